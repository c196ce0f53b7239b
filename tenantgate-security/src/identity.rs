use serde_json::Value;
use tenantgate_core::{Principal, Role, TenantId};

use crate::error::SecurityError;

/// Build a [`Principal`] from validated token claims.
///
/// - `sub` becomes the principal id and must be a non-empty string.
/// - The role is `SUPERADMIN` when any of the `role` claim, the `roles`
///   array or Keycloak's `realm_access.roles` names it; otherwise `STANDARD`.
/// - `tenant_id`, as a number or numeric string, becomes the home tenant.
///
/// ```ignore
/// let principal = principal_from_claims(&claims)?;
/// let ctx = RequestContext::new(session_id, principal);
/// ```
pub fn principal_from_claims(claims: &Value) -> Result<Principal, SecurityError> {
    let sub = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or(SecurityError::MissingClaim("sub"))?;

    let role = if role_claims(claims).any(|r| Role::from_claim(r) == Role::SuperAdmin) {
        Role::SuperAdmin
    } else {
        Role::Standard
    };

    let mut principal = Principal::new(sub, role);
    if let Some(tenant_id) = home_tenant(claims)? {
        principal = principal.with_home_tenant(tenant_id);
    }
    Ok(principal)
}

fn role_claims(claims: &Value) -> impl Iterator<Item = &str> {
    let single = claims.get("role").and_then(|v| v.as_str());
    let standard = string_array(claims.get("roles"));
    let realm = string_array(claims.get("realm_access").and_then(|ra| ra.get("roles")));
    single.into_iter().chain(standard).chain(realm)
}

fn string_array(value: Option<&Value>) -> impl Iterator<Item = &str> {
    value
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
}

fn home_tenant(claims: &Value) -> Result<Option<TenantId>, SecurityError> {
    match claims.get("tenant_id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(|id| Some(TenantId(id))).ok_or_else(|| {
            SecurityError::InvalidClaim {
                claim: "tenant_id",
                message: format!("not an integer: {n}"),
            }
        }),
        Some(Value::String(s)) => s
            .parse::<i64>()
            .map(|id| Some(TenantId(id)))
            .map_err(|e| SecurityError::InvalidClaim {
                claim: "tenant_id",
                message: e.to_string(),
            }),
        Some(other) => Err(SecurityError::InvalidClaim {
            claim: "tenant_id",
            message: format!("unexpected type: {other}"),
        }),
    }
}
