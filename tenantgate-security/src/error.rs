/// Errors raised while mapping an identity into a [`Principal`](tenantgate_core::Principal).
///
/// Access checks never fail with an error: `can_access` answers `false`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    /// A required claim is absent or empty.
    #[error("missing claim: {0}")]
    MissingClaim(&'static str),

    /// A claim is present but has an unusable value.
    #[error("invalid claim {claim}: {message}")]
    InvalidClaim {
        claim: &'static str,
        message: String,
    },
}
