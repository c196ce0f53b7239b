use std::sync::Arc;

use tenantgate_core::Principal;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::access::AccessSet;

/// Per-request identity and memo storage.
///
/// Build one per inbound request from the identity layer's output and pass
/// it by reference down the call chain. The [`AccessSet`] computed for it is
/// stored here, so it lives exactly as long as the request and can never be
/// observed by another request, even one for the same principal.
///
/// Not `Clone`: a copy would carry its own memo.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    session_id: String,
    principal: Principal,
    ip_address: Option<String>,
    user_agent: Option<String>,
    pub(crate) access: OnceCell<Arc<AccessSet>>,
}

impl RequestContext {
    pub fn new(session_id: impl Into<String>, principal: Principal) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            session_id: session_id.into(),
            principal,
            ip_address: None,
            user_agent: None,
            access: OnceCell::new(),
        }
    }

    /// Use an id supplied by the transport layer (e.g. an `x-request-id` header).
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// The access set already computed for this request, if any.
    pub fn cached_access(&self) -> Option<Arc<AccessSet>> {
        self.access.get().cloned()
    }
}
