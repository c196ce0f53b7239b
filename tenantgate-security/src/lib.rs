//! Tenant access resolution for tenantgate.
//!
//! - [`AccessResolver`] computes which tenants a principal may act on and
//!   answers [`can_access`](AccessResolver::can_access), the only gate a
//!   tenant-scoped handler should consult.
//! - [`RequestContext`] carries the request's identity and memoises the
//!   computed [`AccessSet`] for the lifetime of that request only.
//! - [`principal_from_claims`] maps validated token claims to a [`Principal`].
//!
//! [`Principal`]: tenantgate_core::Principal

pub mod access;
pub mod context;
pub mod error;
pub mod identity;

pub use access::{AccessResolver, AccessSet};
pub use context::RequestContext;
pub use error::SecurityError;
pub use identity::principal_from_claims;
