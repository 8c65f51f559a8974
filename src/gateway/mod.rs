//! Gateway access-control implementation

pub mod auth;
pub mod identity;
pub mod runtime;
pub mod server;
pub mod trust;

pub use auth::{AuthorizationResult, Authorizer, ConnectCredential, DenyReason, ResolvedAuth};
pub use identity::{AuthoritativeIdentity, ClaimedIdentity, IdentityLookup};
pub use runtime::{RuntimeConfig, resolve_runtime_config};
pub use trust::{ForwardedHeaders, RequestMeta, TrustClassification, classify_trust};
