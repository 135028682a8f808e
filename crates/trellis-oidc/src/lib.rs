//! OIDC authorization-code flow support.
//!
//! Covers login initiation with PKCE, callback validation (state,
//! nonce, audience), the token and userinfo exchanges, and refresh.
//! Validated claims resolve into a [`trellis_core::FederatedIdentity`]
//! through the same resolver seam the SAML handler uses.

pub mod claims;
pub mod error;
pub mod flow;
pub mod session;

pub use claims::OidcClaimsResolver;
pub use error::{OidcError, OidcResult};
pub use flow::{decode_id_token_payload, AuthFlowService, LoginRedirect};
pub use session::{FlowSession, InMemorySessionStore, SessionStore, SESSION_TTL_MINUTES};
