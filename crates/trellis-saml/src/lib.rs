//! SAML 2.0 service-provider support.
//!
//! Implements the SP side of web-browser SSO: AuthnRequest and
//! LogoutRequest generation over the HTTP-Redirect binding, validation
//! of signed responses delivered to the assertion consumer service, and
//! SP metadata generation. Attribute resolution normalizes assertion
//! attributes into a [`trellis_core::FederatedIdentity`].

pub mod attributes;
pub mod binding;
pub mod canonical;
pub mod error;
pub mod metadata;
pub mod request;
pub mod response;
pub mod service;
pub mod signature;

pub use attributes::SamlAttributeResolver;
pub use error::{SamlError, SamlResult};
pub use response::{check_conditions, parse_response, ParsedResponse, CLOCK_SKEW_SECONDS};
pub use service::{SamlService, SpSettings};
pub use signature::verify_response_signature;
