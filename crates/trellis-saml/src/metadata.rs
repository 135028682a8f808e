//! SP metadata document.

use crate::request::{BINDING_HTTP_POST, BINDING_HTTP_REDIRECT, NAMEID_EMAIL};

/// Static SP EntityDescriptor advertising the assertion consumer and
/// single-logout endpoints.
///
/// AuthnRequests are sent unsigned; assertions from the IdP must be
/// signed.
#[must_use]
pub fn generate_metadata(sp_entity_id: &str, acs_url: &str, sls_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{sp_entity_id}">
  <md:SPSSODescriptor AuthnRequestsSigned="false" WantAssertionsSigned="true" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:SingleLogoutService Binding="{BINDING_HTTP_REDIRECT}" Location="{sls_url}"/>
    <md:NameIDFormat>{NAMEID_EMAIL}</md:NameIDFormat>
    <md:AssertionConsumerService Binding="{BINDING_HTTP_POST}" Location="{acs_url}" index="1" isDefault="true"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>
"#
    )
}
