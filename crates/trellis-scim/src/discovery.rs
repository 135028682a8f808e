//! Discovery documents (RFC 7643 Sections 5-7).
//!
//! These are static: the server's capabilities do not vary per tenant.

use serde_json::{json, Value};

/// Maximum results advertised (and enforced) for filtered queries.
pub const MAX_FILTER_RESULTS: i64 = 200;

/// /ServiceProviderConfig document.
#[must_use]
pub fn service_provider_config(base_url: &str) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:ServiceProviderConfig"],
        "documentationUri": format!("{base_url}/docs/scim"),
        "patch": {"supported": true},
        "bulk": {"supported": false, "maxOperations": 0, "maxPayloadSize": 0},
        "filter": {"supported": true, "maxResults": MAX_FILTER_RESULTS},
        "changePassword": {"supported": false},
        "sort": {"supported": false},
        "etag": {"supported": false},
        "authenticationSchemes": [{
            "type": "oauthbearertoken",
            "name": "OAuth Bearer Token",
            "description": "Authentication scheme using the OAuth Bearer Token Standard",
            "specUri": "http://www.rfc-editor.org/info/rfc6750",
            "primary": true
        }],
        "meta": {
            "resourceType": "ServiceProviderConfig",
            "location": format!("{base_url}/scim/v2/ServiceProviderConfig")
        }
    })
}

/// /ResourceTypes document.
#[must_use]
pub fn resource_types(base_url: &str) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:ListResponse"],
        "totalResults": 2,
        "startIndex": 1,
        "itemsPerPage": 2,
        "Resources": [
            {
                "schemas": ["urn:ietf:params:scim:schemas:core:2.0:ResourceType"],
                "id": "User",
                "name": "User",
                "endpoint": "/Users",
                "schema": "urn:ietf:params:scim:schemas:core:2.0:User",
                "meta": {
                    "resourceType": "ResourceType",
                    "location": format!("{base_url}/scim/v2/ResourceTypes/User")
                }
            },
            {
                "schemas": ["urn:ietf:params:scim:schemas:core:2.0:ResourceType"],
                "id": "Group",
                "name": "Group",
                "endpoint": "/Groups",
                "schema": "urn:ietf:params:scim:schemas:core:2.0:Group",
                "meta": {
                    "resourceType": "ResourceType",
                    "location": format!("{base_url}/scim/v2/ResourceTypes/Group")
                }
            }
        ]
    })
}

/// /Schemas document describing the attributes this server stores.
#[must_use]
pub fn schemas() -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:ListResponse"],
        "totalResults": 2,
        "startIndex": 1,
        "itemsPerPage": 2,
        "Resources": [
            {
                "id": "urn:ietf:params:scim:schemas:core:2.0:User",
                "name": "User",
                "description": "User Account",
                "attributes": [
                    {"name": "userName", "type": "string", "multiValued": false, "required": true, "uniqueness": "server"},
                    {"name": "name", "type": "complex", "multiValued": false, "required": false,
                     "subAttributes": [
                         {"name": "givenName", "type": "string", "multiValued": false, "required": false},
                         {"name": "familyName", "type": "string", "multiValued": false, "required": false}
                     ]},
                    {"name": "active", "type": "boolean", "multiValued": false, "required": false},
                    {"name": "emails", "type": "complex", "multiValued": true, "required": false},
                    {"name": "externalId", "type": "string", "multiValued": false, "required": false}
                ]
            },
            {
                "id": "urn:ietf:params:scim:schemas:core:2.0:Group",
                "name": "Group",
                "description": "Group",
                "attributes": [
                    {"name": "displayName", "type": "string", "multiValued": false, "required": true},
                    {"name": "members", "type": "complex", "multiValued": true, "required": false}
                ]
            }
        ]
    })
}
