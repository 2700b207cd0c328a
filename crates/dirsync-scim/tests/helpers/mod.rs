//! Shared wiremock setup for SCIM account tests.

#![allow(dead_code)]

use dirsync_scim::{ScimAccount, ScimAuth, ScimClient};
use secrecy::SecretString;
use serde_json::{json, Value};
use wiremock::MockServer;

pub const TOKEN: &str = "dapi-test-token";

pub fn account(server: &MockServer) -> ScimAccount {
    let auth = ScimAuth::bearer(SecretString::new(TOKEN.to_string()));
    ScimAccount::new(ScimClient::with_http_client(
        &server.uri(),
        auth,
        reqwest::Client::new(),
    ))
}

pub fn user(id: &str, user_name: &str, external_id: &str) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
        "id": id,
        "userName": user_name,
        "displayName": format!("User {user_name}"),
        "externalId": external_id,
        "active": true
    })
}

pub fn service_principal(id: &str, application_id: &str) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:ServicePrincipal"],
        "id": id,
        "applicationId": application_id,
        "displayName": "automation",
        "active": true
    })
}

pub fn group(id: &str, name: &str, members: &[&str]) -> Value {
    let members: Vec<Value> = members.iter().map(|m| json!({ "value": m })).collect();
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:Group"],
        "id": id,
        "displayName": name,
        "members": members
    })
}

pub fn list(resources: Vec<Value>) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:ListResponse"],
        "totalResults": resources.len(),
        "startIndex": 1,
        "itemsPerPage": resources.len(),
        "Resources": resources
    })
}

pub fn scim_error(status: u16, detail: &str) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:Error"],
        "status": status.to_string(),
        "detail": detail
    })
}
