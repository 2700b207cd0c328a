//! Common test utilities for dirsync-graph integration tests.

#![allow(dead_code)]

use dirsync_graph::{GraphConfig, GraphCredentials, GraphDirectory};
use secrecy::SecretString;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT: &str = "contoso-tenant";

/// Test data factory for a user member.
pub fn user(id: &str, mail: &str) -> Value {
    json!({
        "@odata.type": "#microsoft.graph.user",
        "id": id,
        "displayName": format!("User {id}"),
        "mail": mail,
        "mailNickname": mail.split('@').next().unwrap_or(mail),
        "userPrincipalName": mail,
        "accountEnabled": true
    })
}

/// Test data factory for a service principal member.
pub fn service_principal(id: &str, app_id: &str) -> Value {
    json!({
        "@odata.type": "#microsoft.graph.servicePrincipal",
        "id": id,
        "displayName": format!("App {id}"),
        "appId": app_id,
        "accountEnabled": true
    })
}

/// Test data factory for a nested group member.
pub fn nested_group(id: &str, name: &str) -> Value {
    json!({
        "@odata.type": "#microsoft.graph.group",
        "id": id,
        "displayName": name
    })
}

/// Test data factory for a group fetched by id.
pub fn group(id: &str, name: &str) -> Value {
    json!({ "id": id, "displayName": name })
}

/// Wraps items in an OData collection response.
pub fn odata_page(items: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut response = json!({ "value": items });
    if let Some(link) = next_link {
        response["@odata.nextLink"] = json!(link);
    }
    response
}

/// Creates an OData error response.
pub fn odata_error(code: &str, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

pub fn token_response(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600
    })
}

/// Mock Graph and login endpoints on a single server.
pub struct MockGraph {
    pub server: MockServer,
}

impl MockGraph {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn token_path() -> String {
        format!("/{TENANT}/oauth2/v2.0/token")
    }

    /// Accepts every token request.
    pub async fn mount_token(&self) {
        Mock::given(method("POST"))
            .and(path(Self::token_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response("test-token")))
            .mount(&self.server)
            .await;
    }

    /// Serves `GET /v1.0/groups/{id}` and a single page of members.
    pub async fn mount_group(&self, id: &str, name: &str, members: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(format!("/v1.0/groups/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(group(id, name)))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1.0/groups/{id}/members")))
            .respond_with(ResponseTemplate::new(200).set_body_json(odata_page(members, None)))
            .mount(&self.server)
            .await;
    }

    pub fn config(&self) -> GraphConfig {
        GraphConfig::new(TENANT).with_endpoint(self.server.uri())
    }

    pub fn directory(&self) -> GraphDirectory {
        GraphDirectory::new(&self.config(), credentials()).unwrap()
    }
}

pub fn credentials() -> GraphCredentials {
    GraphCredentials {
        client_id: "client-id".to_string(),
        client_secret: SecretString::new("client-secret".to_string()),
    }
}
