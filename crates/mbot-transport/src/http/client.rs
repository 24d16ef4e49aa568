//! Mattermost REST API v4 client.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, trace};

use mbot_core::{ApiError, ApiResult, Channel, NewPost, Post, RemoteApi, Team, User};

use crate::API_PATH;

/// Header carrying the session token in the login response.
const TOKEN_HEADER: &str = "Token";

/// [`RemoteApi`] over the Mattermost REST API v4.
///
/// The session token obtained by [`login`](RemoteApi::login) is attached as
/// a bearer token to every later request.
pub struct MattermostClient {
    http: Client,
    api_root: String,
    token: RwLock<Option<String>>,
}

impl MattermostClient {
    /// Creates a client for the server at `server_url`, e.g.
    /// `https://chat.example.com`.
    pub fn new(server_url: &str) -> ApiResult<Self> {
        Self::with_timeout(server_url, Duration::from_secs(30))
    }

    /// Creates a client with a custom request timeout.
    pub fn with_timeout(server_url: &str, timeout: Duration) -> ApiResult<Self> {
        let http = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Request {
                endpoint: String::new(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            api_root: format!("{}{API_PATH}", server_url.trim_end_matches('/')),
            token: RwLock::new(None),
        })
    }

    /// Root of the API, e.g. `https://chat.example.com/api/v4`.
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    /// Sends a request and checks its status.
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> ApiResult<reqwest::Response> {
        let url = format!("{}{endpoint}", self.api_root);
        trace!(method = %method, url = %url, "API request");

        let mut req = self.http.request(method, &url);
        if let Some(token) = self.token.read().as_deref() {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await.map_err(|e| ApiError::Request {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(endpoint.to_string()));
        }

        let text = resp.text().await.unwrap_or_default();
        // Error bodies are `{"message": ..., ...}`; fall back to raw text.
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);
        Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> ApiResult<T> {
        let resp = self.execute(method, endpoint, body).await?;
        resp.json().await.map_err(|e| ApiError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl RemoteApi for MattermostClient {
    async fn ping(&self) -> ApiResult<()> {
        self.execute(Method::GET, "/system/ping", None).await?;
        debug!(api = %self.api_root, "Server is up");
        Ok(())
    }

    async fn login(&self, login_id: &str, password: &str) -> ApiResult<User> {
        let body = json!({ "login_id": login_id, "password": password });
        let resp = self
            .execute(Method::POST, "/users/login", Some(body))
            .await?;

        let token = resp
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(ApiError::NotAuthenticated)?;
        let user: User = resp
            .json()
            .await
            .map_err(|e| ApiError::Serialization(e.to_string()))?;

        *self.token.write() = Some(token);
        info!(user = %user.username, user_id = %user.id, "Logged in");
        Ok(user)
    }

    fn auth_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    async fn update_user(&self, user: &User) -> ApiResult<User> {
        let body = serde_json::to_value(user)?;
        self.json(Method::PUT, &format!("/users/{}/patch", user.id), Some(body))
            .await
    }

    async fn team_by_name(&self, name: &str) -> ApiResult<Team> {
        self.json(Method::GET, &format!("/teams/name/{name}"), None)
            .await
    }

    async fn channel_by_name(&self, team_id: &str, name: &str) -> ApiResult<Option<Channel>> {
        let endpoint = format!("/teams/{team_id}/channels/name/{name}");
        match self.json(Method::GET, &endpoint, None).await {
            Ok(channel) => Ok(Some(channel)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_channel(
        &self,
        team_id: &str,
        name: &str,
        display_name: &str,
    ) -> ApiResult<Channel> {
        let body = json!({
            "team_id": team_id,
            "name": name,
            "display_name": display_name,
            "type": "O",
        });
        let channel: Channel = self.json(Method::POST, "/channels", Some(body)).await?;
        info!(channel = %name, channel_id = %channel.id, "Channel created");
        Ok(channel)
    }

    async fn add_channel_member(&self, channel_id: &str, user_id: &str) -> ApiResult<()> {
        let body = json!({ "user_id": user_id });
        self.execute(
            Method::POST,
            &format!("/channels/{channel_id}/members"),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn create_post(&self, post: &NewPost) -> ApiResult<Post> {
        let body = serde_json::to_value(post)?;
        self.json(Method::POST, "/posts", Some(body)).await
    }

    async fn direct_channel(&self, user_a: &str, user_b: &str) -> ApiResult<Channel> {
        let body = json!([user_a, user_b]);
        self.json(Method::POST, "/channels/direct", Some(body)).await
    }
}

impl std::fmt::Debug for MattermostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MattermostClient")
            .field("api_root", &self.api_root)
            .field("authenticated", &self.token.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    use super::*;

    /// Minimal stand-in for the server's REST API.
    async fn fake_server() -> SocketAddr {
        let api = Router::new()
            .route("/system/ping", get(|| async { Json(json!({"status": "OK"})) }))
            .route(
                "/users/login",
                post(|Json(body): Json<Value>| async move {
                    if body["password"] == "secret" {
                        let mut headers = HeaderMap::new();
                        headers.insert("Token", "tok-123".parse().unwrap());
                        (headers, Json(json!({"id": "bot-id", "username": "mbot"}))).into_response()
                    } else {
                        (
                            AxumStatus::UNAUTHORIZED,
                            Json(json!({"message": "invalid credentials"})),
                        )
                            .into_response()
                    }
                }),
            )
            .route(
                "/teams/{team}/channels/name/{name}",
                get(|Path((team, name)): Path<(String, String)>, headers: HeaderMap| async move {
                    let authorized = headers
                        .get("authorization")
                        .is_some_and(|v| v == "Bearer tok-123");
                    if !authorized {
                        return AxumStatus::UNAUTHORIZED.into_response();
                    }
                    if name == "town-square" {
                        Json(json!({"id": "ch-1", "team_id": team, "name": name, "type": "O"}))
                            .into_response()
                    } else {
                        AxumStatus::NOT_FOUND.into_response()
                    }
                }),
            );
        let app = Router::new().nest("/api/v4", api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_api_root() {
        let client = MattermostClient::new("https://chat.example.com/").unwrap();
        assert_eq!(client.api_root(), "https://chat.example.com/api/v4");
    }

    #[tokio::test]
    async fn test_login_stores_token_for_later_calls() {
        let addr = fake_server().await;
        let client = MattermostClient::new(&format!("http://{addr}")).unwrap();

        client.ping().await.unwrap();
        assert!(client.auth_token().is_none());

        let user = client.login("mbot", "secret").await.unwrap();
        assert_eq!(user.id, "bot-id");
        assert_eq!(client.auth_token().as_deref(), Some("tok-123"));

        let channel = client.channel_by_name("team-1", "town-square").await.unwrap();
        assert_eq!(channel.map(|c| c.id), Some("ch-1".to_string()));
        assert!(client
            .channel_by_name("team-1", "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_error_status_carries_server_message() {
        let addr = fake_server().await;
        let client = MattermostClient::new(&format!("http://{addr}")).unwrap();

        match client.login("mbot", "wrong").await {
            Err(ApiError::Status {
                status, message, ..
            }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid credentials");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let err = client.channel_by_name("team-1", "town-square").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let client = MattermostClient::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            client.ping().await,
            Err(ApiError::Request { .. })
        ));
    }
}
