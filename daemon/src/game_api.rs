/// Client for the API the game process itself serves while a match (or a
/// spectated match) is running.
///
/// Unlike the League client's API it needs no credentials, but it also
/// serves a self-signed certificate on `127.0.0.1`.
use std::sync::RwLock;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::RemoteError;
use crate::remote::{build_http_client, get_json};

pub const GAME_CLIENT_BASE_URL: &str = "https://127.0.0.1:2999";

pub struct GameClientApi {
    base_url: String,
    http: RwLock<reqwest::Client>,
}

impl GameClientApi {
    pub fn new(timeout: Duration) -> Result<Self, RemoteError> {
        Self::with_base_url(GAME_CLIENT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            base_url,
            http: RwLock::new(build_http_client(timeout)?),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Rebuilds the HTTP client with a new request timeout. On error the
    /// previous client stays in use.
    pub fn set_timeout(&self, timeout: Duration) -> Result<(), RemoteError> {
        let http = build_http_client(timeout)?;
        *self.http.write().unwrap_or_else(|e| e.into_inner()) = http;
        debug!("game API timeout set to {timeout:?}");
        Ok(())
    }

    /// `GET`s `path` (e.g. `/liveclientdata/allgamedata`) from the game.
    pub async fn get(&self, path: &str) -> Result<Value, RemoteError> {
        let http = self.http.read().unwrap_or_else(|e| e.into_inner()).clone();
        get_json(&http, &self.base_url, None, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::local_http;

    #[test]
    fn defaults_to_the_local_game_port() {
        let api = GameClientApi::new(Duration::from_secs(1)).unwrap();
        assert_eq!(api.base_url(), "https://127.0.0.1:2999");
    }

    #[test]
    fn trailing_slash_is_dropped() {
        let api = GameClientApi::with_base_url("http://127.0.0.1:1/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.base_url(), "http://127.0.0.1:1");
    }

    #[tokio::test]
    async fn get_returns_decoded_body_without_credentials() {
        let (base_url, head) =
            local_http::serve_once("200 OK", r#"{"gameData":{"gameTime":12.5}}"#).await;
        let api = GameClientApi::with_base_url(base_url, Duration::from_secs(2)).unwrap();

        let body = api.get("/liveclientdata/allgamedata").await.unwrap();

        assert_eq!(body["gameData"]["gameTime"], 12.5);
        let head = head.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /liveclientdata/allgamedata http/1.1"));
        assert!(!head.contains("authorization:"));
    }

    #[tokio::test]
    async fn not_found_is_a_status_error() {
        let (base_url, _head) = local_http::serve_once("404 Not Found", "").await;
        let api = GameClientApi::with_base_url(base_url, Duration::from_secs(2)).unwrap();

        let err = api.get("/liveclientdata/activeplayer").await.unwrap_err();

        assert!(matches!(err, RemoteError::Status { status: 404, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn shorter_timeout_applies_to_later_requests() {
        let base_url = local_http::serve_silence().await;
        let api = GameClientApi::with_base_url(base_url, Duration::from_secs(30)).unwrap();
        api.set_timeout(Duration::from_millis(100)).unwrap();

        let err = api.get("/liveclientdata/allgamedata").await.unwrap_err();

        assert!(matches!(err, RemoteError::Transport(ref e) if e.is_timeout()), "got {err:?}");
    }
}
