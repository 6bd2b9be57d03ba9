/// Session with the locally running League client (the "remote client").
///
/// The client exposes an authenticated HTTPS API on `127.0.0.1`. Its port and
/// password are only published on the `LeagueClientUx` process command line,
/// so a session is discovered by scanning the process table rather than
/// configured.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::process_registry::{Pid, ProcessDetails, SystemProcessRegistry};

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

const CLIENT_UX_PROCESS_NAMES: &[&str] = &["LeagueClientUx.exe", "LeagueClientUx"];
const AUTH_USER: &str = "riot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Point-in-time view of the remote client. Read by the installation
/// resolver and the settings-file controller; never written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    /// e.g. `"TENCENT"`, `"EUW"`. Only known while connected.
    pub region: Option<String>,
}

impl ConnectionSnapshot {
    pub fn connected(region: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Connected,
            region: Some(region.into()),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            region: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// The remote client as seen by the controller.
#[async_trait]
pub trait RemoteClientSession: Send + Sync {
    /// Current connection state. May scan the process table.
    async fn snapshot(&self) -> ConnectionSnapshot;

    /// `GET`s `path` from the client API and returns the decoded JSON body.
    /// Non-2xx statuses, timeouts and transport failures are errors.
    async fn get(&self, path: &str) -> Result<Value, RemoteError>;
}

/// Credentials and routing data taken from the client's command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcuAuth {
    pub pid: Pid,
    pub port: u16,
    pub token: String,
    pub region: Option<String>,
}

impl LcuAuth {
    /// Parses `--app-port=`, `--remoting-auth-token=` and `--region=` out
    /// of `args`. Port and token are required.
    pub fn from_args(pid: Pid, args: &[String]) -> Option<Self> {
        let mut port = None;
        let mut token = None;
        let mut region = None;

        for arg in args {
            let arg = arg.trim().trim_matches('"');
            let Some((key, value)) = arg.split_once('=') else {
                continue;
            };
            let value = value.trim_matches('"');
            match key {
                "--app-port" => port = value.parse::<u16>().ok(),
                "--remoting-auth-token" if !value.is_empty() => token = Some(value.to_string()),
                "--region" if !value.is_empty() => region = Some(value.to_string()),
                _ => {}
            }
        }

        Some(Self {
            pid,
            port: port?,
            token: token?,
            region,
        })
    }

    fn base_url(&self) -> String {
        format!("https://127.0.0.1:{}", self.port)
    }
}

struct ActiveSession {
    auth: LcuAuth,
    http: reqwest::Client,
}

/// [`RemoteClientSession`] over the client's HTTPS API, rediscovered from
/// the process table on every snapshot.
pub struct LeagueClientSession {
    registry: Arc<SystemProcessRegistry>,
    timeout: Mutex<Duration>,
    active: Mutex<Option<ActiveSession>>,
}

impl LeagueClientSession {
    pub fn new(registry: Arc<SystemProcessRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            timeout: Mutex::new(timeout),
            active: Mutex::new(None),
        }
    }

    /// Changes the request timeout. The HTTP client is rebuilt on the next
    /// discovery.
    pub fn set_timeout(&self, timeout: Duration) {
        let changed = {
            let mut current = self.timeout.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *current, timeout) != timeout
        };
        if changed {
            self.active.lock().unwrap_or_else(|e| e.into_inner()).take();
        }
    }

    /// Finds a running client. The process scan runs on the blocking pool.
    async fn discover(&self) -> Option<(LcuAuth, reqwest::Client)> {
        let registry = Arc::clone(&self.registry);
        let found = match tokio::task::spawn_blocking(move || scan_for_client(&registry)).await {
            Ok(found) => found,
            Err(e) => {
                warn!("remote client scan failed: {e}");
                None
            }
        };
        self.adopt(found)
    }

    /// Records the outcome of a scan, reusing the HTTP client when the
    /// credentials have not changed since the last discovery.
    fn adopt(&self, found: Option<LcuAuth>) -> Option<(LcuAuth, reqwest::Client)> {
        let timeout = *self.timeout.lock().unwrap_or_else(|e| e.into_inner());
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let Some(auth) = found else {
            if active.take().is_some() {
                info!("remote client went away");
            }
            return None;
        };

        if let Some(current) = active.as_ref() {
            if current.auth == auth {
                return Some((current.auth.clone(), current.http.clone()));
            }
        }

        let http = match build_http_client(timeout) {
            Ok(http) => http,
            Err(e) => {
                warn!("failed to build HTTP client for remote client: {e}");
                return None;
            }
        };
        info!(
            pid = auth.pid,
            port = auth.port,
            region = auth.region.as_deref().unwrap_or("-"),
            "remote client discovered"
        );
        *active = Some(ActiveSession {
            auth: auth.clone(),
            http: http.clone(),
        });
        Some((auth, http))
    }
}

fn scan_for_client(registry: &SystemProcessRegistry) -> Option<LcuAuth> {
    CLIENT_UX_PROCESS_NAMES
        .iter()
        .flat_map(|name| registry.find_by_name(name))
        .find_map(|ProcessDetails { pid, cmd, .. }| LcuAuth::from_args(pid, &cmd))
}

#[async_trait]
impl RemoteClientSession for LeagueClientSession {
    async fn snapshot(&self) -> ConnectionSnapshot {
        match self.discover().await {
            Some((auth, _)) => ConnectionSnapshot {
                state: ConnectionState::Connected,
                region: auth.region,
            },
            None => ConnectionSnapshot::disconnected(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value, RemoteError> {
        let (auth, http) = self.discover().await.ok_or(RemoteError::NoSession)?;
        get_json(&http, &auth.base_url(), Some(&auth.token), path).await
    }
}

/// `GET {base_url}{path}`, with basic auth when a token is given. Anything
/// but a 2xx status with a JSON body is an error.
pub(crate) async fn get_json(
    http: &reqwest::Client,
    base_url: &str,
    token: Option<&str>,
    path: &str,
) -> Result<Value, RemoteError> {
    debug!("GET {base_url}{path}");
    let mut request = http.get(format!("{base_url}{path}"));
    if let Some(token) = token {
        request = request.basic_auth(AUTH_USER, Some(token));
    }
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(RemoteError::Status {
            path: path.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Both local APIs serve a self-signed certificate for `127.0.0.1` and are
/// never reached through a proxy. Connections are pooled and kept alive.
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .no_proxy()
        .timeout(timeout)
        .build()
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;

    /// Canned responses keyed by path; unknown paths answer 404.
    pub struct FakeSession {
        pub snapshot: ConnectionSnapshot,
        pub responses: HashMap<String, Value>,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeSession {
        pub fn new(snapshot: ConnectionSnapshot) -> Self {
            Self {
                snapshot,
                responses: HashMap::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn with_response(mut self, path: &str, body: Value) -> Self {
            self.responses.insert(path.to_string(), body);
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteClientSession for FakeSession {
        async fn snapshot(&self) -> ConnectionSnapshot {
            self.snapshot.clone()
        }

        async fn get(&self, path: &str) -> Result<Value, RemoteError> {
            self.requests.lock().unwrap().push(path.to_string());
            if !self.snapshot.is_connected() {
                return Err(RemoteError::NoSession);
            }
            self.responses
                .get(path)
                .cloned()
                .ok_or_else(|| RemoteError::Status {
                    path: path.to_string(),
                    status: 404,
                })
        }
    }
}
