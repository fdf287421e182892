use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use reqwest::Client;
use tracing::debug;
use url::Url;

use super::HttpError;

/// Default request timeout applied to pooled clients.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide pool of HTTP clients keyed by `scheme://host:port`.
///
/// The pool lock only guards the map. It is released before any request is
/// sent, so concurrent invocations against the same host share a client
/// without serialising on the network call.
#[derive(Debug, Clone)]
pub struct HttpClientPool {
    clients: Arc<Mutex<HashMap<String, Client>>>,
    timeout: Duration,
}

impl Default for HttpClientPool {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl HttpClientPool {
    pub fn new(timeout: Duration) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the pooled client for the host of `url`, creating it on first use.
    pub fn client_for(&self, url: &Url) -> Result<Client, HttpError> {
        let key = host_key(url);
        let mut clients = self.clients.lock().expect("http client pool lock");
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        debug!(host = %key, timeout_secs = self.timeout.as_secs(), "creating pooled http client");
        let client = Client::builder().timeout(self.timeout).build()?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Number of hosts with a pooled client.
    pub fn len(&self) -> usize {
        self.clients.lock().expect("http client pool lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn host_key(url: &Url) -> String {
    format!(
        "{}://{}:{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}
