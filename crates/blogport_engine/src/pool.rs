//! Per-host connection pool with request-issue rate limiting, host
//! rewriting and manual redirect following.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use blogport_core::{HostRewrites, RunConfig};
use port_logging::port_debug;
use reqwest::header::LOCATION;
use reqwest::{Client, Method, Response, StatusCode};
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const REDIRECT_HOP_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("url {0} has no host")]
    NoHost(String),
    #[error("http status {0}")]
    Status(StatusCode),
    #[error("redirect limit exceeded after {0} hops")]
    RedirectLimit(usize),
    #[error("bad redirect target: {0}")]
    BadRedirect(String),
    #[error("host rewrite produced an invalid authority: {0}")]
    BadRewrite(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// One reusable client per destination host, shared for the whole run.
///
/// Every request issue goes through the rate limiter: requests to the same
/// host are spaced at least `1/max_qps` apart, measured at issue time. The
/// last-issue table sits behind an async mutex that is held across the
/// wait, so the check-then-update is atomic.
pub struct HostPool {
    clients: HashMap<String, Client>,
    last_issue: Mutex<HashMap<String, Instant>>,
    min_gap: Duration,
    rewrites: HostRewrites,
}

impl HostPool {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            clients: HashMap::new(),
            last_issue: Mutex::new(HashMap::new()),
            min_gap: config.min_request_gap(),
            rewrites: config.rewrites.clone(),
        }
    }

    /// Metadata-only request; used for size checks.
    pub async fn head(&mut self, url: &Url) -> Result<Response, PoolError> {
        self.request(Method::HEAD, url).await
    }

    pub async fn get(&mut self, url: &Url) -> Result<Response, PoolError> {
        self.request(Method::GET, url).await
    }

    /// Drops every open connection. Called once at the end of a run,
    /// best-effort on failure paths.
    pub fn close_all(&mut self) {
        port_debug!("closing {} host connection(s)", self.clients.len());
        self.clients.clear();
    }

    async fn request(&mut self, method: Method, url: &Url) -> Result<Response, PoolError> {
        let mut target = self.rewritten(url)?;
        let host = host_of(&target)?;
        self.wait_turn(&host).await;
        let client = self.client_for(&host)?;
        let mut response = client.request(method.clone(), target.clone()).send().await?;

        let mut hops = 0;
        while response.status().is_redirection() {
            hops += 1;
            if hops > REDIRECT_HOP_LIMIT {
                return Err(PoolError::RedirectLimit(hops));
            }
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| PoolError::BadRedirect("missing location header".into()))?;
            let next = target
                .join(location)
                .map_err(|err| PoolError::BadRedirect(err.to_string()))?;
            let next = self.rewritten(&next)?;
            let next_host = host_of(&next)?;
            port_debug!("following redirect {target} -> {next}");

            // The redirect target is usually a different host; do not tie it
            // to a pooled connection. One fresh client, dropped afterwards.
            self.wait_turn(&next_host).await;
            let ephemeral = build_client()?;
            response = ephemeral.request(method.clone(), next.clone()).send().await?;
            target = next;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(PoolError::Status(status));
        }
        Ok(response)
    }

    /// Applies the host-rewrite map; path and query are untouched.
    fn rewritten(&self, url: &Url) -> Result<Url, PoolError> {
        let host = url
            .host_str()
            .ok_or_else(|| PoolError::NoHost(url.to_string()))?;
        let replacement = self.rewrites.resolve(host);
        if replacement == host {
            return Ok(url.clone());
        }
        let mut out = url.clone();
        out.set_host(Some(replacement))
            .map_err(|_| PoolError::BadRewrite(replacement.to_string()))?;
        Ok(out)
    }

    /// Sleeps until this host's next issue slot, then records the slot.
    async fn wait_turn(&self, host: &str) {
        let mut table = self.last_issue.lock().await;
        if let Some(previous) = table.get(host) {
            let wait = (*previous + self.min_gap).saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                port_debug!("rate limit: waiting {}ms before {host}", wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }
        table.insert(host.to_string(), Instant::now());
    }

    fn client_for(&mut self, host: &str) -> Result<&Client, PoolError> {
        if !self.clients.contains_key(host) {
            port_debug!("opening connection pool for {host}");
            self.clients.insert(host.to_string(), build_client()?);
        }
        Ok(&self.clients[host])
    }
}

fn host_of(url: &Url) -> Result<String, PoolError> {
    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| PoolError::NoHost(url.to_string()))
}

fn build_client() -> Result<Client, PoolError> {
    // Redirects are followed by hand above, so the client never follows.
    Ok(Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}
