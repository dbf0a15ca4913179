//! HTTP client for volume servers
//!
//! Volumes are plain HTTP blob servers: `HEAD` to check and `GET` to read,
//! `PUT` to store, `DELETE` to remove, and `UNLINK` to leave a pre-delete
//! marker. Every request is bounded by the volume timeout; a volume that does
//! not answer in time, or refuses the connection, is reported as unavailable.

use crate::common::{Error, Result};
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};
use std::future::Future;
use std::time::Duration;

/// What the coordinator needs from a volume server
pub trait VolumeTransport: Send + Sync {
    /// Does `volume` hold `path`? `Ok(false)` means the volume answered 404.
    fn exists(&self, volume: &str, path: &str) -> impl Future<Output = Result<bool>> + Send;

    fn fetch(&self, volume: &str, path: &str) -> impl Future<Output = Result<Bytes>> + Send;

    fn store(
        &self,
        volume: &str,
        path: &str,
        body: Bytes,
    ) -> impl Future<Output = Result<()>> + Send;

    fn unlink(&self, volume: &str, path: &str) -> impl Future<Output = Result<()>> + Send;

    fn remove(&self, volume: &str, path: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Absolute URL of `path` on `volume`
pub fn volume_url(volume: &str, path: &str) -> String {
    if volume.starts_with("http://") || volume.starts_with("https://") {
        format!("{}{}", volume.trim_end_matches('/'), path)
    } else {
        format!("http://{}{}", volume, path)
    }
}

/// reqwest-backed [`VolumeTransport`]
#[derive(Debug, Clone)]
pub struct VolumeClient {
    client: Client,
    timeout: Duration,
}

impl VolumeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(100)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, method: Method, volume: &str, path: &str) -> Result<reqwest::Response> {
        self.client
            .request(method, volume_url(volume, path))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify(volume, e))
    }
}

fn classify(volume: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::VolumeUnavailable {
            volume: volume.to_string(),
            reason: e.to_string(),
        }
    } else {
        Error::Http(format!("{}: {}", volume, e))
    }
}

fn unexpected(volume: &str, method: &str, path: &str, status: StatusCode) -> Error {
    Error::Http(format!("{} {}{} returned {}", method, volume, path, status))
}

impl VolumeTransport for VolumeClient {
    async fn exists(&self, volume: &str, path: &str) -> Result<bool> {
        let response = self.send(Method::HEAD, volume, path).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(unexpected(volume, "HEAD", path, s)),
        }
    }

    async fn fetch(&self, volume: &str, path: &str) -> Result<Bytes> {
        let response = self.send(Method::GET, volume, path).await?;
        match response.status() {
            s if s.is_success() => response.bytes().await.map_err(|e| classify(volume, e)),
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("{}{}", volume, path))),
            s => Err(unexpected(volume, "GET", path, s)),
        }
    }

    async fn store(&self, volume: &str, path: &str, body: Bytes) -> Result<()> {
        let response = self
            .client
            .put(volume_url(volume, path))
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| classify(volume, e))?;
        match response.status() {
            s if s.is_success() => Ok(()),
            s => Err(unexpected(volume, "PUT", path, s)),
        }
    }

    async fn unlink(&self, volume: &str, path: &str) -> Result<()> {
        let method = Method::from_bytes(b"UNLINK")
            .map_err(|e| Error::Internal(format!("UNLINK method: {}", e)))?;
        let response = self.send(method, volume, path).await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            s => Err(unexpected(volume, "UNLINK", path, s)),
        }
    }

    async fn remove(&self, volume: &str, path: &str) -> Result<()> {
        let response = self.send(Method::DELETE, volume, path).await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            s => Err(unexpected(volume, "DELETE", path, s)),
        }
    }
}
