// src/core/backend/client.rs

//! The reqwest-backed transport used against real backends.

use super::{BackendOp, BackendResponse, OpParams};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

/// The version header every backend reply carries for versioned reads.
const VERSION_HEADER: &str = "X-Version";

/// The seam between the replication engine and the network. The dispatcher,
/// health checker and binlog replayer all speak to backends through this
/// trait, which keeps the engine testable against a scripted transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues one operation against one backend, bounded by `deadline`.
    /// Failures of any kind (connect, timeout, malformed reply) surface as a
    /// response with `code == 0`; this method does not error.
    async fn call(
        &self,
        host: &str,
        op: BackendOp,
        params: &OpParams,
        body: Option<Bytes>,
        deadline: Duration,
    ) -> BackendResponse;
}

/// Issues operations over plain HTTP with a shared connection pool.
pub struct HttpTransport {
    client: reqwest::Client,
    /// Path probed by [`BackendOp::Alive`]; configurable because backend
    /// builds have not spelled it uniformly.
    probe_path: String,
}

impl HttpTransport {
    pub fn new(probe_path: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            probe_path,
        }
    }

    fn url(&self, host: &str, op: BackendOp, params: &OpParams) -> String {
        let path = match op {
            BackendOp::Alive => self.probe_path.as_str(),
            _ => op.path(),
        };
        let mut url = format!("http://{host}{path}");
        let mut sep = '?';
        for (key, value) in params.iter() {
            url.push(sep);
            url.push_str(&key.to_string());
            url.push('=');
            url.push_str(&urlencoding::encode_binary(value));
            sep = '&';
        }
        url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        host: &str,
        op: BackendOp,
        params: &OpParams,
        body: Option<Bytes>,
        deadline: Duration,
    ) -> BackendResponse {
        let url = self.url(host, op, params);
        let request = match body {
            Some(payload) => self.client.post(&url).body(payload),
            None => self.client.get(&url),
        };

        let response = match request.timeout(deadline).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("backend {host} {op} failed: {e}");
                return BackendResponse {
                    host: host.to_string(),
                    ..Default::default()
                };
            }
        };

        let code = response.status().as_u16();
        let version = response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let body = response.bytes().await.unwrap_or_else(|e| {
            debug!("backend {host} {op} body read failed: {e}");
            Bytes::new()
        });

        BackendResponse {
            host: host.to_string(),
            code,
            version,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::ParamKey;

    #[test]
    fn url_encodes_binary_params() {
        let transport = HttpTransport::new("/status.html".into());
        let params = OpParams::new()
            .with(ParamKey::Key, Bytes::from_static(b"a b\xff"))
            .with(ParamKey::Ttl, Bytes::from_static(b"30"));
        assert_eq!(
            transport.url("10.0.0.1:8085", BackendOp::Put, &params),
            "http://10.0.0.1:8085/hustdb/put?key=a%20b%FF&ttl=30"
        );
    }

    #[test]
    fn probe_path_comes_from_configuration() {
        let transport = HttpTransport::new("/healthz".into());
        assert_eq!(
            transport.url("10.0.0.1:8085", BackendOp::Alive, &OpParams::new()),
            "http://10.0.0.1:8085/healthz"
        );
    }
}
