use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use meshnet_routing::{Instance, MeshError};

/// Per-call context mirroring the §6 "HTTP proxy call" header contract:
/// `X-Sequence`, `X-Hops`, `X-Proxy` (hex host instance), `X-Originator`
/// (hex originator), `X-Test`.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub sequence: u16,
    pub hop_count: u8,
    pub proxy: Instance,
    pub originator: Instance,
    pub test_id: u32,
}

/// The Internet-proxy call capability, kept behind a trait so tests never
/// need a live HTTP endpoint. [`HttpInternetClient`] is the production
/// implementation; everything else the controller does is transport- and
/// network-agnostic.
#[async_trait]
pub trait InternetClient: Send + Sync {
    async fn call(&self, url: &str, body: Vec<u8>, ctx: RequestContext) -> Result<(u16, Vec<u8>), MeshError>;
}

/// Blocking `ureq` call run on a dedicated blocking thread, per §5's
/// "Internet context (may be parallel with the main context) used only for
/// outgoing external HTTP calls, which are blocking."
pub struct HttpInternetClient {
    connect_timeout: Duration,
}

impl HttpInternetClient {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl InternetClient for HttpInternetClient {
    async fn call(&self, url: &str, body: Vec<u8>, ctx: RequestContext) -> Result<(u16, Vec<u8>), MeshError> {
        let url = url.to_string();
        let connect_timeout = self.connect_timeout;

        tokio::task::spawn_blocking(move || {
            let agent = ureq::AgentBuilder::new().timeout_connect(connect_timeout).build();
            let response = agent
                .post(&url)
                .set("Content-Type", "application/json")
                .set("X-Sequence", &ctx.sequence.to_string())
                .set("X-Hops", &ctx.hop_count.to_string())
                .set("X-Proxy", &ctx.proxy.to_hex())
                .set("X-Originator", &ctx.originator.to_hex())
                .set("X-Test", &ctx.test_id.to_string())
                .send_bytes(&body);

            match response {
                Ok(resp) => {
                    let code = resp.status();
                    let body = resp.into_string().unwrap_or_default().into_bytes();
                    Ok((code, body))
                }
                Err(ureq::Error::Status(code, resp)) => {
                    let body = resp.into_string().unwrap_or_default().into_bytes();
                    Ok((code, body))
                }
                Err(err @ ureq::Error::Transport(_)) => {
                    warn!("internet: http call to {url} failed: {err}");
                    Err(MeshError::external_http_failure(err.to_string()))
                }
            }
        })
        .await
        .map_err(|err| MeshError::external_http_failure(format!("blocking task panicked: {err}")))?
    }
}
