//! Serves HTTP off of logical streams accepted from the hub's mux session,
//! reverse-proxying each request to the local `kube-apiserver` with the
//! configured identity injected.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use relay_core::LogicalStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{AgentConfig, ApiserverAuthMode};

/// A response body boxed over a shared error type: some responses stream
/// straight from the upstream `bytes_stream`, others are the agent's own
/// fixed error bodies, and hyper's connection driver needs one concrete type.
type ResponseBody = BoxBody<Bytes, Box<dyn StdError + Send + Sync>>;

fn empty_body() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| -> Box<dyn StdError + Send + Sync> { match never {} })
        .boxed()
}

#[derive(Clone)]
pub struct ApiserverClient {
    client: reqwest::Client,
    base_url: String,
    mode: ApiserverAuthMode,
    bearer_token: Option<String>,
}

impl ApiserverClient {
    pub async fn build(mode: ApiserverAuthMode, config: &AgentConfig) -> anyhow::Result<Self> {
        match &mode {
            ApiserverAuthMode::ServiceAccount { token_path, ca_path } => {
                let token = tokio::fs::read_to_string(token_path).await?;
                let ca_pem = tokio::fs::read(ca_path).await?;
                let ca_cert = reqwest::Certificate::from_pem(&ca_pem)?;
                let client = reqwest::Client::builder().add_root_certificate(ca_cert).build()?;
                let base_url = format!("https://{}", config.apiserver_addr()?);
                Ok(Self {
                    client,
                    base_url,
                    mode,
                    bearer_token: Some(token.trim().to_string()),
                })
            }
            ApiserverAuthMode::FrontProxy { cert_dir } => {
                let mut identity_pem = tokio::fs::read(format!("{cert_dir}/front-proxy-client.crt")).await?;
                let mut key_pem = tokio::fs::read(format!("{cert_dir}/front-proxy-client.key")).await?;
                identity_pem.append(&mut key_pem);
                let identity = reqwest::Identity::from_pem(&identity_pem)?;
                let ca_pem = tokio::fs::read(format!("{cert_dir}/ca.crt")).await?;
                let ca_cert = reqwest::Certificate::from_pem(&ca_pem)?;
                let client = reqwest::Client::builder()
                    .identity(identity)
                    .add_root_certificate(ca_cert)
                    .build()?;
                // in front-proxy mode the apiserver is always reached on the
                // pod's loopback/local address; the cluster's own service
                // account is never used.
                Ok(Self {
                    client,
                    base_url: "https://kubernetes.default.svc".to_string(),
                    mode,
                    bearer_token: None,
                })
            }
        }
    }

    /// Forwards one request to the apiserver and streams the response body
    /// back rather than buffering it, so `watch` requests and long polls
    /// pass through as they arrive instead of stalling until the upstream
    /// connection closes.
    async fn forward(&self, req: Request<Incoming>) -> Result<Response<ResponseBody>, anyhow::Error> {
        let (parts, body) = req.into_parts();
        let body_bytes = body.collect().await?.to_bytes();
        let url = format!("{}{}", self.base_url, parts.uri);

        let mut out = self.client.request(parts.method, &url);
        for (name, value) in parts.headers.iter() {
            out = out.header(name, value);
        }
        if let Some(token) = &self.bearer_token {
            out = out.bearer_auth(token);
        }
        if matches!(self.mode, ApiserverAuthMode::FrontProxy { .. }) {
            out = out
                .header("X-Remote-User", "kubernetes-admin")
                .header("X-Remote-Group", "system:masters");
        }
        out = out.body(body_bytes);

        let resp = out.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let stream = resp
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>);
        let body = StreamBody::new(stream).boxed();

        let mut builder = Response::builder().status(status);
        if let Some(h) = builder.headers_mut() {
            *h = headers;
        }
        Ok(builder.body(body)?)
    }
}

/// Drains logical streams from `inbound` and serves one HTTP/1 connection
/// per stream, forwarding every request through `client`.
pub async fn serve_streams(mut inbound: mpsc::Receiver<LogicalStream>, client: Arc<ApiserverClient>) {
    while let Some(stream) = inbound.recv().await {
        let client = client.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let client = client.clone();
            let service = service_fn(move |req| {
                let client = client.clone();
                async move {
                    let result = client.forward(req).await;
                    Ok::<_, Infallible>(result.unwrap_or_else(|err| {
                        warn!(error = %err, "apiserver request failed");
                        Response::builder()
                            .status(hyper::StatusCode::BAD_GATEWAY)
                            .body(empty_body())
                            .expect("building a fixed error response never fails")
                    }))
                }
            });

            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await
            {
                debug!(error = %err, "stream connection closed");
            }
        });
    }
}
