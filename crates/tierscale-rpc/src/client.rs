//! hyper clients implementing the operation traits over HTTP.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use tierscale_core::{
    BoxFuture, CloudHarness, CoordinatorOps, DataStore, FleetStatus, OpsError, OpsResult,
    QueuedRequest, Request, Role, ServeOutcome, WorkerId,
};

use crate::wire::{
    ApiResponse, KeyBody, ProcessBody, RequestBody, SetBody, TransactionBody, WorkerBody,
    error_from,
};

/// One-connection-per-call JSON client for a `host:port` endpoint.
#[derive(Debug, Clone)]
pub struct HttpClient {
    address: String,
    timeout: Option<Duration>,
}

impl HttpClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: None,
        }
    }

    /// Bound every call by `timeout`. Long polls should not set one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// POST `body` as JSON to `path` and decode the envelope's payload.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> OpsResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload =
            serde_json::to_vec(body).map_err(|e| OpsError::Codec(format!("encode {path}: {e}")))?;
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(path, payload))
                .await
                .map_err(|_| OpsError::Unreachable(format!("{}{path} timed out", self.address)))?,
            None => self.exchange(path, payload).await,
        }
    }

    async fn exchange<T: DeserializeOwned>(&self, path: &str, payload: Vec<u8>) -> OpsResult<T> {
        let uri = format!("http://{}{path}", self.address);

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| OpsError::Unreachable(format!("connect {}: {e}", self.address)))?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| OpsError::Unreachable(format!("handshake {}: {e}", self.address)))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "rpc connection closed with error");
            }
        });

        let req = http::Request::builder()
            .method(http::Method::POST)
            .uri(&uri)
            .header(http::header::HOST, self.address.as_str())
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::USER_AGENT, "tierscale-rpc/0.1")
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| OpsError::Codec(format!("build {uri}: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| OpsError::Unreachable(format!("{uri}: {e}")))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| OpsError::Unreachable(format!("{uri}: reading body: {e}")))?
            .to_bytes();

        let envelope: ApiResponse<T> = serde_json::from_slice(&bytes).map_err(|e| {
            if status.is_success() {
                OpsError::Codec(format!("{uri}: {e}"))
            } else {
                error_from(status, String::from_utf8_lossy(&bytes).into_owned())
            }
        })?;

        if !status.is_success() || !envelope.success {
            let message = envelope.error.unwrap_or_else(|| status.to_string());
            return Err(error_from(status, message));
        }
        match envelope.data {
            Some(data) => Ok(data),
            // `null` data: valid for unit and `Option` payloads only.
            None => serde_json::from_value(serde_json::Value::Null)
                .map_err(|_| OpsError::Codec(format!("{uri}: response carried no data"))),
        }
    }
}

// ── Coordinator ────────────────────────────────────────────────

/// Coordinator operations served by the primary.
#[derive(Debug, Clone)]
pub struct RemoteCoordinator {
    client: HttpClient,
}

impl RemoteCoordinator {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl CoordinatorOps for RemoteCoordinator {
    fn submit(&self, request: Request) -> BoxFuture<'_, OpsResult<bool>> {
        Box::pin(async move {
            self.client
                .post("/v1/queue/submit", &RequestBody { request })
                .await
        })
    }

    fn fetch(&self) -> BoxFuture<'_, OpsResult<Option<QueuedRequest>>> {
        Box::pin(async move { self.client.post("/v1/queue/fetch", &()).await })
    }

    fn request_retire_mid(&self) -> BoxFuture<'_, OpsResult<bool>> {
        Box::pin(async move { self.client.post("/v1/fleet/retire-mid", &()).await })
    }

    fn notify_front_retired(&self) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move { self.client.post("/v1/fleet/front-retired", &()).await })
    }

    fn query_role(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<Role>> {
        Box::pin(async move {
            match self.client.post("/v1/fleet/role", &WorkerBody { worker }).await {
                Err(OpsError::Remote { status: 404, .. }) => Err(OpsError::UnknownWorker(worker)),
                other => other,
            }
        })
    }

    fn status(&self) -> BoxFuture<'_, OpsResult<FleetStatus>> {
        Box::pin(async move { self.client.post("/v1/fleet/status", &()).await })
    }
}

// ── Stores ─────────────────────────────────────────────────────

/// A key/value store served under a path prefix.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: HttpClient,
    prefix: &'static str,
}

impl RemoteStore {
    /// The primary's cache, under `/v1/cache`.
    pub fn cache(client: HttpClient) -> Self {
        Self {
            client,
            prefix: "/v1/cache",
        }
    }

    /// The harness's backing store, under `/v1/db`.
    pub fn backing(client: HttpClient) -> Self {
        Self {
            client,
            prefix: "/v1/db",
        }
    }

    fn path(&self, op: &str) -> String {
        format!("{}/{op}", self.prefix)
    }
}

impl DataStore for RemoteStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, OpsResult<Option<String>>> {
        Box::pin(async move {
            let body = KeyBody {
                key: key.to_string(),
            };
            self.client.post(&self.path("get"), &body).await
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        auth: &'a str,
    ) -> BoxFuture<'a, OpsResult<bool>> {
        Box::pin(async move {
            let body = SetBody {
                key: key.to_string(),
                value: value.to_string(),
                auth: auth.to_string(),
            };
            self.client.post(&self.path("set"), &body).await
        })
    }

    fn transaction<'a>(
        &'a self,
        item: &'a str,
        price: f32,
        qty: u32,
    ) -> BoxFuture<'a, OpsResult<bool>> {
        Box::pin(async move {
            let body = TransactionBody {
                item: item.to_string(),
                price,
                qty,
            };
            self.client.post(&self.path("transaction"), &body).await
        })
    }
}

// ── Harness ────────────────────────────────────────────────────

/// The simulated cloud, reached over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteHarness {
    client: HttpClient,
}

impl RemoteHarness {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl CloudHarness for RemoteHarness {
    fn next_request(&self, frontend: WorkerId) -> BoxFuture<'_, OpsResult<Request>> {
        Box::pin(async move {
            self.client
                .post("/v1/harness/next-request", &WorkerBody { worker: frontend })
                .await
        })
    }

    fn start_vm(&self) -> BoxFuture<'_, OpsResult<WorkerId>> {
        Box::pin(async move { self.client.post("/v1/harness/start-vm", &()).await })
    }

    fn end_vm(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            self.client
                .post("/v1/harness/end-vm", &WorkerBody { worker })
                .await
        })
    }

    fn register_frontend(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            self.client
                .post("/v1/harness/register-frontend", &WorkerBody { worker })
                .await
        })
    }

    fn unregister_frontend(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            self.client
                .post("/v1/harness/unregister-frontend", &WorkerBody { worker })
                .await
        })
    }

    fn time_of_day(&self) -> BoxFuture<'_, OpsResult<u8>> {
        Box::pin(async move { self.client.post("/v1/harness/time-of-day", &()).await })
    }

    fn process_request(
        &self,
        request: Request,
        outcome: ServeOutcome,
    ) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            self.client
                .post("/v1/harness/process", &ProcessBody { request, outcome })
                .await
        })
    }

    fn drop_request(&self, request: Request) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            self.client
                .post("/v1/harness/drop", &RequestBody { request })
                .await
        })
    }
}
