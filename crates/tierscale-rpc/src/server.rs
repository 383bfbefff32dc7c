//! axum routers for every served seam.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

use tierscale_core::{CloudHarness, CoordinatorOps, DataStore, OpsResult};

use crate::wire::{
    ApiResponse, KeyBody, ProcessBody, RequestBody, SetBody, TransactionBody, WorkerBody,
    status_for,
};

type Ops = Arc<dyn CoordinatorOps>;
type Store = Arc<dyn DataStore>;
type Harness = Arc<dyn CloudHarness>;

fn reply<T: Serialize>(result: OpsResult<T>) -> Response {
    match result {
        Ok(data) => Json(ApiResponse::ok(data)).into_response(),
        Err(e) => {
            debug!(error = %e, "operation failed");
            (status_for(&e), Json(ApiResponse::<()>::err(e.to_string()))).into_response()
        }
    }
}

// ── Coordinator ────────────────────────────────────────────────

/// Queue and fleet operations.
///
/// | Path | Operation |
/// |---|---|
/// | `/v1/queue/submit` | `submit` |
/// | `/v1/queue/fetch` | `fetch` |
/// | `/v1/fleet/retire-mid` | `request_retire_mid` |
/// | `/v1/fleet/front-retired` | `notify_front_retired` |
/// | `/v1/fleet/role` | `query_role` |
/// | `/v1/fleet/status` | `status` |
pub fn coordinator_router(ops: Ops) -> Router {
    Router::new()
        .route("/v1/queue/submit", post(submit))
        .route("/v1/queue/fetch", post(fetch))
        .route("/v1/fleet/retire-mid", post(retire_mid))
        .route("/v1/fleet/front-retired", post(front_retired))
        .route("/v1/fleet/role", post(role))
        .route("/v1/fleet/status", post(status))
        .with_state(ops)
}

async fn submit(State(ops): State<Ops>, Json(body): Json<RequestBody>) -> Response {
    reply(ops.submit(body.request).await)
}

async fn fetch(State(ops): State<Ops>) -> Response {
    reply(ops.fetch().await)
}

async fn retire_mid(State(ops): State<Ops>) -> Response {
    reply(ops.request_retire_mid().await)
}

async fn front_retired(State(ops): State<Ops>) -> Response {
    reply(ops.notify_front_retired().await)
}

async fn role(State(ops): State<Ops>, Json(body): Json<WorkerBody>) -> Response {
    reply(ops.query_role(body.worker).await)
}

async fn status(State(ops): State<Ops>) -> Response {
    reply(ops.status().await)
}

// ── Key/value stores ───────────────────────────────────────────

/// `/get`, `/set` and `/transaction` for one store; nest it under a prefix.
pub fn store_router(store: Store) -> Router {
    Router::new()
        .route("/get", post(store_get))
        .route("/set", post(store_set))
        .route("/transaction", post(store_transaction))
        .with_state(store)
}

async fn store_get(State(store): State<Store>, Json(body): Json<KeyBody>) -> Response {
    reply(store.get(&body.key).await)
}

async fn store_set(State(store): State<Store>, Json(body): Json<SetBody>) -> Response {
    reply(store.set(&body.key, &body.value, &body.auth).await)
}

async fn store_transaction(
    State(store): State<Store>,
    Json(body): Json<TransactionBody>,
) -> Response {
    reply(store.transaction(&body.item, body.price, body.qty).await)
}

// ── Harness ────────────────────────────────────────────────────

/// Harness operations under `/v1/harness`. `next-request` is a long poll.
pub fn harness_router(harness: Harness) -> Router {
    let routes = Router::new()
        .route("/next-request", post(next_request))
        .route("/start-vm", post(start_vm))
        .route("/end-vm", post(end_vm))
        .route("/register-frontend", post(register_frontend))
        .route("/unregister-frontend", post(unregister_frontend))
        .route("/time-of-day", post(time_of_day))
        .route("/process", post(process))
        .route("/drop", post(drop_request))
        .with_state(harness);
    Router::new().nest("/v1/harness", routes)
}

async fn next_request(State(h): State<Harness>, Json(body): Json<WorkerBody>) -> Response {
    reply(h.next_request(body.worker).await)
}

async fn start_vm(State(h): State<Harness>) -> Response {
    reply(h.start_vm().await)
}

async fn end_vm(State(h): State<Harness>, Json(body): Json<WorkerBody>) -> Response {
    reply(h.end_vm(body.worker).await)
}

async fn register_frontend(State(h): State<Harness>, Json(body): Json<WorkerBody>) -> Response {
    reply(h.register_frontend(body.worker).await)
}

async fn unregister_frontend(State(h): State<Harness>, Json(body): Json<WorkerBody>) -> Response {
    reply(h.unregister_frontend(body.worker).await)
}

async fn time_of_day(State(h): State<Harness>) -> Response {
    reply(h.time_of_day().await)
}

async fn process(State(h): State<Harness>, Json(body): Json<ProcessBody>) -> Response {
    reply(h.process_request(body.request, body.outcome).await)
}

async fn drop_request(State(h): State<Harness>, Json(body): Json<RequestBody>) -> Response {
    reply(h.drop_request(body.request).await)
}

// ── Assembled services ─────────────────────────────────────────

/// What the primary serves: coordinator operations plus its cache.
pub fn coordinator_service(ops: Ops, cache: Store) -> Router {
    coordinator_router(ops).nest("/v1/cache", store_router(cache))
}

/// What the harness serves: harness operations plus the backing store.
pub fn harness_service(harness: Harness, backing: Store) -> Router {
    harness_router(harness).nest("/v1/db", store_router(backing))
}

/// Serve `router` until the stop signal is set or its sender is dropped.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "rpc server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    info!(%addr, "rpc server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    use tierscale_cache::{CacheOnlyStore, MemoryStore};
    use tierscale_core::{
        BoxFuture, FleetStatus, LoadLevel, OpsError, QueuedRequest, Request, Role, WorkerId,
    };

    #[derive(Default)]
    struct StubCoordinator {
        queue: Mutex<VecDeque<QueuedRequest>>,
    }

    impl CoordinatorOps for StubCoordinator {
        fn submit(&self, request: Request) -> BoxFuture<'_, OpsResult<bool>> {
            Box::pin(async move {
                self.queue.lock().unwrap().push_back(QueuedRequest {
                    request,
                    enqueued_at_ms: 42,
                });
                Ok(true)
            })
        }

        fn fetch(&self) -> BoxFuture<'_, OpsResult<Option<QueuedRequest>>> {
            Box::pin(async move { Ok(self.queue.lock().unwrap().pop_front()) })
        }

        fn request_retire_mid(&self) -> BoxFuture<'_, OpsResult<bool>> {
            Box::pin(async { Ok(false) })
        }

        fn notify_front_retired(&self) -> BoxFuture<'_, OpsResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn query_role(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<Role>> {
            Box::pin(async move {
                match worker {
                    2 => Ok(Role::Middle),
                    _ => Err(OpsError::UnknownWorker(worker)),
                }
            })
        }

        fn status(&self) -> BoxFuture<'_, OpsResult<FleetStatus>> {
            Box::pin(async move {
                Ok(FleetStatus {
                    queue_len: self.queue.lock().unwrap().len(),
                    num_front: 1,
                    num_mid: 1,
                    load_level: LoadLevel::Unmeasured,
                    load_factor: 1.0,
                    registered_workers: 2,
                })
            })
        }
    }

    fn post_json(uri: &str, body: serde_json::Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn submit_then_fetch_round_trips_the_request() {
        let router = coordinator_router(Arc::new(StubCoordinator::default()));
        let request = serde_json::to_value(Request::browse(7, "apple")).unwrap();

        let resp = router
            .clone()
            .oneshot(post_json(
                "/v1/queue/submit",
                serde_json::json!({ "request": request }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"], true);

        let resp = router
            .clone()
            .oneshot(post_json("/v1/queue/fetch", serde_json::Value::Null))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["data"]["request"]["id"], 7);
        assert_eq!(json["data"]["enqueued_at_ms"], 42);

        let resp = router
            .oneshot(post_json("/v1/queue/fetch", serde_json::Value::Null))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert!(json["data"].is_null());
    }

    #[tokio::test]
    async fn unknown_worker_is_not_found() {
        let router = coordinator_router(Arc::new(StubCoordinator::default()));

        let resp = router
            .clone()
            .oneshot(post_json("/v1/fleet/role", serde_json::json!({ "worker": 2 })))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["data"], "middle");

        let resp = router
            .oneshot(post_json("/v1/fleet/role", serde_json::json!({ "worker": 9 })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "worker 9 has no assigned role");
    }

    #[tokio::test]
    async fn status_is_served() {
        let router = coordinator_router(Arc::new(StubCoordinator::default()));
        let resp = router
            .oneshot(post_json("/v1/fleet/status", serde_json::Value::Null))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["data"]["load_level"], "unmeasured");
        assert_eq!(json["data"]["registered_workers"], 2);
    }

    #[tokio::test]
    async fn cache_only_transaction_is_not_implemented() {
        let store = CacheOnlyStore::new([("apple".to_string(), "ITEM".to_string())]);
        let router = Router::new().nest("/v1/db", store_router(Arc::new(store)));

        let resp = router
            .clone()
            .oneshot(post_json(
                "/v1/db/get",
                serde_json::json!({ "key": "apple" }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["data"], "ITEM");

        let resp = router
            .oneshot(post_json(
                "/v1/db/transaction",
                serde_json::json!({ "item": "apple", "price": 1.0, "qty": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn set_respects_the_store_auth() {
        let router = store_router(Arc::new(MemoryStore::new("secret")));

        let resp = router
            .clone()
            .oneshot(post_json(
                "/set",
                serde_json::json!({ "key": "k", "value": "v", "auth": "nope" }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["data"], false);

        let resp = router
            .oneshot(post_json(
                "/set",
                serde_json::json!({ "key": "k", "value": "v", "auth": "secret" }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["data"], true);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_by_the_extractor() {
        let router = store_router(Arc::new(MemoryStore::new("")));
        let resp = router
            .oneshot(post_json("/get", serde_json::json!({ "nope": 1 })))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }
}
