//! tierscale-rpc: JSON over HTTP for every remote seam.
//!
//! Each operation trait from `tierscale-core` has an axum router that
//! serves an `Arc<dyn Trait>` and a hyper client that implements the same
//! trait, so callers never know which side of the wire they are on.
//!
//! # Routes
//!
//! All routes are `POST` with a JSON body and reply with an
//! `ApiResponse { success, data, error }` envelope.
//!
//! | Served by | Prefix | Operations |
//! |---|---|---|
//! | primary | `/v1/queue`, `/v1/fleet` | submit, fetch, retire-mid, front-retired, role, status |
//! | primary | `/v1/cache` | get, set, transaction |
//! | harness | `/v1/harness` | next-request, start-vm, end-vm, register/unregister-frontend, time-of-day, process, drop |
//! | harness | `/v1/db` | get, set, transaction |
//!
//! Unsupported operations travel as `501` and unknown workers as `404`, so
//! a configuration error never reads as a business-level `false`.

pub mod client;
pub mod directory;
pub mod server;
pub mod wire;

pub use client::{HttpClient, RemoteCoordinator, RemoteHarness, RemoteStore};
pub use directory::RemoteDirectory;
pub use server::{
    coordinator_router, coordinator_service, harness_router, harness_service, serve, store_router,
};
pub use wire::ApiResponse;
