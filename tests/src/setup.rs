//! Common test setup: a real datastore + engine + query-API router
//! wired together exactly as `main` wires them, rooted at a temp
//! directory the caller owns.

use std::path::Path;

use axum::Router;

use metricsd_api::{router, AppState};
use metricsd_datastore::{Datastore, DEFAULT_SHARDS};
use metricsd_engine::{Engine, EngineConfig, EngineHandle};

/// Test context wired the same way `main` wires production: a real
/// file-backed datastore, a running aggregation engine, and the HTTP
/// query-API router sharing its [`EngineHandle`].
pub struct TestContext {
    pub engine: Engine,
    pub handle: EngineHandle,
    pub router: Router,
}

impl TestContext {
    /// Opens (or creates) a datastore at `data_dir` and starts the
    /// engine against it. `no_sync` is always set for tests — fsync
    /// latency has no bearing on what these tests verify.
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        let datastore =
            Datastore::open(data_dir, DEFAULT_SHARDS, true).expect("failed to open datastore");
        let engine = Engine::start(
            datastore,
            EngineConfig {
                prefix: String::new(),
                live_log_path: data_dir.join("live_log"),
            },
        )
        .expect("failed to start engine");
        let handle = engine.handle();
        let router = router(AppState::new(handle.clone()));

        Self { engine, handle, router }
    }

    /// Advances the (paused) tokio clock one second at a time so the
    /// engine's 1 Hz ticker fires exactly `secs` times, yielding after
    /// each tick so `do_pass` finishes before the next advance.
    pub async fn advance_seconds(&self, secs: u64) {
        for _ in 0..secs {
            tokio::time::advance(std::time::Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }
    }

    /// Drops every handle this context holds beyond `engine` itself,
    /// then shuts the engine (and, through it, the datastore) down.
    /// Required before reopening the same `data_dir` in another
    /// [`TestContext`] — otherwise `Engine::shutdown` finds other
    /// `Arc<EngineInner>` clones still alive and leaves the datastore
    /// open rather than closing it.
    pub async fn shutdown(self) {
        let TestContext { engine, handle, router } = self;
        drop(router);
        drop(handle);
        engine.shutdown().await.expect("engine shutdown failed");
    }
}
