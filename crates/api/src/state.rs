//! Application state shared across handlers: just the engine handle.
//! The query API holds no state of its own — every operation it
//! exposes is already a method on [`metricsd_engine::EngineHandle`].

use metricsd_engine::EngineHandle;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

impl AppState {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}
