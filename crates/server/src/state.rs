use events::EventBus;
use orchestrator::OrchestrationEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: OrchestrationEngine,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(engine: OrchestrationEngine) -> Self {
        let event_bus = engine.events().clone();
        Self { engine, event_bus }
    }
}
