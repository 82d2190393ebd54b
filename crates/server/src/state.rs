use events::ProgressBus;
use orchestrator::ScanService;

#[derive(Clone)]
pub struct AppState {
    pub service: ScanService,
    pub bus: ProgressBus,
}

impl AppState {
    pub fn new(service: ScanService, bus: ProgressBus) -> Self {
        Self { service, bus }
    }
}
