use std::sync::Arc;

use crate::scheduler::SchedulerController;
use crate::storage::ExecutionLedger;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SchedulerController>,
    pub ledger: Arc<ExecutionLedger>,
}

impl AppState {
    pub fn new(controller: Arc<SchedulerController>) -> Self {
        let ledger = Arc::clone(controller.orchestrator().ledger());
        Self { controller, ledger }
    }
}
