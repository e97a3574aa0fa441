use std::path::PathBuf;
use std::sync::Arc;

use crate::fault_injection::FaultInjector;

#[derive(Clone)]
pub struct ShardState {
    pub data_root: Arc<PathBuf>,
    pub fault_injector: Arc<FaultInjector>,
}

impl ShardState {
    pub fn new(data_root: PathBuf) -> Self {
        Self {
            data_root: Arc::new(data_root),
            fault_injector: Arc::new(FaultInjector::new()),
        }
    }
}
