//! Shared state handed to every handler

use spindle_execution::MetricsHook;
use spindle_interfaces::{DispatchTask, Storage};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registered tasks by sanitized name, plus optional history and metrics sources
#[derive(Clone)]
pub struct ApiContext {
    pub tasks: Arc<BTreeMap<String, Arc<dyn DispatchTask>>>,
    /// Backs the execution history route
    pub storage: Option<Arc<dyn Storage>>,
    /// Backs the metrics route
    pub metrics: Option<Arc<MetricsHook>>,
}

impl ApiContext {
    pub fn new(tasks: BTreeMap<String, Arc<dyn DispatchTask>>) -> Self {
        Self {
            tasks: Arc::new(tasks),
            storage: None,
            metrics: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsHook>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn task(&self, name: &str) -> Option<&Arc<dyn DispatchTask>> {
        self.tasks.get(name)
    }
}
