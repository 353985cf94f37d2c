//! Shared agent state: the collector, the monitoring controller and config.

use std::sync::Arc;

use crate::config::AgentConfig;
use crate::metrics::Collector;
use crate::sampler::Monitor;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
    pub monitor: Arc<Monitor>,
    pub config: Arc<AgentConfig>,
}

impl AppState {
    pub fn new(config: AgentConfig) -> Self {
        let collector = Arc::new(Collector::new(config.temperature));
        let monitor = Arc::new(Monitor::new(collector.clone(), config.sample_interval));
        Self {
            collector,
            monitor,
            config: Arc::new(config),
        }
    }
}
