//! Continuous monitoring session: one background sampler, started and stopped
//! on request, periodically collecting a full metrics snapshot.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::metrics::Collector;
use crate::types::{MonitorState, MonitoringStatus, SampleSummary};

struct Session {
    state: MonitorState,
    // bumped on every start; a sampler only writes while its generation is current
    generation: u64,
    started_at: Option<DateTime<Utc>>,
    last_sample_at: Option<DateTime<Utc>>,
    samples_taken: u64,
    sample_failures: u64,
    last_sample: Option<SampleSummary>,
    task: Option<JoinHandle<()>>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: MonitorState::Stopped,
            generation: 0,
            started_at: None,
            last_sample_at: None,
            samples_taken: 0,
            sample_failures: 0,
            last_sample: None,
            task: None,
        }
    }

    fn status(&self, period: Duration) -> MonitoringStatus {
        MonitoringStatus {
            state: self.state,
            active: self.state == MonitorState::Running,
            started_at: self.started_at,
            last_sample_at: self.last_sample_at,
            interval_ms: period.as_millis() as u64,
            samples_taken: self.samples_taken,
            sample_failures: self.sample_failures,
            last_sample: self.last_sample.clone(),
        }
    }
}

/// Process-wide monitoring controller. All transitions and all sampler
/// writes go through the single session mutex.
pub struct Monitor {
    collector: Arc<Collector>,
    period: Duration,
    session: Arc<Mutex<Session>>,
}

impl Monitor {
    pub fn new(collector: Arc<Collector>, period: Duration) -> Self {
        Self {
            collector,
            period,
            session: Arc::new(Mutex::new(Session::new())),
        }
    }

    pub async fn start(&self) -> Result<MonitoringStatus> {
        let mut s = self.session.lock().await;
        if s.state == MonitorState::Running {
            return Err(AgentError::MonitoringAlreadyStarted);
        }
        s.generation += 1;
        s.state = MonitorState::Running;
        s.started_at = Some(Utc::now());
        s.last_sample_at = None;
        s.samples_taken = 0;
        s.sample_failures = 0;
        s.last_sample = None;
        s.task = Some(spawn_sampler(
            self.collector.clone(),
            self.session.clone(),
            self.period,
            s.generation,
        ));
        info!(interval_ms = self.period.as_millis() as u64, "monitoring started");
        Ok(s.status(self.period))
    }

    pub async fn stop(&self) -> Result<MonitoringStatus> {
        let mut s = self.session.lock().await;
        if s.state == MonitorState::Stopped {
            return Err(AgentError::MonitoringNotStarted);
        }
        s.state = MonitorState::Stopped;
        if let Some(task) = s.task.take() {
            task.abort();
        }
        info!(samples = s.samples_taken, "monitoring stopped");
        Ok(s.status(self.period))
    }

    pub async fn status(&self) -> MonitoringStatus {
        self.session.lock().await.status(self.period)
    }

    /// Stop the sampler if one is running; used on shutdown.
    pub async fn shutdown(&self) {
        if self.stop().await.is_ok() {
            debug!("sampler stopped for shutdown");
        }
    }
}

// Samples every `period`, first tick immediately. A failed tick is counted
// and logged; the session keeps running.
fn spawn_sampler(
    collector: Arc<Collector>,
    session: Arc<Mutex<Session>>,
    period: Duration,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let outcome = collector.collect_metrics().await;

            let mut s = session.lock().await;
            if s.generation != generation || s.state != MonitorState::Running {
                break;
            }
            match outcome {
                Ok(m) => {
                    s.last_sample_at = Some(m.timestamp);
                    s.samples_taken += 1;
                    s.last_sample = Some(SampleSummary {
                        cpu_usage_percent: m.cpu_info.usage_percent,
                        memory_usage_percent: m.memory_info.usage_percent,
                        process_count: m.processes.len(),
                    });
                    debug!(
                        cpu = m.cpu_info.usage_percent,
                        mem = m.memory_info.usage_percent,
                        "monitoring sample"
                    );
                }
                Err(e) => {
                    s.sample_failures += 1;
                    warn!(error = %e, "monitoring sample failed");
                }
            }
        }
    })
}
