use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Alert, AlertSink};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub failed: usize,
}

impl DispatchSummary {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed
    }
}

#[derive(Clone, Default)]
pub struct AlertDispatcher {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Attempts every sink concurrently. Failures are logged and counted,
    /// never returned; completion order across sinks is unspecified.
    pub async fn dispatch(&self, alert: &Alert) -> DispatchSummary {
        let deliveries = self.sinks.iter().map(|sink| async move {
            let result = sink.send(alert).await;
            (sink.name(), result)
        });

        let mut summary = DispatchSummary {
            attempted: self.sinks.len(),
            failed: 0,
        };

        for (sink_name, result) in join_all(deliveries).await {
            match result {
                Ok(()) => debug!("Alert for {} delivered via {}", alert.subject, sink_name),
                Err(e) => {
                    summary.failed += 1;
                    warn!("Alert for {} not delivered: {}", alert.subject, e);
                }
            }
        }

        summary
    }
}
