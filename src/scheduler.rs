// Scheduler module - drives the collector on a fixed interval
//
// # Architecture
// - Uses Tokio's interval timer for periodic execution
// - The collector is synchronous, so each cycle runs on the blocking pool;
//   the collector is moved into the blocking task and handed back afterwards
// - Cycles never overlap: the next tick is awaited only after the previous
//   cycle finished (late ticks are skipped, not bunched up)
// - Failed cycles are logged and do not stop the loop

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::collector::{Charts, Metrics, OpenLdap};
use crate::storage::MetricSink;

/// Runs `f` against the collector on the blocking thread pool and returns the
/// collector together with the result.
///
/// Every call into the collector (and into ldap3's synchronous client, which
/// owns its own runtime) must go through here rather than run on an async
/// worker thread.
pub async fn run_blocking<T, F>(mut collector: OpenLdap, f: F) -> Result<(OpenLdap, T), JoinError>
where
    F: FnOnce(&mut OpenLdap) -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let output = f(&mut collector);
        (collector, output)
    })
    .await
}

/// Closes the collector's connection and drops it off the async threads.
pub async fn shutdown_collector(collector: OpenLdap) {
    let result = tokio::task::spawn_blocking(move || {
        let mut collector = collector;
        collector.cleanup();
    })
    .await;

    if let Err(e) = result {
        error!("Collector cleanup task panicked: {}", e);
    }
}

/// Periodic driver for one OpenLDAP collector
pub struct CollectorScheduler {
    /// Where charts and metrics are published
    sink: Arc<dyn MetricSink>,

    /// Node identifier attached to every published record
    node_id: String,

    /// Time between two collection cycles
    every: Duration,
}

impl CollectorScheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    /// * `sink` - Consumer of charts and metrics
    /// * `node_id` - Node identifier attached to every record
    /// * `every` - Collection interval (typically `Config::update_interval()`)
    pub fn new(sink: Arc<dyn MetricSink>, node_id: String, every: Duration) -> Self {
        CollectorScheduler {
            sink,
            node_id,
            every,
        }
    }

    /// Runs the collection loop until Ctrl+C, then cleans up the collector.
    pub async fn start(self, collector: OpenLdap) {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C, running until killed: {}", e);
                std::future::pending::<()>().await;
            }
        };

        self.run_until(collector, shutdown).await;
    }

    /// Runs the collection loop until `shutdown` resolves.
    ///
    /// # Behavior
    /// - Publishes the chart set once before the first cycle
    /// - Collects on every tick (the first tick fires immediately)
    /// - Publishes non-empty metrics maps; empty ones are logged and skipped
    /// - Checks for shutdown only between cycles; a running cycle is never cut short
    ///
    /// # Returns
    /// Number of metrics maps published
    pub async fn run_until<F>(self, collector: OpenLdap, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting collection loop for {} (every {:?}), publishing to {}",
            collector.config().url,
            self.every,
            self.sink.name()
        );

        self.publish_charts(collector.charts()).await;

        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut collector = collector;
        let mut published = 0;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping collection loop");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let (returned, metrics) = match run_blocking(collector, OpenLdap::collect).await {
                Ok(pair) => pair,
                Err(e) => {
                    // The collector (and its connection) went down with the task
                    error!("Collection task panicked, stopping: {}", e);
                    return published;
                }
            };
            collector = returned;

            if self.publish_metrics(&metrics).await {
                published += 1;
            }
        }

        shutdown_collector(collector).await;
        info!("Collection loop stopped after {} published cycle(s)", published);
        published
    }

    /// Performs a single collection and publishes its result (useful for
    /// testing and debugging).
    ///
    /// # Returns
    /// Number of metrics maps published (0 or 1)
    pub async fn collect_once(&self, collector: OpenLdap) -> usize {
        info!("Running one-time collection against {}", collector.config().url);

        self.publish_charts(collector.charts()).await;

        let published = match run_blocking(collector, OpenLdap::collect).await {
            Ok((collector, metrics)) => {
                let published = self.publish_metrics(&metrics).await;
                shutdown_collector(collector).await;
                usize::from(published)
            }
            Err(e) => {
                error!("Collection task panicked: {}", e);
                0
            }
        };

        info!("One-time collection complete: {} metrics map(s) published", published);
        published
    }

    async fn publish_charts(&self, charts: &Charts) {
        match self.sink.publish_charts(&self.node_id, charts).await {
            Ok(()) => debug!("Published {} chart(s) to {}", charts.len(), self.sink.name()),
            Err(e) => error!("Failed to publish charts to {}: {}", self.sink.name(), e),
        }
    }

    /// Returns whether the metrics were handed to the sink.
    async fn publish_metrics(&self, metrics: &Metrics) -> bool {
        if metrics.is_empty() {
            warn!("No metrics collected this cycle");
            return false;
        }

        match self
            .sink
            .publish_metrics(&self.node_id, Utc::now(), metrics)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to publish metrics to {}: {}", self.sink.name(), e);
                false
            }
        }
    }
}
