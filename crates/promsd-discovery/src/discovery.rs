//! One refresh cycle: query every plan and aggregate the results.

use crate::aggregator::{self, FANOUT_CHANNEL_CAPACITY};
use crate::fanout::fan_out;
use crate::mapper::MapperOptions;
use crate::querier::ServiceQuerier;
use crate::types::{CycleReport, QueryPlan};
use promsd_core::DiscoveryConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Periodically performs DNS-SD queries for the configured services.
pub struct Discovery {
    querier: Arc<dyn ServiceQuerier>,
    plans: Vec<QueryPlan>,
    options: Arc<MapperOptions>,
}

impl Discovery {
    /// Creates a discovery engine querying through `querier`.
    ///
    /// Interfaces in `config` must already have been checked to exist.
    pub fn new(querier: Arc<dyn ServiceQuerier>, config: &DiscoveryConfig) -> Self {
        let plans = QueryPlan::for_services(&config.service_names, &config.interfaces);
        let options = MapperOptions::new(config.secure_service.clone(), config.ipv4_only);

        Self {
            querier,
            plans,
            options: Arc::new(options),
        }
    }

    /// Queries issued every cycle.
    pub fn plans(&self) -> &[QueryPlan] {
        &self.plans
    }

    pub fn mapper_options(&self) -> &MapperOptions {
        &self.options
    }

    /// Runs one refresh cycle.
    ///
    /// Returns once every query has finished or been cancelled. The snapshot
    /// holds whatever was delivered before that point.
    pub async fn refresh_all(&self, token: &CancellationToken) -> CycleReport {
        let (tx, rx) = mpsc::channel(FANOUT_CHANNEL_CAPACITY);

        let (queries, snapshot) = tokio::join!(
            fan_out(
                Arc::clone(&self.querier),
                self.plans.clone(),
                Arc::clone(&self.options),
                tx,
                token.clone(),
            ),
            aggregator::collect(rx),
        );

        let report = CycleReport { snapshot, queries };

        let failed = report.failed_queries();
        if failed > 0 {
            for query in report.queries.iter().filter(|q| q.outcome.is_failed()) {
                debug!(plan = %query.plan, outcome = ?query.outcome, "Query failed, treating as empty");
            }
            warn!(
                failed,
                total = report.queries.len(),
                "Some DNS-SD queries failed this cycle"
            );
        }

        debug!(
            groups = report.snapshot.len(),
            queries = report.queries.len(),
            cancelled = report.was_cancelled(),
            "Refresh cycle finished"
        );

        report
    }
}
