//! Query fan-out.
//!
//! Every [`QueryPlan`] runs as its own task. A task owns the response stream
//! of its query, maps each response as it arrives and forwards the result
//! over the shared channel. Tasks stop at the next suspension point once
//! the cancellation token fires.

use crate::error::DiscoveryError;
use crate::mapper::{map_entry, MapperOptions};
use crate::querier::ServiceQuerier;
use crate::types::{QueryOutcome, QueryPlan, QueryReport};
use promsd_core::TargetGroup;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs every plan concurrently and waits for all of them.
///
/// The caller's `sender` is consumed; once this returns every clone has been
/// dropped, so a receiver draining the channel sees it close.
pub async fn fan_out(
    querier: Arc<dyn ServiceQuerier>,
    plans: Vec<QueryPlan>,
    options: Arc<MapperOptions>,
    sender: mpsc::Sender<TargetGroup>,
    token: CancellationToken,
) -> Vec<QueryReport> {
    let tasks: Vec<_> = plans
        .into_iter()
        .map(|plan| {
            let querier = Arc::clone(&querier);
            let options = Arc::clone(&options);
            let sender = sender.clone();
            let token = token.clone();
            let task_plan = plan.clone();

            let handle = tokio::spawn(async move {
                run_query(querier.as_ref(), &task_plan, &options, &sender, &token).await
            });
            (plan, handle)
        })
        .collect();
    drop(sender);

    let mut reports = Vec::with_capacity(tasks.len());
    for (plan, handle) in tasks {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(plan = %plan, error = %e, "Query task panicked");
                QueryOutcome::Failed {
                    error: DiscoveryError::query_failed(
                        &plan.service,
                        plan.interface.as_deref(),
                        format!("query task panicked: {}", e),
                    ),
                }
            }
        };
        debug!(plan = %plan, outcome = ?outcome, "Query finished");
        reports.push(QueryReport { plan, outcome });
    }

    reports
}

/// Runs one query to completion, cancellation or failure.
pub async fn run_query(
    querier: &dyn ServiceQuerier,
    plan: &QueryPlan,
    options: &MapperOptions,
    sender: &mpsc::Sender<TargetGroup>,
    token: &CancellationToken,
) -> QueryOutcome {
    if token.is_cancelled() {
        return QueryOutcome::Cancelled { forwarded: 0 };
    }

    let responses = match querier.query(&plan.service, plan.interface.as_deref()) {
        Ok(responses) => responses,
        Err(error) => return QueryOutcome::Failed { error },
    };

    let mut forwarded = 0;
    let mut dropped = 0;

    loop {
        let entry = tokio::select! {
            biased;
            _ = token.cancelled() => return QueryOutcome::Cancelled { forwarded },
            received = responses.recv() => match received {
                Ok(entry) => entry,
                Err(_) => return QueryOutcome::Completed { forwarded, dropped },
            },
        };

        let Some(group) = map_entry(&entry, options) else {
            dropped += 1;
            continue;
        };

        if token.is_cancelled() {
            return QueryOutcome::Cancelled { forwarded };
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return QueryOutcome::Cancelled { forwarded },
            sent = sender.send(group) => {
                if sent.is_err() {
                    return QueryOutcome::Failed {
                        error: DiscoveryError::query_failed(
                            &plan.service,
                            plan.interface.as_deref(),
                            "collector went away",
                        ),
                    };
                }
                forwarded += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HangingQuerier, StaticQuerier};
    use crate::types::ServiceEntry;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const HTTP: &str = "_prometheus-http._tcp";
    const HTTPS: &str = "_prometheus-https._tcp";

    fn options(ipv4_only: bool) -> Arc<MapperOptions> {
        Arc::new(MapperOptions::new(HTTPS, ipv4_only))
    }

    fn entry(service: &str, host: &str, last_octet: u8) -> ServiceEntry {
        ServiceEntry::new(service, host, 9100).with_v4(Ipv4Addr::new(10, 0, 0, last_octet))
    }

    async fn drain(mut rx: mpsc::Receiver<TargetGroup>) -> Vec<TargetGroup> {
        let mut out = Vec::new();
        while let Some(group) = rx.recv().await {
            out.push(group);
        }
        out
    }

    #[tokio::test]
    async fn test_fan_out_forwards_all_groups() {
        let querier = StaticQuerier::new()
            .with_entries(HTTP, None, vec![entry(HTTP, "a.local.", 1), entry(HTTP, "b.local.", 2)])
            .with_entries(HTTPS, None, vec![entry(HTTPS, "c.local.", 3)]);
        let querier = Arc::new(querier);

        let (tx, rx) = mpsc::channel(16);
        let collector = tokio::spawn(drain(rx));
        let plans = QueryPlan::for_services(&[HTTP.to_string(), HTTPS.to_string()], &[]);

        let reports = fan_out(querier.clone(), plans, options(false), tx, CancellationToken::new()).await;
        let groups = collector.await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(groups.len(), 3);
        assert_eq!(querier.calls(), 2);
        assert!(reports
            .iter()
            .all(|r| matches!(r.outcome, QueryOutcome::Completed { .. })));
    }

    #[tokio::test]
    async fn test_fan_out_per_interface() {
        let querier = StaticQuerier::new()
            .with_entries(HTTP, Some("eth0"), vec![entry(HTTP, "a.local.", 1)])
            .with_entries(HTTP, Some("wlan0"), vec![entry(HTTP, "b.local.", 2)]);
        let querier = Arc::new(querier);

        let (tx, rx) = mpsc::channel(16);
        let collector = tokio::spawn(drain(rx));
        let plans = QueryPlan::for_services(
            &[HTTP.to_string()],
            &["eth0".to_string(), "wlan0".to_string()],
        );

        let reports = fan_out(querier.clone(), plans, options(false), tx, CancellationToken::new()).await;
        let mut targets: Vec<_> = collector
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.targets[0].clone())
            .collect();
        targets.sort();

        assert_eq!(reports.len(), 2);
        assert_eq!(targets, vec!["10.0.0.1:9100", "10.0.0.2:9100"]);
        assert_eq!(querier.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_query_is_isolated() {
        let querier = StaticQuerier::new()
            .with_failure(HTTP, None, "socket closed")
            .with_entries(HTTPS, None, vec![entry(HTTPS, "c.local.", 3)]);

        let (tx, rx) = mpsc::channel(16);
        let collector = tokio::spawn(drain(rx));
        let plans = QueryPlan::for_services(&[HTTP.to_string(), HTTPS.to_string()], &[]);

        let reports = fan_out(Arc::new(querier), plans, options(false), tx, CancellationToken::new()).await;
        let groups = collector.await.unwrap();

        assert_eq!(groups.len(), 1);
        let failed: Vec<_> = reports.iter().filter(|r| r.outcome.is_failed()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].plan.service, HTTP);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_a_failure() {
        let querier = StaticQuerier::new().with_entries(HTTP, None, vec![]);

        let (tx, rx) = mpsc::channel(16);
        let collector = tokio::spawn(drain(rx));
        let reports = fan_out(
            Arc::new(querier),
            vec![QueryPlan::new(HTTP, None)],
            options(false),
            tx,
            CancellationToken::new(),
        )
        .await;

        assert!(collector.await.unwrap().is_empty());
        assert!(matches!(
            reports[0].outcome,
            QueryOutcome::Completed {
                forwarded: 0,
                dropped: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_ipv4_only_counts_dropped() {
        let v6_only = ServiceEntry::new(HTTP, "v6.local.", 9100).with_v6("fe80::1".parse().unwrap());
        let querier = StaticQuerier::new()
            .with_entries(HTTP, None, vec![v6_only, entry(HTTP, "a.local.", 1)]);

        let (tx, rx) = mpsc::channel(16);
        let collector = tokio::spawn(drain(rx));
        let reports = fan_out(
            Arc::new(querier),
            vec![QueryPlan::new(HTTP, None)],
            options(true),
            tx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(collector.await.unwrap().len(), 1);
        assert!(matches!(
            reports[0].outcome,
            QueryOutcome::Completed {
                forwarded: 1,
                dropped: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_cancellation_stops_hanging_queries() {
        let querier = Arc::new(HangingQuerier::new(vec![entry(HTTP, "a.local.", 1)]));
        let token = CancellationToken::new();

        let (tx, rx) = mpsc::channel(16);
        let collector = tokio::spawn(drain(rx));
        let fan = tokio::spawn(fan_out(
            querier.clone(),
            vec![QueryPlan::new(HTTP, None), QueryPlan::new(HTTPS, None)],
            options(false),
            tx,
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let reports = tokio::time::timeout(Duration::from_secs(5), fan)
            .await
            .expect("fan-out did not stop after cancellation")
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.outcome.is_cancelled()));
        assert_eq!(collector.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_issues_no_query() {
        let querier = Arc::new(StaticQuerier::new().with_entries(HTTP, None, vec![entry(HTTP, "a.local.", 1)]));
        let token = CancellationToken::new();
        token.cancel();

        let (tx, rx) = mpsc::channel(16);
        let reports = fan_out(
            querier.clone(),
            vec![QueryPlan::new(HTTP, None)],
            options(false),
            tx,
            token,
        )
        .await;

        assert!(reports[0].outcome.is_cancelled());
        assert_eq!(querier.calls(), 0);
        assert!(drain(rx).await.is_empty());
    }
}
