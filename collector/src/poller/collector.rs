//! Periodic node polling.
//!
//! Each tick runs, in order:
//!
//! 1. `getblockcount`: failures are logged and the height is kept;
//! 2. `getrawmempool` and
//! 3. `getpeerinfo`: failures stop the loop under
//!    [`FailurePolicy::Strict`], otherwise they are handled like step 1;
//! 4. the wallet balance, when a provider is configured: failures bump
//!    `wallet_errors` and keep the previous balance;
//! 5. the height, mempool and peer gauges are written from the latest
//!    successful observation of each.
//!
//! Values are never reset. A series that was never observed stays absent
//! from the exposition.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::{Instant, MissedTickBehavior};

use super::error::CollectorError;
use super::policy::FailurePolicy;
use crate::metrics::MetricsRegistry;
use crate::rpc::{NodeRpc, RpcError, methods};
use crate::wallet::WalletBalanceProvider;

/// Last successful observation of each node query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub block_count: Option<u64>,
    pub mempool_size: Option<usize>,
    pub connected_peers: Option<usize>,
}

/// What happened to the wallet query during a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum WalletOutcome {
    /// Wallet polling is disabled.
    #[default]
    Skipped,
    Updated(f64),
    Failed,
}

/// Outcome of one tick that did not stop the loop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Node queries that failed and were tolerated, in call order.
    pub failed: Vec<&'static str>,
    pub wallet: WalletOutcome,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.wallet != WalletOutcome::Failed
    }
}

/// Polls a node and publishes what it sees.
///
/// The collector is the only writer of the metric series; it owns no lock
/// because every Prometheus series is updated atomically.
pub struct Collector<R> {
    rpc: Arc<R>,
    wallet: Option<Box<dyn WalletBalanceProvider>>,
    metrics: Arc<MetricsRegistry>,
    chain: String,
    policy: FailurePolicy,
    last: NodeSnapshot,
}

impl<R> Collector<R>
where
    R: NodeRpc,
{
    pub fn new(
        rpc: Arc<R>,
        wallet: Option<Box<dyn WalletBalanceProvider>>,
        metrics: Arc<MetricsRegistry>,
        chain: impl Into<String>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            rpc,
            wallet,
            metrics,
            chain: chain.into(),
            policy,
            last: NodeSnapshot::default(),
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        self.last
    }

    /// Ticks every `period` until a fatal failure.
    ///
    /// The first tick fires one full period after the call. A tick that
    /// overruns delays the next one; missed ticks are not caught up and
    /// ticks never overlap.
    ///
    /// A zero period, or one so long that the tick schedule cannot be
    /// represented on the monotonic clock, is rejected before any tick.
    pub async fn run(mut self, period: Duration) -> Result<(), CollectorError> {
        let first = Instant::now()
            .checked_add(period)
            .filter(|first| !period.is_zero() && first.checked_add(period).is_some())
            .ok_or(CollectorError::InvalidPeriod(period))?;
        let mut ticker = tokio::time::interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            chain = %self.chain,
            interval_secs = period.as_secs(),
            policy = %self.policy,
            wallet = self.wallet.as_ref().map(|w| w.label()),
            "collector loop started"
        );

        loop {
            ticker.tick().await;
            let report = self.tick().await?;
            tracing::debug!(
                snapshot = ?self.snapshot(),
                clean = report.is_clean(),
                failed = ?report.failed,
                wallet = ?report.wallet,
                "tick complete"
            );
        }
    }

    /// Runs one polling round.
    pub async fn tick(&mut self) -> Result<TickReport, CollectorError> {
        let mut report = TickReport::default();

        match self.rpc.get_block_count().await {
            Ok(height) => self.last.block_count = Some(height),
            Err(e) => self.tolerate(methods::GET_BLOCK_COUNT, e, &mut report),
        }

        match self.rpc.get_raw_mempool().await {
            Ok(txids) => self.last.mempool_size = Some(txids.len()),
            Err(e) => self.escalate(methods::GET_RAW_MEMPOOL, e, &mut report)?,
        }

        match self.rpc.get_peer_info().await {
            Ok(peers) => self.last.connected_peers = Some(peers.len()),
            Err(e) => self.escalate(methods::GET_PEER_INFO, e, &mut report)?,
        }

        report.wallet = self.poll_wallet().await;

        self.publish();
        if report.failed.is_empty() {
            self.metrics
                .node
                .last_success_timestamp_seconds
                .with_label_values(&[self.chain.as_str()])
                .set(unix_now_secs());
        }

        Ok(report)
    }

    async fn poll_wallet(&self) -> WalletOutcome {
        let Some(wallet) = self.wallet.as_ref() else {
            return WalletOutcome::Skipped;
        };

        match wallet.balance().await {
            Ok(balance) => {
                if let Some(gauge) = &self.metrics.node.wallet_balance {
                    gauge
                        .with_label_values(&[self.chain.as_str(), wallet.label()])
                        .set(balance);
                }
                WalletOutcome::Updated(balance)
            }
            Err(e) => {
                tracing::error!(
                    chain = %self.chain,
                    wallet = wallet.label(),
                    error = %e,
                    "wallet balance query failed"
                );
                self.metrics
                    .node
                    .wallet_errors
                    .with_label_values(&[self.chain.as_str()])
                    .inc();
                WalletOutcome::Failed
            }
        }
    }

    fn publish(&self) {
        let node = &self.metrics.node;
        let labels = [self.chain.as_str()];

        if let Some(height) = self.last.block_count {
            node.block_count.with_label_values(&labels).set(height as f64);
        }
        if let Some(size) = self.last.mempool_size {
            node.raw_mempool_size.with_label_values(&labels).set(size as f64);
        }
        if let Some(peers) = self.last.connected_peers {
            node.connected_peers.with_label_values(&labels).set(peers as f64);
        }
    }

    fn tolerate(&self, method: &'static str, err: RpcError, report: &mut TickReport) {
        tracing::error!(
            chain = %self.chain,
            method,
            error = %err,
            "node query failed, keeping last value"
        );
        self.count_rpc_error(method);
        report.failed.push(method);
    }

    fn escalate(
        &self,
        method: &'static str,
        err: RpcError,
        report: &mut TickReport,
    ) -> Result<(), CollectorError> {
        if self.policy.is_strict() {
            self.count_rpc_error(method);
            return Err(CollectorError::Fatal {
                method,
                source: err,
            });
        }
        self.tolerate(method, err, report);
        Ok(())
    }

    fn count_rpc_error(&self, method: &'static str) {
        self.metrics
            .node
            .rpc_errors
            .with_label_values(&[self.chain.as_str(), method])
            .inc();
    }
}

fn unix_now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcResult;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CHAIN: &str = "regtest";

    /// Scripted node. `None` for a query makes it fail.
    struct MockNode {
        height: Mutex<Option<u64>>,
        mempool: Mutex<Option<Vec<String>>>,
        peers: Mutex<Option<Vec<Value>>>,
        mempool_calls: AtomicUsize,
        height_calls: AtomicUsize,
    }

    impl MockNode {
        fn healthy(height: u64, mempool: usize, peers: usize) -> Self {
            Self {
                height: Mutex::new(Some(height)),
                mempool: Mutex::new(Some((0..mempool).map(|i| format!("tx{i}")).collect())),
                peers: Mutex::new(Some((0..peers).map(|i| json!({ "id": i })).collect())),
                mempool_calls: AtomicUsize::new(0),
                height_calls: AtomicUsize::new(0),
            }
        }

        fn fail() -> RpcError {
            RpcError::Transport("connection refused".to_string())
        }
    }

    #[async_trait]
    impl NodeRpc for MockNode {
        async fn get_block_count(&self) -> RpcResult<u64> {
            self.height_calls.fetch_add(1, Ordering::SeqCst);
            self.height.lock().unwrap().ok_or_else(Self::fail)
        }

        async fn get_raw_mempool(&self) -> RpcResult<Vec<String>> {
            self.mempool_calls.fetch_add(1, Ordering::SeqCst);
            self.mempool.lock().unwrap().clone().ok_or_else(Self::fail)
        }

        async fn get_peer_info(&self) -> RpcResult<Vec<Value>> {
            self.peers.lock().unwrap().clone().ok_or_else(Self::fail)
        }

        async fn get_balance(&self, _wallet: Option<&str>) -> RpcResult<f64> {
            Err(Self::fail())
        }
    }

    struct MockWallet {
        balance: Arc<Mutex<Option<f64>>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WalletBalanceProvider for MockWallet {
        fn label(&self) -> &str {
            "hot"
        }

        async fn balance(&self) -> RpcResult<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.balance
                .lock()
                .unwrap()
                .ok_or_else(|| RpcError::Node {
                    code: -18,
                    message: "Requested wallet does not exist or is not loaded".to_string(),
                })
        }
    }

    fn build(
        node: Arc<MockNode>,
        wallet: Option<MockWallet>,
        policy: FailurePolicy,
    ) -> (Collector<MockNode>, Arc<MetricsRegistry>) {
        let metrics = Arc::new(MetricsRegistry::new(wallet.is_some()).expect("metrics"));
        let wallet = wallet.map(|w| Box::new(w) as Box<dyn WalletBalanceProvider>);
        let collector = Collector::new(node, wallet, metrics.clone(), CHAIN, policy);
        (collector, metrics)
    }

    fn value(gauge: &prometheus::GaugeVec) -> f64 {
        gauge.with_label_values(&[CHAIN]).get()
    }

    #[tokio::test]
    async fn one_tick_publishes_height_mempool_and_peers() {
        let node = Arc::new(MockNode::healthy(100, 3, 2));
        let (mut collector, metrics) = build(node, None, FailurePolicy::Strict);

        let report = collector.tick().await.expect("tick");

        assert!(report.is_clean());
        assert_eq!(report.wallet, WalletOutcome::Skipped);
        assert_eq!(value(&metrics.node.block_count), 100.0);
        assert_eq!(value(&metrics.node.raw_mempool_size), 3.0);
        assert_eq!(value(&metrics.node.connected_peers), 2.0);

        let text = metrics.gather_text();
        assert!(text.contains("blockchain_collector_block_count{chain=\"regtest\"} 100"));
        assert!(text.contains("blockchain_collector_last_success_timestamp_seconds{chain=\"regtest\"}"));
    }

    #[tokio::test]
    async fn height_failure_is_tolerated_even_when_strict() {
        let node = Arc::new(MockNode::healthy(100, 1, 1));
        let (mut collector, metrics) = build(node.clone(), None, FailurePolicy::Strict);
        collector.tick().await.expect("first tick");

        *node.height.lock().unwrap() = None;
        *node.mempool.lock().unwrap() = Some(vec!["a".into(), "b".into()]);
        let report = collector.tick().await.expect("height failure is not fatal");

        assert_eq!(report.failed, vec![methods::GET_BLOCK_COUNT]);
        assert_eq!(value(&metrics.node.block_count), 100.0);
        assert_eq!(value(&metrics.node.raw_mempool_size), 2.0);
        assert_eq!(
            metrics
                .node
                .rpc_errors
                .with_label_values(&[CHAIN, methods::GET_BLOCK_COUNT])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn strict_policy_makes_mempool_failure_fatal() {
        let node = Arc::new(MockNode::healthy(100, 3, 2));
        *node.mempool.lock().unwrap() = None;
        let (mut collector, metrics) = build(node, None, FailurePolicy::Strict);

        match collector.tick().await {
            Err(CollectorError::Fatal { method, .. }) => {
                assert_eq!(method, methods::GET_RAW_MEMPOOL)
            }
            other => panic!("expected fatal mempool failure, got {other:?}"),
        }
        assert!(!metrics.gather_text().contains("connected_peers{"));
    }

    #[tokio::test]
    async fn strict_policy_makes_peer_failure_fatal() {
        let node = Arc::new(MockNode::healthy(100, 3, 2));
        *node.peers.lock().unwrap() = None;
        let (mut collector, _metrics) = build(node, None, FailurePolicy::Strict);

        match collector.tick().await {
            Err(CollectorError::Fatal { method, .. }) => {
                assert_eq!(method, methods::GET_PEER_INFO)
            }
            other => panic!("expected fatal peer failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tolerant_policy_keeps_stale_values_and_counts_errors() {
        let node = Arc::new(MockNode::healthy(100, 3, 2));
        let (mut collector, metrics) = build(node.clone(), None, FailurePolicy::Tolerant);
        collector.tick().await.expect("first tick");
        let first_success = value(&metrics.node.last_success_timestamp_seconds);

        *node.height.lock().unwrap() = Some(101);
        *node.mempool.lock().unwrap() = None;
        *node.peers.lock().unwrap() = None;
        let report = collector.tick().await.expect("tolerant tick");

        assert_eq!(
            report.failed,
            vec![methods::GET_RAW_MEMPOOL, methods::GET_PEER_INFO]
        );
        assert_eq!(value(&metrics.node.block_count), 101.0);
        assert_eq!(value(&metrics.node.raw_mempool_size), 3.0);
        assert_eq!(value(&metrics.node.connected_peers), 2.0);
        assert_eq!(
            value(&metrics.node.last_success_timestamp_seconds),
            first_success
        );
        assert_eq!(
            collector.snapshot(),
            NodeSnapshot {
                block_count: Some(101),
                mempool_size: Some(3),
                connected_peers: Some(2),
            }
        );
    }

    #[tokio::test]
    async fn wallet_failure_counts_once_and_keeps_balance() {
        let balance = Arc::new(Mutex::new(Some(1.5)));
        let calls = Arc::new(AtomicUsize::new(0));
        let wallet = MockWallet {
            balance: balance.clone(),
            calls: calls.clone(),
        };
        let node = Arc::new(MockNode::healthy(100, 0, 0));
        let (mut collector, metrics) = build(node, Some(wallet), FailurePolicy::Strict);

        let report = collector.tick().await.expect("tick");
        assert_eq!(report.wallet, WalletOutcome::Updated(1.5));

        *balance.lock().unwrap() = None;
        let report = collector.tick().await.expect("wallet failure is not fatal");
        assert_eq!(report.wallet, WalletOutcome::Failed);
        assert!(!report.is_clean());

        let wallet_gauge = metrics.node.wallet_balance.as_ref().expect("registered");
        assert_eq!(wallet_gauge.with_label_values(&[CHAIN, "hot"]).get(), 1.5);
        assert_eq!(metrics.node.wallet_errors.with_label_values(&[CHAIN]).get(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn wallet_failure_before_any_success_leaves_balance_absent() {
        let wallet = MockWallet {
            balance: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let node = Arc::new(MockNode::healthy(7, 0, 0));
        let (mut collector, metrics) = build(node, Some(wallet), FailurePolicy::Tolerant);

        collector.tick().await.expect("tick");

        let text = metrics.gather_text();
        assert!(!text.contains("wallet_balance{"));
        assert!(text.contains("blockchain_collector_wallet_errors{chain=\"regtest\"} 1"));
    }

    #[tokio::test]
    async fn disabled_wallet_never_exposes_balance() {
        let node = Arc::new(MockNode::healthy(5, 1, 1));
        let (mut collector, metrics) = build(node, None, FailurePolicy::Tolerant);

        for _ in 0..3 {
            collector.tick().await.expect("tick");
        }

        let text = metrics.gather_text();
        assert!(!text.contains("wallet_balance"));
        assert!(!text.contains("wallet_errors{"));
    }

    #[tokio::test]
    async fn exposition_only_carries_latest_values() {
        let node = Arc::new(MockNode::healthy(1, 0, 0));
        let (mut collector, metrics) = build(node.clone(), None, FailurePolicy::Tolerant);

        for height in 1..=4u64 {
            *node.height.lock().unwrap() = Some(height);
            collector.tick().await.expect("tick");
        }

        let text = metrics.gather_text();
        let samples: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("blockchain_collector_block_count{"))
            .collect();
        assert_eq!(samples, vec!["blockchain_collector_block_count{chain=\"regtest\"} 4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_waits_one_period_before_first_tick() {
        let node = Arc::new(MockNode::healthy(10, 0, 0));
        let (collector, _metrics) = build(node.clone(), None, FailurePolicy::Tolerant);
        let handle = tokio::spawn(collector.run(Duration::from_secs(15)));

        tokio::time::sleep(Duration::from_secs(14)).await;
        assert_eq!(node.height_calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(node.height_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(node.height_calls.load(Ordering::SeqCst), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn run_rejects_periods_the_clock_cannot_schedule() {
        for period in [Duration::from_secs(u64::MAX), Duration::ZERO] {
            let node = Arc::new(MockNode::healthy(10, 0, 0));
            let (collector, _metrics) = build(node.clone(), None, FailurePolicy::Tolerant);

            let result = tokio::spawn(collector.run(period))
                .await
                .expect("collector task must not panic");

            match result {
                Err(CollectorError::InvalidPeriod(p)) => assert_eq!(p, period),
                other => panic!("expected invalid period error, got {other:?}"),
            }
            assert_eq!(node.height_calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_after_fatal_failure() {
        let node = Arc::new(MockNode::healthy(10, 0, 0));
        *node.mempool.lock().unwrap() = None;
        let (collector, _metrics) = build(node.clone(), None, FailurePolicy::Strict);

        let result = collector.run(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CollectorError::Fatal { .. })));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(node.mempool_calls.load(Ordering::SeqCst), 1);
        assert_eq!(node.height_calls.load(Ordering::SeqCst), 1);
    }
}
