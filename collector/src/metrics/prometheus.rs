//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and the exporter's strongly-typed series, and an async HTTP
//! exporter that serves `/metrics` using `hyper`.

use std::{
    convert::Infallible,
    io,
    net::{Ipv4Addr, Ipv6Addr},
    sync::Arc,
};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{self, Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "blockchain";
const SUBSYSTEM: &str = "collector";

pub const LABEL_CHAIN: &str = "chain";
pub const LABEL_WALLET: &str = "wallet";
pub const LABEL_METHOD: &str = "method";

/// Content type of the Prometheus text exposition format.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE).subsystem(SUBSYSTEM)
}

/// Node health series written by the collector loop.
///
/// Every series carries a `chain` label; the wallet balance additionally
/// carries `wallet`. Gauges hold the last successfully observed value.
#[derive(Clone)]
pub struct ExporterMetrics {
    /// Local chain height.
    pub block_count: GaugeVec,
    /// Number of transactions in the node's mempool.
    pub raw_mempool_size: GaugeVec,
    /// Number of connected peers.
    pub connected_peers: GaugeVec,
    /// Failed wallet balance queries.
    pub wallet_errors: IntCounterVec,
    /// Balance of the selected wallet. `None` when wallet polling is off,
    /// in which case the series is never registered.
    pub wallet_balance: Option<GaugeVec>,
    /// Failed node queries, by RPC method.
    pub rpc_errors: IntCounterVec,
    /// Unix time of the last tick in which every node query succeeded.
    pub last_success_timestamp_seconds: GaugeVec,
}

impl ExporterMetrics {
    /// Registers the exporter series into `registry`.
    pub fn register(registry: &Registry, wallet_enabled: bool) -> Result<Self, prometheus::Error> {
        let block_count = GaugeVec::new(
            opts("block_count", "The local blockchain length"),
            &[LABEL_CHAIN],
        )?;
        registry.register(Box::new(block_count.clone()))?;

        let raw_mempool_size = GaugeVec::new(
            opts("raw_mempool_size", "The number of txes in rawmempool"),
            &[LABEL_CHAIN],
        )?;
        registry.register(Box::new(raw_mempool_size.clone()))?;

        let connected_peers = GaugeVec::new(
            opts("connected_peers", "The number of connected peers"),
            &[LABEL_CHAIN],
        )?;
        registry.register(Box::new(connected_peers.clone()))?;

        let wallet_errors = IntCounterVec::new(
            opts("wallet_errors", "Failures to load wallets"),
            &[LABEL_CHAIN],
        )?;
        registry.register(Box::new(wallet_errors.clone()))?;

        let wallet_balance = if wallet_enabled {
            let gauge = GaugeVec::new(
                opts("wallet_balance", "The balance on the selected wallet"),
                &[LABEL_CHAIN, LABEL_WALLET],
            )?;
            registry.register(Box::new(gauge.clone()))?;
            Some(gauge)
        } else {
            None
        };

        let rpc_errors = IntCounterVec::new(
            opts("rpc_errors", "Failed node RPC queries by method"),
            &[LABEL_CHAIN, LABEL_METHOD],
        )?;
        registry.register(Box::new(rpc_errors.clone()))?;

        let last_success_timestamp_seconds = GaugeVec::new(
            opts(
                "last_success_timestamp_seconds",
                "Unix time of the last poll in which every node query succeeded",
            ),
            &[LABEL_CHAIN],
        )?;
        registry.register(Box::new(last_success_timestamp_seconds.clone()))?;

        Ok(Self {
            block_count,
            raw_mempool_size,
            connected_peers,
            wallet_errors,
            wallet_balance,
            rpc_errors,
            last_success_timestamp_seconds,
        })
    }
}

/// Wrapper around a Prometheus registry and the exporter series.
///
/// Constructed once at startup and shared in an [`Arc`]: the collector loop
/// writes through `node`, the HTTP handler only reads via
/// [`MetricsRegistry::gather_text`]. Prometheus series are atomic, so no
/// extra locking is needed.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub node: ExporterMetrics,
}

impl MetricsRegistry {
    /// Creates a fresh registry and registers the exporter series.
    pub fn new(wallet_enabled: bool) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let node = ExporterMetrics::register(&registry, wallet_enabled)?;
        Ok(Self { registry, node })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Binds the metrics listener. Failure here is fatal for the exporter.
///
/// `addr` is `host:port` (host names are resolved) or `:port`, which
/// listens on every interface. For `:port` an IPv6 wildcard socket is tried
/// first, which on Linux also accepts IPv4 unless `net.ipv6.bindv6only` is
/// set; hosts without IPv6 fall back to the IPv4 wildcard.
pub async fn bind_metrics_listener(addr: &str) -> io::Result<TcpListener> {
    let Some(port) = addr.strip_prefix(':') else {
        return TcpListener::bind(addr).await;
    };

    let port: u16 = port.parse().map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("invalid port {port:?}: {e}"))
    })?;

    match TcpListener::bind((Ipv6Addr::UNSPECIFIED, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            tracing::debug!(port, error = %e, "IPv6 wildcard bind failed, using IPv4 only");
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await
        }
    }
}

/// Serves `GET /metrics` on an already bound listener until accepting
/// fails. All other paths return 404.
///
/// Each connection is handled on its own task; handlers only read the
/// registry.
pub async fn serve_metrics(
    listener: TcpListener,
    metrics: Arc<MetricsRegistry>,
) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!(%peer, error = %err, "metrics connection closed with error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            let mut resp = Response::new(Full::new(Bytes::from(body)));
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static(TEXT_CONTENT_TYPE),
            );
            resp
        }
        _ => {
            let mut resp = Response::new(Full::new(Bytes::from_static(b"not found")));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            resp
        }
    };
    Ok(response)
}
