//! Exporter configuration.
//!
//! Everything is read once at startup from environment variables and is
//! immutable afterwards. Each variable is looked up under its plain name
//! first and then under its `BITCOIN_`-prefixed alias, so both deployment
//! conventions work:
//!
//! | Variable             | Alias                | Default           |
//! |----------------------|----------------------|-------------------|
//! | `CHAIN`              | `BITCOIN_CHAIN`      | `bitcoin-mainnet` |
//! | `RPC_USER`           | `BITCOIN_RPC_USER`   | `""`              |
//! | `RPC_PASS`           | `BITCOIN_RPC_PASS`   | `""`              |
//! | `RPC_HOST`           | `BITCOIN_RPC_HOST`   | required          |
//! | `INTERVAL`           | `BITCOIN_INTERVAL`   | `15`              |
//! | `HTTP_LISTENADDR`    |                      | `:9112`           |
//! | `WALLET`             |                      | `UNDEFINED`       |
//! | `WALLET_SOURCE`      |                      | `raw`             |
//! | `RPC_FAILURE_POLICY` |                      | `tolerant`        |
//! | `RPC_TIMEOUT`        |                      | unset             |

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::poller::FailurePolicy;

pub const DEFAULT_CHAIN: &str = "bitcoin-mainnet";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
/// Longest accepted poll interval: one day.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_LISTEN_ADDR: &str = ":9112";

/// `WALLET` value that turns wallet polling off. An empty string is a valid
/// wallet selection (the node's default wallet), so it cannot serve here.
pub const WALLET_DISABLED_SENTINEL: &str = "UNDEFINED";

const ENV_ALIAS_PREFIX: &str = "BITCOIN_";

/// Startup configuration errors. All of them are fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required environment variable {name} is not set")]
    Missing { name: &'static str },

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings for the node's RPC port.
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// `host:port` of the node, without scheme. TLS is never used.
    pub host: String,
    pub user: String,
    pub password: String,
    /// Per-request timeout. `None` keeps the HTTP client's default.
    pub timeout: Option<Duration>,
}

/// Which wallet, if any, to report a balance for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletSelection {
    Disabled,
    /// The node's default wallet (`WALLET=""`).
    Default,
    Named(String),
}

impl WalletSelection {
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            None | Some(WALLET_DISABLED_SENTINEL) => WalletSelection::Disabled,
            Some("") => WalletSelection::Default,
            Some(name) => WalletSelection::Named(name.to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, WalletSelection::Disabled)
    }

    /// Wallet name for the `/wallet/<name>` endpoint; `None` targets the
    /// node root (default wallet, or disabled).
    pub fn endpoint_name(&self) -> Option<&str> {
        match self {
            WalletSelection::Named(name) => Some(name),
            _ => None,
        }
    }

    /// Value of the `wallet` label on the balance gauge.
    pub fn label(&self) -> &str {
        match self {
            WalletSelection::Named(name) => name,
            _ => "",
        }
    }
}

/// How the wallet balance is fetched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WalletSource {
    /// Hand-built `getbalance` request with result-shape sniffing.
    #[default]
    Raw,
    /// The structured client's `getbalance` call.
    Client,
}

impl FromStr for WalletSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(WalletSource::Raw),
            "client" => Ok(WalletSource::Client),
            other => Err(format!("expected \"raw\" or \"client\", got {other:?}")),
        }
    }
}

/// Top-level exporter configuration.
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    /// Value of the `chain` label on every series.
    pub chain: String,
    pub rpc: RpcConfig,
    /// Poll period.
    pub interval: Duration,
    /// Bind address of the `/metrics` server, `host:port` or `:port`.
    /// Host names are resolved at bind time.
    pub listen_addr: String,
    pub wallet: WalletSelection,
    pub wallet_source: WalletSource,
    pub failure_policy: FailurePolicy,
}

impl ExporterConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let chain = env
            .get_aliased("CHAIN")
            .unwrap_or_else(|| DEFAULT_CHAIN.to_string());

        let host = env
            .get_aliased("RPC_HOST")
            .filter(|h| !h.trim().is_empty())
            .ok_or(ConfigError::Missing { name: "RPC_HOST" })?;

        let rpc = RpcConfig {
            host,
            user: env.get_aliased("RPC_USER").unwrap_or_default(),
            password: env.get_aliased("RPC_PASS").unwrap_or_default(),
            timeout: parse_timeout(env.get("RPC_TIMEOUT"))?,
        };

        let interval = parse_interval(env.get_aliased("INTERVAL").as_deref());

        let listen_raw = env
            .get("HTTP_LISTENADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = parse_listen_addr(&listen_raw).map_err(|reason| ConfigError::Invalid {
            name: "HTTP_LISTENADDR",
            value: listen_raw.clone(),
            reason,
        })?;

        let wallet = WalletSelection::from_env_value(env.get("WALLET").as_deref());

        let wallet_source = match env.get("WALLET_SOURCE") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                name: "WALLET_SOURCE",
                value: raw.clone(),
                reason,
            })?,
            None => WalletSource::default(),
        };

        let failure_policy = match env.get("RPC_FAILURE_POLICY") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                name: "RPC_FAILURE_POLICY",
                value: raw.clone(),
                reason,
            })?,
            None => FailurePolicy::default(),
        };

        Ok(Self {
            chain,
            rpc,
            interval,
            listen_addr,
            wallet,
            wallet_source,
            failure_policy,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    /// `name`, falling back to `BITCOIN_<name>`.
    fn get_aliased(&self, name: &str) -> Option<String> {
        self.get(name)
            .or_else(|| self.get(&format!("{ENV_ALIAS_PREFIX}{name}")))
    }
}

/// Parses the poll interval in whole seconds.
///
/// Unset, unparseable, zero and longer-than-[`MAX_INTERVAL`] values all
/// fall back to [`DEFAULT_INTERVAL`]; all but unset log a warning.
pub fn parse_interval(raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        return DEFAULT_INTERVAL;
    };

    match raw.trim().parse::<u64>() {
        Ok(0) => {
            tracing::warn!(value = raw, "poll interval must be positive, using default of 15s");
            DEFAULT_INTERVAL
        }
        Ok(secs) if Duration::from_secs(secs) > MAX_INTERVAL => {
            tracing::warn!(
                value = raw,
                max_secs = MAX_INTERVAL.as_secs(),
                "poll interval too long, using default of 15s"
            );
            DEFAULT_INTERVAL
        }
        Ok(secs) => Duration::from_secs(secs),
        Err(e) => {
            tracing::warn!(value = raw, error = %e, "invalid poll interval, using default of 15s");
            DEFAULT_INTERVAL
        }
    }
}

/// Checks a listen address of the form `host:port`, `[v6]:port` or
/// `:port` and returns it trimmed.
///
/// The host is not resolved here; `localhost:9112` is only looked up when
/// the metrics listener binds. An empty host (`":9112"`) means every
/// interface.
pub fn parse_listen_addr(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| "expected host:port or :port".to_string())?;
    port.parse::<u16>()
        .map_err(|e| format!("invalid port {port:?}: {e}"))?;
    if host.contains(char::is_whitespace) {
        return Err(format!("invalid host {host:?}"));
    }
    Ok(raw.to_string())
}

fn parse_timeout(raw: Option<String>) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::Invalid {
            name: "RPC_TIMEOUT",
            value: raw,
            reason: "expected a positive number of seconds".to_string(),
        }),
        Ok(secs) => Ok(Some(Duration::from_secs(secs))),
    }
}
