use std::fmt;
use std::str::FromStr;

/// How the collector reacts to a failed mempool or peer query.
///
/// Chain-height and wallet failures are always tolerated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure, count it, keep the last value and carry on.
    #[default]
    Tolerant,
    /// Stop the collector loop; the binary exits and a supervisor restarts it.
    Strict,
}

impl FailurePolicy {
    pub fn is_strict(self) -> bool {
        matches!(self, FailurePolicy::Strict)
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tolerant" => Ok(FailurePolicy::Tolerant),
            "strict" => Ok(FailurePolicy::Strict),
            other => Err(format!("expected \"tolerant\" or \"strict\", got {other:?}")),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Tolerant => write!(f, "tolerant"),
            FailurePolicy::Strict => write!(f, "strict"),
        }
    }
}
