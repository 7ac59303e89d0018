use std::time::Duration;

use thiserror::Error;

use crate::rpc::RpcError;

/// Errors that stop the collector loop.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// A query the strict failure policy treats as unrecoverable failed.
    #[error("fatal {method} failure: {source}")]
    Fatal {
        method: &'static str,
        #[source]
        source: RpcError,
    },

    /// The poll period is zero or too long to schedule.
    #[error("cannot schedule ticks every {0:?}")]
    InvalidPeriod(Duration),
}
