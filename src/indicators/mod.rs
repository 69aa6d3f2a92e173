// Technical indicators module

pub mod moving_average;

pub use moving_average::{calculate_sma, rolling_average};

/// Inputs that cannot produce a signal
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    #[error("no valid bars among the last {0} to average")]
    NoValidBars(usize),

    #[error("latest bar carries no usable price")]
    NoPrice,
}
