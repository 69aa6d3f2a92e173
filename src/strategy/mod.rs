// Trading strategy module
pub mod mean_reversion;

pub use mean_reversion::{MeanReversionStrategy, PriceSignal, RebalancePlan, Signal};
