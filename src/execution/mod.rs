// Session tracking, data collection, order state and the trading loop
pub mod driver;
pub mod executor;
pub mod position_manager;
pub mod price_feed;
pub mod session;

pub use driver::{Driver, DriverState, EngineState};
pub use executor::{ExecutionAction, Executor, TickError, TickReport};
pub use position_manager::PositionManager;
pub use price_feed::PriceHistoryAggregator;
pub use session::{MarketSessionTracker, SessionError};

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Periodic timer whose first tick fires one full period from now
pub(crate) fn poll_timer(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
