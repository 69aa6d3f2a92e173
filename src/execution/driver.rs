use super::{
    poll_timer, ExecutionAction, Executor, MarketSessionTracker, PositionManager,
    PriceHistoryAggregator, TickError,
};
use crate::api::Venue;
use crate::config::Settings;
use crate::models::Session;
use crate::strategy::MeanReversionStrategy;
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;

/// Where the daily trading cycle is
#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    Init,
    CancelStaleOrders,
    AwaitOpen,
    CollectBars(Session),
    RebalanceLoop,
    Closing,
    SleepUntilNextSession(Duration),
}

/// Mutable engine memory carried between ticks
pub struct EngineState {
    pub orders: PositionManager,
    pub time_to_close: Option<TimeDelta>,
    pub rolling_average: Option<f64>,
}

impl EngineState {
    pub fn new(symbol: &str) -> Self {
        Self {
            orders: PositionManager::new(symbol),
            time_to_close: None,
            rolling_average: None,
        }
    }
}

/// Runs the trading day for one instrument, session after session
pub struct Driver {
    venue: Arc<dyn Venue>,
    symbol: String,
    tracker: MarketSessionTracker,
    feed: PriceHistoryAggregator,
    executor: Executor,
    poll_interval: Duration,
    closing_window: TimeDelta,
    close_buffer: Duration,
    state: EngineState,
}

impl Driver {
    pub fn new(venue: Arc<dyn Venue>, symbol: &str, settings: &Settings) -> Self {
        let poll_interval = settings.poll_interval();

        Self {
            tracker: MarketSessionTracker::new(venue.clone(), poll_interval),
            feed: PriceHistoryAggregator::new(
                venue.clone(),
                symbol,
                settings.bar_window,
                poll_interval,
            ),
            executor: Executor::new(
                symbol,
                MeanReversionStrategy::new(settings.exposure_multiplier),
            ),
            venue,
            symbol: symbol.to_string(),
            poll_interval,
            closing_window: settings.closing_window(),
            close_buffer: settings.close_buffer(),
            state: EngineState::new(symbol),
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Drive the state machine forever
    pub async fn run(&mut self) {
        let mut state = DriverState::Init;
        loop {
            state = self.step(state).await;
        }
    }

    /// Perform one state's work and return the next state
    pub async fn step(&mut self, state: DriverState) -> DriverState {
        match state {
            DriverState::Init => {
                self.state = EngineState::new(&self.symbol);
                DriverState::CancelStaleOrders
            }
            DriverState::CancelStaleOrders => {
                self.state.orders.cancel_all_open(self.venue.as_ref()).await;
                DriverState::AwaitOpen
            }
            DriverState::AwaitOpen => {
                tracing::info!(symbol = %self.symbol, "Waiting for market to open...");
                let session = self.tracker.await_open().await;
                tracing::info!(symbol = %self.symbol, "Market opened");
                DriverState::CollectBars(session)
            }
            DriverState::CollectBars(session) => {
                tracing::info!(symbol = %self.symbol, "Waiting for {} bars...", self.feed.window());
                self.feed.collect_opening_bars(&session).await;
                DriverState::RebalanceLoop
            }
            DriverState::RebalanceLoop => self.rebalance_loop().await,
            DriverState::Closing => self.close_session().await,
            DriverState::SleepUntilNextSession(duration) => {
                tracing::info!(
                    symbol = %self.symbol,
                    "Sleeping until market close ({}s)",
                    duration.as_secs()
                );
                tokio::time::sleep(duration).await;
                DriverState::Init
            }
        }
    }

    /// Rebalance every interval until the close is near
    async fn rebalance_loop(&mut self) -> DriverState {
        let mut ticker = poll_timer(self.poll_interval);

        loop {
            ticker.tick().await;

            let time_to_close = match self.tracker.time_to_close().await {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(error = %e, "Clock check failed, skipping tick");
                    continue;
                }
            };
            self.state.time_to_close = Some(time_to_close);

            if time_to_close < self.closing_window {
                tracing::info!(
                    symbol = %self.symbol,
                    minutes_to_close = time_to_close.num_minutes(),
                    "Market closing soon, closing positions"
                );
                return DriverState::Closing;
            }

            self.rebalance_once().await;
        }
    }

    async fn rebalance_once(&mut self) {
        let result = self
            .executor
            .rebalance(self.venue.as_ref(), &self.feed, &mut self.state.orders)
            .await;

        match result {
            Ok(report) => {
                self.state.rolling_average = Some(report.prices.rolling_average);
                if let ExecutionAction::Failed { rejected: true, .. } = report.action {
                    tracing::warn!(symbol = %self.symbol, "Order rejected, position unchanged this tick");
                }
                tracing::debug!(signal = ?report.signal, action = ?report.action, "Tick complete");
            }
            Err(TickError::Signal(e)) => {
                tracing::error!(symbol = %self.symbol, error = %e, "Cannot compute signal, skipping tick");
            }
            Err(TickError::Venue(e)) => {
                tracing::warn!(symbol = %self.symbol, error = %e, "Venue call failed, skipping tick");
            }
        }
    }

    /// Liquidate at market and schedule the restart for after the close
    async fn close_session(&mut self) -> DriverState {
        match self
            .executor
            .liquidate(self.venue.as_ref(), &mut self.state.orders)
            .await
        {
            Ok(action) => tracing::info!(symbol = %self.symbol, ?action, "Closing liquidation"),
            Err(e) => tracing::warn!(symbol = %self.symbol, error = %e, "Closing liquidation failed"),
        }

        let until_close = match self.state.time_to_close.and_then(|t| t.to_std().ok()) {
            Some(duration) => duration,
            None => {
                tracing::warn!(
                    symbol = %self.symbol,
                    "Time to close unknown, sleeping for the close buffer only"
                );
                Duration::ZERO
            }
        };
        DriverState::SleepUntilNextSession(until_close + self.close_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{account, bars_from_closes, clock, regular_day, MockVenue};
    use crate::models::{OrderSide, OrderType, Position};

    fn settings() -> Settings {
        Settings::from_toml("").unwrap()
    }

    fn open_clock(now: &str) -> crate::models::Clock {
        clock(
            true,
            now,
            "2024-01-03T09:30:00-05:00",
            "2024-01-02T16:00:00-05:00",
        )
    }

    /// Bars whose last price sits just under a mean of 100
    fn dip_bars() -> Vec<crate::models::Bar> {
        let mut closes = vec![100.0 + 0.1 / 19.0; 19];
        closes.push(99.9);
        bars_from_closes(&closes)
    }

    #[tokio::test]
    async fn test_init_resets_and_cancels_stale_orders() {
        let stale = crate::api::mock::order_record("AAPL");
        let stale_id = stale.id;
        let venue = Arc::new(MockVenue::new().with(|s| s.open_orders.push(stale)));
        let mut driver = Driver::new(venue.clone(), "AAPL", &settings());

        let next = driver.step(DriverState::Init).await;
        assert_eq!(next, DriverState::CancelStaleOrders);

        let next = driver.step(next).await;
        assert_eq!(next, DriverState::AwaitOpen);
        assert_eq!(venue.cancelled(), vec![stale_id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_open_does_not_advance_on_clock_failure() {
        let venue = Arc::new(MockVenue::new().with(|s| {
            s.clock_failures = 2;
            s.clocks.push_back(open_clock("2024-01-02T09:30:00-05:00"));
        }));
        let mut driver = Driver::new(venue.clone(), "AAPL", &settings());

        let started = tokio::time::Instant::now();
        let next = driver.step(DriverState::AwaitOpen).await;

        assert!(matches!(next, DriverState::CollectBars(s) if s.is_open));
        assert_eq!(started.elapsed(), Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebalance_loop_trades_then_closes() {
        let venue = Arc::new(MockVenue::new().with(|s| {
            s.calendar = vec![regular_day()];
            s.clocks.push_back(open_clock("2024-01-02T15:00:00-05:00"));
            s.clocks.push_back(open_clock("2024-01-02T15:01:00-05:00"));
            s.clocks.push_back(open_clock("2024-01-02T15:50:00-05:00"));
            s.bars.push_back(dip_bars());
            s.account = Some(account(10_000.0, 5_000.0));
        }));
        let mut driver = Driver::new(venue.clone(), "AAPL", &settings());

        let next = driver.step(DriverState::RebalanceLoop).await;

        assert_eq!(next, DriverState::Closing);
        assert_eq!(driver.state().time_to_close, Some(TimeDelta::minutes(10)));
        assert!(driver.state().rolling_average.is_some());

        // two ticks each cancel the previous order before buying again
        let created = venue.created();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|o| o.side == OrderSide::Buy));
        assert_eq!(venue.cancelled().len(), 1);
        assert_eq!(venue.state.lock().unwrap().open_orders.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebalance_loop_closes_when_market_reports_closed() {
        let venue = Arc::new(MockVenue::new().with(|s| {
            s.calendar = vec![regular_day()];
            s.clocks.push_back(open_clock("2024-01-02T15:00:00-05:00"));
            s.clocks.push_back(clock(
                false,
                "2024-01-02T16:05:00-05:00",
                "2024-01-03T09:30:00-05:00",
                "2024-01-03T16:00:00-05:00",
            ));
            s.bars.push_back(dip_bars());
            s.account = Some(account(10_000.0, 5_000.0));
        }));
        let mut driver = Driver::new(venue.clone(), "AAPL", &settings());

        let next = tokio::time::timeout(
            Duration::from_secs(600),
            driver.step(DriverState::RebalanceLoop),
        )
        .await
        .expect("rebalance loop kept running after the close");

        assert_eq!(next, DriverState::Closing);
        assert_eq!(venue.created().len(), 1);
        assert_eq!(driver.state().time_to_close, Some(TimeDelta::zero()));

        let next = driver.step(next).await;
        assert_eq!(next, DriverState::SleepUntilNextSession(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebalance_loop_skips_tick_on_clock_failure() {
        let venue = Arc::new(MockVenue::new().with(|s| {
            s.clock_failures = 1;
            s.clocks.push_back(open_clock("2024-01-02T15:55:00-05:00"));
        }));
        let mut driver = Driver::new(venue.clone(), "AAPL", &settings());

        let started = tokio::time::Instant::now();
        let next = driver.step(DriverState::RebalanceLoop).await;

        assert_eq!(next, DriverState::Closing);
        assert_eq!(started.elapsed(), Duration::from_secs(120));
        assert!(venue.created().is_empty());
    }

    #[tokio::test]
    async fn test_closing_sells_at_market_and_sleeps_past_close() {
        let venue = Arc::new(MockVenue::new().with(|s| {
            s.position = Some(Position {
                quantity: 24.0,
                market_value: 2_400.0,
            });
        }));
        let mut driver = Driver::new(venue.clone(), "AAPL", &settings());
        driver.state.time_to_close = Some(TimeDelta::minutes(14));

        let next = driver.step(DriverState::Closing).await;

        assert_eq!(
            next,
            DriverState::SleepUntilNextSession(Duration::from_secs(14 * 60 + 60))
        );
        let created = venue.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].order_type, OrderType::Market);
        assert_eq!(created[0].side, OrderSide::Sell);
        assert_eq!(created[0].qty, 24);
        assert!(driver.state().orders.last_order().is_some());
    }

    #[tokio::test]
    async fn test_closing_twice_without_position_sends_nothing() {
        let venue = Arc::new(MockVenue::new());
        let mut driver = Driver::new(venue.clone(), "AAPL", &settings());

        let first = driver.step(DriverState::Closing).await;
        let second = driver.step(DriverState::Closing).await;

        assert!(venue.created().is_empty());
        // no clock reading yet, so only the buffer is slept
        assert_eq!(first, DriverState::SleepUntilNextSession(Duration::from_secs(60)));
        assert_eq!(second, first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_restarts_cycle() {
        let venue = Arc::new(MockVenue::new());
        let mut driver = Driver::new(venue, "AAPL", &settings());

        let started = tokio::time::Instant::now();
        let next = driver
            .step(DriverState::SleepUntilNextSession(Duration::from_secs(900)))
            .await;

        assert_eq!(next, DriverState::Init);
        assert_eq!(started.elapsed(), Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_session_cycle() {
        let venue = Arc::new(MockVenue::new().with(|s| {
            s.calendar = vec![regular_day()];
            s.clocks.push_back(clock(
                false,
                "2024-01-02T09:29:00-05:00",
                "2024-01-02T09:30:00-05:00",
                "2024-01-02T16:00:00-05:00",
            ));
            s.clocks.push_back(open_clock("2024-01-02T09:30:00-05:00"));
            s.clocks.push_back(open_clock("2024-01-02T09:51:00-05:00"));
            s.clocks.push_back(open_clock("2024-01-02T15:46:00-05:00"));
            s.bars.push_back(dip_bars());
            s.account = Some(account(10_000.0, 5_000.0));
            s.position = Some(Position {
                quantity: 3.0,
                market_value: 300.0,
            });
        }));
        let mut driver = Driver::new(venue.clone(), "AAPL", &settings());

        let mut state = DriverState::Init;
        let mut visited = Vec::new();
        while state != DriverState::Init || visited.is_empty() {
            visited.push(std::mem::discriminant(&state));
            state = driver.step(state).await;
        }

        assert_eq!(visited.len(), 7);
        let created = venue.created();
        assert_eq!(created.first().map(|o| o.order_type), Some(OrderType::Limit));
        assert_eq!(created.last().map(|o| o.order_type), Some(OrderType::Market));
        assert_eq!(created.last().map(|o| o.qty), Some(3));
    }
}
