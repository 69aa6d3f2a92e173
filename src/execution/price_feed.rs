use super::poll_timer;
use crate::api::{Venue, VenueError};
use crate::models::{Bar, BarQuery, Session};
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use std::time::Duration;

/// Collects minute bars for one instrument
pub struct PriceHistoryAggregator {
    venue: Arc<dyn Venue>,
    symbol: String,
    window: usize,
    poll_interval: Duration,
}

impl PriceHistoryAggregator {
    pub fn new(venue: Arc<dyn Venue>, symbol: &str, window: usize, poll_interval: Duration) -> Self {
        Self {
            venue,
            symbol: symbol.to_string(),
            window,
            poll_interval,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// When today's session opened, in the venue's offset
    async fn session_open(&self, session: &Session) -> Result<DateTime<FixedOffset>, VenueError> {
        let today = session.now.date_naive();
        let day = self
            .venue
            .get_calendar(today)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| VenueError::Decode(format!("no calendar entry for {}", today)))?;

        day.date
            .and_time(day.open)
            .and_local_timezone(*session.now.offset())
            .single()
            .ok_or_else(|| VenueError::Decode(format!("invalid session open on {}", today)))
    }

    /// Poll until at least one full window of bars exists since the open.
    ///
    /// Returns the bars seen on the completing poll; failures retry on the next interval.
    pub async fn collect_opening_bars(&self, session: &Session) -> Vec<Bar> {
        let mut ticker = poll_timer(self.poll_interval);

        loop {
            ticker.tick().await;

            let bars = match self.session_open(session).await {
                Ok(open) => self.venue.get_bars(&self.symbol, BarQuery::Since(open)).await,
                Err(e) => Err(e),
            };

            match bars {
                Ok(bars) if bars.len() >= self.window => {
                    tracing::info!(symbol = %self.symbol, bars = bars.len(), "Opening bars collected");
                    return bars;
                }
                Ok(bars) => {
                    tracing::info!(
                        symbol = %self.symbol,
                        "Collecting data... ({}/{} bars)",
                        bars.len(),
                        self.window
                    );
                }
                Err(e) => {
                    tracing::warn!(symbol = %self.symbol, error = %e, "Bar check failed");
                }
            }
        }
    }

    /// Most recent window of bars, oldest first
    pub async fn latest_bars(&self) -> Result<Vec<Bar>, VenueError> {
        self.venue
            .get_bars(&self.symbol, BarQuery::Latest(self.window))
            .await
    }
}
