pub mod alpaca;
#[cfg(test)]
pub mod mock;

pub use alpaca::AlpacaClient;

use crate::models::{
    Account, Bar, BarQuery, CalendarDay, Clock, OrderQuery, OrderRecord, OrderRequest, Position,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

/// Failure of a single venue call
#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    #[error("venue request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("venue returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("failed to decode venue response: {0}")]
    Decode(String),
}

impl VenueError {
    /// True when the venue refused an order rather than failing to answer
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Execution venue: clock, calendar, market data, account and orders.
///
/// Each call is independent and may fail on its own.
#[async_trait]
pub trait Venue: Send + Sync {
    async fn get_clock(&self) -> Result<Clock, VenueError>;

    async fn get_calendar(&self, date: NaiveDate) -> Result<Vec<CalendarDay>, VenueError>;

    /// Minute bars in chronological order
    async fn get_bars(&self, symbol: &str, query: BarQuery) -> Result<Vec<Bar>, VenueError>;

    /// `Ok(None)` when there is no position in the symbol
    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, VenueError>;

    async fn get_account(&self) -> Result<Account, VenueError>;

    async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<OrderRecord>, VenueError>;

    async fn cancel_order(&self, id: Uuid) -> Result<(), VenueError>;

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderRecord, VenueError>;
}
