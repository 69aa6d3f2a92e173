use crate::api::{Venue, VenueError};
use crate::models::{OrderQuery, OrderRecord, OrderStatusFilter, Position, SortDirection};

/// Holding and the single outstanding order for one instrument.
///
/// At most one order is tracked; recording a new one replaces the previous.
pub struct PositionManager {
    symbol: String,
    last_order: Option<OrderRecord>,
}

impl PositionManager {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            last_order: None,
        }
    }

    pub fn last_order(&self) -> Option<&OrderRecord> {
        self.last_order.as_ref()
    }

    /// Current holding; no position at the venue is a zero holding
    pub async fn current_position(&self, venue: &dyn Venue) -> Result<Position, VenueError> {
        Ok(venue.get_position(&self.symbol).await?.unwrap_or_default())
    }

    /// Cancel the tracked order, if any. The order is forgotten even if the cancel fails.
    pub async fn cancel_outstanding(&mut self, venue: &dyn Venue) {
        let Some(order) = self.last_order.take() else {
            return;
        };

        match venue.cancel_order(order.id).await {
            Ok(()) => tracing::debug!(order_id = %order.id, "Cancelled outstanding order"),
            Err(e) => tracing::warn!(order_id = %order.id, error = %e, "Failed to cancel order"),
        }
    }

    pub fn record_submission(&mut self, order: OrderRecord) {
        self.last_order = Some(order);
    }

    /// Cancel every open order for the symbol, including ones left by an earlier run.
    ///
    /// Returns how many cancels the venue accepted.
    pub async fn cancel_all_open(&mut self, venue: &dyn Venue) -> usize {
        self.last_order = None;

        let query = OrderQuery {
            status: OrderStatusFilter::Open,
            direction: SortDirection::Asc,
            symbol: Some(self.symbol.clone()),
        };
        let orders = match venue.get_orders(&query).await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::warn!(symbol = %self.symbol, error = %e, "Failed to list open orders");
                return 0;
            }
        };

        let mut cancelled = 0;
        for order in orders.iter().filter(|o| o.symbol == self.symbol) {
            match venue.cancel_order(order.id).await {
                Ok(()) => cancelled += 1,
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Failed to cancel stale order")
                }
            }
        }

        if !orders.is_empty() {
            tracing::info!(symbol = %self.symbol, cancelled, "Cancelled stale orders");
        }
        cancelled
    }
}
