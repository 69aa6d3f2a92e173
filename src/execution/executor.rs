use crate::api::{Venue, VenueError};
use crate::execution::{PositionManager, PriceHistoryAggregator};
use crate::indicators::SignalError;
use crate::models::{OrderRecord, OrderRequest, OrderSide};
use crate::strategy::{MeanReversionStrategy, PriceSignal, Signal};

/// What a tick did at the venue
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Hold,
    /// Liquidation called for but nothing is held
    NothingToSell,
    /// Sizing produced no whole shares
    ZeroQuantity { side: OrderSide, quantity: i64 },
    Submitted(OrderRecord),
    Failed {
        side: OrderSide,
        quantity: u64,
        rejected: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub signal: Signal,
    pub prices: PriceSignal,
    pub action: ExecutionAction,
}

/// Why a rebalance tick produced no decision
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("venue unavailable: {0}")]
    Venue(#[from] VenueError),

    #[error("invalid signal input: {0}")]
    Signal(#[from] SignalError),
}

/// Turns prices, holdings and capital into orders for one instrument
pub struct Executor {
    symbol: String,
    strategy: MeanReversionStrategy,
}

impl Executor {
    pub fn new(symbol: &str, strategy: MeanReversionStrategy) -> Self {
        Self {
            symbol: symbol.to_string(),
            strategy,
        }
    }

    /// One rebalance tick: cancel the outstanding order, then decide and submit.
    pub async fn rebalance(
        &self,
        venue: &dyn Venue,
        feed: &PriceHistoryAggregator,
        orders: &mut PositionManager,
    ) -> Result<TickReport, TickError> {
        orders.cancel_outstanding(venue).await;

        let position = orders.current_position(venue).await?;
        let bars = feed.latest_bars().await?;
        let prices = PriceSignal::from_bars(&bars, feed.window())?;

        tracing::info!(
            symbol = %self.symbol,
            running_average = prices.rolling_average,
            curr_price = prices.current_price,
            prev_price = prices.previous_price,
            going_down = prices.going_down(),
            position_qty = position.quantity,
            position_value = position.market_value,
            "Rebalancing"
        );

        let signal = self.strategy.classify(&prices);
        let action = match signal {
            Signal::Liquidate => {
                let quantity = position.whole_shares();
                if quantity > 0 {
                    tracing::info!(
                        diff = prices.distance_from_mean(),
                        "Setting position to zero"
                    );
                    self.submit_limit_order(
                        venue,
                        orders,
                        quantity as i64,
                        OrderSide::Sell,
                        prices.current_price,
                    )
                    .await
                } else {
                    tracing::info!(symbol = %self.symbol, "No position in the stock, no action required");
                    ExecutionAction::NothingToSell
                }
            }
            Signal::Rebalance => {
                let account = venue.get_account().await?;
                let plan = self.strategy.size_rebalance(&prices, &position, &account);

                tracing::info!(
                    portfolio_value = account.portfolio_value,
                    buying_power = account.buying_power,
                    share = plan.share,
                    target_value = plan.target_value,
                    amount_to_add = plan.amount_to_add,
                    diff = prices.distance_from_mean(),
                    "Sized rebalance"
                );

                self.submit_limit_order(venue, orders, plan.quantity, plan.side, plan.limit_price)
                    .await
            }
            Signal::Hold => ExecutionAction::Hold,
        };

        Ok(TickReport {
            signal,
            prices,
            action,
        })
    }

    /// Cancel the outstanding order and sell the whole position at market
    pub async fn liquidate(
        &self,
        venue: &dyn Venue,
        orders: &mut PositionManager,
    ) -> Result<ExecutionAction, VenueError> {
        orders.cancel_outstanding(venue).await;

        let position = orders.current_position(venue).await?;
        let quantity = position.whole_shares();
        if quantity == 0 {
            tracing::info!(symbol = %self.symbol, "Nothing to liquidate");
            return Ok(ExecutionAction::NothingToSell);
        }

        Ok(self
            .submit(venue, orders, OrderRequest::market(&self.symbol, quantity, OrderSide::Sell))
            .await)
    }

    /// Submit a day limit order when the quantity is positive
    pub async fn submit_limit_order(
        &self,
        venue: &dyn Venue,
        orders: &mut PositionManager,
        quantity: i64,
        side: OrderSide,
        price: f64,
    ) -> ExecutionAction {
        if quantity <= 0 {
            tracing::info!(
                symbol = %self.symbol,
                qty = quantity,
                ?side,
                "Quantity is <= 0, order not sent"
            );
            return ExecutionAction::ZeroQuantity { side, quantity };
        }

        let request = OrderRequest::limit(&self.symbol, quantity as u64, side, price);
        self.submit(venue, orders, request).await
    }

    async fn submit(
        &self,
        venue: &dyn Venue,
        orders: &mut PositionManager,
        request: OrderRequest,
    ) -> ExecutionAction {
        match venue.create_order(&request).await {
            Ok(order) => {
                tracing::info!(
                    symbol = %request.symbol,
                    qty = request.qty,
                    side = ?request.side,
                    order_type = ?request.order_type,
                    limit_price = ?request.limit_price,
                    order_id = %order.id,
                    "Order sent"
                );
                orders.record_submission(order.clone());
                ExecutionAction::Submitted(order)
            }
            Err(e) => {
                tracing::warn!(
                    symbol = %request.symbol,
                    qty = request.qty,
                    side = ?request.side,
                    order_type = ?request.order_type,
                    limit_price = ?request.limit_price,
                    rejected = e.is_rejection(),
                    error = %e,
                    "Order did not go through"
                );
                ExecutionAction::Failed {
                    side: request.side,
                    quantity: request.qty,
                    rejected: e.is_rejection(),
                }
            }
        }
    }
}
