use crate::indicators::{rolling_average, SignalError};
use crate::models::{Account, Bar, OrderSide, Position};

/// What the latest prices call for, before sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Falling but still above the mean: sell everything
    Liquidate,
    /// Below the mean: move exposure toward the sized target
    Rebalance,
    Hold,
}

/// Prices feeding one decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSignal {
    pub current_price: f64,
    pub previous_price: f64,
    pub rolling_average: f64,
}

impl PriceSignal {
    /// Build from chronological bars; the newest bar supplies the current price.
    pub fn from_bars(bars: &[Bar], window: usize) -> Result<Self, SignalError> {
        let rolling_average = rolling_average(bars, window)?;
        let current_price = bars
            .last()
            .and_then(Bar::effective_price)
            .ok_or(SignalError::NoPrice)?;
        let previous_price = bars
            .len()
            .checked_sub(2)
            .and_then(|i| bars[i].effective_price())
            .unwrap_or(0.0);

        Ok(Self {
            current_price,
            previous_price,
            rolling_average,
        })
    }

    pub fn going_down(&self) -> bool {
        self.current_price < self.previous_price
    }

    /// Relative distance of the current price from the mean
    pub fn distance_from_mean(&self) -> f64 {
        ((self.current_price - self.rolling_average) / self.rolling_average.abs()).abs()
    }
}

/// Sized rebalance toward the target exposure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebalancePlan {
    pub share: f64,
    pub target_value: f64,
    pub amount_to_add: f64,
    pub side: OrderSide,
    /// Whole shares to trade; zero or below means nothing to send
    pub quantity: i64,
    pub limit_price: f64,
}

/// Minute-bar mean reversion.
///
/// Sells into weakness above the rolling mean and scales into the position
/// below it, proportionally to the distance from the mean.
#[derive(Debug, Clone)]
pub struct MeanReversionStrategy {
    exposure_multiplier: f64,
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self::new(200.0)
    }
}

impl MeanReversionStrategy {
    pub fn new(exposure_multiplier: f64) -> Self {
        Self {
            exposure_multiplier,
        }
    }

    pub fn classify(&self, prices: &PriceSignal) -> Signal {
        if prices.going_down() && prices.current_price > prices.rolling_average {
            Signal::Liquidate
        } else if prices.current_price < prices.rolling_average {
            Signal::Rebalance
        } else {
            Signal::Hold
        }
    }

    /// Size a rebalance from the gap between the target and current exposure.
    ///
    /// Buys are capped by buying power, sells by the shares held.
    pub fn size_rebalance(
        &self,
        prices: &PriceSignal,
        position: &Position,
        account: &Account,
    ) -> RebalancePlan {
        let price = prices.current_price;
        let share = ((prices.rolling_average - price) / price) * self.exposure_multiplier;
        let target_value = account.portfolio_value * share;
        let amount_to_add = target_value - position.market_value;

        let (side, quantity) = if amount_to_add > 0.0 {
            let spend = amount_to_add.min(account.buying_power);
            (OrderSide::Buy, (spend / price).floor() as i64)
        } else {
            let qty = (amount_to_add.abs() / price).floor() as i64;
            (OrderSide::Sell, qty.min(position.whole_shares() as i64))
        };

        RebalancePlan {
            share,
            target_value,
            amount_to_add,
            side,
            quantity,
            limit_price: price,
        }
    }
}
