use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One minute bar for the tracked instrument
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub open_price: f64,
    pub close_price: f64,
    pub timestamp: DateTime<FixedOffset>,
}

impl Bar {
    /// Price this bar contributes to the signal.
    ///
    /// A zero close falls back to the open price; a bar with neither is
    /// invalid and yields `None`.
    pub fn effective_price(&self) -> Option<f64> {
        if self.close_price != 0.0 {
            Some(self.close_price)
        } else if self.open_price != 0.0 {
            Some(self.open_price)
        } else {
            None
        }
    }
}

/// Raw venue clock, timestamps exactly as the venue sent them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clock {
    pub is_open: bool,
    pub next_open: String,
    pub next_close: String,
    pub timestamp: String,
}

/// Parsed clock snapshot, re-read every evaluation tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    pub is_open: bool,
    pub next_open_at: DateTime<FixedOffset>,
    pub next_close_at: DateTime<FixedOffset>,
    pub now: DateTime<FixedOffset>,
}

impl Session {
    /// Time left in the current session; zero once the market is closed
    pub fn time_to_close(&self) -> chrono::TimeDelta {
        if !self.is_open {
            return chrono::TimeDelta::zero();
        }
        self.next_close_at - self.now
    }

    pub fn time_to_open(&self) -> chrono::TimeDelta {
        self.next_open_at - self.now
    }
}

/// One trading day, times in venue-local time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

/// Current holding in the instrument. A missing position is quantity zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub quantity: f64,
    pub market_value: f64,
}

impl Position {
    /// Whole shares that can be sold. Fractional remainders and shorts count as zero.
    pub fn whole_shares(&self) -> u64 {
        if self.quantity > 0.0 {
            self.quantity.floor() as u64
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub portfolio_value: f64,
    pub buying_power: f64,
    pub cash: f64,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
}

/// Order as submitted to the venue
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub qty: u64,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    pub client_order_id: Uuid,
}

impl OrderRequest {
    pub fn limit(symbol: &str, qty: u64, side: OrderSide, limit_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            qty,
            side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Day,
            limit_price: Some(limit_price),
            client_order_id: Uuid::new_v4(),
        }
    }

    pub fn market(symbol: &str, qty: u64, side: OrderSide) -> Self {
        Self {
            symbol: symbol.to_string(),
            qty,
            side,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            limit_price: None,
            client_order_id: Uuid::new_v4(),
        }
    }
}

/// Venue confirmation of an order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: Uuid,
    pub symbol: String,
    pub quantity: f64,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatusFilter {
    Open,
    Closed,
    All,
}

impl OrderStatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuery {
    pub status: OrderStatusFilter,
    pub direction: SortDirection,
    pub symbol: Option<String>,
}

/// Which minute bars to fetch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarQuery {
    /// Every bar from this instant on
    Since(DateTime<FixedOffset>),
    /// The most recent `n` bars
    Latest(usize),
}
