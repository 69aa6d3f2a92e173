//! Scripted in-memory venue for unit tests

use super::{Venue, VenueError};
use crate::models::{
    Account, Bar, BarQuery, CalendarDay, Clock, OrderQuery, OrderRecord, OrderRequest, Position,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta};
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MockState {
    /// Clocks served in order; the last one repeats once the queue drains
    pub clocks: VecDeque<Clock>,
    pub clock_failures: usize,
    pub clock_calls: usize,

    pub calendar: Vec<CalendarDay>,

    /// Bar batches served in order; the last one repeats once the queue drains
    pub bars: VecDeque<Vec<Bar>>,
    pub bar_failures: usize,
    pub bar_queries: Vec<BarQuery>,

    pub position: Option<Position>,
    pub position_failures: usize,
    pub account: Option<Account>,
    pub account_calls: usize,

    pub open_orders: Vec<OrderRecord>,
    pub orders_failures: usize,
    pub fail_cancels: bool,
    pub reject_orders: bool,

    pub cancelled: Vec<Uuid>,
    pub created: Vec<OrderRequest>,
}

#[derive(Default)]
pub struct MockVenue {
    pub state: Mutex<MockState>,
}

pub fn ts(value: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(value).unwrap()
}

pub fn clock(is_open: bool, now: &str, next_open: &str, next_close: &str) -> Clock {
    Clock {
        is_open,
        next_open: next_open.to_string(),
        next_close: next_close.to_string(),
        timestamp: now.to_string(),
    }
}

pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    let start = ts("2024-01-02T09:30:00-05:00");
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| Bar {
            open_price: *close,
            close_price: *close,
            timestamp: start + TimeDelta::minutes(i as i64),
        })
        .collect()
}

pub fn regular_day() -> CalendarDay {
    CalendarDay {
        date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
    }
}

pub fn account(portfolio_value: f64, buying_power: f64) -> Account {
    Account {
        portfolio_value,
        buying_power,
        cash: buying_power,
        status: "ACTIVE".to_string(),
    }
}

pub fn order_record(symbol: &str) -> OrderRecord {
    OrderRecord {
        id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        quantity: 1.0,
        side: crate::models::OrderSide::Buy,
        order_type: crate::models::OrderType::Limit,
        limit_price: Some(100.0),
        status: "new".to_string(),
    }
}

fn failure(call: &str) -> VenueError {
    VenueError::Status {
        status: 503,
        body: format!("{} unavailable", call),
    }
}

impl MockVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: FnOnce(&mut MockState)>(self, setup: F) -> Self {
        setup(&mut self.state.lock().unwrap());
        self
    }

    pub fn created(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn cancelled(&self) -> Vec<Uuid> {
        self.state.lock().unwrap().cancelled.clone()
    }
}

fn next_or_last<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl Venue for MockVenue {
    async fn get_clock(&self) -> Result<Clock, VenueError> {
        let mut state = self.state.lock().unwrap();
        state.clock_calls += 1;
        if state.clock_failures > 0 {
            state.clock_failures -= 1;
            return Err(failure("clock"));
        }
        next_or_last(&mut state.clocks).ok_or_else(|| failure("clock"))
    }

    async fn get_calendar(&self, _date: NaiveDate) -> Result<Vec<CalendarDay>, VenueError> {
        Ok(self.state.lock().unwrap().calendar.clone())
    }

    async fn get_bars(&self, _symbol: &str, query: BarQuery) -> Result<Vec<Bar>, VenueError> {
        let mut state = self.state.lock().unwrap();
        state.bar_queries.push(query);
        if state.bar_failures > 0 {
            state.bar_failures -= 1;
            return Err(failure("bars"));
        }
        let bars = next_or_last(&mut state.bars).unwrap_or_default();
        Ok(match query {
            BarQuery::Latest(n) => bars[bars.len().saturating_sub(n)..].to_vec(),
            BarQuery::Since(_) => bars,
        })
    }

    async fn get_position(&self, _symbol: &str) -> Result<Option<Position>, VenueError> {
        let mut state = self.state.lock().unwrap();
        if state.position_failures > 0 {
            state.position_failures -= 1;
            return Err(failure("position"));
        }
        Ok(state.position)
    }

    async fn get_account(&self) -> Result<Account, VenueError> {
        let mut state = self.state.lock().unwrap();
        state.account_calls += 1;
        state.account.clone().ok_or_else(|| failure("account"))
    }

    async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<OrderRecord>, VenueError> {
        let mut state = self.state.lock().unwrap();
        if state.orders_failures > 0 {
            state.orders_failures -= 1;
            return Err(failure("orders"));
        }
        Ok(state
            .open_orders
            .iter()
            .filter(|o| query.symbol.as_deref().map_or(true, |s| s == o.symbol))
            .cloned()
            .collect())
    }

    async fn cancel_order(&self, id: Uuid) -> Result<(), VenueError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_cancels {
            return Err(failure("cancel"));
        }
        state.cancelled.push(id);
        state.open_orders.retain(|o| o.id != id);
        Ok(())
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderRecord, VenueError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_orders {
            return Err(VenueError::Rejected("insufficient buying power".to_string()));
        }
        state.created.push(request.clone());

        let record = OrderRecord {
            id: Uuid::new_v4(),
            symbol: request.symbol.clone(),
            quantity: request.qty as f64,
            side: request.side,
            order_type: request.order_type,
            limit_price: request.limit_price,
            status: "accepted".to_string(),
        };
        state.open_orders.push(record.clone());
        Ok(record)
    }
}
