use super::{Venue, VenueError};
use crate::config::Settings;
use crate::models::{
    Account, Bar, BarQuery, CalendarDay, Clock, OrderQuery, OrderRecord, OrderRequest, OrderSide,
    OrderType, Position,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_RATE_LIMIT_RPM: u32 = 200;

type AlpacaRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// REST client for the Alpaca trading and market data APIs
///
/// Cloneable; clones share the HTTP pool and the rate limiter.
#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    trading_url: String,
    data_url: String,
    api_key: String,
    api_secret: String,
    rate_limiter: Arc<AlpacaRateLimiter>,
}

// Alpaca sends most numbers as JSON strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

fn numeric<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Numeric::deserialize(deserializer)? {
        Numeric::Number(n) => Ok(n),
        Numeric::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

fn optional_numeric<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Numeric>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Numeric::Number(n)) => Ok(Some(n)),
        Some(Numeric::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
struct ClockResponse {
    timestamp: String,
    is_open: bool,
    next_open: String,
    next_close: String,
}

#[derive(Debug, Deserialize)]
struct CalendarEntry {
    date: NaiveDate,
    open: String,
    close: String,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<Vec<BarEntry>>,
}

#[derive(Debug, Deserialize)]
struct BarEntry {
    t: DateTime<FixedOffset>,
    o: f64,
    c: f64,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    #[serde(deserialize_with = "numeric")]
    qty: f64,
    #[serde(deserialize_with = "numeric")]
    market_value: f64,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(deserialize_with = "numeric")]
    portfolio_value: f64,
    #[serde(deserialize_with = "numeric")]
    buying_power: f64,
    #[serde(deserialize_with = "numeric")]
    cash: f64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: Uuid,
    symbol: String,
    #[serde(default, deserialize_with = "optional_numeric")]
    qty: Option<f64>,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    #[serde(default, deserialize_with = "optional_numeric")]
    limit_price: Option<f64>,
    status: String,
}

impl From<OrderResponse> for OrderRecord {
    fn from(order: OrderResponse) -> Self {
        Self {
            id: order.id,
            symbol: order.symbol,
            quantity: order.qty.unwrap_or(0.0),
            side: order.side,
            order_type: order.order_type,
            limit_price: order.limit_price,
            status: order.status,
        }
    }
}

fn parse_session_time(value: &str) -> Result<NaiveTime, VenueError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| VenueError::Decode(format!("calendar time '{}': {}", value, e)))
}

impl AlpacaClient {
    /// Create a client from loaded settings
    pub fn new(settings: &Settings) -> Result<Self, VenueError> {
        Self::with_endpoints(
            settings.trading_url(),
            &settings.data_url,
            &settings.api_key,
            &settings.api_secret,
            settings.rate_limit_per_minute,
            settings.request_timeout(),
        )
    }

    /// Create a client against explicit endpoints
    pub fn with_endpoints(
        trading_url: &str,
        data_url: &str,
        api_key: &str,
        api_secret: &str,
        rate_limit_per_minute: u32,
        timeout: Duration,
    ) -> Result<Self, VenueError> {
        let client = Client::builder().timeout(timeout).build()?;

        let rpm = NonZeroU32::new(rate_limit_per_minute)
            .or(NonZeroU32::new(DEFAULT_RATE_LIMIT_RPM))
            .unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            trading_url: trading_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            rate_limiter,
        })
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }

    /// Send a rate-limited request; non-2xx statuses become `VenueError::Status`
    async fn send(&self, request: RequestBuilder) -> Result<Response, VenueError> {
        self.rate_limiter.until_ready().await;

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(VenueError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, VenueError> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| VenueError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Venue for AlpacaClient {
    async fn get_clock(&self) -> Result<Clock, VenueError> {
        let url = format!("{}/v2/clock", self.trading_url);
        let clock: ClockResponse = self.json(self.request(Method::GET, url)).await?;

        Ok(Clock {
            is_open: clock.is_open,
            next_open: clock.next_open,
            next_close: clock.next_close,
            timestamp: clock.timestamp,
        })
    }

    async fn get_calendar(&self, date: NaiveDate) -> Result<Vec<CalendarDay>, VenueError> {
        let url = format!("{}/v2/calendar", self.trading_url);
        let day = date.format("%Y-%m-%d").to_string();
        let request = self
            .request(Method::GET, url)
            .query(&[("start", day.as_str()), ("end", day.as_str())]);

        let entries: Vec<CalendarEntry> = self.json(request).await?;
        entries
            .into_iter()
            .map(|entry| {
                Ok(CalendarDay {
                    date: entry.date,
                    open: parse_session_time(&entry.open)?,
                    close: parse_session_time(&entry.close)?,
                })
            })
            .collect()
    }

    async fn get_bars(&self, symbol: &str, query: BarQuery) -> Result<Vec<Bar>, VenueError> {
        let url = format!("{}/v2/stocks/{}/bars", self.data_url, symbol);
        let mut request = self
            .request(Method::GET, url)
            .query(&[("timeframe", "1Min")]);

        let descending = match query {
            BarQuery::Since(start) => {
                request = request.query(&[("start", start.to_rfc3339())]);
                false
            }
            BarQuery::Latest(limit) => {
                request = request.query(&[("limit", limit.to_string().as_str()), ("sort", "desc")]);
                true
            }
        };

        let response: BarsResponse = self.json(request).await?;
        let mut bars: Vec<Bar> = response
            .bars
            .unwrap_or_default()
            .into_iter()
            .map(|b| Bar {
                open_price: b.o,
                close_price: b.c,
                timestamp: b.t,
            })
            .collect();

        if descending {
            bars.reverse();
        }

        tracing::debug!(symbol, count = bars.len(), "Fetched minute bars");
        Ok(bars)
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, VenueError> {
        let url = format!("{}/v2/positions/{}", self.trading_url, symbol);

        match self.json::<PositionResponse>(self.request(Method::GET, url)).await {
            Ok(position) => Ok(Some(Position {
                quantity: position.qty,
                market_value: position.market_value,
            })),
            Err(VenueError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_account(&self) -> Result<Account, VenueError> {
        let url = format!("{}/v2/account", self.trading_url);
        let account: AccountResponse = self.json(self.request(Method::GET, url)).await?;

        Ok(Account {
            portfolio_value: account.portfolio_value,
            buying_power: account.buying_power,
            cash: account.cash,
            status: account.status,
        })
    }

    async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<OrderRecord>, VenueError> {
        let url = format!("{}/v2/orders", self.trading_url);
        let mut request = self.request(Method::GET, url).query(&[
            ("status", query.status.as_str()),
            ("direction", query.direction.as_str()),
        ]);
        if let Some(symbol) = &query.symbol {
            request = request.query(&[("symbols", symbol.as_str())]);
        }

        let orders: Vec<OrderResponse> = self.json(request).await?;
        Ok(orders.into_iter().map(OrderRecord::from).collect())
    }

    async fn cancel_order(&self, id: Uuid) -> Result<(), VenueError> {
        let url = format!("{}/v2/orders/{}", self.trading_url, id);
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderRecord, VenueError> {
        let url = format!("{}/v2/orders", self.trading_url);

        match self
            .json::<OrderResponse>(self.request(Method::POST, url).json(request))
            .await
        {
            Ok(order) => Ok(order.into()),
            Err(VenueError::Status { status, body })
                if status == StatusCode::FORBIDDEN.as_u16()
                    || status == StatusCode::UNPROCESSABLE_ENTITY.as_u16() =>
            {
                Err(VenueError::Rejected(body))
            }
            Err(e) => Err(e),
        }
    }
}
