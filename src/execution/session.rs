use super::poll_timer;
use crate::api::{Venue, VenueError};
use crate::models::{Clock, Session};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta};
use std::sync::Arc;
use std::time::Duration;

/// Width of the `±HH:MM` suffix the venue appends to every timestamp
const OFFSET_WIDTH: usize = 6;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClockError {
    #[error("timestamp '{0}' does not end in a ±HH:MM offset")]
    UnsupportedOffset(String),

    #[error("cannot parse timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },

    #[error("market reported open but closes at {next_close} before now {now}")]
    InconsistentSession {
        now: DateTime<FixedOffset>,
        next_close: DateTime<FixedOffset>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Clock(#[from] ClockError),
}

/// Parse a venue timestamp such as `2024-01-02T10:15:30.123-05:00`.
///
/// The trailing six characters are split off as the UTC offset and the rest is
/// parsed as local time. Any other suffix shape is rejected.
pub fn parse_venue_timestamp(value: &str) -> Result<DateTime<FixedOffset>, ClockError> {
    let split = value
        .len()
        .checked_sub(OFFSET_WIDTH)
        .filter(|&i| value.is_char_boundary(i))
        .ok_or_else(|| ClockError::UnsupportedOffset(value.to_string()))?;
    let (local, suffix) = value.split_at(split);

    let offset =
        parse_offset(suffix).ok_or_else(|| ClockError::UnsupportedOffset(value.to_string()))?;

    let local = NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M:%S%.f").map_err(|e| {
        ClockError::Timestamp {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })?;

    local
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| ClockError::Timestamp {
            value: value.to_string(),
            reason: "ambiguous local time".to_string(),
        })
}

fn parse_offset(suffix: &str) -> Option<FixedOffset> {
    let bytes = suffix.as_bytes();
    if bytes.len() != OFFSET_WIDTH || bytes[3] != b':' {
        return None;
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits = [bytes[1], bytes[2], bytes[4], bytes[5]];
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    let hours = i32::from(digits[0] - b'0') * 10 + i32::from(digits[1] - b'0');
    let minutes = i32::from(digits[2] - b'0') * 10 + i32::from(digits[3] - b'0');
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Turn a raw venue clock into a checked session snapshot
pub fn session_from_clock(clock: &Clock) -> Result<Session, ClockError> {
    let session = Session {
        is_open: clock.is_open,
        next_open_at: parse_venue_timestamp(&clock.next_open)?,
        next_close_at: parse_venue_timestamp(&clock.next_close)?,
        now: parse_venue_timestamp(&clock.timestamp)?,
    };

    if session.is_open && session.next_close_at <= session.now {
        return Err(ClockError::InconsistentSession {
            now: session.now,
            next_close: session.next_close_at,
        });
    }

    Ok(session)
}

/// Tracks whether the market is open by polling the venue clock
pub struct MarketSessionTracker {
    venue: Arc<dyn Venue>,
    poll_interval: Duration,
}

impl MarketSessionTracker {
    pub fn new(venue: Arc<dyn Venue>, poll_interval: Duration) -> Self {
        Self {
            venue,
            poll_interval,
        }
    }

    /// Fresh session snapshot from the venue clock
    pub async fn session(&self) -> Result<Session, SessionError> {
        let clock = self.venue.get_clock().await?;
        Ok(session_from_clock(&clock)?)
    }

    pub async fn time_to_close(&self) -> Result<TimeDelta, SessionError> {
        Ok(self.session().await?.time_to_close())
    }

    /// Poll the clock every interval until the market is open.
    ///
    /// Failed polls are logged and retried on the next interval, without limit.
    pub async fn await_open(&self) -> Session {
        let mut ticker = poll_timer(self.poll_interval);

        loop {
            ticker.tick().await;

            match self.session().await {
                Ok(session) if session.is_open => return session,
                Ok(session) => {
                    tracing::info!(
                        minutes_until_open = session.time_to_open().num_minutes(),
                        "Market closed, waiting for open"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Clock check failed, retrying next interval");
                }
            }
        }
    }
}
