use super::SignalError;
use crate::models::Bar;

/// Calculate Simple Moving Average (SMA)
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period || period == 0 {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Mean effective price of the most recent `window` bars.
///
/// Bars with a zero close use their open price; bars with neither are skipped.
/// Errors when nothing valid is left to average.
pub fn rolling_average(bars: &[Bar], window: usize) -> Result<f64, SignalError> {
    let start = bars.len().saturating_sub(window);
    let prices: Vec<f64> = bars[start..]
        .iter()
        .filter_map(Bar::effective_price)
        .collect();

    calculate_sma(&prices, prices.len()).ok_or(SignalError::NoValidBars(bars.len() - start))
}
