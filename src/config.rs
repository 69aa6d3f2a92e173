use serde::Deserialize;
use std::time::Duration;

const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";
const LIVE_TRADING_URL: &str = "https://api.alpaca.markets";
const MARKET_DATA_URL: &str = "https://data.alpaca.markets";

/// Runtime settings.
///
/// Layered as defaults, then an optional `equitybot.toml`, then `EQUITYBOT_*`
/// environment variables. Credentials may also come from the venue's own
/// `APCA_API_KEY_ID` / `APCA_API_SECRET_KEY` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    pub paper: bool,
    pub trading_url: Option<String>,
    pub data_url: String,
    pub default_symbol: String,
    pub poll_interval_secs: u64,
    pub bar_window: usize,
    pub closing_window_mins: i64,
    pub close_buffer_secs: u64,
    pub exposure_multiplier: f64,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
}

impl Settings {
    /// Load settings from the process environment and `equitybot.toml`
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Same layering as `load`, reading variables from `env` instead of the process when given
    fn load_from(env: Option<config::Map<String, String>>) -> Result<Self, config::ConfigError> {
        let var = |name: &str| match &env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        };
        let api_key = var("APCA_API_KEY_ID");
        let api_secret = var("APCA_API_SECRET_KEY");

        let builder = Self::defaults()?
            .add_source(config::File::with_name("equitybot").required(false))
            .add_source(
                config::Environment::with_prefix("EQUITYBOT")
                    .try_parsing(true)
                    .source(env),
            )
            .set_override_option("api_key", api_key)?
            .set_override_option("api_secret", api_secret)?;

        builder.build()?.try_deserialize()
    }

    /// Load settings from an inline TOML document on top of the defaults
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        Self::defaults()?
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError>
    {
        config::Config::builder()
            .set_default("paper", true)?
            .set_default("data_url", MARKET_DATA_URL)?
            .set_default("default_symbol", "AAPL")?
            .set_default("poll_interval_secs", 60)?
            .set_default("bar_window", 20)?
            .set_default("closing_window_mins", 15)?
            .set_default("close_buffer_secs", 60)?
            .set_default("exposure_multiplier", 200.0)?
            .set_default("rate_limit_per_minute", 200)?
            .set_default("request_timeout_secs", 30)
    }

    /// Trading endpoint, paper unless explicitly overridden or disabled
    pub fn trading_url(&self) -> &str {
        match &self.trading_url {
            Some(url) => url,
            None if self.paper => PAPER_TRADING_URL,
            None => LIVE_TRADING_URL,
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn closing_window(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::minutes(self.closing_window_mins)
    }

    pub fn close_buffer(&self) -> Duration {
        Duration::from_secs(self.close_buffer_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
