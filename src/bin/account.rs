use anyhow::Context;
use equitybot::{AlpacaClient, Settings, Venue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("equitybot=info")
        .init();

    let settings = Settings::load().context("Failed to load settings")?;
    let client = AlpacaClient::new(&settings).context("Failed to build venue client")?;

    let account = client
        .get_account()
        .await
        .context("Failed to fetch account")?;

    println!("Account ({})", settings.trading_url());
    println!("  Status:          {}", account.status);
    println!("  Portfolio value: ${:.2}", account.portfolio_value);
    println!("  Buying power:    ${:.2}", account.buying_power);
    println!("  Cash:            ${:.2}", account.cash);

    Ok(())
}
