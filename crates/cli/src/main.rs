use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crypto_portfolio_core::errors::CoreError;
use crypto_portfolio_core::models::coin::Coin;
use crypto_portfolio_core::models::settings::Settings;
use crypto_portfolio_core::models::transaction::Transaction;
use crypto_portfolio_core::providers::coingecko::CoinGeckoProvider;
use crypto_portfolio_core::services::ledger_store::{BuyOrder, SellOrder};
use crypto_portfolio_core::services::market_service::{MarketService, Quote};
use crypto_portfolio_core::services::price_sync::{PriceSync, SyncOutcome};
use crypto_portfolio_core::CryptoPortfolio;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .map(|d| d.join("crypto-portfolio"))
            .context("No platform data directory; pass --data-dir")?,
    };
    tracing::debug!(data_dir = %data_dir.display(), "opening portfolio");

    let provider = CoinGeckoProvider::from_settings(&settings);
    let gateway = provider.gateway().clone();
    let app = App {
        portfolio: CryptoPortfolio::open_dir(&data_dir),
        market: Arc::new(
            MarketService::new(Arc::new(provider)).with_vs_currency(&settings.vs_currency),
        ),
        settings,
    };

    let result = run(app, cli.command).await;
    if gateway.fallbacks_served() > 0 {
        eprintln!("Note: the API is rate limiting requests; some figures are demo data.");
    }
    result
}

async fn run(app: App, command: Commands) -> Result<()> {
    match command {
        Commands::Buy { coin, quantity, price } => app.buy(&coin, quantity, price).await,
        Commands::Sell { coin, quantity, price } => app.sell(&coin, quantity, price).await,
        Commands::Clear { yes } => app.clear(yes),
        Commands::Show => {
            show_portfolio(&app.portfolio);
            Ok(())
        }
        Commands::History { coin } => {
            app.history(coin.as_deref());
            Ok(())
        }
        Commands::Sync => app.sync().await,
        Commands::Watch => app.watch().await,
        Commands::Markets { page, per_page } => app.markets(page, per_page).await,
        Commands::Search { query } => app.search(&query).await,
        Commands::Chart { coin, days } => app.chart(&coin, days).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Track a crypto portfolio against live CoinGecko prices.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML settings file. Missing keys take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the saved portfolio.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a purchase. Without --price the current market price is used.
    Buy {
        /// Coin id (e.g., "bitcoin").
        coin: String,
        quantity: f64,
        #[arg(long)]
        price: Option<f64>,
    },

    /// Record a sale. Without --price the current market price is used.
    Sell {
        coin: String,
        quantity: f64,
        #[arg(long)]
        price: Option<f64>,
    },

    /// Delete every holding and transaction.
    Clear {
        /// Confirm the wipe.
        #[arg(long)]
        yes: bool,
    },

    /// Holdings and totals at the last synced prices.
    Show,

    /// Transaction log, newest first.
    History {
        /// Only transactions for this coin id.
        coin: Option<String>,
    },

    /// Fetch current prices once and revalue the portfolio.
    Sync,

    /// Keep prices synced until Ctrl-C.
    Watch,

    /// Coins by market cap.
    Markets {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },

    /// Find coins by name or symbol.
    Search { query: String },

    /// Daily price history of a coin.
    Chart {
        coin: String,
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => Settings::default(),
    };
    settings.validate()?;
    Ok(settings)
}

// ==============================================================================
// Command Handlers
// ==============================================================================

struct App {
    portfolio: CryptoPortfolio,
    market: Arc<MarketService>,
    settings: Settings,
}

impl App {
    async fn buy(mut self, coin_id: &str, quantity: f64, price: Option<f64>) -> Result<()> {
        let (coin, price) = match price {
            Some(price) => (self.coin_metadata(coin_id).await, price),
            None => {
                let quote = self.live_price(coin_id).await?;
                (Some(quote.coin), quote.price)
            }
        };
        let order = match &coin {
            Some(coin) => BuyOrder::new(&coin.id, &coin.symbol, &coin.name, quantity, price)
                .with_image(&coin.image),
            None => match self.portfolio.holding(coin_id) {
                Some(h) => BuyOrder::new(coin_id, &h.symbol, &h.name, quantity, price)
                    .with_image(&h.image),
                None => BuyOrder::new(coin_id, coin_id, coin_id, quantity, price),
            },
        };
        let symbol = order.symbol.to_uppercase();
        let tx = self.portfolio.buy(order)?;
        println!(
            "Bought {} {symbol} at {} (total {})",
            tx.quantity,
            money(tx.price),
            money(tx.total_amount)
        );
        Ok(())
    }

    async fn sell(mut self, coin_id: &str, quantity: f64, price: Option<f64>) -> Result<()> {
        if self.portfolio.holding(coin_id).is_none() {
            bail!("No holding for {coin_id}");
        }
        let price = match price {
            Some(price) => price,
            None => self.live_price(coin_id).await?.price,
        };
        let receipt = self.portfolio.sell(SellOrder::new(coin_id, quantity, price))?;
        println!(
            "Sold {} {coin_id} at {} (total {}, realized {})",
            receipt.transaction.quantity,
            money(receipt.transaction.price),
            money(receipt.transaction.total_amount),
            signed_money(receipt.realized_profit_loss)
        );
        if receipt.closed {
            println!("Position in {coin_id} closed");
        }
        Ok(())
    }

    /// Current price for recording a trade. Demo data is never used.
    async fn live_price(&self, coin_id: &str) -> Result<Quote> {
        match self.market.live_quote(coin_id).await {
            Ok(quote) => Ok(quote),
            Err(CoreError::RateLimited) => bail!(
                "The API is rate limiting requests, so no live price for {coin_id} is available. \
                 Try again shortly or pass --price"
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Name, symbol and image for a trade with an explicit price. Optional:
    /// the trade goes ahead without them.
    async fn coin_metadata(&self, coin_id: &str) -> Option<Coin> {
        match self.market.coin_details(coin_id).await {
            Ok(coin) => Some(coin),
            Err(e) => {
                tracing::warn!(coin_id, error = %e, "no coin metadata; recording trade without it");
                None
            }
        }
    }

    fn clear(mut self, confirmed: bool) -> Result<()> {
        if !confirmed {
            bail!("Refusing to clear the portfolio without --yes");
        }
        self.portfolio.clear();
        println!("Portfolio cleared");
        Ok(())
    }

    fn history(&self, coin_id: Option<&str>) {
        let transactions: Vec<&Transaction> = match coin_id {
            Some(id) => self.portfolio.state().transactions_for(id),
            None => self.portfolio.transactions().iter().rev().collect(),
        };
        if transactions.is_empty() {
            println!("No transactions");
            return;
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Date", "Type", "Coin", "Quantity", "Price", "Total"]);
        for tx in transactions {
            table.add_row(vec![
                tx.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                tx.kind.to_string(),
                tx.coin_id.clone(),
                tx.quantity.to_string(),
                money(tx.price),
                money(tx.total_amount),
            ]);
        }
        println!("{table}");
    }

    async fn sync(self) -> Result<()> {
        let mut sync = PriceSync::from_settings(self.market.clone(), &self.settings);
        let portfolio = self.portfolio.into_shared();
        match sync.sync_once(&portfolio).await? {
            SyncOutcome::NothingTracked => println!("Nothing to sync"),
            SyncOutcome::NoPrices => println!("No prices returned for held coins"),
            SyncOutcome::Unchanged => println!("Prices unchanged"),
            SyncOutcome::Applied { updated } => println!("Updated {updated} holding(s)"),
        }
        show_portfolio(&*portfolio.lock().await);
        Ok(())
    }

    async fn watch(self) -> Result<()> {
        let sync = PriceSync::from_settings(self.market.clone(), &self.settings);
        let portfolio = self.portfolio.into_shared();
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        println!(
            "Syncing every {}s, Ctrl-C to stop",
            self.settings.sync_interval_secs
        );
        let handle = tokio::spawn(sync.run(portfolio.clone(), shutdown_rx));

        tokio::signal::ctrl_c().await?;
        shutdown_tx.send(true)?;
        handle.await?;

        let state = portfolio.lock().await.state().clone();
        println!(
            "Value {}  P/L {} ({})",
            money(state.total_value),
            signed_money(state.total_profit_loss),
            percent(state.total_profit_loss_percentage)
        );
        Ok(())
    }

    async fn markets(&self, page: u32, per_page: u32) -> Result<()> {
        let query = self.market.markets_query().page(page, per_page);
        let coins = self.market.coins_markets(&query).await?;

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["#", "Coin", "Id", "Price", "24h", "Market cap"]);
        for coin in &coins {
            table.add_row(market_row(coin));
        }
        println!("{table}");
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<()> {
        let result = self.market.search(query).await?;
        if result.coins.is_empty() {
            println!("No matches (queries need at least 3 characters)");
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Rank", "Name", "Symbol", "Id"]);
        for coin in result.coins {
            table.add_row(vec![
                optional(coin.market_cap_rank.map(|r| r.to_string())),
                coin.name,
                coin.symbol,
                coin.id,
            ]);
        }
        println!("{table}");
        Ok(())
    }

    async fn chart(&self, coin_id: &str, days: u32) -> Result<()> {
        let chart = self.market.market_chart(coin_id, days).await?;
        let (Some(first), Some(last)) = (chart.prices.first(), chart.prices.last()) else {
            println!("No price history for {coin_id}");
            return Ok(());
        };

        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["Date", "Price"]);
        for point in &chart.prices {
            table.add_row(vec![
                optional(point.timestamp().map(|t| t.format("%Y-%m-%d").to_string())),
                money(point.price),
            ]);
        }
        println!("{table}");

        let low = chart.prices.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
        let high = chart.prices.iter().map(|p| p.price).fold(f64::NEG_INFINITY, f64::max);
        let change = if first.price > 0.0 {
            (last.price - first.price) / first.price * 100.0
        } else {
            0.0
        };
        println!(
            "Low {}  High {}  Change {}",
            money(low),
            money(high),
            percent(change)
        );
        Ok(())
    }
}

// ==============================================================================
// Formatting
// ==============================================================================

fn show_portfolio(portfolio: &CryptoPortfolio) {
    let state = portfolio.state();
    if state.holdings.is_empty() {
        println!("No holdings");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Coin", "Quantity", "Avg cost", "Price", "Value", "P/L", "P/L %", "Alloc",
    ]);
    for h in portfolio.holdings() {
        table.add_row(vec![
            format!("{} ({})", h.name, h.symbol.to_uppercase()),
            h.quantity.to_string(),
            money(h.average_buy_price),
            money(h.current_price),
            money(h.current_value),
            signed_money(h.profit_loss),
            percent(h.profit_loss_percentage),
            format!("{:.1}%", state.allocation(&h.coin_id)),
        ]);
    }
    println!("{table}");
    println!(
        "Value {}  Invested {}  P/L {} ({})",
        money(state.total_value),
        money(state.total_invested),
        signed_money(state.total_profit_loss),
        percent(state.total_profit_loss_percentage)
    );
}

fn market_row(coin: &Coin) -> Vec<String> {
    vec![
        optional(coin.market_cap_rank.map(|r| r.to_string())),
        format!("{} ({})", coin.name, coin.symbol.to_uppercase()),
        coin.id.clone(),
        optional(coin.current_price.map(money)),
        optional(coin.price_change_percentage_24h.map(percent)),
        optional(coin.market_cap.map(|c| format!("{c:.0}"))),
    ]
}

/// Sub-dollar prices keep more decimals.
fn money(value: f64) -> String {
    if value.abs() < 1.0 && value != 0.0 {
        format!("{value:.6}")
    } else {
        format!("{value:.2}")
    }
}

fn signed_money(value: f64) -> String {
    if value >= 0.0 {
        format!("+{}", money(value))
    } else {
        money(value)
    }
}

fn percent(value: f64) -> String {
    format!("{value:+.2}%")
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}
