use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use signalbot::api::{BinanceFuturesClient, ExchangeGateway};
use signalbot::config::{load_settings, Settings};
use signalbot::db::PostgresSignalStore;
use signalbot::execution::{LifecycleController, PassSummary};
use signalbot::persistence::RedisInstrumentCache;
use signalbot::store::{InstrumentStore, MemoryStore, SignalStore};
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser)]
#[command(name = "signalbot", about = "Futures signal executor")]
struct Cli {
    /// Path to a TOML settings file
    #[arg(long, short, global = true, default_value = "config/settings.toml")]
    config: String,

    /// Keep signals and instruments in memory instead of Postgres/Redis
    #[arg(long, global = true)]
    memory_store: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduled passes until Ctrl+C (default)
    Run,
    /// Store a new signal
    AcceptSignal {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        side: String,
        #[arg(long)]
        price: Option<f64>,
    },
    /// Flatten every position and settle OPEN/WAITING signals
    CloseAll,
    /// Fetch and store the exchange instrument rules
    RefreshInstruments,
    /// Run a single pass once
    Pass {
        #[arg(value_enum)]
        pass: Pass,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Pass {
    Sizing,
    Entry,
    Close,
}

impl Pass {
    fn label(&self) -> &'static str {
        match self {
            Pass::Sizing => "📏 [SIZING]",
            Pass::Entry => "🎯 [ENTRY]",
            Pass::Close => "🔒 [CLOSE]",
        }
    }

    async fn run(
        &self,
        controller: &LifecycleController,
    ) -> Result<PassSummary, signalbot::error::LifecycleError> {
        let now = Utc::now();
        match self {
            Pass::Sizing => controller.sizing_pass(now).await,
            Pass::Entry => controller.entry_pass(now).await,
            Pass::Close => controller.close_pass(now).await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let settings = load_settings(Some(&cli.config)).context("failed to load settings")?;
    let controller = Arc::new(build_controller(&settings, cli.memory_store).await?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(controller, &settings).await,
        Command::AcceptSignal {
            symbol,
            side,
            price,
        } => {
            let signal = controller.accept_signal(&symbol, &side, price).await?;
            println!("{}", signal.id);
            Ok(())
        }
        Command::CloseAll => {
            let report = controller.force_close_all().await?;
            for failure in &report.failures {
                tracing::error!("  {}", failure);
            }
            if report.failures.is_empty() {
                Ok(())
            } else {
                anyhow::bail!("force close finished with {} failures", report.failures.len())
            }
        }
        Command::RefreshInstruments => {
            controller.refresh_instruments().await?;
            Ok(())
        }
        Command::Pass { pass } => {
            let summary = pass.run(&controller).await?;
            log_summary(pass, &summary);
            // Legs run on the protection worker; wait for them before exiting
            for leg in summary.legs {
                let (kind, signal_id) = (leg.kind, leg.signal_id);
                tracing::info!("  {} leg for {}: {:?}", kind, signal_id, leg.outcome().await);
            }
            Ok(())
        }
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("signalbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn build_controller(
    settings: &Settings,
    memory_store: bool,
) -> anyhow::Result<LifecycleController> {
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(
        BinanceFuturesClient::new(&settings.exchange).context("failed to build exchange client")?,
    );

    let (signals, instruments): (Arc<dyn SignalStore>, Arc<dyn InstrumentStore>) = if memory_store
    {
        tracing::warn!("Using in-memory storage, signals are lost on exit");
        let store = Arc::new(MemoryStore::new());
        let signals: Arc<dyn SignalStore> = store.clone();
        let instruments: Arc<dyn InstrumentStore> = store;
        (signals, instruments)
    } else {
        let postgres = PostgresSignalStore::new(&settings.storage.database_url)
            .await
            .context("failed to connect to Postgres")?;
        for (status, count) in postgres.status_counts().await? {
            tracing::info!("  {}: {}", status, count);
        }
        let redis = RedisInstrumentCache::new(&settings.storage.redis_url)
            .await
            .context("failed to connect to Redis")?;
        let signals: Arc<dyn SignalStore> = Arc::new(postgres);
        let instruments: Arc<dyn InstrumentStore> = Arc::new(redis);
        (signals, instruments)
    };

    Ok(LifecycleController::new(
        gateway,
        signals,
        instruments,
        settings,
    )?)
}

// ============================================================================
// Scheduler
// ============================================================================

async fn run(controller: Arc<LifecycleController>, settings: &Settings) -> anyhow::Result<()> {
    tracing::info!("🚀 signalbot starting");

    let budget = &settings.budget;
    let schedule = &settings.schedule;
    tracing::info!("\n📊 Configuration:");
    match budget.max_capital {
        Some(capital) => tracing::info!("  Max Capital: ${:.2}", capital),
        None => tracing::info!("  Max Capital: live USDT balance"),
    }
    match budget.max_pairs {
        Some(pairs) => tracing::info!("  Max Pairs: {}", pairs),
        None => tracing::info!("  Max Pairs: in-flight signal count"),
    }
    tracing::info!("  Leverage: {}x", budget.leverage);
    tracing::info!(
        "  Take Profit: {}% / Stop Loss: {}%",
        budget.take_profit_rate * 100.0,
        budget.stop_loss_rate * 100.0
    );
    if let Some(rate) = budget.trailing_callback_rate {
        tracing::info!("  Trailing Callback: {}%", rate);
    }
    tracing::info!("  Order TTL: {}s", budget.order_ttl_secs);

    tracing::info!("📚 Loading instrument rules...");
    if let Err(e) = controller.refresh_instruments().await {
        tracing::error!("Initial instrument refresh failed: {}", e);
    }

    tracing::info!("\n🔄 Spawning independent loops...");

    let sizing_task = spawn_pass_loop(
        controller.clone(),
        Pass::Sizing,
        Duration::from_secs(schedule.sizing_interval_secs),
    );
    let entry_task = spawn_pass_loop(
        controller.clone(),
        Pass::Entry,
        Duration::from_secs(schedule.entry_interval_secs),
    );
    let close_task = spawn_pass_loop(
        controller.clone(),
        Pass::Close,
        Duration::from_secs(schedule.close_interval_secs),
    );
    let refresh_task = {
        let controller = controller.clone();
        let hour = schedule.instrument_refresh_hour_utc;
        tokio::spawn(async move {
            instrument_refresh_loop(controller, hour).await;
        })
    };

    tracing::info!("✅ All loops spawned successfully");
    tracing::info!("  📏 Sizing: every {}s", schedule.sizing_interval_secs);
    tracing::info!("  🎯 Entry: every {}s", schedule.entry_interval_secs);
    tracing::info!("  🔒 Close/TTL: every {}s", schedule.close_interval_secs);
    tracing::info!(
        "  📚 Instruments: daily at {:02}:00 UTC",
        schedule.instrument_refresh_hour_utc
    );
    tracing::info!("\nPress Ctrl+C to stop...\n");

    // Wait for Ctrl+C or task failure
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        result = sizing_task => {
            tracing::error!("Sizing loop exited: {:?}", result);
        }
        result = entry_task => {
            tracing::error!("Entry loop exited: {:?}", result);
        }
        result = close_task => {
            tracing::error!("Close loop exited: {:?}", result);
        }
        result = refresh_task => {
            tracing::error!("Instrument refresh loop exited: {:?}", result);
        }
    }

    tracing::info!("👋 signalbot stopped");
    Ok(())
}

fn spawn_pass_loop(
    controller: Arc<LifecycleController>,
    pass: Pass,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now(), period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            tracing::debug!("{} Tick at {}", pass.label(), Utc::now().format("%H:%M:%S"));

            match pass.run(&controller).await {
                Ok(summary) => log_summary(pass, &summary),
                Err(e) => tracing::error!("{} Pass failed: {}", pass.label(), e),
            }
        }
    })
}

fn log_summary(pass: Pass, summary: &PassSummary) {
    if summary.examined == 0 {
        return;
    }
    tracing::info!(
        "{} {} signals examined, {} transitions, {} protective legs queued",
        pass.label(),
        summary.examined,
        summary.transitions.len(),
        summary.legs.len()
    );
}

async fn instrument_refresh_loop(controller: Arc<LifecycleController>, hour: u32) {
    loop {
        let now = Utc::now();
        let next = next_daily_run(now, hour);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!("📚 Next instrument refresh at {}", next.format("%Y-%m-%d %H:%M UTC"));

        tokio::time::sleep(wait).await;

        if let Err(e) = controller.refresh_instruments().await {
            tracing::error!("Instrument refresh failed: {}", e);
        }
    }
}

/// Next `hour:00` UTC strictly after `now`
fn next_daily_run(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now);

    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}
