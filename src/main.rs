use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use chat_operator::chatbot::{ChatbotConfig, create_chatbot};
use chat_operator::cli::{Cli, Command};
use chat_operator::config::OperatorConfig;
use chat_operator::error::ConfigError;
use chat_operator::operator::{
    Clock, Operator, OperatorDeps, RunOutcome, STARTUP_FAILURE_EXIT_CODE, TokioClock,
};
use chat_operator::platform::{PlatformConfig, load_platform_config, load_platform_file};
use chat_operator::surface::{WebDriverConfig, WebSurface, connect};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let guard = init_tracing(cli.log.as_deref());

    let mut config = OperatorConfig::from_env();
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }

    let code = match cli.command {
        Command::Run {
            platform,
            manual_wait,
        } => match run(&platform, manual_wait, config).await {
            Ok(code) => code,
            Err(e) => {
                error!("Startup failed: {e:#}");
                eprintln!("❌ {e:#}");
                STARTUP_FAILURE_EXIT_CODE
            }
        },
        Command::Validate { target, verbose } => validate(&target, verbose, &config.cache_dir),
    };

    // Flush the file writer before exiting.
    drop(guard);
    std::process::exit(code);
}

/// Console logging from `--log` / `RUST_LOG`, plus a daily debug log file
/// when `OPERATOR_LOG_DIR` is set.
fn init_tracing(level: Option<&str>) -> Option<WorkerGuard> {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let console_filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (file, guard) = match std::env::var("OPERATOR_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let log_dir = PathBuf::from(dir);
            std::fs::create_dir_all(&log_dir).ok();
            let appender = tracing_appender::rolling::daily(&log_dir, "chat-operator.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry().with(console).with(file).init();
    guard
}

async fn run(
    platform_name: &str,
    manual_wait: Option<u64>,
    config: OperatorConfig,
) -> anyhow::Result<i32> {
    let platform = match load_platform_config(platform_name, &config.cache_dir) {
        Ok(platform) => platform,
        Err(e @ ConfigError::PlatformNotConfigured { .. }) => {
            error!("{e}");
            eprintln!("Run the analyzer for '{platform_name}' first to generate its configuration.");
            return Ok(1);
        }
        Err(e) => return Err(e).context("Invalid platform configuration"),
    };

    let mut config = config.apply_platform(&platform);
    if let Some(secs) = manual_wait {
        config.manual_login_wait = Duration::from_secs(secs);
    }
    config.validate()?;
    config.check_platform_waits(&platform)?;

    eprintln!("🤖 Chat Operator v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Platform: {} ({})", platform.platform_name, platform.url);
    eprintln!("   Poll interval: {}s", config.poll_interval.as_secs());
    eprintln!("   Message cap: {}", config.message_cap);
    eprintln!("   Press Ctrl+C to stop.\n");

    let chatbot = create_chatbot(ChatbotConfig::from_env())?;

    let driver_config = WebDriverConfig::from_env();
    let client = connect(&driver_config)
        .await
        .with_context(|| format!("Failed to connect to WebDriver at {}", driver_config.url))?;

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let platform_label = platform.platform_name.clone();
    let surface = Arc::new(WebSurface::new(client, platform, clock.clone()));

    let deps = OperatorDeps {
        authenticator: surface.clone(),
        poller: surface.clone(),
        reader: surface.clone(),
        chatbot,
        sender: surface.clone(),
        clock,
    };
    let mut operator = Operator::new(platform_label, config, deps)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, shutting down");
                cancel.cancel();
            }
        }
    });

    let outcome = operator.run(&cancel).await;
    match &outcome {
        RunOutcome::Cancelled => eprintln!("Operator stopped."),
        RunOutcome::RecalibrationRequired(report) => eprintln!("❌ {report}"),
        RunOutcome::AuthenticationFailed(e) => {
            eprintln!("❌ {e}. Check the browser window and try again.")
        }
    }

    if let Err(e) = surface.close().await {
        warn!(error = %e, "Failed to close WebDriver session");
    }

    Ok(outcome.exit_code())
}

/// Load a platform configuration by name or path and print it.
fn validate(target: &str, verbose: bool, cache_dir: &Path) -> i32 {
    let path = Path::new(target);
    let loaded = if path.is_file() || target.ends_with(".json") {
        load_platform_file(path)
    } else {
        load_platform_config(target, cache_dir)
    };

    match loaded {
        Ok(config) => {
            print_platform(&config, verbose);
            println!("\n✅ Configuration is valid");
            0
        }
        Err(e) => {
            eprintln!("❌ {e}");
            1
        }
    }
}

fn print_platform(config: &PlatformConfig, verbose: bool) {
    println!("Platform: {}", config.platform_name);
    println!("URL:      {}", config.url);
    if let Some(updated) = &config.last_updated {
        println!("Updated:  {updated}");
    }

    println!("\nSelectors:");
    for (name, value) in config.selectors.entries() {
        println!("  {name:<20} {}", value.unwrap_or("(not set)"));
    }

    if verbose {
        let t = &config.wait_timeouts;
        println!("\nWait timeouts:");
        println!("  page_load            {}s", t.page_load);
        println!("  element_visible      {}s", t.element_visible);
        println!("  message_send         {}s", t.message_send);

        println!("\nOverrides:");
        match config.poll_interval_secs {
            Some(secs) => println!("  poll_interval_secs   {secs}"),
            None => println!("  poll_interval_secs   (default)"),
        }
        match config.message_cap {
            Some(cap) => println!("  message_cap          {cap}"),
            None => println!("  message_cap          (default)"),
        }
    }
}
