//! gate-resilience-sim
//!
//! Feeds synthetic failures through a resilience context so operators can
//! check alert thresholds, recovery wiring and the report layout against a
//! given configuration without touching production traffic.

use clap::{Parser, Subcommand};
use gate_resilience::{
    logging::{init_logging, LogConfig},
    ErrorCategory, ErrorContext, ErrorRecord, ResilienceConfig, ResilienceContext,
    ResilienceError, Result,
};
use humantime_serde::re::humantime;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "gate-resilience-sim")]
#[command(about = "Replay synthetic failures through the resilience subsystem")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file (defaults to RESILIENCE_* environment variables)
    #[arg(long, short, global = true, env = "RESILIENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report a burst of errors of one category, then evaluate alerts
    Burst {
        /// Category name, e.g. connection_transport or persistence-query
        #[arg(long, short = 'k')]
        category: ErrorCategory,

        /// Number of errors to report
        #[arg(long, short = 'n', default_value = "11")]
        count: u32,

        /// Component (socket/gate) id attached to each error
        #[arg(long)]
        component: Option<String>,

        /// Tenant scope attached to each error
        #[arg(long)]
        scope: Option<String>,

        /// Let the recovery loop run this long before printing
        #[arg(long, value_parser = humantime::parse_duration)]
        wait: Option<Duration>,
    },
    /// Report one error of every category and print the report
    Mixed {
        /// Rounds through the category list
        #[arg(long, short = 'r', default_value = "1")]
        rounds: u32,
    },
    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<ResilienceConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                ResilienceError::config(format!("Cannot read {}: {}", path.display(), e))
            })?;
            ResilienceConfig::from_toml_str(&raw)
        }
        None => ResilienceConfig::from_env(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.debug {
        log_config.level = Level::DEBUG;
    }
    init_logging(log_config)?;

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Config => {
            let rendered = if cli.json {
                serde_json::to_string_pretty(&config)?
            } else {
                toml::to_string_pretty(&config)
                    .map_err(|e| ResilienceError::config(format!("Cannot render config: {}", e)))?
            };
            println!("{rendered}");
        }
        Command::Burst {
            category,
            count,
            component,
            scope,
            wait,
        } => {
            let ctx = ResilienceContext::new(config);
            ctx.start_monitoring(None).await?;

            let mut extra = ErrorContext::new().with_metadata("source", "simulator");
            if let Some(component) = component {
                extra = extra.with_component_id(component);
            }
            if let Some(scope) = scope {
                extra = extra.with_scope_key(scope);
            }

            info!(%category, count, "Reporting synthetic burst");
            for i in 0..count {
                ctx.report_error(
                    ErrorRecord::new(category, format!("synthetic {} #{}", category, i + 1)),
                    Some(extra.clone()),
                )
                .await;
            }

            let fired = ctx.monitor().evaluate_alerts().await;
            if let Some(wait) = wait {
                tokio::time::sleep(wait).await;
            }

            print_outcome(&ctx, &fired, cli.json).await?;
            ctx.shutdown().await;
        }
        Command::Mixed { rounds } => {
            let ctx = ResilienceContext::new(config);
            ctx.start_monitoring(None).await?;

            for round in 0..rounds {
                for category in ErrorCategory::ALL {
                    ctx.report_error(
                        ErrorRecord::new(category, format!("synthetic {} round {}", category, round + 1)),
                        Some(ErrorContext::new().with_correlation_id(format!("sim-{round}"))),
                    )
                    .await;
                }
            }

            let fired = ctx.monitor().evaluate_alerts().await;
            print_outcome(&ctx, &fired, cli.json).await?;
            ctx.shutdown().await;
        }
    }

    Ok(())
}

async fn print_outcome(
    ctx: &ResilienceContext,
    fired: &[gate_resilience::monitoring::FiredAlert],
    json: bool,
) -> Result<()> {
    if json {
        let summary = serde_json::json!({
            "health": ctx.health().await,
            "alerts": fired,
            "error_stats": ctx
                .error_stats()
                .await
                .into_iter()
                .map(|(category, stats)| (category.as_str().to_string(), stats))
                .collect::<std::collections::BTreeMap<_, _>>(),
            "recovery": ctx.recovery_stats().await,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", ctx.report().await);
    if fired.is_empty() {
        println!("No alerts fired");
    }
    for alert in fired {
        println!("ALERT [{}] {}: {}", alert.severity, alert.rule_name, alert.message);
    }

    let recovery = ctx.recovery_stats().await;
    println!(
        "Recovery queue: {} pending, processing: {}, strategies: {}",
        recovery.queue_length,
        recovery.is_processing,
        recovery.strategies.join(", ")
    );
    Ok(())
}
