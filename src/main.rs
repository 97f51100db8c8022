//! ResearchFlow - search history cache with cloud reconciliation
//!
#![doc = "ResearchFlow - search history CLI"]
#![doc = "Main entry point for the ResearchFlow command-line tool."]

use anyhow::Result;

use researchflow::cli::{Cli, Commands};
use researchflow::commands::{self, record::RecordArgs, AppContext};
use researchflow::config::Config;
use researchflow::history::{LifecycleHub, LifecycleSignal};
use researchflow::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_logging(cli.verbose, cli.json_logs)?;

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    let ctx = AppContext::open(config)?;

    // Ctrl-C and normal shutdown both flush pending writes.
    let lifecycle = LifecycleHub::default();
    ctx.coalescer.attach_lifecycle(lifecycle.subscribe());

    let result = tokio::select! {
        result = run(&ctx, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, flushing pending history writes");
            lifecycle.emit(LifecycleSignal::Unload);
            Ok(())
        }
    };

    let flushed = ctx.coalescer.flush_all();
    tracing::debug!(flushed, "Shutdown complete");
    result
}

async fn run(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(ctx, command).await
        }
        Commands::Record {
            query,
            user,
            workspace,
            summary,
            key_points,
            questions,
        } => {
            tracing::debug!(query = %query, "Recording search");
            let args = RecordArgs {
                query,
                user,
                workspace,
                summary,
                key_points,
                questions,
            };
            commands::record::run_record(ctx, args).await
        }
        Commands::Sync {
            user,
            workspaces,
            workspaces_file,
        } => {
            commands::sync::run_sync(ctx, &user, &workspaces, workspaces_file.as_deref()).await
        }
        Commands::Migrate {
            user,
            workspaces,
            workspaces_file,
        } => {
            tracing::info!(user = %user, "Starting migration");
            commands::sync::run_migrate(ctx, &user, &workspaces, workspaces_file.as_deref())
                .await
        }
    }
}
