//! mender CLI entry point.

use clap::Parser;

use mender::cli::commands;
use mender::cli::{handle_error, Cli, CommandContext, Commands};
use mender::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let ctx = match CommandContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(err) => handle_error(err, json),
    };
    let config = match ctx.load_config() {
        Ok(config) => config,
        Err(err) => handle_error(err, json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from_settings(&config.logging, &ctx.root)) {
        Ok(logger) => logger,
        Err(err) => handle_error(err.context("Failed to initialize logging"), json),
    };

    let result = match cli.command {
        Commands::Fix(args) => commands::fix::execute(args, config, &ctx).await,
        Commands::Features(args) => commands::features::execute(args, config, &ctx).await,
        Commands::Loop(args) => commands::cycle::execute(args, config, &ctx).await,
        Commands::Issues(args) => commands::issues::execute(args, config, &ctx).await,
        Commands::Config(args) => commands::config::execute(args, config, &ctx).await,
    };

    if let Err(err) = result {
        handle_error(err, json);
    }
}
