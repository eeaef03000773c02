mod app;
mod cli;
mod config;
mod console;
mod presenter;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use app::App;
use cli::Cli;
use config::AppConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply_cli(&cli);

    App::new(config).run()
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
