use clap::Parser;
use pikpakfs::{CliArgs, Config};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match Config::load_with_cli(&cli).and_then(|c| {
        c.validate()?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging.level);

    match pikpakfs::run_blocking(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Builds the global subscriber from the resolved `logging.level` (config file, env, or
/// `-v`/`-vv` CLI overrides, per the layered precedence in `Config::load_with_cli`).
fn init_tracing(level: &str) {
    let level: tracing::Level = level.parse().unwrap_or(tracing::Level::INFO);
    let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
