use clap::Parser;
use rulerunner::app::Application;
use rulerunner::cli::Cli;
use rulerunner::{NAME, VERSION};
use std::process;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    init_logging(cli.debug);
    log::debug!("{} v{}", NAME, VERSION);

    let mut app = match Application::new(cli.to_config()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize {}: {:#}", NAME, e);
            process::exit(1);
        }
    };

    if let Err(e) = app.bootstrap(cli.bootstrap.as_deref()).await {
        eprintln!("Failed to bootstrap: {:#}", e);
        process::exit(1);
    }

    match app.run().await {
        Ok(outcome) => {
            if outcome.interrupted {
                eprintln!("Shutdown signal received, run stopped early");
            }
            process::exit(outcome.exit_code());
        }
        Err(e) => {
            eprintln!("Run failed: {:#}", e);
            process::exit(1);
        }
    }
}

/// Initialize logging; progress output goes to stdout, so only warnings by default
fn init_logging(debug: bool) {
    let log_level = if debug {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string())
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&log_level)).init();
}
