use anyhow::Result;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use dcf_terminal::models::Config;
use dcf_terminal::ui;

fn main() -> Result<()> {
    // Initialize logging - suppress most logs so they don't tear the TUI
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::ERROR)
        .with_env_filter("dcf_terminal=error")
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            std::process::exit(1);
        }
    };

    match ui::run_app(config) {
        Ok(_) => {
            println!("Thanks for using the DCF Valuation Terminal!");
        }
        Err(e) => {
            eprintln!("❌ TUI Error: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
