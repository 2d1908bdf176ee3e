use crate::config::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging system from config, with CLI verbosity taking
/// precedence. `RUST_LOG` wins over both.
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<()> {
    let level = match cli_verbose {
        0 => config.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("civic={}", level)),
    );

    let registry = tracing_subscriber::registry().with(filter);
    match config.format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_current_span(true))
                .init();
        }
        _ => {
            registry.with(fmt::layer()).init();
        }
    }
    Ok(())
}
