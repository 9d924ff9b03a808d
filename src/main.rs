use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meterpay_core::cli::{self, Cli, Commands};
use meterpay_core::config::Config;
use meterpay_core::BillingError;

fn init_tracing() {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // logs go to stderr so command output stays pipeable
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing();

    let result = match &cli.command {
        Commands::Quote { amount } => cli::handle_quote(&config, &cli.source, amount).await,
        Commands::Buy {
            amount,
            device,
            method,
        } => cli::handle_buy(&config, &cli.source, amount, device, method).await,
        Commands::Summary {
            filter,
            page,
            page_size,
        } => cli::handle_summary(&config, &cli.source, filter, *page, *page_size).await,
        Commands::Usage {
            filter,
            granularity,
        } => cli::handle_usage(&config, &cli.source, filter, granularity).await,
        Commands::Export {
            kind,
            filter,
            id,
            granularity,
            output,
        } => {
            cli::handle_export(
                &config,
                &cli.source,
                *kind,
                filter,
                id.as_deref(),
                granularity,
                output.as_deref(),
            )
            .await
        }
        Commands::Chat { meters } => cli::handle_chat(&config, &cli.source, meters).await,
        Commands::Config => cli::handle_config_validate(&config),
    };

    if let Err(e) = &result {
        match e.downcast_ref::<BillingError>() {
            Some(billing) => tracing::error!(kind = billing.kind(), retryable = billing.is_retryable(), "{}", billing),
            None => tracing::error!("{:#}", e),
        }
    }

    result
}
