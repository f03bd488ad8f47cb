// src/main.rs
use box_bundler::api;
use box_bundler::config::{self, AppConfig};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let dotenv_result = dotenvy::dotenv();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config::log_level_from_env())
        .with_target(false)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("⚠️ Could not install log subscriber: {}", err);
    }

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!(error = %err, "Could not load .env");
        }
    }

    let app_config = AppConfig::from_env();
    let grouping = app_config.grouping.grouping_config();
    info!(
        tolerance = grouping.tolerance,
        bundle_weight_cap = grouping.bundle_weight_cap,
        batch_weight_cap = grouping.batch_weight_cap,
        oversize_policy = ?grouping.oversize_policy,
        max_units = grouping.max_units,
        "🚀 Grouping service starting"
    );

    api::start_api_server(app_config.api, app_config.grouping).await;
}
