use anyhow::{Context, Result};
use shortlets::{config::Config, geocode::MapboxGeocoder, pipeline};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shortlets=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let config = Config::from_env().context("reading configuration")?;
    info!(
        source = %config.source_url,
        data_dir = %config.data_dir.display(),
        delay_ms = config.geocode.delay.as_millis() as u64,
        concurrency = config.geocode.concurrency,
        "configured"
    );

    let geocoder = MapboxGeocoder::new(&config.geocode)?;
    if !geocoder.has_credential() {
        warn!("MAPBOX_ACCESS_TOKEN is not set; coordinates will be left empty");
    }

    // ─── 3) fetch → parse → geocode → write ──────────────────────────
    match pipeline::run(&config, Arc::new(geocoder)).await {
        Ok(summary) => {
            info!(
                source = %summary.fetch.final_url,
                rows = summary.rows,
                geocoded = summary.hits,
                "saved {}",
                summary.output.display()
            );
            Ok(())
        }
        Err(e) => {
            let e = anyhow::Error::from(e);
            error!("data processing failed: {:#}", e);
            Err(e)
        }
    }
}
