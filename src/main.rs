use scr_driver::{client, Controller, DriverConfig, Recorder};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = DriverConfig::from_env()?;

    let recorder = if cfg.telemetry_enabled() {
        Recorder::csv(&cfg.telemetry_path)
    } else {
        tracing::info!("telemetry off");
        Recorder::disabled()
    };
    let mut controller = Controller::new(cfg.stage, cfg.policy.clone(), recorder);

    let summary = client::run(&cfg, &mut controller).await?;
    tracing::info!(
        "session over: episodes={} steps={} server_shutdown={}",
        summary.episodes, summary.steps, summary.server_shutdown
    );
    Ok(())
}
