use crm_service::{config::Config, services::init_metrics, Application};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().expect("Failed to load configuration");

    init_tracing(
        &config.service_name,
        &std::env::var("RUST_LOG").unwrap_or_else(|_| "info,crm_service=debug".into()),
    );
    init_metrics();

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
