use anyhow::Context;
use quota_router::{
    cli::config_path_from_args, config::Config, logging::init_tracing,
    observability::metrics::start_prometheus_exporter, server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path_from_args()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let _logging = init_tracing(&config.logging).context("failed to initialize logging")?;

    if config.metrics.enabled {
        start_prometheus_exporter(config.metrics.listen_addr).with_context(|| {
            format!(
                "failed to start metrics exporter on {}",
                config.metrics.listen_addr
            )
        })?;
    }

    server::run(config).await
}
