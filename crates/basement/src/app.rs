//! Process wiring.
//!
//! Start order is configuration, logging, telemetry providers, middleware
//! chain, listener. Stop order is the reverse: the listener drains first so
//! in-flight requests can still emit telemetry, then the providers flush.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use basement_config::{ConfigLoader, Configuration, LogFormat, Overrides};
use basement_middleware::MiddlewareChain;
use basement_server::{lifecycle, livez_handler, ListenerConfig, Router, Server, ServerError, LIVEZ_PATH};
use basement_telemetry::{init_logging, init_providers, LogConfig, Observability, ProviderOptions};

/// Prefix for `BASEMENT__SECTION__KEY` variables.
pub const ENV_PREFIX: &str = "BASEMENT";

/// Bound on flushing and closing the telemetry providers at exit.
pub const TELEMETRY_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Loads and validates the configuration.
///
/// Layers: defaults, `config_file`, `.env`, prefixed environment, standard
/// OpenTelemetry variables, `overrides`.
pub fn load_configuration(
    config_file: Option<&Path>,
    overrides: Overrides,
) -> anyhow::Result<Configuration> {
    let mut loader = ConfigLoader::new().with_defaults();
    if let Some(path) = config_file {
        loader = loader
            .with_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }

    let config = loader
        .with_dotenv()?
        .with_env_prefix(ENV_PREFIX)
        .with_standard_env()
        .with_overrides(overrides)
        .load()
        .context("invalid configuration")?;
    Ok(config)
}

/// The logging setup for `config`.
pub fn log_config(config: &Configuration) -> LogConfig {
    LogConfig {
        level: config.logging.level.clone(),
        json_format: config.logging.format == LogFormat::Json,
        include_target: true,
    }
}

/// The provider setup for `config`.
pub fn provider_options(config: &Configuration) -> ProviderOptions {
    let options = ProviderOptions::new(
        !config.telemetry.disabled,
        config.telemetry.service_name.clone(),
    );
    match &config.telemetry.collector_endpoint {
        Some(endpoint) => options.with_collector_endpoint(endpoint.clone()),
        None => options,
    }
}

/// Builds the server: `/livez` behind the standard chain.
pub fn build_server(config: &Configuration, observability: &Observability) -> anyhow::Result<Server> {
    let listener = ListenerConfig::from_config(&config.server)?;
    let router = Router::new().route_shared(LIVEZ_PATH, livez_handler(observability));
    let chain = MiddlewareChain::standard(observability, &config.cors);

    let server = Server::builder()
        .config(listener)
        .router(router)
        .chain(chain)
        .build()?;
    Ok(server)
}

/// Runs the service until `interrupt` completes or the listener fails.
pub async fn serve<F>(config: Configuration, interrupt: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let logging = init_logging(&log_config(&config))?;
    tracing::info!(
        version = crate::VERSION,
        port = config.server.port,
        tls = config.server.tls_enabled(),
        telemetry = !config.telemetry.disabled,
        "starting basement"
    );

    let (observability, telemetry) = init_providers(&provider_options(&config))
        .await
        .context("initializing telemetry")?;
    observability.install_global();
    if let Some(provider) = observability.logger_provider() {
        logging.attach_exporter(provider)?;
    }

    let served = match build_server(&config, &observability) {
        Ok(server) => run_until_stopped(server, interrupt).await,
        Err(e) => Err(e),
    };

    if let Err(e) = telemetry.shutdown(TELEMETRY_SHUTDOWN_DEADLINE).await {
        tracing::warn!(error = %e, "telemetry shutdown incomplete");
    }
    // The providers are closed; keep later events on stdout only.
    let _ = logging.detach_exporter();

    served
}

async fn run_until_stopped<F>(server: Server, interrupt: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    match lifecycle::run(server, interrupt).await {
        Ok(()) => Ok(()),
        // Logged by the lifecycle; the process still exits normally.
        Err(ServerError::ShutdownTimeout { .. }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
