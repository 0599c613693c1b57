//! Log output and optional OTLP span export.
//!
//! Spans go to an OTLP/gRPC collector only when `OTEL_EXPORTER_OTLP_ENDPOINT`
//! is set; otherwise the service just logs.

use anyhow::Result;
use once_cell::sync::OnceCell;
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{SdkTracerProvider, Tracer},
    Resource,
};
use std::{env, time::Duration};
use tonic::transport::ClientTlsConfig;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::GIT_COMMIT_HASH;

const ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

// Dependencies that are noisy at the service's own level.
const QUIET_TARGETS: [&str; 4] = [
    "hyper=error",
    "tokio=error",
    "sqlx=warn",
    "opentelemetry_sdk=warn",
];

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Where spans are shipped.
#[derive(Debug, PartialEq, Eq)]
struct Collector {
    endpoint: String,
    tls_domain: Option<String>,
}

impl Collector {
    /// A bare `host:port` is taken to mean TLS.
    fn from_endpoint(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_end_matches('/');
        if raw.is_empty() {
            return None;
        }

        let endpoint = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };
        let tls_domain = endpoint
            .strip_prefix("https://")
            .and_then(|rest| rest.split(['/', ':']).next())
            .filter(|host| !host.is_empty())
            .map(str::to_string);

        Some(Self {
            endpoint,
            tls_domain,
        })
    }

    fn from_env() -> Option<Self> {
        env::var(ENDPOINT_ENV)
            .ok()
            .and_then(|raw| Self::from_endpoint(&raw))
    }

    fn tracer(&self) -> Result<Tracer> {
        let mut builder = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&self.endpoint)
            .with_compression(Compression::Gzip)
            .with_timeout(EXPORT_TIMEOUT);
        if let Some(domain) = &self.tls_domain {
            builder = builder.with_tls_config(
                ClientTlsConfig::new()
                    .domain_name(domain.clone())
                    .with_native_roots(),
            );
        }

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(builder.build()?)
            .with_resource(service_resource())
            .build();

        let _ = TRACER_PROVIDER.set(provider.clone());
        global::set_tracer_provider(provider.clone());
        global::set_text_map_propagator(TraceContextPropagator::new());

        Ok(provider.tracer(env!("CARGO_PKG_NAME")))
    }
}

fn service_resource() -> Resource {
    Resource::builder_empty()
        .with_attributes([
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("vcs.revision", GIT_COMMIT_HASH),
        ])
        .build()
}

fn env_filter(verbosity_level: Level) -> Result<EnvFilter> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy();
    for directive in QUIET_TARGETS {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

/// Install the global subscriber. `RUST_LOG` overrides `verbosity_level`,
/// which defaults to `ERROR`.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a subscriber is
/// already installed.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let filter = env_filter(verbosity_level.unwrap_or(Level::ERROR))?;

    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let otel_layer = match Collector::from_env() {
        Some(collector) => Some(tracing_opentelemetry::layer().with_tracer(collector.tracer()?)),
        None => None,
    };

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(otel_layer)
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Flush pending spans. Does nothing when export is off.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        if let Err(err) = provider.shutdown() {
            debug!("tracer provider shutdown failed: {err}");
        }
    }
}
