//! Logging and OpenTelemetry pipeline initialisation for Centinela.
//!
//! Call [`init_tracing`] once at process startup to wire up the `tracing`
//! subscriber with an optional OTLP span exporter.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set the OTLP HTTP exporter is activated. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `CENTINELA_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = centinela_runtime::telemetry::init_tracing("centinela");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

/// Log output settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `RUST_LOG` directive, or [`DEFAULT_FILTER`].
    pub filter: String,
    /// Newline-delimited JSON instead of the compact human format.
    pub json: bool,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var("RUST_LOG").ok(),
            std::env::var("CENTINELA_LOG_FORMAT").ok(),
        )
    }

    fn from_values(rust_log: Option<String>, format: Option<String>) -> Self {
        Self {
            filter: rust_log
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            json: format.is_some_and(|f| f.eq_ignore_ascii_case("json")),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|e| {
            eprintln!("[centinela] invalid RUST_LOG {:?} ({e}); using {DEFAULT_FILTER}", self.filter);
            EnvFilter::new(DEFAULT_FILTER)
        })
    }
}

/// Initialise the global `tracing` subscriber with an optional OTLP exporter.
///
/// When `OTEL_EXPORTER_OTLP_ENDPOINT` is set an OTLP/HTTP span exporter is
/// configured and every span (the per-request spans opened by the polling
/// server included) is forwarded to the collector. Otherwise only the console
/// formatter is installed.
///
/// The returned [`TracerProviderGuard`] **must** be held for the lifetime of
/// the process; dropping it flushes all pending span batches.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let settings = LogSettings::from_env();
    let provider = build_provider(service_name);

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("centinela")));
    let (json_layer, compact_layer) = if settings.json {
        (Some(fmt::layer().json().with_target(true)), None)
    } else {
        (None, Some(fmt::layer().compact().with_target(true)))
    };

    let installed = tracing_subscriber::registry()
        .with(settings.env_filter())
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init();
    if let Err(e) = installed {
        eprintln!("[centinela] tracing subscriber already installed: {e}");
    }

    TracerProviderGuard(provider)
}

/// RAII guard that shuts down the OTel [`SdkTracerProvider`] on drop.
///
/// Hold an instance of this type in `main` for the entire program lifetime.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// Whether spans are being exported to a collector.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[centinela] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// Build an [`SdkTracerProvider`] when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// Returns `None` when the env-var is absent or the exporter cannot be
/// initialised; the error goes to stderr because no subscriber exists yet.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[centinela] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // Simple (synchronous) exporter: no Tokio runtime is required at
            // init time.
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_info_compact() {
        let settings = LogSettings::from_values(None, None);
        assert_eq!(settings.filter, "info");
        assert!(!settings.json);
    }

    #[test]
    fn settings_honour_filter_and_json_format() {
        let settings = LogSettings::from_values(
            Some("centinela_runtime=debug".to_string()),
            Some("JSON".to_string()),
        );
        assert_eq!(settings.filter, "centinela_runtime=debug");
        assert!(settings.json);
    }

    #[test]
    fn blank_filter_falls_back_to_default() {
        let settings = LogSettings::from_values(Some("  ".to_string()), Some("pretty".to_string()));
        assert_eq!(settings.filter, "info");
        assert!(!settings.json);
    }

    #[test]
    fn build_provider_returns_none_without_endpoint() {
        // SAFETY: no other test in this crate reads this env-var.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider("test-service").is_none());
    }

    #[test]
    fn guard_without_provider_drops_cleanly() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }
}
