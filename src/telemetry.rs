//! Logging and optional OTLP export.
//!
//! `GT_LOG` sets the filter (default `warn`), `GT_LOG_FORMAT=json` switches
//! stderr output to JSON lines. With the `otel` feature and
//! `OTEL_EXPORTER_OTLP_ENDPOINT` set, spans and events are exported too.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const FILTER_ENV: &str = "GT_LOG";
const FORMAT_ENV: &str = "GT_LOG_FORMAT";
const SERVICE_NAME: &str = "gastown";

/// Flushes and shuts down exporters on drop. Hold it for the whole run.
#[derive(Default)]
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
    #[cfg(feature = "otel")]
    logger_provider: Option<opentelemetry_sdk::logs::SdkLoggerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        {
            if let Some(provider) = self.logger_provider.take() {
                let _ = provider.shutdown();
            }
            if let Some(provider) = self.tracer_provider.take() {
                let _ = provider.shutdown();
            }
        }
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn wants_json(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}

/// Install the global subscriber. Never fails: a broken exporter setup
/// degrades to stderr-only logging.
pub fn init() -> TelemetryGuard {
    let json = wants_json(std::env::var(FORMAT_ENV).ok().as_deref());
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| fmt::layer().compact().with_writer(std::io::stderr));

    #[cfg(feature = "otel")]
    {
        if std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
            match otel::providers() {
                Ok((tracer_provider, logger_provider)) => {
                    use opentelemetry::trace::TracerProvider as _;

                    let tracer = tracer_provider.tracer(SERVICE_NAME);
                    let _ = tracing_subscriber::registry()
                        .with(filter())
                        .with(json_layer)
                        .with(text_layer)
                        .with(tracing_opentelemetry::layer().with_tracer(tracer))
                        .with(
                            opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(
                                &logger_provider,
                            ),
                        )
                        .try_init();
                    return TelemetryGuard {
                        tracer_provider: Some(tracer_provider),
                        logger_provider: Some(logger_provider),
                    };
                }
                Err(e) => eprintln!("warning: OTLP export disabled: {e}"),
            }
        }
    }

    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(json_layer)
        .with(text_layer)
        .try_init();
    TelemetryGuard::default()
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry_otlp::{LogExporter, SpanExporter};
    use opentelemetry_sdk::Resource;
    use opentelemetry_sdk::logs::SdkLoggerProvider;
    use opentelemetry_sdk::trace::SdkTracerProvider;

    use super::SERVICE_NAME;

    /// OTLP/HTTP providers. Endpoint and headers come from the standard
    /// `OTEL_EXPORTER_OTLP_*` variables.
    pub fn providers() -> Result<(SdkTracerProvider, SdkLoggerProvider), String> {
        let resource = Resource::builder().with_service_name(SERVICE_NAME).build();

        let span_exporter = SpanExporter::builder()
            .with_http()
            .build()
            .map_err(|e| format!("span exporter: {e}"))?;
        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(span_exporter)
            .with_resource(resource.clone())
            .build();

        let log_exporter = LogExporter::builder()
            .with_http()
            .build()
            .map_err(|e| format!("log exporter: {e}"))?;
        let logger_provider = SdkLoggerProvider::builder()
            .with_batch_exporter(log_exporter)
            .with_resource(resource)
            .build();

        Ok((tracer_provider, logger_provider))
    }
}
