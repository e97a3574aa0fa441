use anyhow::Result;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};
use std::env;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_OTLP_HTTP_ENDPOINT: &str = "http://localhost:4318/v1/traces";

/// Installs the global subscriber: env filter, compact fmt output and, when
/// `OTEL_TRACES_EXPORTER` asks for it, an OpenTelemetry layer.
///
/// `OTEL_TRACES_EXPORTER=otlp` ships spans over OTLP/HTTP to
/// `OTEL_EXPORTER_OTLP_ENDPOINT`; `stdout` prints them. Anything else keeps
/// plain log output only.
pub fn init_telemetry(service_name: &'static str) {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let exporter = env::var("OTEL_TRACES_EXPORTER").unwrap_or_default();
    let tracer = match exporter.as_str() {
        "otlp" => {
            let endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_OTLP_HTTP_ENDPOINT.to_string());
            match otlp_tracer(&endpoint, service_name) {
                Ok(tracer) => Some(tracer),
                Err(e) => {
                    eprintln!("{}: OTLP exporter unavailable ({}), using stdout", service_name, e);
                    Some(stdout_tracer(service_name))
                }
            }
        }
        "stdout" => Some(stdout_tracer(service_name)),
        _ => None,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_target(false))
        .with(tracer.map(OpenTelemetryLayer::new))
        .init();
}

fn resource(service_name: &'static str) -> Resource {
    Resource::builder().with_service_name(service_name).build()
}

fn otlp_tracer(endpoint: &str, service_name: &'static str) -> Result<Tracer> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_resource(resource(service_name))
        .with_batch_exporter(exporter)
        .build();
    global::set_tracer_provider(provider.clone());

    Ok(provider.tracer(service_name))
}

fn stdout_tracer(service_name: &'static str) -> Tracer {
    let provider = SdkTracerProvider::builder()
        .with_resource(resource(service_name))
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build();

    provider.tracer(service_name)
}
