//! Step-level observability
//!
//! `metrics` feature: OpenTelemetry instruments exported through a Prometheus
//! registry. `tracing` feature: one span per migration step.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{MigrationMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use crate::migration::Direction;
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<MigrationMetrics> = Lazy::new(MigrationMetrics::init);

    pub struct MigrationMetrics {
        pub registry: Registry,
        pub steps_total: Counter<u64>,
        pub step_failures_total: Counter<u64>,
        pub step_duration: Histogram<f64>,
        _provider: SdkMeterProvider,
    }

    impl MigrationMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let builder = SdkMeterProvider::builder();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => builder.with_reader(exporter).build(),
                Err(e) => {
                    log::warn!("Prometheus exporter unavailable, step metrics not exported: {}", e);
                    builder.build()
                }
            };
            let meter = provider.meter("stepwise");

            let steps_total = meter
                .u64_counter("stepwise_migration_steps_total")
                .with_description("Migration steps confirmed by the database")
                .build();

            let step_failures_total = meter
                .u64_counter("stepwise_migration_step_failures_total")
                .with_description("Migration steps that halted a batch")
                .build();

            let step_duration = meter
                .f64_histogram("stepwise_migration_step_duration_seconds")
                .with_description("Duration of a single migration step")
                .build();

            Self {
                registry,
                steps_total,
                step_failures_total,
                step_duration,
                _provider: provider,
            }
        }

        pub fn record_step(&self, direction: Direction, elapsed: Duration, succeeded: bool) {
            let attributes = [KeyValue::new("direction", direction.as_str())];
            if succeeded {
                self.steps_total.add(1, &attributes);
            } else {
                self.step_failures_total.add(1, &attributes);
            }
            self.step_duration.record(elapsed.as_secs_f64(), &attributes);
        }

        /// Prometheus text exposition of every recorded metric
        pub fn render(&self) -> String {
            TextEncoder::new()
                .encode_to_string(&self.registry.gather())
                .unwrap_or_default()
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use crate::migration::Migration;

    /// Span covering one step: executor call plus state re-read
    pub fn step_span(migration: &Migration) -> tracing::Span {
        tracing::info_span!(
            "migration_step",
            version = migration.version,
            direction = %migration.direction,
            name = %migration.name,
        )
    }
}
