//! Prometheus metrics and `tracing` spans for settlement and database work.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{CommissionMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        metrics::{Counter, Histogram, MeterProvider as _},
        KeyValue,
    };
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<CommissionMetrics> = Lazy::new(CommissionMetrics::init);

    pub struct CommissionMetrics {
        registry: Registry,
        _provider: SdkMeterProvider,
        pub settlements_total: Counter<u64>,
        pub settlement_failures_total: Counter<u64>,
        pub anomalies_total: Counter<u64>,
        pub credited_amount_total: Counter<f64>,
        pub settlement_duration: Histogram<f64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
    }

    impl CommissionMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .expect("failed to build prometheus exporter");
            let provider = SdkMeterProvider::builder().with_reader(exporter).build();
            let meter = provider.meter("commission_ledger");

            let settlements_total = meter
                .u64_counter("commission_settlements_total")
                .with_description("Bookings whose commission split was committed")
                .build();
            let settlement_failures_total = meter
                .u64_counter("commission_settlement_failures_total")
                .with_description("Settlement attempts rolled back")
                .build();
            let anomalies_total = meter
                .u64_counter("commission_anomalies_total")
                .with_description("Arithmetic and configuration anomalies detected during settlement")
                .build();
            let credited_amount_total = meter
                .f64_counter("commission_credited_amount_total")
                .with_description("Sum of wallet credits, in whole currency units")
                .build();
            let settlement_duration = meter
                .f64_histogram("commission_settlement_duration_seconds")
                .with_description("Duration of one settlement transaction")
                .build();
            let query_errors_total = meter
                .u64_counter("commission_query_errors_total")
                .with_description("Failed database statements")
                .build();
            let query_duration = meter
                .f64_histogram("commission_query_duration_seconds")
                .with_description("Duration of database statements")
                .build();

            Self {
                registry,
                _provider: provider,
                settlements_total,
                settlement_failures_total,
                anomalies_total,
                credited_amount_total,
                settlement_duration,
                query_errors_total,
                query_duration,
            }
        }

        pub fn record_settlement(&self, elapsed: Duration) {
            self.settlements_total.add(1, &[]);
            self.settlement_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_settlement_failure(&self, kind: &'static str) {
            self.settlement_failures_total
                .add(1, &[KeyValue::new("kind", kind)]);
        }

        pub fn record_anomaly(&self, kind: &'static str) {
            self.anomalies_total.add(1, &[KeyValue::new("kind", kind)]);
        }

        pub fn record_credit(&self, amount: f64, kind: &'static str) {
            self.credited_amount_total
                .add(amount, &[KeyValue::new("kind", kind)]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        /// Prometheus text exposition of everything recorded so far.
        pub fn gather(&self) -> String {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("failed to encode metrics: {e}");
            }
            String::from_utf8_lossy(&buffer).into_owned()
        }
    }
}

/// Span constructors shared by the engine, executor and transaction paths.
#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn settle_booking_span(booking_id: i64, status: &str) -> Span {
        info_span!("commission.settle_booking", booking_id, status)
    }

    pub fn recalculate_booking_span(booking_id: i64) -> Span {
        info_span!("commission.recalculate_booking", booking_id)
    }

    pub fn preview_span(product_id: i64) -> Span {
        info_span!("commission.preview", product_id)
    }

    pub fn execute_query_span(query: &str) -> Span {
        // Statement text only; bound values may carry user data.
        info_span!("db.query", db.statement = query)
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("db.connect")
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("db.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("db.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("db.transaction.rollback")
    }
}
