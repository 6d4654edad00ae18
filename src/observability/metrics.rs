//! OpenTelemetry request instruments.
//!
//! Key metrics:
//! - http.server.requests: Counter of handled requests
//! - http.server.duration: Histogram of request duration in milliseconds
//!
//! Both are keyed by `{method, route, status}`.

use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Name of the request counter.
pub const REQUESTS_METRIC: &str = "http.server.requests";

/// Name of the request duration histogram.
pub const DURATION_METRIC: &str = "http.server.duration";

/// Request instruments, created once per meter and cloned into every
/// request flow. Updates are commutative and safe to call concurrently.
#[derive(Debug, Clone)]
pub struct RequestInstruments {
    /// Total number of handled requests.
    pub requests: Counter<u64>,
    /// Request duration in milliseconds.
    pub duration: Histogram<f64>,
}

impl RequestInstruments {
    /// Register both instruments on the given meter.
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter(REQUESTS_METRIC)
                .with_description("Number of HTTP requests")
                .with_unit("{requests}")
                .init(),
            duration: meter
                .f64_histogram(DURATION_METRIC)
                .with_description("Duration of HTTP requests")
                .with_unit("ms")
                .init(),
        }
    }

    /// Count one request and record its duration.
    pub fn record(&self, attributes: &[KeyValue], elapsed: Duration) {
        self.requests.add(1, attributes);
        self.duration
            .record(elapsed.as_secs_f64() * 1000.0, attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};

    #[test]
    fn test_record_does_not_panic() {
        let provider = SdkMeterProvider::builder()
            .with_reader(ManualReader::builder().build())
            .build();
        let instruments = RequestInstruments::new(&provider.meter("test"));

        let attrs = [
            KeyValue::new("method", "GET"),
            KeyValue::new("route", "/health"),
            KeyValue::new("status", 200_i64),
        ];
        instruments.record(&attrs, Duration::from_millis(3));
        instruments.clone().record(&attrs, Duration::ZERO);
    }
}
