use hdrhistogram::Histogram;
use std::time::Duration;

/// Latencies above one hour, in microseconds, are recorded as one hour.
const MAX_TRACKABLE_US: u64 = 3_600_000_000;
const SIGNIFICANT_FIGURES: u8 = 3;

/// Microsecond latency distribution backed by an HDR histogram.
///
/// The sum is kept next to the histogram so that the mean is exact rather than bucketed.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    inner: Histogram<u64>,
    sum_us: u128,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            inner: Histogram::new_with_bounds(1, MAX_TRACKABLE_US, SIGNIFICANT_FIGURES)
                .expect("Latency histogram bounds are valid"),
            sum_us: 0,
        }
    }
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, latency: Duration) {
        // The histogram's lowest discernible value is 1, so 0 µs is recorded as 1 µs.
        let value = u64::try_from(latency.as_micros())
            .unwrap_or(u64::MAX)
            .clamp(1, MAX_TRACKABLE_US);
        self.inner.saturating_record(value);
        self.sum_us += value as u128;
    }

    pub fn merge(&mut self, other: &LatencyHistogram) {
        if let Err(e) = self.inner.add(&other.inner) {
            log::warn!("Could not merge latency histograms: {e:?}");
            return;
        }
        self.sum_us += other.sum_us;
    }

    pub fn count(&self) -> u64 {
        self.inner.len()
    }

    pub fn min(&self) -> Duration {
        if self.inner.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_micros(self.inner.min())
    }

    pub fn max(&self) -> Duration {
        if self.inner.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_micros(self.inner.max())
    }

    pub fn mean(&self) -> Duration {
        match self.count() {
            0 => Duration::ZERO,
            count => Duration::from_micros((self.sum_us / count as u128) as u64),
        }
    }

    /// The latency at or below which `percentile` percent of the recorded values fall.
    pub fn percentile(&self, percentile: f64) -> Duration {
        if self.inner.is_empty() {
            return Duration::ZERO;
        }
        let quantile = percentile.clamp(0.0, 100.0) / 100.0;
        Duration::from_micros(self.inner.value_at_quantile(quantile))
    }
}
