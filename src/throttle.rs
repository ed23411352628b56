//! Quota throttling as reported by brokers in `throttle_time_ms`.
//!
//! Brokers answer throttled requests normally and expect the client to stay
//! quiet for the reported time ([KIP-219]).
//!
//! [KIP-219]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-219+-+Improve+quota+communication

use std::time::Duration;

use tracing::{info, warn};

/// Time the broker asked us to back off for, if any.
pub(crate) fn throttle_duration(throttle_time_ms: Option<i32>) -> Option<Duration> {
    let throttle_time_ms = throttle_time_ms?;

    let throttle_time_ms = match u64::try_from(throttle_time_ms) {
        Ok(t) => t,
        Err(_) => {
            warn!(throttle_time_ms, "Invalid throttle time");
            return None;
        }
    };

    (throttle_time_ms > 0).then(|| Duration::from_millis(throttle_time_ms))
}

/// Waits out the throttle time reported alongside a response.
pub(crate) async fn respect_throttle(throttle_time_ms: Option<i32>, request_name: &str) {
    if let Some(duration) = throttle_duration(throttle_time_ms) {
        info!(
            request_name,
            throttle_secs = duration.as_secs_f64(),
            "broker asked us to throttle",
        );
        tokio::time::sleep(duration).await;
    }
}
