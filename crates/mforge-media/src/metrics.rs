//! Metrics emitted by media operations.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const FFMPEG_STEP_DURATION_SECONDS: &str = "mforge_ffmpeg_step_duration_seconds";
    pub const STITCH_STRATEGY_TOTAL: &str = "mforge_stitch_strategy_total";
    pub const WATCHDOG_SIGNALS_TOTAL: &str = "mforge_watchdog_signals_total";
    pub const FRAMES_KEYED_TOTAL: &str = "mforge_frames_keyed_total";
}

/// Record one FFmpeg step by outcome.
pub fn record_ffmpeg_step(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    histogram!(names::FFMPEG_STEP_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record which stitch path produced the output.
pub fn record_stitch_strategy(strategy: &str) {
    let labels = [("strategy", strategy.to_string())];
    counter!(names::STITCH_STRATEGY_TOTAL, &labels).increment(1);
}

/// Record a signal sent by the process watchdog.
pub fn record_watchdog_signal(signal: &str) {
    let labels = [("signal", signal.to_string())];
    counter!(names::WATCHDOG_SIGNALS_TOTAL, &labels).increment(1);
}

pub fn record_frames_keyed(count: u64) {
    counter!(names::FRAMES_KEYED_TOTAL).increment(count);
}
