//! Progress reporting for long-running overwrite passes.
//!
//! Samples are throttled to at most one per 1 GiB written or per 500 ms,
//! whichever bound is coarser, so progress callbacks never become the
//! bottleneck of a multi-hundred-MB/s write loop.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const EMIT_BYTE_INTERVAL: u64 = 1024 * 1024 * 1024; // 1 GiB
pub const EMIT_TIME_INTERVAL: Duration = Duration::from_millis(500);

/// One progress observation, forwarded to the host callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub bytes_written: u64,
    pub total_bytes: u64,
    pub percent: f64,
    pub speed_mbps: f64,
    pub pass_index: usize,
    pub pass_count: usize,
}

/// Emission throttle. `bytes_written` is cumulative within the current
/// pass; samples are monotonically non-decreasing in it.
pub struct ProgressThrottle {
    pass_start: Instant,
    last_emit: Instant,
    last_emit_bytes: u64,
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressThrottle {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            pass_start: now,
            last_emit: now,
            last_emit_bytes: 0,
        }
    }

    /// Reset at the start of each pass.
    pub fn begin_pass(&mut self) {
        let now = Instant::now();
        self.pass_start = now;
        self.last_emit = now;
        self.last_emit_bytes = 0;
    }

    /// Build a sample when both the byte and the time bounds have elapsed;
    /// `force` bypasses the throttle for the final sample of a pass.
    pub fn sample(
        &mut self,
        bytes_written: u64,
        total_bytes: u64,
        pass_index: usize,
        pass_count: usize,
        force: bool,
    ) -> Option<ProgressSample> {
        let crossed_byte_bound = bytes_written - self.last_emit_bytes >= EMIT_BYTE_INTERVAL;
        let crossed_time_bound = self.last_emit.elapsed() >= EMIT_TIME_INTERVAL;

        if !force && !(crossed_byte_bound && crossed_time_bound) {
            return None;
        }

        self.last_emit = Instant::now();
        self.last_emit_bytes = bytes_written;

        let elapsed = self.pass_start.elapsed().as_secs_f64().max(0.001);
        let percent = if total_bytes > 0 {
            (bytes_written as f64 / total_bytes as f64 * 100.0).min(100.0)
        } else {
            100.0
        };

        Some(ProgressSample {
            bytes_written,
            total_bytes,
            percent,
            speed_mbps: bytes_written as f64 / (1024.0 * 1024.0) / elapsed,
            pass_index,
            pass_count,
        })
    }
}

/// Convert a byte rate or count to a readable string
pub fn human_bytes(bytes: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bytes <= 0.0 {
        return "0B".to_string();
    }
    let mut val = bytes;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}

/// Format seconds to H:MM:SS or M:SS
pub fn format_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
