//! 时间格式化

use std::time::Duration;

/// HH:MM:SS
pub fn seconds_to_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (m, s) = (secs / 60, secs % 60);
    let (h, m) = (m / 60, m % 60);
    format!("{h:02}:{m:02}:{s:02}")
}

/// MM:SS, 分钟不封顶
pub fn seconds_to_ms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// 剩余时间估计: elapsed / done * remaining
pub fn estimate_remaining(elapsed: Duration, done: usize, total: usize) -> Duration {
    if done == 0 {
        return Duration::ZERO;
    }
    let remaining = total.saturating_sub(done) as f64;
    elapsed.mul_f64(remaining / done as f64)
}
