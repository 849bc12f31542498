//! Input Sanitization
//!
//! The engine never rejects host input. Values that cannot be trusted are
//! replaced before any rule or formula sees them.
//!
//! Functions:
//! - Timestamp sanitization (future / negative -> now)
//! - Due time sanitization (negative -> now)
//! - Response time sanitization (outside (0, 60s] -> 1000ms)
//! - Personal parameter sanitization

use crate::types::{
    DEFAULT_RESPONSE_TIME_MS, MAX_DIFFICULTY, MAX_RESPONSE_TIME_MS, MIN_DIFFICULTY,
};

/// Lower bound for a usable learning / forgetting speed
pub const MIN_SPEED: f64 = 0.1;

/// Upper bound for a usable learning / forgetting speed
pub const MAX_SPEED: f64 = 5.0;

/// 时间戳清洗: 未来或负数时间戳折叠为 now
pub fn sanitize_timestamp(ts: i64, now: i64) -> i64 {
    if ts < 0 {
        tracing::debug!(timestamp = ts, "negative timestamp replaced with now");
        return now;
    }
    if ts > now {
        tracing::warn!(timestamp = ts, now, "future timestamp replaced with now");
        return now;
    }
    ts
}

/// 到期时间清洗: 负数折叠为 now, 未来时间保留
pub fn sanitize_due_time(due: i64, now: i64) -> i64 {
    if due < 0 {
        tracing::debug!(due, "negative due time replaced with now");
        return now;
    }
    due
}

pub fn is_valid_response_time(rt: f64) -> bool {
    rt.is_finite() && rt > 0.0 && rt <= MAX_RESPONSE_TIME_MS
}

/// 反应时间清洗: 不在 (0, 60000] 内的值替换为 1000ms
pub fn sanitize_response_time(rt: f64) -> f64 {
    if is_valid_response_time(rt) {
        rt
    } else {
        DEFAULT_RESPONSE_TIME_MS
    }
}

/// 个性化速度参数清洗: 非法值回退为中性值 1.0
pub fn sanitize_speed(speed: f64) -> f64 {
    if !speed.is_finite() || speed <= 0.0 {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// 比例清洗: NaN 回退为默认值, 其余截断到 [0, 1]
pub fn sanitize_ratio(ratio: f64, fallback: f64) -> f64 {
    if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

pub fn clamp_difficulty(difficulty: u8) -> u8 {
    difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}
