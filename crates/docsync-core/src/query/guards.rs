//! Shared guardrails for traversal depths, batch sizing, and history windows.

// Traversal guards
pub const DEFAULT_IMPACT_DEPTH: i64 = 3;
pub const MAX_IMPACT_DEPTH: i64 = 6;
pub const MAX_GRAPH_VISITED: usize = 20_000;

// Scheduler guards
pub const DEFAULT_BATCH_SIZE: i64 = 10;
pub const MAX_BATCH_SIZE: i64 = 500;
pub const DEFAULT_WORKERS: i64 = 4;
pub const MAX_WORKERS: i64 = 64;
pub const DEFAULT_MAX_RETRIES: i64 = 2;
pub const MAX_RETRIES: i64 = 10;
pub const MAX_RETRY_BACKOFF_MS: u64 = 5_000;

// Threshold controller guards
pub const DEFAULT_HISTORY_WINDOW: i64 = 10;
pub const MAX_HISTORY_WINDOW: i64 = 1_000;

pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

pub fn clamp_depth(value: i64, maximum: i64) -> i64 {
    clamp_int(value, 1, maximum)
}

pub fn clamp_batch_size(value: i64) -> usize {
    clamp_int(value, 1, MAX_BATCH_SIZE) as usize
}

pub fn clamp_workers(value: i64) -> usize {
    clamp_int(value, 1, MAX_WORKERS) as usize
}

pub fn clamp_retries(value: i64) -> u32 {
    clamp_int(value, 0, MAX_RETRIES) as u32
}

pub fn clamp_window(value: i64) -> usize {
    clamp_int(value, 1, MAX_HISTORY_WINDOW) as usize
}

/// Parse an on/off toggle the forgiving way (`1/true/yes/on`, case-insensitive).
pub fn parse_toggle(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
