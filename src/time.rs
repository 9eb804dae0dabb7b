use chrono::{Local, Utc};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Local calendar date, the store's daily partition key (`YYYY-MM-DD`).
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Local wall-clock time used for display ordering (`HH:MM`).
pub fn now_hm() -> String {
    Local::now().format("%H:%M").to_string()
}
