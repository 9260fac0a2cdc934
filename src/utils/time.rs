use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return milliseconds since the UNIX epoch
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
