use std::time::Duration;
use time::OffsetDateTime;

pub fn utc_now_ms() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// True when `then_ms` lies strictly more than `age` before `now_ms`.
pub fn older_than(then_ms: i128, now_ms: i128, age: Duration) -> bool {
    now_ms - then_ms > age.as_millis() as i128
}
