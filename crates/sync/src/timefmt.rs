#![forbid(unsafe_code)]

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub(crate) fn now_ms() -> i64 {
    tally_storage::now_ms()
}

pub(crate) fn ts_ms_to_rfc3339(ts_ms: i64) -> String {
    let nanos = (ts_ms as i128) * 1_000_000i128;
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    dt.format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub(crate) fn rfc3339_to_ms(value: &str) -> Option<i64> {
    let dt = OffsetDateTime::parse(value, &Rfc3339).ok()?;
    let ms = dt.unix_timestamp_nanos() / 1_000_000i128;
    if ms < i64::MIN as i128 || ms > i64::MAX as i128 {
        return None;
    }
    Some(ms as i64)
}
