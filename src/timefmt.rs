//! Validity and update time helpers.
//!
//! Times are rendered in the same layout OpenSSL prints generalized time:
//! `Mar  3 09:15:00 2025 GMT`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime, Utc};
use der::asn1::UtcTime;
use x509_cert::time::Time;

use crate::error::{PkiError, Result};

const TIME_FORMAT: &str = "%b %e %H:%M:%S %Y GMT";

pub fn format_time(time: &Time) -> String {
    let utc: DateTime<Utc> = DateTime::from(time.to_system_time());
    utc.format(TIME_FORMAT).to_string()
}

/// Parse text produced by [`format_time`].
pub fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| PkiError::parse(format!("Invalid time '{}'", text), e))
}

/// `now + offset_secs`, truncated to whole seconds.
pub fn time_from_now(offset_secs: i64) -> Result<Time> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| PkiError::invalid_input(format!("System clock before epoch: {}", e)))?
        .as_secs() as i64;
    let target = now
        .checked_add(offset_secs)
        .filter(|secs| *secs >= 0)
        .ok_or_else(|| PkiError::invalid_input(format!("Time offset {} out of range", offset_secs)))?;

    time_at(UNIX_EPOCH + Duration::from_secs(target as u64))
        .map_err(|e| PkiError::encoding(format!("Time offset {} not representable", offset_secs), e))
}

/// UTCTime through 2049, GeneralizedTime after (RFC 5280 section 4.1.2.5).
pub fn time_at(time: SystemTime) -> der::Result<Time> {
    match UtcTime::from_system_time(time) {
        Ok(utc) => Ok(Time::UtcTime(utc)),
        Err(_) => Time::try_from(time),
    }
}
