// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC3339 timestamp (any offset) into UTC.
pub fn parse_rfc3339_utc(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// "YYYY-MM" bucket for an RFC3339 date.
pub fn month_key(date: &str) -> Option<String> {
    parse_rfc3339_utc(date).map(|dt| format!("{:04}-{:02}", dt.year(), dt.month()))
}

/// ISO-8601 week bucket ("YYYY-Www") for an RFC3339 date.
pub fn iso_week_key(date: &str) -> Option<String> {
    parse_rfc3339_utc(date).map(|dt| {
        let week = dt.iso_week();
        format!("{:04}-W{:02}", week.year(), week.week())
    })
}
