//! Core type definitions for Kestrel
//!
//! Account names, request timestamps and the listing options a proxy
//! forwards to the account server.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest account name accepted by default
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 256;

/// Name of an account resource (the first path segment)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct AccountName(String);

impl AccountName {
    /// Create a new account name no longer than `max` bytes
    pub fn with_max_len(name: impl Into<String>, max: usize) -> Result<Self, AccountNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(AccountNameError::Empty);
        }
        if name.len() > max {
            return Err(AccountNameError::TooLong {
                len: name.len(),
                max,
            });
        }
        Ok(Self(name))
    }

    /// Get the account name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountName({:?})", self.0)
    }
}

impl AsRef<str> for AccountName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when creating an account name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountNameError {
    #[error("account name must not be empty")]
    Empty,
    #[error("Account name length of {len} longer than {max}")]
    TooLong { len: usize, max: usize },
}

/// Request timestamp used by the account server for conflict resolution.
///
/// Rendered as seconds since the epoch with five fractional digits,
/// zero padded to sixteen characters (`0000001234.56789`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current wall clock time
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing instant
    #[must_use]
    pub const fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Microseconds since the epoch
    #[must_use]
    pub fn as_micros(&self) -> i64 {
        self.0.timestamp_micros()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.as_micros().max(0);
        let secs = micros / 1_000_000;
        let frac = (micros % 1_000_000) / 10;
        write!(f, "{secs:010}.{frac:05}")
    }
}

/// Listing options forwarded verbatim on account GET requests
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingOptions {
    pub format: Option<String>,
    pub limit: Option<String>,
    pub marker: Option<String>,
    pub end_marker: Option<String>,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
}

impl ListingOptions {
    /// Options that were supplied, as `(name, value)` query pairs
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("format", &self.format),
            ("limit", &self.limit),
            ("marker", &self.marker),
            ("end_marker", &self.end_marker),
            ("prefix", &self.prefix),
            ("delimiter", &self.delimiter),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_account_name_validation() {
        let name = AccountName::with_max_len("AUTH_test", MAX_ACCOUNT_NAME_LENGTH).unwrap();
        assert_eq!(name.as_str(), "AUTH_test");
        assert_eq!(
            AccountName::with_max_len("", MAX_ACCOUNT_NAME_LENGTH).unwrap_err(),
            AccountNameError::Empty
        );

        let long = "a".repeat(MAX_ACCOUNT_NAME_LENGTH + 1);
        let err = AccountName::with_max_len(long, MAX_ACCOUNT_NAME_LENGTH).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Account name length of 257 longer than 256"
        );

        assert!(AccountName::with_max_len("abcd", 4).is_ok());
        assert!(AccountName::with_max_len("abcde", 4).is_err());
    }

    #[test]
    fn test_timestamp_format() {
        let dt = Utc.timestamp_opt(1_412_345_678, 123_456_000).unwrap();
        let ts = Timestamp::from_datetime(dt);
        assert_eq!(ts.to_string(), "1412345678.12345");

        let early = Timestamp::from_datetime(Utc.timestamp_opt(12, 0).unwrap());
        assert_eq!(early.to_string(), "0000000012.00000");
        assert_eq!(early.to_string().len(), 16);
    }

    #[test]
    fn test_timestamp_monotonic_ordering() {
        let a = Timestamp::from_datetime(Utc.timestamp_opt(100, 0).unwrap());
        let b = Timestamp::from_datetime(Utc.timestamp_opt(100, 10_000).unwrap());
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn test_listing_options_pairs() {
        let opts = ListingOptions {
            format: Some("json".into()),
            limit: Some("10".into()),
            prefix: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            opts.to_pairs(),
            vec![("format", "json"), ("limit", "10"), ("prefix", "")]
        );
        assert!(ListingOptions::default().to_pairs().is_empty());
    }
}
