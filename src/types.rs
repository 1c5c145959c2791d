//! Shared types for condor-git-config

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Error type for `--max-age` parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseMaxAgeError {
    #[error("value cannot be empty")]
    Empty,
    #[error("not a number of seconds: {0}")]
    NotANumber(String),
    #[error("max age cannot be negative: {0}")]
    Negative(String),
}

/// The logical cache a work directory is bound to.
///
/// A work directory holds content for exactly one identity for its whole
/// lifetime; see [`crate::cache::CacheError::Conflict`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheIdentity {
    pub git_uri: String,
    pub branch: String,
}

impl CacheIdentity {
    pub fn new(git_uri: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            git_uri: git_uri.into(),
            branch: branch.into(),
        }
    }
}

impl fmt::Display for CacheIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.git_uri, self.branch)
    }
}

/// How long a refreshed cache stays fresh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxAge {
    /// Refresh once `max_age` has elapsed since the last refresh
    Finite(Duration),
    /// Never refresh after the first successful population
    Infinite,
}

impl MaxAge {
    pub fn from_secs_f64(secs: f64) -> Self {
        // Too large for a Duration is as good as forever
        match Duration::try_from_secs_f64(secs.max(0.0)) {
            Ok(d) => MaxAge::Finite(d),
            Err(_) => MaxAge::Infinite,
        }
    }

    /// Default staleness threshold: 300 seconds, jittered by up to ten
    /// seconds either way so a fleet of nodes does not pull in lockstep.
    pub fn jittered_default() -> Self {
        MaxAge::Finite(Duration::from_secs(rand::random_range(290..=310)))
    }

    /// Seconds as a float, `f64::INFINITY` for [`MaxAge::Infinite`].
    pub fn as_secs_f64(&self) -> f64 {
        match self {
            MaxAge::Finite(d) => d.as_secs_f64(),
            MaxAge::Infinite => f64::INFINITY,
        }
    }
}

impl FromStr for MaxAge {
    type Err = ParseMaxAgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseMaxAgeError::Empty);
        }

        // f64 parsing accepts "inf", "infinity" and "+inf" case-insensitively
        let secs: f64 = s
            .parse()
            .map_err(|_| ParseMaxAgeError::NotANumber(s.to_string()))?;

        if secs.is_nan() {
            return Err(ParseMaxAgeError::NotANumber(s.to_string()));
        }
        if secs < 0.0 {
            return Err(ParseMaxAgeError::Negative(s.to_string()));
        }

        Ok(MaxAge::from_secs_f64(secs))
    }
}

impl fmt::Display for MaxAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxAge::Finite(d) => write!(f, "{}s", d.as_secs_f64()),
            MaxAge::Infinite => write!(f, "inf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_whole_seconds() {
        let age: MaxAge = "300".parse().unwrap();
        assert_eq!(age, MaxAge::Finite(Duration::from_secs(300)));
    }

    #[test]
    fn parse_fractional_seconds() {
        let age: MaxAge = "0.5".parse().unwrap();
        assert_eq!(age, MaxAge::Finite(Duration::from_millis(500)));
    }

    #[test]
    fn parse_infinity_sentinels() {
        for s in ["inf", "INF", "infinity", "+inf"] {
            let age: MaxAge = s.parse().unwrap();
            assert_eq!(age, MaxAge::Infinite, "parsing {s:?}");
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(
            "soon".parse::<MaxAge>(),
            Err(ParseMaxAgeError::NotANumber("soon".into()))
        );
        assert_eq!("".parse::<MaxAge>(), Err(ParseMaxAgeError::Empty));
        assert!(matches!(
            "nan".parse::<MaxAge>(),
            Err(ParseMaxAgeError::NotANumber(_))
        ));
    }

    #[test]
    fn parse_rejects_negative() {
        assert!(matches!(
            "-1".parse::<MaxAge>(),
            Err(ParseMaxAgeError::Negative(_))
        ));
        assert!(matches!(
            "-inf".parse::<MaxAge>(),
            Err(ParseMaxAgeError::Negative(_))
        ));
    }

    #[test]
    fn jittered_default_stays_in_window() {
        for _ in 0..50 {
            let secs = MaxAge::jittered_default().as_secs_f64();
            assert!((290.0..=310.0).contains(&secs), "got {secs}");
        }
    }

    #[test]
    fn jittered_default_spreads_across_window() {
        let draws: std::collections::HashSet<u64> = (0..200)
            .map(|_| match MaxAge::jittered_default() {
                MaxAge::Finite(d) => d.as_secs(),
                MaxAge::Infinite => panic!("default must be finite"),
            })
            .collect();
        assert!(draws.len() > 1, "all draws were {draws:?}");
    }

    #[test]
    fn infinite_as_secs() {
        assert!(MaxAge::Infinite.as_secs_f64().is_infinite());
    }

    #[test]
    fn identity_display() {
        let id = CacheIdentity::new("https://example.com/cfg.git", "master");
        assert_eq!(id.to_string(), "https://example.com/cfg.git@master");
    }
}
