use regex::Regex;
use std::{num::ParseIntError, sync::LazyLock};
use thiserror::Error;

static MAX_AGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"max-age=([0-9]+)").expect("max-age pattern must compile"));

/// HSTS settings parsed from a route's annotation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HstsConfig {
    pub max_age: i32,
    pub preload: bool,
    pub include_sub_domains: bool,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error("max-age must be set in HSTS annotation")]
    MissingMaxAge,

    #[error("invalid max-age: {0}")]
    InvalidMaxAge(#[from] ParseIntError),
}

// === impl HstsConfig ===

impl HstsConfig {
    /// Parses an HSTS header value, e.g. `max-age=31536000;includeSubDomains;preload`.
    ///
    /// Tokens are separated by `;` and compared case-insensitively. Spaces are
    /// dropped before parsing and unrecognized tokens are ignored. `max-age` is
    /// mandatory; only its first occurrence is considered.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let normalized = value.replace(' ', "").to_lowercase();

        let mut config = Self::default();
        for token in normalized.split(';') {
            match token {
                "includesubdomains" => config.include_sub_domains = true,
                "preload" => config.preload = true,
                _ => {}
            }
        }

        let digits = MAX_AGE
            .captures(&normalized)
            .and_then(|c| c.get(1))
            .ok_or(ParseError::MissingMaxAge)?;
        config.max_age = digits.as_str().parse()?;

        Ok(config)
    }
}
