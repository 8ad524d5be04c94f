use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[error("invalid domain pattern {pattern:?}: {source}")]
pub struct PatternError {
    pattern: String,
    #[source]
    source: regex::Error,
}

/// Returns true if any pattern matches any of the hostnames in full.
///
/// Patterns are regular expressions authored by cluster operators, e.g.
/// `.*\.example\.com`. Each is anchored at both ends. Patterns are tried in
/// order and the first match wins.
pub fn matches<'h, P, H>(patterns: P, hosts: H) -> Result<bool, PatternError>
where
    P: IntoIterator,
    P::Item: AsRef<str>,
    H: IntoIterator<Item = &'h str>,
    H::IntoIter: Clone,
{
    let hosts = hosts.into_iter();
    for pattern in patterns {
        let regex = anchored(pattern.as_ref())?;
        if hosts.clone().any(|host| regex.is_match(host)) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn anchored(pattern: &str) -> Result<Regex, PatternError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| PatternError {
        pattern: pattern.to_string(),
        source,
    })
}

impl PatternError {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
