use crate::{
    domain::{self, PatternError},
    hsts::HstsConfig,
    labels::{Labels, Selector, SelectorError},
};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A cluster-wide HSTS requirement for routes in matching namespaces and
/// domains.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    /// Restricts the requirement to namespaces with matching labels. When
    /// unset, every namespace matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<Selector>,

    /// Regular expressions matched against the route's hostnames in full.
    #[serde(default)]
    pub domain_patterns: Vec<String>,

    #[serde(default)]
    pub max_age: MaxAgeRange,

    #[serde(
        default,
        deserialize_with = "preload::deserialize",
        serialize_with = "preload::serialize"
    )]
    #[schemars(with = "String")]
    pub preload_policy: Policy,

    #[serde(
        default,
        deserialize_with = "include_sub_domains::deserialize",
        serialize_with = "include_sub_domains::serialize"
    )]
    #[schemars(with = "String")]
    pub include_sub_domains_policy: Policy,
}

/// Inclusive bounds on `max-age`, in seconds. Negative bounds are ignored.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct MaxAgeRange {
    #[serde(
        rename = "smallestMaxAge",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub smallest: Option<i32>,

    #[serde(
        rename = "largestMaxAge",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub largest: Option<i32>,
}

/// Constrains whether a boolean HSTS directive must be present.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Policy {
    #[default]
    NoOpinion,
    Require,
    RequireNot,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("max-age {max_age} exceeds maximum age {largest}")]
    ExceedsMaxAge { max_age: i32, largest: i32 },

    #[error("max-age {max_age} is below minimum age {smallest}")]
    BelowMinAge { max_age: i32, smallest: i32 },

    #[error("preload must be specified")]
    PreloadRequired,

    #[error("preload must not be specified")]
    PreloadForbidden,

    #[error("includeSubDomains must be specified")]
    IncludeSubDomainsRequired,

    #[error("includeSubDomains must not be specified")]
    IncludeSubDomainsForbidden,
}

/// A requirement whose selector or patterns could not be evaluated.
#[derive(Clone, Debug, Error)]
pub enum MatchError {
    #[error("requiredHSTSPolicies[{index}] has an invalid namespaceSelector: {source}")]
    Selector {
        index: usize,
        #[source]
        source: SelectorError,
    },

    #[error("requiredHSTSPolicies[{index}] has an invalid domain pattern: {source}")]
    Pattern {
        index: usize,
        #[source]
        source: PatternError,
    },
}

/// Returns the first requirement, in order, whose namespace selector and
/// domain patterns both match, along with its position in the list.
///
/// Evaluation stops at the first match, so a malformed requirement later in
/// the list is never reached.
pub fn select<'r, 'h, H>(
    requirements: &'r [Requirement],
    namespace: &Labels,
    hosts: H,
) -> Result<Option<(usize, &'r Requirement)>, MatchError>
where
    H: IntoIterator<Item = &'h str>,
    H::IntoIter: Clone,
{
    let hosts = hosts.into_iter();
    for (index, requirement) in requirements.iter().enumerate() {
        let ns_matches = requirement
            .matches_namespace(namespace)
            .map_err(|source| MatchError::Selector { index, source })?;
        let domain_matches = requirement
            .matches_domain(hosts.clone())
            .map_err(|source| MatchError::Pattern { index, source })?;

        if ns_matches && domain_matches {
            return Ok(Some((index, requirement)));
        }
    }

    Ok(None)
}

// === impl Requirement ===

impl Requirement {
    pub fn matches_namespace(&self, labels: &Labels) -> Result<bool, SelectorError> {
        match self.namespace_selector.as_ref() {
            None => Ok(true),
            Some(selector) => selector.matches(labels),
        }
    }

    pub fn matches_domain<'h, H>(&self, hosts: H) -> Result<bool, PatternError>
    where
        H: IntoIterator<Item = &'h str>,
        H::IntoIter: Clone,
    {
        domain::matches(&self.domain_patterns, hosts)
    }

    /// Checks a parsed HSTS configuration against this requirement, reporting
    /// the first constraint it violates.
    pub fn validate(&self, config: &HstsConfig) -> Result<(), Violation> {
        if let Some(largest) = self.max_age.largest.filter(|l| *l >= 0) {
            if config.max_age > largest {
                return Err(Violation::ExceedsMaxAge {
                    max_age: config.max_age,
                    largest,
                });
            }
        }

        if let Some(smallest) = self.max_age.smallest.filter(|s| *s >= 0) {
            if config.max_age < smallest {
                return Err(Violation::BelowMinAge {
                    max_age: config.max_age,
                    smallest,
                });
            }
        }

        match self.preload_policy {
            Policy::Require if !config.preload => return Err(Violation::PreloadRequired),
            Policy::RequireNot if config.preload => return Err(Violation::PreloadForbidden),
            _ => {}
        }

        match self.include_sub_domains_policy {
            Policy::Require if !config.include_sub_domains => {
                Err(Violation::IncludeSubDomainsRequired)
            }
            Policy::RequireNot if config.include_sub_domains => {
                Err(Violation::IncludeSubDomainsForbidden)
            }
            _ => Ok(()),
        }
    }
}

// === impl Policy ===

impl Policy {
    /// Reads a policy from its API representation. Empty and unknown values
    /// express no opinion.
    fn from_api(value: &str, require: &str, require_not: &str) -> Self {
        if value == require {
            Self::Require
        } else if value == require_not {
            Self::RequireNot
        } else {
            Self::NoOpinion
        }
    }

    fn to_api<'a>(self, require: &'a str, require_not: &'a str) -> &'a str {
        match self {
            Self::NoOpinion => "NoOpinion",
            Self::Require => require,
            Self::RequireNot => require_not,
        }
    }
}

mod preload {
    use super::*;

    const REQUIRE: &str = "RequirePreload";
    const REQUIRE_NOT: &str = "RequireNoPreload";

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Policy, D::Error> {
        let value = Option::<String>::deserialize(d)?.unwrap_or_default();
        Ok(Policy::from_api(&value, REQUIRE, REQUIRE_NOT))
    }

    pub(super) fn serialize<S: Serializer>(policy: &Policy, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(policy.to_api(REQUIRE, REQUIRE_NOT))
    }
}

mod include_sub_domains {
    use super::*;

    const REQUIRE: &str = "RequireIncludeSubDomains";
    const REQUIRE_NOT: &str = "RequireNoIncludeSubDomains";

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Policy, D::Error> {
        let value = Option::<String>::deserialize(d)?.unwrap_or_default();
        Ok(Policy::from_api(&value, REQUIRE, REQUIRE_NOT))
    }

    pub(super) fn serialize<S: Serializer>(policy: &Policy, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(policy.to_api(REQUIRE, REQUIRE_NOT))
    }
}

#[cfg(test)]
mod tests;
