use crate::{
    hsts::{HstsConfig, ParseError},
    labels::Labels,
    requirement::{self, MatchError, Requirement, Violation},
    HSTS_ANNOTATION,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// The parts of a route that HSTS admission depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    pub host: String,
    /// Hostnames reported in the route's ingress status.
    pub ingress_hosts: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub termination: Option<Termination>,
}

/// Where the route's TLS connection is terminated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    Edge,
    Reencrypt,
    Passthrough,
    #[serde(other)]
    Unknown,
}

/// Why a route was admitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Allowed {
    /// The router does not terminate TLS for the route, so it never sends an
    /// HSTS header.
    NotTerminated(Termination),

    /// No requirement applies to the route.
    NoRequirement,

    /// The route satisfies the requirement at `index`.
    Compliant { index: usize, config: HstsConfig },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("termination type is empty, must be edge or reencrypt")]
    MissingTermination,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("HSTS annotation does not satisfy required policy: {0}")]
    Violation(#[from] Violation),
}

/// Decides whether a route's HSTS annotation satisfies the cluster's required
/// HSTS policies.
///
/// Only the first requirement that matches the route's namespace and hosts is
/// enforced. Routes that match no requirement are admitted.
pub fn evaluate(
    requirements: &[Requirement],
    route: &Route,
    namespace: &Labels,
) -> Result<Allowed, Error> {
    match route.termination.as_ref() {
        None => return Err(Error::MissingTermination),
        Some(Termination::Edge | Termination::Reencrypt) => {}
        Some(termination) => {
            info!(route = %route.name, ?termination, "HSTS policy not applied to route");
            return Ok(Allowed::NotTerminated(termination.clone()));
        }
    }

    let Some((index, requirement)) = requirement::select(requirements, namespace, route.hosts())?
    else {
        debug!(route = %route.name, "No required HSTS policy matches route");
        return Ok(Allowed::NoRequirement);
    };
    debug!(route = %route.name, index, "Route matches required HSTS policy");

    let config = HstsConfig::parse(route.hsts_header().unwrap_or_default())?;
    requirement.validate(&config)?;
    Ok(Allowed::Compliant { index, config })
}

// === impl Route ===

impl Route {
    /// The route's host followed by any hosts reported in its status.
    pub fn hosts(&self) -> impl Iterator<Item = &str> + Clone {
        std::iter::once(self.host.as_str()).chain(self.ingress_hosts.iter().map(String::as_str))
    }

    pub fn hsts_header(&self) -> Option<&str> {
        self.annotations.get(HSTS_ANNOTATION).map(String::as_str)
    }
}

// === impl Error ===

impl Error {
    /// A stable label for the error's category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingTermination => "config",
            Self::Parse(_) => "parse",
            Self::Match(MatchError::Selector { .. }) => "selector",
            Self::Match(MatchError::Pattern { .. }) => "pattern",
            Self::Violation(_) => "violation",
        }
    }

    /// Indicates whether the error stems from cluster policy rather than the
    /// route being admitted.
    pub fn is_policy_misconfigured(&self) -> bool {
        matches!(self, Self::Match(_))
    }
}
