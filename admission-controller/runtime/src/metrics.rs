use crate::hsts::{Allowed, Error};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// Counts admission decisions by outcome.
///
/// Denials caused by malformed cluster policy carry their own reasons so that
/// they can be told apart from routes that violate a well-formed policy.
#[derive(Clone, Debug, Default)]
pub struct AdmissionMetrics {
    decisions: Family<DecisionLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct DecisionLabels {
    decision: &'static str,
    reason: &'static str,
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let decisions = Family::<DecisionLabels, Counter>::default();
        reg.register(
            "decisions",
            "Total number of route admission decisions",
            decisions.clone(),
        );
        Self { decisions }
    }

    pub(crate) fn allowed(&self, allowed: &Allowed) {
        let reason = match allowed {
            Allowed::NotTerminated(_) => "not_terminated",
            Allowed::NoRequirement => "no_requirement",
            Allowed::Compliant { .. } => "compliant",
        };
        self.inc("allow", reason);
    }

    pub(crate) fn denied(&self, error: &Error) {
        self.inc("deny", error.kind());
    }

    /// Records a denial issued because cluster state could not be read.
    pub(crate) fn unavailable(&self) {
        self.inc("deny", "unavailable");
    }

    fn inc(&self, decision: &'static str, reason: &'static str) {
        self.decisions
            .get_or_create(&DecisionLabels { decision, reason })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn count(&self, decision: &'static str, reason: &'static str) -> u64 {
        self.decisions
            .get_or_create(&DecisionLabels { decision, reason })
            .get()
    }
}
