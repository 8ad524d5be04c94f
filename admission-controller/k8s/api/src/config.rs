use hsts_admission_core::Requirement;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cluster-wide ingress configuration. The instance named `cluster` holds the
/// HSTS requirements that routes are admitted against.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(group = "config.openshift.io", version = "v1", kind = "Ingress")]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    #[serde(default)]
    pub domain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apps_domain: Option<String>,

    /// Evaluated in order; the first requirement matching a route applies.
    #[serde(rename = "requiredHSTSPolicies", default)]
    pub required_hsts_policies: Vec<Requirement>,
}
