//! Point-in-time snapshots of the cluster state that HSTS admission reads.
//!
//! The index is fed by namespace and ingress-config watches through
//! [`kubert::index::cluster`]. Admission handlers read namespace labels and
//! the required HSTS policies from it, and wait on [`Synced`] before trusting
//! either.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

use ahash::AHashMap as HashMap;
use hsts_admission_core::{Labels, Requirement};
use hsts_admission_k8s_api::{self as k8s, ResourceExt};
use kubert::index::{ClusterRemoved, IndexClusterResource};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;


pub type SharedIndex = Arc<RwLock<Index>>;

#[derive(Debug)]
pub struct Index {
    /// The name of the ingress config that holds required HSTS policies.
    ingress_name: String,

    namespaces: HashMap<String, Labels>,

    /// Unset until the ingress config has been observed.
    requirements: Option<Arc<[Requirement]>>,

    synced: watch::Sender<Synced>,
}

/// Tracks which watches have completed their initial list.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Synced {
    pub namespaces: bool,
    pub ingress: bool,
}

// === impl Index ===

impl Index {
    pub fn shared(ingress_name: impl ToString) -> SharedIndex {
        let (synced, _) = watch::channel(Synced::default());
        Arc::new(RwLock::new(Self {
            ingress_name: ingress_name.to_string(),
            namespaces: HashMap::default(),
            requirements: None,
            synced,
        }))
    }

    pub fn ingress_name(&self) -> &str {
        &self.ingress_name
    }

    pub fn namespace_labels(&self, name: &str) -> Option<Labels> {
        self.namespaces.get(name).cloned()
    }

    /// Returns the ordered list of required HSTS policies, or `None` if the
    /// ingress config does not exist.
    pub fn requirements(&self) -> Option<Arc<[Requirement]>> {
        self.requirements.clone()
    }

    pub fn synced(&self) -> watch::Receiver<Synced> {
        self.synced.subscribe()
    }
}

impl IndexClusterResource<k8s::Namespace> for Index {
    fn apply(&mut self, ns: k8s::Namespace) {
        let name = ns.name_unchecked();
        let labels = Labels::from(ns.metadata.labels);
        tracing::trace!(%name, ?labels, "Indexing namespace");
        self.namespaces.insert(name, labels);
    }

    fn delete(&mut self, name: String) {
        tracing::trace!(%name, "Removing namespace");
        self.namespaces.remove(&name);
    }

    fn reset(&mut self, namespaces: Vec<k8s::Namespace>, removed: ClusterRemoved) {
        for ns in namespaces {
            IndexClusterResource::<k8s::Namespace>::apply(self, ns);
        }
        for name in removed {
            IndexClusterResource::<k8s::Namespace>::delete(self, name);
        }
        tracing::debug!(namespaces = self.namespaces.len(), "Namespaces synced");
        self.synced.send_modify(|s| s.namespaces = true);
    }
}

impl IndexClusterResource<k8s::Ingress> for Index {
    fn apply(&mut self, ingress: k8s::Ingress) {
        if ingress.name_unchecked() != self.ingress_name {
            return;
        }
        let requirements = ingress.spec.required_hsts_policies;
        tracing::info!(
            name = %self.ingress_name,
            requirements = requirements.len(),
            "Updated required HSTS policies"
        );
        self.requirements = Some(requirements.into());
    }

    fn delete(&mut self, name: String) {
        if name != self.ingress_name {
            return;
        }
        tracing::info!(%name, "Ingress config deleted");
        self.requirements = None;
    }

    fn reset(&mut self, ingresses: Vec<k8s::Ingress>, removed: ClusterRemoved) {
        for ingress in ingresses {
            IndexClusterResource::<k8s::Ingress>::apply(self, ingress);
        }
        for name in removed {
            IndexClusterResource::<k8s::Ingress>::delete(self, name);
        }
        self.synced.send_modify(|s| s.ingress = true);
    }
}

// === impl Synced ===

impl Synced {
    pub fn is_ready(&self) -> bool {
        self.namespaces && self.ingress
    }
}
