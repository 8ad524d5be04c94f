#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use hsts_admission_core as hsts;
pub use hsts_admission_k8s_api as k8s;
pub use hsts_admission_k8s_index as index;

mod admission;
mod args;
mod metrics;

pub use self::{admission::Admission, args::Args, metrics::AdmissionMetrics};
