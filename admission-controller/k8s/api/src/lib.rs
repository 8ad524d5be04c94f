#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod config;
pub mod route;

pub use self::{
    config::{Ingress, IngressSpec},
    route::{Route, RouteSpec, RouteStatus},
};
pub use k8s_openapi::api::core::v1::Namespace;
pub use kube::{
    api::{ObjectMeta, ResourceExt},
    runtime::watcher,
};
