#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod domain;
pub mod evaluate;
pub mod hsts;
pub mod labels;
pub mod requirement;

pub use self::{
    evaluate::{evaluate, Allowed, Error, Route, Termination},
    hsts::HstsConfig,
    labels::{Labels, Selector},
    requirement::{MaxAgeRange, Policy, Requirement},
};

/// The route annotation carrying the HSTS header value.
pub const HSTS_ANNOTATION: &str = "haproxy.router.openshift.io/hsts_header";
