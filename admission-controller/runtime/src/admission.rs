use crate::{
    hsts,
    index::{SharedIndex, Synced},
    k8s::{ResourceExt, Route},
    metrics::AdmissionMetrics,
};
use anyhow::{anyhow, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::{
    core::{admission::Operation, DynamicObject},
    Resource,
};
use thiserror::Error;
use tokio::{sync::watch, time};
use tracing::{debug, info, trace, warn};

const PLUGIN_NAME: &str = "route.openshift.io/RequiredRouteAnnotations";

/// Validates that created and updated routes satisfy the cluster's required
/// HSTS policies.
#[derive(Clone)]
pub struct Admission {
    index: SharedIndex,
    synced: watch::Receiver<Synced>,
    sync_timeout: time::Duration,
    metrics: AdmissionMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            let bytes = req.into_body().collect().await?.to_bytes();
            admission.review(&bytes).await
        })
    }
}

impl Admission {
    pub fn new(
        index: SharedIndex,
        sync_timeout: time::Duration,
        metrics: AdmissionMetrics,
    ) -> Self {
        let synced = index.read().synced();
        Self {
            index,
            synced,
            sync_timeout,
            metrics,
        }
    }

    /// Handles a serialized `AdmissionReview`, returning the response to send.
    async fn review(self, body: &[u8]) -> Result<Response<Body>, Error> {
        let review: AdmissionReview = match serde_json::from_slice(body) {
            Ok(review) => review,
            Err(error) => {
                warn!(%error, "Failed to parse request body");
                return json_response(AdmissionResponse::invalid(error).into_review());
            }
        };
        trace!(?review);

        let rsp = match review.try_into() {
            Ok(req) => {
                debug!(?req);
                self.admit(req).await
            }
            Err(error) => {
                warn!(%error, "Invalid admission request");
                AdmissionResponse::invalid(error)
            }
        };
        debug!(?rsp);
        json_response(rsp.into_review())
    }

    async fn admit(self, req: AdmissionRequest) -> AdmissionResponse {
        let rsp = AdmissionResponse::from(&req);
        if !is_kind::<Route>(&req) {
            return rsp;
        }
        if !matches!(req.operation, Operation::Create | Operation::Update) {
            return rsp;
        }

        let route = match parse_route(req) {
            Ok(route) => route,
            Err(error) => {
                info!(%error, "Failed to parse Route");
                return rsp.deny(error);
            }
        };
        let ns = route.namespace().unwrap_or_default();
        let name = route.name_any();

        if !self.wait_for_sync().await {
            warn!(%ns, %name, "Caches not synchronized");
            self.metrics.unavailable();
            return rsp.deny(format_args!("{PLUGIN_NAME}: caches not synchronized"));
        }

        let (requirements, labels) = {
            let index = self.index.read();
            let Some(requirements) = index.requirements() else {
                let ingress = index.ingress_name().to_string();
                drop(index);
                warn!(%ingress, "Ingress config not found");
                self.metrics.unavailable();
                return rsp.deny(format_args!(
                    "{PLUGIN_NAME}: ingress.config.openshift.io {ingress:?} not found"
                ));
            };
            (requirements, index.namespace_labels(&ns))
        };
        let Some(labels) = labels else {
            info!(%ns, %name, "Namespace not found");
            self.metrics.unavailable();
            return rsp.deny(format_args!("{PLUGIN_NAME}: namespace {ns:?} not found"));
        };

        match hsts::evaluate(&requirements, &hsts::Route::from(&route), &labels) {
            Ok(allowed) => {
                debug!(%ns, %name, ?allowed, "Admitted");
                self.metrics.allowed(&allowed);
                rsp
            }
            Err(error) => {
                if error.is_policy_misconfigured() {
                    warn!(%error, %ns, %name, "Required HSTS policy is invalid");
                } else {
                    info!(%error, %ns, %name, "Denied");
                }
                self.metrics.denied(&error);
                rsp.deny(error)
            }
        }
    }

    /// Waits for the namespace and ingress config watches to complete their
    /// initial list. Returns false if they do not within the sync timeout.
    async fn wait_for_sync(&self) -> bool {
        let mut synced = self.synced.clone();
        let ready = matches!(
            time::timeout(self.sync_timeout, synced.wait_for(Synced::is_ready)).await,
            Ok(Ok(_))
        );
        ready
    }
}

fn is_kind<T>(req: &AdmissionRequest) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    req.kind.group.eq_ignore_ascii_case(&T::group(&dt))
        && req.kind.kind.eq_ignore_ascii_case(&T::kind(&dt))
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

fn parse_route(req: AdmissionRequest) -> Result<Route> {
    let obj = req
        .object
        .ok_or_else(|| anyhow!("admission request missing 'object'"))?;
    let mut route = serde_json::from_value::<Route>(serde_json::to_value(obj)?)?;
    if route.meta().namespace.is_none() {
        route.meta_mut().namespace = req.namespace;
    }
    Ok(route)
}
