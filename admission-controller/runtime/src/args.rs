use crate::{
    admission::Admission,
    index::Index,
    k8s::{self, watcher},
    metrics::AdmissionMetrics,
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "hsts-admission",
    about = "Admits routes that satisfy the cluster's required HSTS policies"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "hsts_admission=info,warn",
        env = "HSTS_ADMISSION_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// The name of the ingress config that holds required HSTS policies.
    #[clap(long, default_value = "cluster")]
    ingress_config_name: String,

    /// How long a review waits for the initial namespace and ingress config
    /// lists before it is denied.
    #[clap(long, default_value = "10")]
    cache_sync_timeout_secs: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            ingress_config_name,
            cache_sync_timeout_secs,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let mut prom = <Registry>::default();
        let metrics = AdmissionMetrics::register(prom.sub_registry_with_prefix("hsts_admission"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        let index = Index::shared(&ingress_config_name);

        // Spawn resource watches.

        let namespaces = runtime.watch_all::<k8s::Namespace>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(index.clone(), namespaces).instrument(info_span!("namespaces")),
        );

        // Only the named ingress config carries required HSTS policies.
        let ingresses = runtime.watch_all::<k8s::Ingress>(
            watcher::Config::default().fields(&format!("metadata.name={ingress_config_name}")),
        );
        tokio::spawn(
            kubert::index::cluster(index.clone(), ingresses)
                .instrument(info_span!("ingresses.config.openshift.io")),
        );

        info!(ingress = %ingress_config_name, "Admitting routes against required HSTS policies");
        let admission = Admission::new(
            index,
            Duration::from_secs(cache_sync_timeout_secs),
            metrics,
        );
        let runtime = runtime.spawn_server(move || admission.clone());

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
