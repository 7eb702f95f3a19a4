//! # GitOps Renderer
//!
//! Renders every configured cluster's source tree and exits non-zero when any
//! file or cluster failed.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Duration;
use clap::Parser;
use gitops_renderer::cli::{Cli, VERSION};
use gitops_renderer::config::{ClusterConfig, RendererConfig, RuntimeSettings};
use gitops_renderer::discovery::DiscoveryOptions;
use gitops_renderer::logging::init_tracing;
use gitops_renderer::provider::aws::{load_sdk_config, AwsIamBackend, AwsSecretLookup};
use gitops_renderer::provider::cluster::KubeCluster;
use gitops_renderer::provider::kubeseal::KubesealSealer;
use gitops_renderer::provider::{ClusterBackend, IamBackend, Offline, SecretLookup};
use gitops_renderer::render::{FunctionRegistry, TemplateRenderer};
use gitops_renderer::rewrite::{IamAuthRewriter, RestartMarker, RewriteOptions, RewritePipeline};
use gitops_renderer::runner::{run_cluster, ClusterRunError, RunContext};
use gitops_renderer::sink::ResourceSink;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

// Secret lookups block inside template rendering, which needs worker threads
#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|provider| anyhow!("Failed to install rustls crypto provider, already set: {provider:?}"))?;

    let cli = Cli::parse();
    let settings = RuntimeSettings::from_env();
    init_tracing(&settings);
    info!(version = VERSION, "Starting gitops-renderer");

    let config = RendererConfig::load(&cli.config)?;
    let clusters = config.select(&cli.clusters)?;

    let mut failed = 0;
    for cluster in clusters {
        let span = info_span!("cluster", name = %cluster.name);
        let outcome = async {
            let mut ctx = build_context(&cli, &settings, cluster).await?;
            run_cluster(&mut ctx).await.map_err(anyhow::Error::from)
        }
        .instrument(span)
        .await;

        match outcome {
            Ok(report) => {
                println!("{}: {report}", cluster.name);
                for failure in &report.failures {
                    println!("  error: {failure}");
                }
                if !report.is_success() {
                    failed += 1;
                }
            }
            Err(err) => {
                if let Some(ClusterRunError::Invariant { report, .. }) = err.downcast_ref() {
                    println!("{}: {report} (aborted)", cluster.name);
                }
                error!(cluster = %cluster.name, "Cluster run failed: {err:#}");
                println!("{}: failed: {err:#}", cluster.name);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} cluster(s) had failures");
    }
    Ok(())
}

/// Build the per-cluster capabilities. Clients are only created when the run
/// can reach them.
async fn build_context(
    cli: &Cli,
    settings: &RuntimeSettings,
    cluster: &ClusterConfig,
) -> Result<RunContext> {
    let skip_secrets = cli.skip_secrets();
    let needs_cluster = !cli.disable_api && (cli.apply || !skip_secrets);

    let (iam, secrets): (Arc<dyn IamBackend>, Arc<dyn SecretLookup>) = if skip_secrets {
        (Arc::new(Offline), Arc::new(Offline))
    } else {
        let sdk_config = load_sdk_config(&cluster.aws_region).await;
        (
            Arc::new(AwsIamBackend::new(&sdk_config)),
            Arc::new(AwsSecretLookup::new(&sdk_config)),
        )
    };

    let kube: Arc<dyn ClusterBackend> = if needs_cluster {
        Arc::new(
            KubeCluster::connect(cluster.kube_context.as_deref())
                .await
                .with_context(|| format!("Failed to connect to cluster {}", cluster.name))?,
        )
    } else {
        Arc::new(Offline)
    };

    let registry = FunctionRegistry::standard().with_secrets(secrets, skip_secrets);
    let renderer = TemplateRenderer::new(&registry).context("Failed to build template renderer")?;

    let mut iam_auth = IamAuthRewriter::new(iam, Arc::clone(&kube))
        .with_max_key_age(Duration::days(settings.max_key_age_days));
    if let (Some(sealing), false) = (&cluster.sealing, skip_secrets) {
        let sealer = KubesealSealer::new(
            &settings.kubeseal_path,
            &sealing.controller_name,
            &sealing.controller_namespace,
            cluster.kube_context.clone(),
        )?;
        iam_auth = iam_auth.with_sealer(Arc::new(sealer));
    }
    let pipeline = RewritePipeline::new()
        .with_routine(iam_auth)
        .with_routine(RestartMarker::default());

    let sink = if cli.apply && !cli.disable_api {
        ResourceSink::live(kube)
    } else {
        ResourceSink::files(&cluster.deploy_dir)
    };

    info!(
        skip_secrets = skip_secrets,
        live = cli.apply && !cli.disable_api,
        routines = ?pipeline.routine_names(),
        "Prepared cluster run"
    );

    Ok(RunContext {
        cluster: cluster.name.clone(),
        source_dir: cluster.source_dir.clone(),
        discovery: DiscoveryOptions {
            exclude: cluster.exclude.clone(),
            pattern: cli.pattern.clone(),
            trash: cli.trash,
        },
        renderer,
        pipeline,
        rewrite_options: RewriteOptions { skip_secrets },
        sink,
    })
}
