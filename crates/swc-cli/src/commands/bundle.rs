use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use swc_config::{
    ArchiveSettings, BuildFailurePolicy, ExtractSettings, resolve_directory,
};
use swc_core::{ArchivePipeline, ExtractPipeline, detect_archiver};
use tracing::info;

use crate::cli::{BundleArgs, normalize_prefix};
use crate::client::{AppContext, CliError, CliResult, require_clean, shutdown_signal};
use crate::output::render_run_summary;

pub(crate) async fn handle_bundle(ctx: &AppContext, args: BundleArgs) -> CliResult<()> {
    let temp_dir = resolve_directory(&args.temp_dir.clone().unwrap_or_else(std::env::temp_dir))?;
    let failure_policy = if args.best_effort {
        BuildFailurePolicy::BestEffort
    } else {
        BuildFailurePolicy::Abort
    };

    if args.extract {
        let local_dir = prepare_restore_dir(&args.local_dir)?;
        let mut settings = ExtractSettings::new(local_dir, args.container, temp_dir);
        settings.prefix = normalize_prefix(args.prefix.as_deref());
        settings.no_hidden = args.no_hidden;
        settings.failure_policy = failure_policy;
        if let Some(parallelism) = args.parallelism {
            settings.parallelism = parallelism;
        }
        return extract(ctx, &settings).await;
    }

    let local_dir = resolve_directory(&args.local_dir)?;
    let mut settings = ArchiveSettings::new(local_dir, args.container, temp_dir);
    settings.prefix = normalize_prefix(args.prefix.as_deref());
    settings.walk.no_hidden = args.no_hidden;
    settings.subtree = args.subtree;
    settings.metadata = args.metadata;
    settings.bundle_threshold = args.bundle_threshold;
    settings.failure_policy = failure_policy;
    if let Some(parallelism) = args.parallelism {
        settings.parallelism = parallelism;
    }
    if let Some(segment_size) = args.segment_size {
        settings.segment_size = segment_size;
    }
    archive(ctx, &settings).await
}

async fn archive(ctx: &AppContext, settings: &ArchiveSettings) -> CliResult<()> {
    let archiver = detect_archiver(settings.inline_member_limit);
    info!(
        archiver = archiver.name(),
        local_dir = %settings.local_dir.display(),
        container = %settings.container,
        "archiving directory tree"
    );
    let pipeline = ArchivePipeline::new(Arc::clone(&ctx.store), archiver, ctx.metrics.clone());
    let report = pipeline.run(settings, shutdown_signal()).await?;
    render_run_summary("bundle.archive", &report, &ctx.metrics.snapshot(), ctx.output)?;
    require_clean("archives", &report)
}

async fn extract(ctx: &AppContext, settings: &ExtractSettings) -> CliResult<()> {
    let archiver = detect_archiver(swc_config::defaults::INLINE_MEMBER_LIMIT);
    info!(
        archiver = archiver.name(),
        local_dir = %settings.local_dir.display(),
        container = %settings.container,
        "restoring directory tree"
    );
    let pipeline = ExtractPipeline::new(Arc::clone(&ctx.store), archiver, ctx.metrics.clone());
    let report = pipeline.run(settings, shutdown_signal()).await?;
    render_run_summary("bundle.extract", &report, &ctx.metrics.snapshot(), ctx.output)?;
    require_clean("archives", &report)
}

fn prepare_restore_dir(path: &Path) -> CliResult<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create {}", path.display()))
        .map_err(CliError::failure)?;
    Ok(resolve_directory(path)?)
}
