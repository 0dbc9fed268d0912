use std::num::NonZeroUsize;
use std::sync::Arc;

use swc_config::defaults::REMOVE_PARALLELISM;
use swc_core::tools::Remover;
use tracing::info;

use crate::cli::RemoveArgs;
use crate::client::{AppContext, CliResult, require_clean, shutdown_signal};
use crate::output::{render_removal_plan, render_removal_report};

pub(crate) async fn handle_remove(ctx: &AppContext, args: RemoveArgs) -> CliResult<()> {
    let remover = Remover::new(Arc::clone(&ctx.store), ctx.metrics.clone());
    let plan = remover.plan(&args.container, args.prefix.as_deref()).await?;

    if !args.force {
        render_removal_plan(&plan, ctx.output)?;
        info!(objects = plan.objects.len(), "dry run; pass --force to delete");
        return Ok(());
    }

    let parallelism = args
        .parallelism
        .or_else(|| NonZeroUsize::new(REMOVE_PARALLELISM))
        .unwrap_or(NonZeroUsize::MIN);
    let report = remover.execute(&plan, parallelism, shutdown_signal()).await?;
    render_removal_report(&plan, &report, ctx.output)?;
    require_clean("deletions", &report.objects)
}
