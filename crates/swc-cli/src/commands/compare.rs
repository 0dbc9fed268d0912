use anyhow::anyhow;
use swc_config::resolve_directory;
use swc_core::tools::compare_sizes;

use crate::cli::{CompareArgs, normalize_prefix};
use crate::client::{AppContext, CliError, CliResult};
use crate::output::render_size_comparison;

pub(crate) async fn handle_compare(ctx: &AppContext, args: CompareArgs) -> CliResult<()> {
    let local_dir = resolve_directory(&args.local_dir)?;
    let prefix = normalize_prefix(args.prefix.as_deref()).map(|prefix| format!("{prefix}/"));

    let comparison =
        compare_sizes(ctx.store.as_ref(), &local_dir, &args.container, prefix.as_deref()).await?;
    render_size_comparison(&comparison, ctx.output)?;

    if comparison.identical() {
        Ok(())
    } else {
        Err(CliError::failure(anyhow!(
            "local folder holds {} bytes, store holds {} bytes",
            comparison.local_bytes,
            comparison.store_bytes
        )))
    }
}
