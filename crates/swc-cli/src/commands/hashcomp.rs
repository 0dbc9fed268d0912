use anyhow::anyhow;
use swc_core::tools::{HashSource, compare_hash};
use tracing::debug;

use crate::cli::HashcompArgs;
use crate::client::{AppContext, CliError, CliResult};
use crate::output::render_hash_comparison;

pub(crate) async fn handle_hashcomp(ctx: &AppContext, args: HashcompArgs) -> CliResult<()> {
    let source = HashSource::from_argument(&args.source)?;
    debug!(source = ?source, object = %args.object, "comparing checksums");

    let comparison = compare_hash(ctx.store.as_ref(), &args.container, &args.object, &source).await?;
    render_hash_comparison(&comparison, ctx.output)?;

    if comparison.matches() {
        Ok(())
    } else {
        Err(CliError::failure(anyhow!(
            "{} does not match {}",
            args.source,
            args.object
        )))
    }
}
