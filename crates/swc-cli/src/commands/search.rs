use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use swc_config::defaults::SEARCH_PARALLELISM;
use swc_core::tools::{SearchQuery, Searcher};

use crate::cli::{OutputFormat, SearchArgs};
use crate::client::{AppContext, CliResult, require_clean, shutdown_signal};
use crate::output::render_search_hit;

pub(crate) async fn handle_search(ctx: &AppContext, args: SearchArgs) -> CliResult<()> {
    let query = SearchQuery {
        pattern: args.pattern,
        ignore_case: args.ignore_case,
        name_glob: args.name_glob,
        skip_binary: args.skip_binary,
        max_object_bytes: args.max_object_bytes,
    };
    let parallelism = args
        .parallelism
        .or_else(|| NonZeroUsize::new(SEARCH_PARALLELISM))
        .unwrap_or(NonZeroUsize::MIN);

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let format = ctx.output;
    let searcher = Searcher::new(Arc::clone(&ctx.store), ctx.metrics.clone());
    let report = searcher
        .run(
            &args.container,
            args.prefix.as_deref().filter(|prefix| !prefix.is_empty()),
            &query,
            parallelism,
            move |hit| {
                counter.fetch_add(1, Ordering::Relaxed);
                render_search_hit(&hit, format);
            },
            shutdown_signal(),
        )
        .await?;

    if format == OutputFormat::Table {
        println!(
            "{} matches in {} objects searched",
            hits.load(Ordering::Relaxed),
            report.completed
        );
    }
    require_clean("object reads", &report)
}

#[cfg(test)]
mod tests {
    use super::*;

    use swc_test_support::mocks::MemoryStore;

    use crate::client::tests::memory_context;

    type TestResult<T> = anyhow::Result<T>;

    fn args(pattern: &str) -> SearchArgs {
        SearchArgs {
            container: "logs".to_string(),
            pattern: pattern.to_string(),
            prefix: None,
            ignore_case: false,
            name_glob: None,
            skip_binary: false,
            max_object_bytes: None,
            parallelism: None,
        }
    }

    #[tokio::test]
    async fn searches_every_selected_object() -> TestResult<()> {
        let memory = Arc::new(MemoryStore::new());
        memory.put_object("logs", "a.txt", &b"all good"[..]);
        memory.put_object("logs", "b.txt", &b"request timeout after 30s"[..]);
        let ctx = memory_context(&memory, OutputFormat::Table)?;

        handle_search(&ctx, args("timeout")).await?;

        assert_eq!(ctx.metrics.snapshot().jobs_completed, 2);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_regex_is_a_validation_error() -> TestResult<()> {
        let memory = Arc::new(MemoryStore::new());
        memory.put_object("logs", "a.txt", &b"x"[..]);
        let ctx = memory_context(&memory, OutputFormat::Json)?;
        let mut search = args("(unclosed");
        search.ignore_case = true;

        let Err(err) = handle_search(&ctx, search).await else {
            anyhow::bail!("expected a pattern error");
        };
        assert_eq!(err.exit_code(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_objects_fail_the_command() -> TestResult<()> {
        let memory = Arc::new(MemoryStore::new());
        memory.put_object("logs", "a.txt", &b"fine"[..]);
        memory.put_object("logs", "b.txt", &b"broken"[..]);
        memory.fail_on("b.txt");
        let ctx = memory_context(&memory, OutputFormat::Table)?;

        let Err(err) = handle_search(&ctx, args("fine")).await else {
            anyhow::bail!("expected partial failure");
        };
        assert_eq!(err.exit_code(), 3);
        Ok(())
    }
}
