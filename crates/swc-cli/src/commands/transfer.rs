use std::sync::Arc;

use anyhow::Context;
use swc_config::{DownloadSettings, resolve_directory};
use swc_core::DownloadPipeline;

use crate::cli::PgetArgs;
use crate::client::{AppContext, CliError, CliResult, require_clean, shutdown_signal};
use crate::output::render_run_summary;

pub(crate) async fn handle_pget(ctx: &AppContext, args: PgetArgs) -> CliResult<()> {
    std::fs::create_dir_all(&args.target_dir)
        .with_context(|| format!("failed to create {}", args.target_dir.display()))
        .map_err(CliError::failure)?;
    let target_dir = resolve_directory(&args.target_dir)?;

    let mut settings = DownloadSettings::new(args.container, args.objects, target_dir);
    if let Some(parallelism) = args.parallelism {
        settings.parallelism = parallelism;
    }

    let pipeline = DownloadPipeline::new(Arc::clone(&ctx.store), ctx.metrics.clone());
    let report = pipeline.run(&settings, shutdown_signal()).await?;
    render_run_summary("pget", &report, &ctx.metrics.snapshot(), ctx.output)?;
    require_clean("downloads", &report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    use swc_test_support::mocks::MemoryStore;
    use tempfile::TempDir;

    use crate::cli::OutputFormat;
    use crate::client::tests::memory_context;

    type TestResult<T> = anyhow::Result<T>;

    #[tokio::test]
    async fn downloads_into_a_new_target_directory() -> TestResult<()> {
        let temp = TempDir::new()?;
        let memory = Arc::new(MemoryStore::new());
        memory.put_segmented("c", "runs/big.bin", ".segments_c", &[b"aaaa", b"bbbb", b"cccc"]);
        memory.put_object("c", "notes.txt", &b"hello"[..]);
        let ctx = memory_context(&memory, OutputFormat::Table)?;
        let target = temp.path().join("fresh/out");

        handle_pget(
            &ctx,
            PgetArgs {
                container: "c".to_string(),
                objects: vec!["runs/big.bin".to_string(), "notes.txt".to_string()],
                target_dir: target.clone(),
                parallelism: NonZeroUsize::new(2),
            },
        )
        .await?;

        assert_eq!(std::fs::read(target.join("runs/big.bin"))?, b"aaaabbbbcccc");
        assert_eq!(std::fs::read(target.join("notes.txt"))?, b"hello");
        assert_eq!(ctx.metrics.snapshot().bytes_downloaded, 17);
        Ok(())
    }

    #[tokio::test]
    async fn missing_objects_fail_the_command() -> TestResult<()> {
        let temp = TempDir::new()?;
        let memory = Arc::new(MemoryStore::new());
        memory.put_object("c", "present.txt", &b"x"[..]);
        let ctx = memory_context(&memory, OutputFormat::Json)?;

        let result = handle_pget(
            &ctx,
            PgetArgs {
                container: "c".to_string(),
                objects: vec!["present.txt".to_string(), "absent.txt".to_string()],
                target_dir: temp.path().to_path_buf(),
                parallelism: None,
            },
        )
        .await;

        let Err(err) = result else {
            anyhow::bail!("expected partial failure");
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.display_message(), "1 of 2 downloads failed");
        assert!(temp.path().join("present.txt").exists());
        Ok(())
    }
}
