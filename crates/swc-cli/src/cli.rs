//! Argument parsing and command dispatch for the `swc` binary.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use swc_config::{
    CredentialOverrides, ObjectMetadata, parse_metadata, parse_parallelism, parse_size,
};
use swc_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, Metrics, init_logging};
use tracing::debug;

use crate::client::{AppContext, CliError, CliResult, config_message};
use crate::commands::bundle::handle_bundle;
use crate::commands::compare::handle_compare;
use crate::commands::hashcomp::handle_hashcomp;
use crate::commands::remove::handle_remove;
use crate::commands::search::handle_search;
use crate::commands::transfer::handle_pget;

/// Parses CLI arguments, installs logging, executes the requested command and
/// returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format.map_or_else(LogFormat::infer, LogFormat::from),
        build_sha: option_env!("SWC_BUILD_SHA").unwrap_or("dev"),
    };
    if let Err(err) = init_logging(&logging) {
        let err = CliError::failure(err);
        eprintln!("error: {}", err.display_message());
        return err.exit_code();
    }

    match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    let command = command_label(&cli.command);
    debug!(command, "dispatching command");

    let metrics = Metrics::new().map_err(CliError::failure)?;
    let overrides = CredentialOverrides {
        auth_token: cli.auth_token,
        storage_url: cli.storage_url,
    };
    let ctx = AppContext::connect(&overrides, metrics, cli.output).await?;

    let outcome = match cli.command {
        Command::Bundle(args) => handle_bundle(&ctx, args).await,
        Command::Pget(args) => handle_pget(&ctx, args).await,
        Command::Compare(args) => handle_compare(&ctx, args).await,
        Command::Remove(args) => handle_remove(&ctx, args).await,
        Command::Hashcomp(args) => handle_hashcomp(&ctx, args).await,
        Command::Search(args) => handle_search(&ctx, args).await,
    };

    if cli.metrics {
        match ctx.metrics.render() {
            Ok(text) => eprint!("{text}"),
            Err(err) => tracing::warn!(error = %err, "failed to render metrics"),
        }
    }
    outcome
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Bundle(args) if args.extract => "bundle.extract",
        Command::Bundle(_) => "bundle.archive",
        Command::Pget(_) => "pget",
        Command::Compare(_) => "compare",
        Command::Remove(_) => "rm",
        Command::Hashcomp(_) => "hashcomp",
        Command::Search(_) => "search",
    }
}

#[derive(Parser)]
#[command(
    name = "swc",
    version,
    about = "Archive, restore and inspect directory trees in a Swift object store"
)]
pub(crate) struct Cli {
    #[arg(long, global = true, env = "SWC_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
    #[arg(long, global = true, env = "SWC_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormatArg>,
    #[arg(
        long,
        global = true,
        help = "Pre-issued auth token (overrides OS_AUTH_TOKEN)"
    )]
    auth_token: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Storage URL for the auth token (overrides OS_STORAGE_URL)"
    )]
    storage_url: Option<String>,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for results and summaries"
    )]
    output: OutputFormat,
    #[arg(
        long,
        global = true,
        help = "Print transfer counters in Prometheus text format on exit"
    )]
    metrics: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Archive a directory tree into the store, or restore one with `--extract`.
    Bundle(BundleArgs),
    /// Download objects, reassembling segmented objects in parallel.
    Pget(PgetArgs),
    /// Compare the size of a local folder with the bytes under a prefix.
    Compare(CompareArgs),
    /// Delete objects below a prefix.
    #[command(name = "rm")]
    Remove(RemoveArgs),
    /// Compare a local file or MD5 digest with a stored object.
    Hashcomp(HashcompArgs),
    /// Search object names and bodies for a pattern.
    Search(SearchArgs),
}

/// Output format for command results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Json,
    Pretty,
    Compact,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Json => Self::Json,
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Compact => Self::Compact,
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct BundleArgs {
    #[arg(short = 'l', long = "local", help = "Local directory to archive or restore into")]
    pub(crate) local_dir: PathBuf,
    #[arg(short = 'c', long)]
    pub(crate) container: String,
    #[arg(short = 'x', long, help = "Restore archives instead of creating them")]
    pub(crate) extract: bool,
    #[arg(short = 'n', long, help = "Skip hidden directories")]
    pub(crate) no_hidden: bool,
    #[arg(short = 't', long = "temp", help = "Scratch directory for archives (defaults to the system temp dir)")]
    pub(crate) temp_dir: Option<PathBuf>,
    #[arg(short = 'p', long, help = "Object name prefix (pseudo folder)")]
    pub(crate) prefix: Option<String>,
    #[arg(short = 'P', long = "parallel", value_parser = parallelism_arg)]
    pub(crate) parallelism: Option<NonZeroUsize>,
    #[arg(
        short = 'm',
        long = "meta",
        value_parser = metadata_arg,
        help = "Object metadata as key:value, may be repeated"
    )]
    pub(crate) metadata: Vec<ObjectMetadata>,
    #[arg(short = 's', long, help = "Restrict archiving to this subtree of the local directory")]
    pub(crate) subtree: Option<PathBuf>,
    #[arg(
        long = "bundle",
        value_parser = size_arg,
        help = "Bundle small files up to this size per archive (e.g. 500M, 2G)"
    )]
    pub(crate) bundle_threshold: Option<u64>,
    #[arg(long, value_parser = size_arg, help = "Segment size for large uploads")]
    pub(crate) segment_size: Option<u64>,
    #[arg(long, help = "Upload archives even when the archiver reports an error")]
    pub(crate) best_effort: bool,
}

#[derive(Args, Debug)]
pub(crate) struct PgetArgs {
    #[arg(short = 'c', long)]
    pub(crate) container: String,
    #[arg(required = true, help = "Objects to download")]
    pub(crate) objects: Vec<String>,
    #[arg(short = 'd', long = "dir", default_value = ".", help = "Target directory")]
    pub(crate) target_dir: PathBuf,
    #[arg(
        short = 'P',
        long = "parallel",
        value_parser = parallelism_arg,
        help = "Segments fetched at once per object"
    )]
    pub(crate) parallelism: Option<NonZeroUsize>,
}

#[derive(Args, Debug)]
pub(crate) struct CompareArgs {
    #[arg(short = 'l', long = "local")]
    pub(crate) local_dir: PathBuf,
    #[arg(short = 'c', long)]
    pub(crate) container: String,
    #[arg(short = 'p', long)]
    pub(crate) prefix: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct RemoveArgs {
    #[arg(short = 'c', long)]
    pub(crate) container: String,
    #[arg(
        short = 'p',
        long,
        help = "Object, pseudo folder, or raw prefix ending in '*'; omit to empty the container"
    )]
    pub(crate) prefix: Option<String>,
    #[arg(long, help = "Delete instead of listing what would be deleted")]
    pub(crate) force: bool,
    #[arg(short = 'P', long = "parallel", value_parser = parallelism_arg)]
    pub(crate) parallelism: Option<NonZeroUsize>,
}

#[derive(Args, Debug)]
pub(crate) struct HashcompArgs {
    #[arg(short = 'c', long)]
    pub(crate) container: String,
    #[arg(short = 'o', long)]
    pub(crate) object: String,
    #[arg(help = "Local file, .md5 file, or 32-character MD5 digest")]
    pub(crate) source: String,
}

#[derive(Args, Debug)]
pub(crate) struct SearchArgs {
    #[arg(short = 'c', long)]
    pub(crate) container: String,
    #[arg(help = "Literal text, or a regular expression with --ignore-case")]
    pub(crate) pattern: String,
    #[arg(short = 'p', long)]
    pub(crate) prefix: Option<String>,
    #[arg(short = 'i', long)]
    pub(crate) ignore_case: bool,
    #[arg(short = 'f', long = "file-glob", help = "Only search objects whose name matches")]
    pub(crate) name_glob: Option<String>,
    #[arg(short = 'b', long, help = "Skip bodies that look binary")]
    pub(crate) skip_binary: bool,
    #[arg(long = "max-bytes", value_parser = size_arg, help = "Skip objects larger than this")]
    pub(crate) max_object_bytes: Option<u64>,
    #[arg(short = 'P', long = "parallel", value_parser = parallelism_arg)]
    pub(crate) parallelism: Option<NonZeroUsize>,
}

fn size_arg(value: &str) -> Result<u64, String> {
    parse_size(value).map_err(|err| config_message(&err))
}

fn metadata_arg(value: &str) -> Result<ObjectMetadata, String> {
    parse_metadata(value).map_err(|err| config_message(&err))
}

fn parallelism_arg(value: &str) -> Result<NonZeroUsize, String> {
    parse_parallelism(value).map_err(|err| config_message(&err))
}

/// Trim surrounding slashes; an empty prefix means none.
pub(crate) fn normalize_prefix(prefix: Option<&str>) -> Option<String> {
    prefix
        .map(|value| value.trim_matches('/'))
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    type TestResult<T> = anyhow::Result<T>;

    fn parse(args: &[&str]) -> TestResult<Cli> {
        Ok(Cli::try_parse_from(args)?)
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bundle_flags_map_to_typed_values() -> TestResult<()> {
        let cli = parse(&[
            "swc",
            "bundle",
            "-l",
            "/data/run1",
            "-c",
            "proj",
            "-n",
            "-p",
            "backup",
            "-P",
            "8",
            "-m",
            "project:genomics",
            "-m",
            "owner:lab",
            "--bundle",
            "500M",
            "--best-effort",
        ])?;
        let Command::Bundle(args) = cli.command else {
            anyhow::bail!("expected bundle command");
        };
        assert!(!args.extract);
        assert!(args.no_hidden);
        assert!(args.best_effort);
        assert_eq!(args.local_dir, PathBuf::from("/data/run1"));
        assert_eq!(args.parallelism.map(NonZeroUsize::get), Some(8));
        assert_eq!(args.bundle_threshold, Some(500_000_000));
        assert_eq!(args.metadata.len(), 2);
        assert_eq!(args.metadata[0].key, "project");
        assert_eq!(args.metadata[1].value, "lab");
        Ok(())
    }

    #[test]
    fn no_hidden_help_names_directories_only() -> TestResult<()> {
        let command = Cli::command();
        let bundle = command
            .find_subcommand("bundle")
            .ok_or_else(|| anyhow::anyhow!("bundle subcommand missing"))?;
        let flag = bundle
            .get_arguments()
            .find(|arg| arg.get_id() == "no_hidden")
            .ok_or_else(|| anyhow::anyhow!("no_hidden flag missing"))?;
        let help = flag.get_help().map(ToString::to_string);
        assert_eq!(help.as_deref(), Some("Skip hidden directories"));
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected_at_parse_time() {
        for args in [
            &["swc", "bundle", "-l", "/d", "-c", "c", "-P", "0"][..],
            &["swc", "bundle", "-l", "/d", "-c", "c", "-m", "a:b:c"][..],
            &["swc", "bundle", "-l", "/d", "-c", "c", "--bundle", "10K"][..],
            &["swc", "pget", "-c", "c"][..],
        ] {
            assert!(Cli::try_parse_from(args).is_err(), "{args:?} should fail");
        }
    }

    #[test]
    fn global_options_apply_after_the_subcommand() -> TestResult<()> {
        let cli = parse(&[
            "swc",
            "rm",
            "-c",
            "proj",
            "--force",
            "--output",
            "json",
            "--auth-token",
            "tk",
            "--storage-url",
            "https://swift.example/v1/AUTH_a",
            "--log-format",
            "json",
        ])?;
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.auth_token.as_deref(), Some("tk"));
        assert_eq!(cli.log_format, Some(LogFormatArg::Json));
        assert_eq!(command_label(&cli.command), "rm");
        let Command::Remove(args) = cli.command else {
            anyhow::bail!("expected rm command");
        };
        assert!(args.force);
        assert!(args.prefix.is_none());
        Ok(())
    }

    #[test]
    fn search_and_pget_arguments_parse() -> TestResult<()> {
        let cli = parse(&[
            "swc", "search", "-c", "logs", "-i", "-b", "-f", "*.txt", "--max-bytes", "1G",
            "error.*timeout",
        ])?;
        let Command::Search(args) = cli.command else {
            anyhow::bail!("expected search command");
        };
        assert_eq!(args.pattern, "error.*timeout");
        assert_eq!(args.name_glob.as_deref(), Some("*.txt"));
        assert_eq!(args.max_object_bytes, Some(1_000_000_000));

        let cli = parse(&["swc", "pget", "-c", "c", "a.bin", "b.bin", "-d", "/tmp/out"])?;
        let Command::Pget(args) = cli.command else {
            anyhow::bail!("expected pget command");
        };
        assert_eq!(args.objects, ["a.bin", "b.bin"]);
        assert_eq!(args.target_dir, PathBuf::from("/tmp/out"));
        Ok(())
    }

    #[test]
    fn extract_mode_is_labelled_separately() -> TestResult<()> {
        let cli = parse(&["swc", "bundle", "-x", "-l", "/restore", "-c", "proj"])?;
        assert_eq!(command_label(&cli.command), "bundle.extract");
        Ok(())
    }

    #[test]
    fn prefixes_lose_surrounding_slashes() {
        assert_eq!(normalize_prefix(Some("/backup/")).as_deref(), Some("backup"));
        assert_eq!(normalize_prefix(Some("a/b")).as_deref(), Some("a/b"));
        assert_eq!(normalize_prefix(Some("/")), None);
        assert_eq!(normalize_prefix(None), None);
    }
}
