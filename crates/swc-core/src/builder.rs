//! Building and unpacking archive files.
//!
//! # Design
//! - [`Archiver`] is the seam between the pipelines and the archive format.
//! - [`TarCommand`] drives GNU `tar`, compressing through `pigz` when one is
//!   installed; [`NativeTar`] does the same work in-process.
//! - Members are paths relative to the archive's base directory. Directories
//!   are stored without their contents unless the request is recursive.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// One archive to build.
#[derive(Debug, Clone, Copy)]
pub struct CreateArchive<'a> {
    /// Destination archive file.
    pub archive: &'a Path,
    /// Directory the members are relative to.
    pub base_dir: &'a Path,
    /// Members in archive order.
    pub members: &'a [PathBuf],
    /// Include everything below directory members.
    pub recursive: bool,
    /// Directory for helper files such as member lists.
    pub scratch_dir: &'a Path,
}

/// Creates and extracts compressed archives.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Build `request.archive` from the requested members.
    async fn create(&self, request: &CreateArchive<'_>) -> CoreResult<()>;

    /// Unpack `archive` into `target`, which must exist.
    async fn extract(&self, archive: &Path, target: &Path) -> CoreResult<()>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Pick the external `tar` when installed, otherwise the in-process one.
#[must_use]
pub fn detect_archiver(inline_member_limit: usize) -> Arc<dyn Archiver> {
    match TarCommand::detect(inline_member_limit) {
        Some(command) => {
            debug!(
                program = %command.program.display(),
                compressor = ?command.compressor,
                "using external tar"
            );
            Arc::new(command)
        }
        None => {
            debug!("tar not found on PATH; using in-process archiver");
            Arc::new(NativeTar)
        }
    }
}

/// Locate an executable on `PATH`.
#[must_use]
pub fn find_program(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// GNU `tar` invoked as a child process.
#[derive(Debug, Clone)]
pub struct TarCommand {
    program: PathBuf,
    compressor: Option<PathBuf>,
    inline_member_limit: usize,
}

impl TarCommand {
    /// Command using `program`, compressing with `compressor` or gzip.
    #[must_use]
    pub const fn new(program: PathBuf, compressor: Option<PathBuf>, inline_member_limit: usize) -> Self {
        Self {
            program,
            compressor,
            inline_member_limit,
        }
    }

    /// Resolve `tar` and `pigz` from `PATH`.
    #[must_use]
    pub fn detect(inline_member_limit: usize) -> Option<Self> {
        let program = find_program("tar")?;
        Some(Self::new(program, find_program("pigz"), inline_member_limit))
    }

    fn compression_arg(&self) -> OsString {
        self.compressor.as_ref().map_or_else(
            || OsString::from("--gzip"),
            |program| flag("--use-compress-program=", program),
        )
    }

    /// Arguments for building `request`. Members go through `list_file` when
    /// one is given.
    #[must_use]
    pub fn create_args(&self, request: &CreateArchive<'_>, list_file: Option<&Path>) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("--create"),
            flag("--file=", request.archive),
            flag("--directory=", request.base_dir),
        ];
        if !request.recursive {
            args.push(OsString::from("--no-recursion"));
        }
        args.push(self.compression_arg());
        match list_file {
            Some(list) => {
                args.push(OsString::from("--null"));
                args.push(flag("--files-from=", list));
            }
            None => {
                args.push(OsString::from("--"));
                args.extend(request.members.iter().map(|member| member.as_os_str().to_owned()));
            }
        }
        args
    }

    /// Arguments for unpacking `archive` into `target`.
    #[must_use]
    pub fn extract_args(&self, archive: &Path, target: &Path) -> Vec<OsString> {
        vec![
            OsString::from("--extract"),
            flag("--file=", archive),
            flag("--directory=", target),
            OsString::from("--same-permissions"),
            OsString::from("--delay-directory-restore"),
            self.compression_arg(),
        ]
    }

    async fn execute(&self, operation: &'static str, archive: &Path, args: Vec<OsString>) -> CoreResult<()> {
        debug!(program = %self.program.display(), ?args, "running archiver");
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| CoreError::io(operation, &self.program, source))?;
        if output.status.success() {
            return Ok(());
        }
        warn!(
            archive = %archive.display(),
            status = ?output.status.code(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "archiver reported failure"
        );
        Err(CoreError::Archiver {
            operation,
            archive: archive.to_path_buf(),
            status: output.status.code(),
        })
    }
}

#[async_trait]
impl Archiver for TarCommand {
    async fn create(&self, request: &CreateArchive<'_>) -> CoreResult<()> {
        if request.members.len() <= self.inline_member_limit {
            let args = self.create_args(request, None);
            return self.execute("tar.create", request.archive, args).await;
        }

        let list = request.scratch_dir.join(format!(
            ".tar.{}.{}",
            std::process::id(),
            Uuid::new_v4().simple()
        ));
        tokio::fs::write(&list, member_list(request.members))
            .await
            .map_err(|source| CoreError::io("tar.member_list", &list, source))?;
        let args = self.create_args(request, Some(&list));
        let outcome = self.execute("tar.create", request.archive, args).await;
        if let Err(err) = tokio::fs::remove_file(&list).await {
            warn!(error = %err, path = %list.display(), "failed to remove member list");
        }
        outcome
    }

    async fn extract(&self, archive: &Path, target: &Path) -> CoreResult<()> {
        let args = self.extract_args(archive, target);
        self.execute("tar.extract", archive, args).await
    }

    fn name(&self) -> &'static str {
        "tar"
    }
}

/// In-process gzip-compressed tar archiver.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTar;

#[async_trait]
impl Archiver for NativeTar {
    async fn create(&self, request: &CreateArchive<'_>) -> CoreResult<()> {
        let archive = request.archive.to_path_buf();
        let base_dir = request.base_dir.to_path_buf();
        let members = request.members.to_vec();
        let recursive = request.recursive;
        tokio::task::spawn_blocking(move || build_native(&archive, &base_dir, &members, recursive))
            .await
            .map_err(|source| CoreError::Join {
                operation: "native_tar.create",
                source,
            })?
    }

    async fn extract(&self, archive: &Path, target: &Path) -> CoreResult<()> {
        let archive = archive.to_path_buf();
        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_native(&archive, &target))
            .await
            .map_err(|source| CoreError::Join {
                operation: "native_tar.extract",
                source,
            })?
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

fn build_native(archive: &Path, base_dir: &Path, members: &[PathBuf], recursive: bool) -> CoreResult<()> {
    let file = File::create(archive).map_err(|source| CoreError::io("native_tar.create", archive, source))?;
    let mut builder = tar::Builder::new(GzEncoder::new(BufWriter::new(file), Compression::default()));
    builder.follow_symlinks(false);

    for member in members {
        let source = base_dir.join(member);
        let metadata = fs::symlink_metadata(&source)
            .map_err(|err| CoreError::io("native_tar.stat", &source, err))?;
        let appended = if metadata.is_dir() && recursive {
            builder.append_dir_all(member, &source)
        } else if metadata.is_dir() {
            builder.append_dir(member, &source)
        } else {
            builder.append_path_with_name(&source, member)
        };
        appended.map_err(|err| CoreError::io("native_tar.append", &source, err))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|source| CoreError::io("native_tar.finish", archive, source))?;
    encoder
        .finish()
        .and_then(|mut writer| writer.flush())
        .map_err(|source| CoreError::io("native_tar.finish", archive, source))
}

fn unpack_native(archive: &Path, target: &Path) -> CoreResult<()> {
    let file = File::open(archive).map_err(|source| CoreError::io("native_tar.open", archive, source))?;
    let mut unpacker = tar::Archive::new(MultiGzDecoder::new(BufReader::new(file)));
    unpacker.set_preserve_permissions(true);
    unpacker.set_preserve_mtime(true);
    unpacker.set_overwrite(true);
    unpacker
        .unpack(target)
        .map_err(|source| CoreError::io("native_tar.extract", archive, source))
}

fn flag(name: &str, value: &Path) -> OsString {
    let mut arg = OsString::from(name);
    arg.push(value.as_os_str());
    arg
}

fn member_list(members: &[PathBuf]) -> Vec<u8> {
    let mut list = Vec::new();
    for member in members {
        list.extend_from_slice(member.as_os_str().as_encoded_bytes());
        list.push(0);
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use swc_test_support::fixtures::{collect_tree, tar_available, write_tree};
    use tempfile::TempDir;

    type TestResult<T> = anyhow::Result<T>;

    fn members(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn request<'a>(
        archive: &'a Path,
        base_dir: &'a Path,
        members: &'a [PathBuf],
        recursive: bool,
        scratch_dir: &'a Path,
    ) -> CreateArchive<'a> {
        CreateArchive {
            archive,
            base_dir,
            members,
            recursive,
            scratch_dir,
        }
    }

    #[test]
    fn flat_create_arguments_disable_recursion() {
        let command = TarCommand::new(PathBuf::from("/bin/tar"), None, 16);
        let list = members(&[".", "a.txt"]);
        let req = request(
            Path::new("/tmp/out.tar.gz"),
            Path::new("/data"),
            &list,
            false,
            Path::new("/tmp"),
        );
        let args = command.create_args(&req, None);
        let rendered: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            rendered,
            [
                "--create",
                "--file=/tmp/out.tar.gz",
                "--directory=/data",
                "--no-recursion",
                "--gzip",
                "--",
                ".",
                "a.txt",
            ]
        );
    }

    #[test]
    fn recursive_create_with_list_file_uses_pigz() {
        let command = TarCommand::new(
            PathBuf::from("/bin/tar"),
            Some(PathBuf::from("/usr/bin/pigz")),
            16,
        );
        let list = members(&[".git"]);
        let req = request(
            Path::new("/tmp/out.tar.gz"),
            Path::new("/repo"),
            &list,
            true,
            Path::new("/tmp"),
        );
        let args = command.create_args(&req, Some(Path::new("/tmp/.tar.1.x")));
        let rendered: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(!rendered.contains(&"--no-recursion".to_string()));
        assert!(rendered.contains(&"--use-compress-program=/usr/bin/pigz".to_string()));
        assert!(rendered.ends_with(&["--null".to_string(), "--files-from=/tmp/.tar.1.x".to_string()]));
        assert!(!rendered.contains(&".git".to_string()));
    }

    #[test]
    fn extract_arguments_restore_permissions() {
        let command = TarCommand::new(PathBuf::from("/bin/tar"), None, 16);
        let rendered: Vec<String> = command
            .extract_args(Path::new("/tmp/a.tar.gz"), Path::new("/restore"))
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            rendered,
            [
                "--extract",
                "--file=/tmp/a.tar.gz",
                "--directory=/restore",
                "--same-permissions",
                "--delay-directory-restore",
                "--gzip",
            ]
        );
    }

    #[test]
    fn member_list_is_nul_separated() {
        assert_eq!(member_list(&members(&["a", "b c"])), b"a\0b c\0");
    }

    #[tokio::test]
    async fn native_flat_archive_skips_subdirectory_contents() -> TestResult<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("data");
        write_tree(&source, &[("a.txt", b"alpha"), ("sub/b.txt", b"beta")])?;
        let archive = temp.path().join("data.root.tar.gz");
        let list = members(&[".", "a.txt"]);

        NativeTar
            .create(&request(&archive, &source, &list, false, temp.path()))
            .await?;
        let restore = temp.path().join("restore");
        fs::create_dir_all(&restore)?;
        NativeTar.extract(&archive, &restore).await?;

        let restored = collect_tree(&restore)?;
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.get("a.txt").map(Vec::as_slice), Some(&b"alpha"[..]));
        assert!(!restore.join("sub").exists());
        Ok(())
    }

    #[tokio::test]
    async fn native_recursive_archive_includes_descendants() -> TestResult<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("repo");
        write_tree(
            &source,
            &[(".git/HEAD", b"ref: main"), (".git/objects/ab/cd", b"blob"), ("top", b"t")],
        )?;
        let archive = temp.path().join("git.tar.gz");
        let list = members(&[".git"]);

        NativeTar
            .create(&request(&archive, &source, &list, true, temp.path()))
            .await?;
        let restore = temp.path().join("restore");
        fs::create_dir_all(&restore)?;
        NativeTar.extract(&archive, &restore).await?;

        let restored = collect_tree(&restore)?;
        assert_eq!(
            restored.keys().cloned().collect::<Vec<_>>(),
            [".git/HEAD", ".git/objects/ab/cd"]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn native_archive_keeps_symlinks() -> TestResult<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("data");
        write_tree(&source, &[("target.txt", b"x")])?;
        std::os::unix::fs::symlink("target.txt", source.join("link"))?;
        let archive = temp.path().join("data.tar.gz");
        let list = members(&[".", "link", "target.txt"]);

        NativeTar
            .create(&request(&archive, &source, &list, false, temp.path()))
            .await?;
        let restore = temp.path().join("restore");
        fs::create_dir_all(&restore)?;
        NativeTar.extract(&archive, &restore).await?;

        let link = fs::symlink_metadata(restore.join("link"))?;
        assert!(link.file_type().is_symlink());
        assert_eq!(fs::read_link(restore.join("link"))?, PathBuf::from("target.txt"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_member_fails_the_build() -> TestResult<()> {
        let temp = TempDir::new()?;
        let list = members(&["absent"]);
        let archive = temp.path().join("x.tar.gz");
        let outcome = NativeTar
            .create(&request(&archive, temp.path(), &list, false, temp.path()))
            .await;
        assert!(matches!(outcome, Err(CoreError::Io { operation: "native_tar.stat", .. })));
        Ok(())
    }

    #[tokio::test]
    async fn external_tar_round_trips_through_a_list_file() -> TestResult<()> {
        if !tar_available() {
            return Ok(());
        }
        let Some(command) = TarCommand::detect(1) else {
            return Ok(());
        };
        let temp = TempDir::new()?;
        let source = temp.path().join("data");
        write_tree(&source, &[("a.txt", b"alpha"), ("b c.txt", b"spaced"), ("sub/x", b"x")])?;
        let archive = temp.path().join("data.tar.gz");
        let list = members(&[".", "a.txt", "b c.txt"]);

        command
            .create(&request(&archive, &source, &list, false, temp.path()))
            .await?;
        let leftovers: Vec<_> = fs::read_dir(temp.path())?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".tar."))
            .collect();
        assert!(leftovers.is_empty());

        let restore = temp.path().join("restore");
        fs::create_dir_all(&restore)?;
        NativeTar.extract(&archive, &restore).await?;
        let restored = collect_tree(&restore)?;
        assert_eq!(restored.keys().cloned().collect::<Vec<_>>(), ["a.txt", "b c.txt"]);
        Ok(())
    }

    #[tokio::test]
    async fn external_tar_exit_status_is_reported() -> TestResult<()> {
        if !tar_available() {
            return Ok(());
        }
        let Some(command) = TarCommand::detect(16) else {
            return Ok(());
        };
        let temp = TempDir::new()?;
        let outcome = command
            .extract(&temp.path().join("missing.tar.gz"), temp.path())
            .await;
        assert!(matches!(outcome, Err(CoreError::Archiver { status: Some(_), .. })));
        Ok(())
    }
}
