//! Local-disk storage adapter.
//!
//! Every operation resolves the incoming VFS path against the
//! mountpoint's root template, so one mountpoint declaration like
//! `{vfs}/{username}` yields per-user physical directories.

use crate::config::Config;
use crate::error::VfsError;
use crate::storage::mounts::Mountpoint;
use crate::storage::template::SegmentContext;
use crate::storage::watch::{WatchEvent, WatchHandle, WatchSink};
use crate::storage::{
    Adapter, ByteSource, FileStat, FileStream, ReadRange, StatTimes, VfsContext,
};
use crate::utils::mime;
use chrono::{DateTime, Utc};
use notify::{EventKind, RecursiveMode, Watcher};
use notify::event::{CreateKind, RemoveKind};
use regex::Regex;
use std::io::{self, ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufWriter};
use walkdir::WalkDir;

pub struct SystemAdapter {
    config: Arc<Config>,
}

impl SystemAdapter {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn segment_context<'a>(&'a self, username: &'a str) -> SegmentContext<'a> {
        SegmentContext {
            root: Path::new("."),
            vfs_root: &self.config.vfs_root,
            username,
        }
    }

    /// Resolves a VFS path to the physical path it addresses.
    fn real_path(&self, ctx: &VfsContext, mount: &Mountpoint, path: &str) -> io::Result<PathBuf> {
        let template = mount.template.as_ref().ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("mountpoint '{}' has no root", mount.name),
            )
        })?;

        let root = template.resolve(&self.segment_context(&ctx.user.username));
        let relative = path
            .strip_prefix(&mount.root)
            .or_else(|| path.strip_prefix(mount.root.trim_end_matches('/')))
            .unwrap_or(path);

        Ok(root.join(relative.trim_start_matches('/')))
    }

    fn mime_for(&self, filename: &str) -> String {
        mime::lookup(&self.config.mime_overrides, filename)
    }

    /// Builds the client-facing metadata for one entry.
    async fn file_stat(&self, real_path: &Path, vfs_path: &str) -> io::Result<FileStat> {
        let metadata = fs::metadata(real_path).await?;
        let filename = Path::new(vfs_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let to_utc = |t: io::Result<std::time::SystemTime>| t.ok().map(DateTime::<Utc>::from);

        Ok(FileStat {
            mime: metadata
                .is_file()
                .then(|| self.mime_for(&filename)),
            filename,
            path: vfs_path.to_string(),
            size: metadata.len(),
            is_file: metadata.is_file(),
            is_directory: metadata.is_dir(),
            stat: StatTimes {
                atime: to_utc(metadata.accessed()),
                mtime: to_utc(metadata.modified()),
                ctime: to_utc(metadata.created()),
            },
        })
    }

    async fn copy_recursive(from: PathBuf, to: PathBuf) -> io::Result<()> {
        let metadata = fs::metadata(&from).await?;
        if metadata.is_file() {
            fs::copy(&from, &to).await?;
            return Ok(());
        }

        fs::create_dir_all(&to).await?;
        let mut stack = vec![(from, to)];
        while let Some((src, dst)) = stack.pop() {
            let mut entries = fs::read_dir(&src).await?;
            while let Some(entry) = entries.next_entry().await? {
                let src_path = entry.path();
                let dst_path = dst.join(entry.file_name());
                if entry.file_type().await?.is_dir() {
                    fs::create_dir_all(&dst_path).await?;
                    stack.push((src_path, dst_path));
                } else {
                    fs::copy(&src_path, &dst_path).await?;
                }
            }
        }
        Ok(())
    }
}

/// Converts a glob pattern (`*`, `**`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("^(?i)");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
}

fn change_kind(kind: &EventKind) -> Option<&'static str> {
    match kind {
        EventKind::Create(CreateKind::Folder) => Some("addDir"),
        EventKind::Create(_) => Some("add"),
        EventKind::Modify(_) => Some("change"),
        EventKind::Remove(RemoveKind::Folder) => Some("unlinkDir"),
        EventKind::Remove(_) => Some("unlink"),
        _ => None,
    }
}

#[async_trait::async_trait]
impl Adapter for SystemAdapter {
    async fn exists(&self, ctx: &VfsContext, mount: &Mountpoint, path: &str) -> io::Result<bool> {
        let real = self.real_path(ctx, mount, path)?;
        fs::try_exists(&real).await
    }

    async fn stat(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
    ) -> io::Result<FileStat> {
        let real = self.real_path(ctx, mount, path)?;
        self.file_stat(&real, path).await
    }

    async fn readdir(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
    ) -> io::Result<Vec<FileStat>> {
        let real = self.real_path(ctx, mount, path)?;
        let base = path.trim_end_matches('/');

        let mut result = Vec::new();
        let mut entries = fs::read_dir(&real).await?;
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().into_owned();
            let vfs_path = format!("{base}/{filename}");
            result.push(self.file_stat(&entry.path(), &vfs_path).await?);
        }
        result.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(result)
    }

    async fn readfile(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
        range: Option<ReadRange>,
    ) -> io::Result<FileStream> {
        let real = self.real_path(ctx, mount, path)?;
        let metadata = fs::metadata(&real).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("'{path}' is not a file"),
            ));
        }

        let total = metadata.len();
        let mime = self.mime_for(path);
        let mut file = fs::File::open(&real).await?;

        if let Some(range) = range {
            let start = range.start;
            let end = range.end.unwrap_or_else(|| total.saturating_sub(1));
            if start > end || start >= total {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    "range not satisfiable",
                ));
            }
            let end = end.min(total.saturating_sub(1));

            file.seek(SeekFrom::Start(start)).await?;
            let reader = file.take(end - start + 1);
            return Ok(FileStream {
                reader: Box::new(reader),
                total,
                range: Some((start, end)),
                mime,
            });
        }

        Ok(FileStream {
            reader: Box::new(file),
            total,
            range: None,
            mime,
        })
    }

    async fn writefile(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
        mut source: ByteSource,
    ) -> io::Result<Option<u64>> {
        let real = self.real_path(ctx, mount, path)?;

        // Probe races with the write; accepted, see design notes
        match fs::metadata(&real).await {
            Ok(metadata) if metadata.is_dir() => return Ok(None),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }

        let file = fs::File::create(&real).await?;
        let mut writer = BufWriter::new(file);
        let written = tokio::io::copy(&mut source, &mut writer).await?;
        tokio::io::AsyncWriteExt::flush(&mut writer).await?;
        Ok(Some(written))
    }

    async fn mkdir(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
        ensure: bool,
    ) -> io::Result<bool> {
        let real = self.real_path(ctx, mount, path)?;
        if ensure {
            fs::create_dir_all(&real).await?;
        } else {
            fs::create_dir(&real).await?;
        }
        Ok(true)
    }

    async fn copy(
        &self,
        ctx: &VfsContext,
        src_mount: &Mountpoint,
        from: &str,
        dst_mount: &Mountpoint,
        to: &str,
    ) -> io::Result<bool> {
        let real_from = self.real_path(ctx, src_mount, from)?;
        let real_to = self.real_path(ctx, dst_mount, to)?;
        Self::copy_recursive(real_from, real_to).await?;
        Ok(true)
    }

    async fn rename(
        &self,
        ctx: &VfsContext,
        src_mount: &Mountpoint,
        from: &str,
        dst_mount: &Mountpoint,
        to: &str,
    ) -> io::Result<bool> {
        let real_from = self.real_path(ctx, src_mount, from)?;
        let real_to = self.real_path(ctx, dst_mount, to)?;
        fs::rename(&real_from, &real_to).await?;
        Ok(true)
    }

    async fn unlink(&self, ctx: &VfsContext, mount: &Mountpoint, path: &str) -> io::Result<bool> {
        let real = self.real_path(ctx, mount, path)?;
        let metadata = fs::metadata(&real).await?;
        if metadata.is_dir() {
            fs::remove_dir_all(&real).await?;
        } else {
            fs::remove_file(&real).await?;
        }
        Ok(true)
    }

    async fn search(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        root: &str,
        pattern: &str,
    ) -> io::Result<Vec<FileStat>> {
        let real_root = self.real_path(ctx, mount, root)?;
        let matcher = glob_to_regex(pattern)
            .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e.to_string()))?;

        let walk_root = real_root.clone();
        let relative_matches = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            for entry in WalkDir::new(&walk_root).into_iter().filter_map(Result::ok) {
                let filename = entry.file_name().to_string_lossy();
                if matcher.is_match(&filename) {
                    if let Ok(relative) = entry.path().strip_prefix(&walk_root) {
                        found.push(relative.to_path_buf());
                    }
                }
            }
            found
        })
        .await
        .map_err(io::Error::other)?;

        let base = root.trim_end_matches('/');
        let mut result = Vec::new();
        for relative in relative_matches {
            let vfs_path = format!("{base}/{}", relative.display());
            match self.file_stat(&real_root.join(&relative), &vfs_path).await {
                Ok(stat) => result.push(stat),
                Err(err) => tracing::warn!(path = %vfs_path, "search stat failed: {err}"),
            }
        }
        Ok(result)
    }

    async fn touch(&self, ctx: &VfsContext, mount: &Mountpoint, path: &str) -> io::Result<bool> {
        let real = self.real_path(ctx, mount, path)?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&real)
            .await?;
        Ok(true)
    }

    async fn realpath(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
    ) -> io::Result<PathBuf> {
        self.real_path(ctx, mount, path)
    }

    fn watch(&self, mount: &Arc<Mountpoint>, sink: WatchSink) -> Option<io::Result<WatchHandle>> {
        let template = mount.template.as_ref()?;

        // Watch the static part of the root; dynamic tokens become
        // capture groups for recovering per-user scope from event paths.
        let ctx = self.segment_context("");
        let watch_root = template.static_prefix(&ctx);
        let regex = match template.watch_regex(&ctx) {
            Ok(re) => re,
            Err(err) => {
                return Some(Err(io::Error::new(ErrorKind::InvalidInput, err.to_string())));
            }
        };
        let dynamic: Vec<String> = template
            .dynamic_segments()
            .into_iter()
            .map(String::from)
            .collect();

        let handler = move |result: Result<notify::Event, notify::Error>| {
            let event = match result {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!("watch error: {err}");
                    return;
                }
            };
            let Some(kind) = change_kind(&event.kind) else {
                return;
            };

            for path in &event.paths {
                let path_str = path.to_string_lossy();
                let Some(caps) = regex.captures(&path_str) else {
                    continue;
                };

                let segments = dynamic
                    .iter()
                    .enumerate()
                    .filter_map(|(i, name)| {
                        caps.get(i + 1).map(|m| (name.clone(), m.as_str().to_string()))
                    })
                    .collect();
                let relative = caps
                    .get(caps.len() - 1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();

                let _ = sink.send(WatchEvent {
                    segments,
                    relative,
                    kind,
                });
            }
        };

        let mut watcher = match notify::recommended_watcher(handler) {
            Ok(watcher) => watcher,
            Err(err) => return Some(Err(io::Error::other(err.to_string()))),
        };
        if let Err(err) = watcher.watch(&watch_root, RecursiveMode::Recursive) {
            return Some(Err(io::Error::other(err.to_string())));
        }

        Some(Ok(WatchHandle::new(watcher)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mounts::{MountAttributes, MountConfig};
    use crate::utils::session::User;
    use std::collections::HashMap;

    fn test_config(vfs_root: &Path) -> Arc<Config> {
        Arc::new(Config {
            host: "127.0.0.1".into(),
            port: 0,
            vfs_root: vfs_root.to_path_buf(),
            watch: false,
            jwt_secret: "secret".into(),
            jwt_lifetime_secs: 3600,
            mounts: vec![],
            mime_overrides: HashMap::new(),
        })
    }

    fn home_mount() -> Mountpoint {
        Mountpoint::new(MountConfig {
            name: "home".into(),
            adapter: None,
            attributes: MountAttributes {
                root: Some("{vfs}/{username}".into()),
                ..Default::default()
            },
        })
    }

    fn jest_ctx() -> VfsContext {
        VfsContext {
            user: User {
                username: "jest".into(),
                groups: vec![],
            },
        }
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("*.txt").unwrap();
        assert!(re.is_match("notes.txt"));
        assert!(re.is_match("NOTES.TXT"));
        assert!(!re.is_match("notes.txt.bak"));

        let re = glob_to_regex("file?.rs").unwrap();
        assert!(re.is_match("file1.rs"));
        assert!(!re.is_match("file12.rs"));
    }

    #[tokio::test]
    async fn test_real_path_resolves_per_user() {
        let tmp = tempfile::TempDir::new().unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));
        let mount = home_mount();

        let real = adapter
            .real_path(&jest_ctx(), &mount, "home:/docs/file.txt")
            .unwrap();
        assert_eq!(real, tmp.path().join("jest/docs/file.txt"));
    }

    #[tokio::test]
    async fn test_exists_missing_path_is_false_not_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest")).await.unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));

        let exists = adapter
            .exists(&jest_ctx(), &home_mount(), "home:/nothing")
            .await
            .unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    async fn test_touch_then_stat() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest")).await.unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));
        let mount = home_mount();
        let ctx = jest_ctx();

        assert!(adapter.touch(&ctx, &mount, "home:/test").await.unwrap());
        let stat = adapter.stat(&ctx, &mount, "home:/test").await.unwrap();

        assert_eq!(stat.filename, "test");
        assert_eq!(stat.path, "home:/test");
        assert_eq!(stat.size, 0);
        assert!(stat.is_file);
        assert!(!stat.is_directory);
        assert_eq!(stat.mime.as_deref(), Some("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_readfile_range() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest")).await.unwrap();
        fs::write(tmp.path().join("jest/data.bin"), b"0123456789")
            .await
            .unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));
        let mount = home_mount();
        let ctx = jest_ctx();

        let mut stream = adapter
            .readfile(
                &ctx,
                &mount,
                "home:/data.bin",
                Some(ReadRange {
                    start: 2,
                    end: Some(5),
                }),
            )
            .await
            .unwrap();
        assert_eq!(stream.total, 10);
        assert_eq!(stream.range, Some((2, 5)));

        let mut buf = Vec::new();
        stream.reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"2345");
    }

    #[tokio::test]
    async fn test_readfile_directory_rejects() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest/dir")).await.unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));

        let err = adapter
            .readfile(&jest_ctx(), &home_mount(), "home:/dir", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_writefile_into_directory_returns_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest/dir")).await.unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));

        let source: ByteSource = Box::new(std::io::Cursor::new(b"data".to_vec()));
        let written = adapter
            .writefile(&jest_ctx(), &home_mount(), "home:/dir", source)
            .await
            .unwrap();
        assert_eq!(written, None);
    }

    #[tokio::test]
    async fn test_writefile_reports_byte_count() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest")).await.unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));

        let source: ByteSource = Box::new(std::io::Cursor::new(b"hello world".to_vec()));
        let written = adapter
            .writefile(&jest_ctx(), &home_mount(), "home:/out.txt", source)
            .await
            .unwrap();
        assert_eq!(written, Some(11));

        let content = fs::read_to_string(tmp.path().join("jest/out.txt"))
            .await
            .unwrap();
        assert_eq!(content, "hello world");
    }

    #[tokio::test]
    async fn test_mkdir_ensure_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest")).await.unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));
        let mount = home_mount();
        let ctx = jest_ctx();

        assert!(adapter.mkdir(&ctx, &mount, "home:/d", true).await.unwrap());
        assert!(adapter.mkdir(&ctx, &mount, "home:/d", true).await.unwrap());

        let err = adapter
            .mkdir(&ctx, &mount, "home:/d", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_readdir_lists_entries() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest/sub")).await.unwrap();
        fs::write(tmp.path().join("jest/a.txt"), b"a").await.unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));

        let entries = adapter
            .readdir(&jest_ctx(), &home_mount(), "home:/")
            .await
            .unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub"]);
        assert_eq!(entries[0].path, "home:/a.txt");
        assert!(entries[1].is_directory);
    }

    #[tokio::test]
    async fn test_search_matches_glob() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest/docs")).await.unwrap();
        fs::write(tmp.path().join("jest/notes.txt"), b"x").await.unwrap();
        fs::write(tmp.path().join("jest/docs/deep.txt"), b"x")
            .await
            .unwrap();
        fs::write(tmp.path().join("jest/image.png"), b"x").await.unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));

        let mut found = adapter
            .search(&jest_ctx(), &home_mount(), "home:/", "*.txt")
            .await
            .unwrap();
        found.sort_by(|a, b| a.path.cmp(&b.path));
        let paths: Vec<&str> = found.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["home:/docs/deep.txt", "home:/notes.txt"]);
    }

    #[tokio::test]
    async fn test_copy_and_rename_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest/src")).await.unwrap();
        fs::write(tmp.path().join("jest/src/f.txt"), b"payload")
            .await
            .unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));
        let mount = home_mount();
        let ctx = jest_ctx();

        assert!(
            adapter
                .copy(&ctx, &mount, "home:/src", &mount, "home:/dst")
                .await
                .unwrap()
        );
        let copied = fs::read_to_string(tmp.path().join("jest/dst/f.txt"))
            .await
            .unwrap();
        assert_eq!(copied, "payload");

        assert!(
            adapter
                .rename(&ctx, &mount, "home:/dst", &mount, "home:/moved")
                .await
                .unwrap()
        );
        assert!(!fs::try_exists(tmp.path().join("jest/dst")).await.unwrap());
        assert!(fs::try_exists(tmp.path().join("jest/moved/f.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlink_recursive() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("jest/tree/deep")).await.unwrap();
        fs::write(tmp.path().join("jest/tree/deep/f"), b"x").await.unwrap();
        let adapter = SystemAdapter::new(test_config(tmp.path()));

        assert!(
            adapter
                .unlink(&jest_ctx(), &home_mount(), "home:/tree")
                .await
                .unwrap()
        );
        assert!(!fs::try_exists(tmp.path().join("jest/tree")).await.unwrap());
    }
}
