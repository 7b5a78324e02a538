use crate::config::Config;
use crate::storage::driver::system::SystemAdapter;
use crate::storage::mounts::Mountpoint;
use crate::storage::watch::{WatchHandle, WatchSink};
use crate::utils::session::User;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncRead;

pub mod driver;
pub mod mounts;
pub mod paths;
pub mod permission;
pub mod template;
pub mod watch;

/// Per-request context handed to adapters so they can resolve dynamic
/// segment tokens (e.g. `{username}`) themselves.
#[derive(Clone, Debug)]
pub struct VfsContext {
    pub user: User,
}

/// Client-facing file metadata.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub filename: String,
    /// VFS path, e.g. `home:/docs/file.txt`.
    pub path: String,
    pub size: u64,
    pub is_file: bool,
    pub is_directory: bool,
    /// `None` for directories.
    pub mime: Option<String>,
    pub stat: StatTimes,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct StatTimes {
    pub atime: Option<DateTime<Utc>>,
    pub mtime: Option<DateTime<Utc>>,
    pub ctime: Option<DateTime<Utc>>,
}

/// Requested byte range of a read, inclusive bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReadRange {
    pub start: u64,
    pub end: Option<u64>,
}

/// An open read stream plus the metadata the HTTP layer needs to shape
/// the response.
pub struct FileStream {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Full size of the underlying file.
    pub total: u64,
    /// Resolved `[start, end]` when this is a partial read.
    pub range: Option<(u64, u64)>,
    pub mime: String,
}

impl std::fmt::Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStream")
            .field("total", &self.total)
            .field("range", &self.range)
            .field("mime", &self.mime)
            .finish_non_exhaustive()
    }
}

pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// The operation set every storage backend implements. All paths are
/// sanitized VFS paths; the adapter resolves them against the
/// mountpoint's root template using the request context.
#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    /// Never errors for a missing path, only for I/O failures.
    async fn exists(&self, ctx: &VfsContext, mount: &Mountpoint, path: &str) -> io::Result<bool>;

    async fn stat(&self, ctx: &VfsContext, mount: &Mountpoint, path: &str)
    -> io::Result<FileStat>;

    async fn readdir(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
    ) -> io::Result<Vec<FileStat>>;

    /// Rejects when the target is a directory.
    async fn readfile(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
        range: Option<ReadRange>,
    ) -> io::Result<FileStream>;

    /// Returns the byte count written, or `None` when the target is an
    /// existing directory (not an error).
    async fn writefile(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
        source: ByteSource,
    ) -> io::Result<Option<u64>>;

    /// With `ensure`, a pre-existing directory is not an error.
    async fn mkdir(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
        ensure: bool,
    ) -> io::Result<bool>;

    /// Same-adapter copy; cross-adapter pairs are emulated by the
    /// dispatcher instead.
    async fn copy(
        &self,
        ctx: &VfsContext,
        src_mount: &Mountpoint,
        from: &str,
        dst_mount: &Mountpoint,
        to: &str,
    ) -> io::Result<bool>;

    async fn rename(
        &self,
        ctx: &VfsContext,
        src_mount: &Mountpoint,
        from: &str,
        dst_mount: &Mountpoint,
        to: &str,
    ) -> io::Result<bool>;

    /// Recursive for directories.
    async fn unlink(&self, ctx: &VfsContext, mount: &Mountpoint, path: &str) -> io::Result<bool>;

    async fn search(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        root: &str,
        pattern: &str,
    ) -> io::Result<Vec<FileStat>>;

    /// Creates an empty file if absent.
    async fn touch(&self, ctx: &VfsContext, mount: &Mountpoint, path: &str) -> io::Result<bool>;

    /// True filesystem path. Internal only, never exposed over HTTP.
    async fn realpath(
        &self,
        ctx: &VfsContext,
        mount: &Mountpoint,
        path: &str,
    ) -> io::Result<PathBuf>;

    /// Attaches a native watcher for the mountpoint, feeding change
    /// events into `sink`. `None` when the backend cannot watch.
    fn watch(&self, mount: &Arc<Mountpoint>, sink: WatchSink) -> Option<io::Result<WatchHandle>> {
        let _ = (mount, sink);
        None
    }
}

/// Name-to-instance adapter registry, resolved per mountpoint at dispatch
/// time.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        let mut adapters: HashMap<String, Arc<dyn Adapter>> = HashMap::new();
        adapters.insert("system".to_string(), Arc::new(SystemAdapter::new(config)));
        Self { adapters }
    }

    pub fn register(&mut self, name: &str, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(name.to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(name).cloned()
    }

    /// Whether two mountpoints share one adapter instance.
    pub fn same_adapter(&self, a: &Mountpoint, b: &Mountpoint) -> bool {
        a.adapter_name == b.adapter_name
    }
}
