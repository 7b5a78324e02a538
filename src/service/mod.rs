use crate::storage::{FileStream, ReadRange};
use serde::Deserialize;
use serde_json::Value;
use tempfile::NamedTempFile;

pub mod auth;
pub mod broadcast;
pub mod fields;
pub mod vfs;

/// The VFS operation set exposed over the wire and the internal facade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VfsMethod {
    Exists,
    Stat,
    Readdir,
    Readfile,
    Writefile,
    Mkdir,
    Rename,
    Copy,
    Unlink,
    Search,
    Touch,
    Realpath,
}

impl VfsMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Stat => "stat",
            Self::Readdir => "readdir",
            Self::Readfile => "readfile",
            Self::Writefile => "writefile",
            Self::Mkdir => "mkdir",
            Self::Rename => "rename",
            Self::Copy => "copy",
            Self::Unlink => "unlink",
            Self::Search => "search",
            Self::Touch => "touch",
            Self::Realpath => "realpath",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exists" => Self::Exists,
            "stat" => Self::Stat,
            "readdir" => Self::Readdir,
            "readfile" => Self::Readfile,
            "writefile" => Self::Writefile,
            "mkdir" => Self::Mkdir,
            "rename" => Self::Rename,
            "copy" => Self::Copy,
            "unlink" => Self::Unlink,
            "search" => Self::Search,
            "touch" => Self::Touch,
            "realpath" => Self::Realpath,
            _ => return None,
        })
    }

    /// Whether this operation mutates its target mountpoint. Copy and
    /// rename are handled per-endpoint by the dispatcher (read intent on
    /// the source, write intent on the destination).
    pub fn write_intent(&self) -> bool {
        matches!(
            self,
            Self::Writefile | Self::Mkdir | Self::Unlink | Self::Touch
        )
    }
}

/// Options accepted by several operations, arriving either as a JSON
/// object or a JSON-encoded string field.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VfsOptions {
    #[serde(default)]
    pub ensure: bool,
    #[serde(default)]
    pub download: bool,
}

/// Path-bearing request fields, sanitized by the dispatcher before use.
#[derive(Clone, Debug, Default)]
pub struct Fields {
    pub path: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub root: Option<String>,
    pub pattern: Option<String>,
    pub options: VfsOptions,
}

/// A multipart upload spooled to disk. The temp file is removed when
/// this is dropped, whichever way the request ends.
#[derive(Debug)]
pub struct Upload {
    pub file: NamedTempFile,
}

/// One parsed VFS request.
#[derive(Debug, Default)]
pub struct VfsPayload {
    pub fields: Fields,
    pub upload: Option<Upload>,
    pub range: Option<ReadRange>,
}

/// Dispatcher result: JSON for most operations, a byte stream for
/// `readfile`.
#[derive(Debug)]
pub enum VfsReply {
    Json(Value),
    Stream {
        stream: FileStream,
        filename: String,
        download: bool,
    },
}

impl VfsReply {
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Stream { .. } => None,
        }
    }
}
