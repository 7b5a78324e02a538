//! Mountpoint model and registry.

use crate::error::VfsError;
use crate::storage::permission::GroupRule;
use crate::storage::paths::get_prefix;
use crate::storage::template::Template;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize)]
pub struct MountConfig {
    pub name: String,
    /// Adapter name, defaults to `system`.
    pub adapter: Option<String>,
    #[serde(default)]
    pub attributes: MountAttributes,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountAttributes {
    /// Segment-template root, e.g. `{vfs}/{username}`.
    pub root: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub groups: Vec<GroupRule>,
    #[serde(default = "default_true")]
    pub watch: bool,
    /// Group check mode: `true` requires all listed groups, `false` at
    /// least one.
    #[serde(default = "default_true")]
    pub strict_groups: bool,
    #[serde(default = "default_true")]
    pub searchable: bool,
}

fn default_true() -> bool {
    true
}

// Keeps programmatic construction in line with the serde defaults
impl Default for MountAttributes {
    fn default() -> Self {
        Self {
            root: None,
            read_only: false,
            groups: Vec::new(),
            watch: true,
            strict_groups: true,
            searchable: true,
        }
    }
}

/// A named binding between a VFS path prefix and a storage adapter.
#[derive(Debug)]
pub struct Mountpoint {
    pub id: Uuid,
    pub name: String,
    /// Always `<name>:/`.
    pub root: String,
    pub adapter_name: String,
    pub attributes: MountAttributes,
    /// Parsed from `attributes.root` when present.
    pub template: Option<Template>,
}

impl Mountpoint {
    pub fn new(config: MountConfig) -> Self {
        let template = config.attributes.root.as_deref().map(Template::parse);
        Self {
            id: Uuid::new_v4(),
            root: format!("{}:/", config.name),
            name: config.name,
            adapter_name: config.adapter.unwrap_or_else(|| "system".to_string()),
            attributes: config.attributes,
            template,
        }
    }
}

/// Ordered collection of active mountpoints. Mount and unmount mutate the
/// list inside one lock acquisition, so they are atomic with respect to
/// concurrent resolution.
#[derive(Default)]
pub struct MountRegistry {
    mounts: RwLock<Vec<Arc<Mountpoint>>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mountpoint to the active list. Mounting the same name
    /// twice creates two coexisting entries; resolution returns the first.
    pub async fn mount(&self, config: MountConfig) -> Arc<Mountpoint> {
        let mountpoint = Arc::new(Mountpoint::new(config));
        self.mounts.write().await.push(mountpoint.clone());
        tracing::info!(name = %mountpoint.name, id = %mountpoint.id, "mounted");
        mountpoint
    }

    /// Removes a mountpoint by identity. Returns `false` when it is not
    /// in the active list; never fails.
    pub async fn unmount(&self, mountpoint: &Mountpoint) -> bool {
        let mut mounts = self.mounts.write().await;
        let before = mounts.len();
        mounts.retain(|m| m.id != mountpoint.id);
        let removed = mounts.len() < before;
        if removed {
            tracing::info!(name = %mountpoint.name, "unmounted");
        }
        removed
    }

    /// Resolves a VFS path to its mountpoint via the path prefix.
    pub async fn resolve(&self, path: &str) -> Result<Arc<Mountpoint>, VfsError> {
        let prefix = get_prefix(path);
        if prefix.is_empty() {
            return Err(VfsError::MountpointNotFound(prefix.to_string()));
        }

        self.mounts
            .read()
            .await
            .iter()
            .find(|m| m.name == prefix)
            .cloned()
            .ok_or_else(|| VfsError::MountpointNotFound(prefix.to_string()))
    }

    pub async fn list(&self) -> Vec<Arc<Mountpoint>> {
        self.mounts.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> MountConfig {
        MountConfig {
            name: name.into(),
            adapter: None,
            attributes: MountAttributes::default(),
        }
    }

    #[tokio::test]
    async fn test_mount_defaults() {
        let registry = MountRegistry::new();
        let mount = registry.mount(config("home")).await;

        assert_eq!(mount.root, "home:/");
        assert_eq!(mount.adapter_name, "system");
        assert!(mount.attributes.watch);
        assert!(mount.attributes.strict_groups);
    }

    #[tokio::test]
    async fn test_resolve_by_prefix() {
        let registry = MountRegistry::new();
        registry.mount(config("home")).await;
        registry.mount(config("osjs")).await;

        let resolved = registry.resolve("osjs:/dist/index.html").await.unwrap();
        assert_eq!(resolved.name, "osjs");

        let err = registry.resolve("nope:/x").await.unwrap_err();
        assert!(matches!(err, VfsError::MountpointNotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_empty_prefix_fails() {
        let registry = MountRegistry::new();
        registry.mount(config("home")).await;

        assert!(registry.resolve(":/x").await.is_err());
    }

    #[tokio::test]
    async fn test_unmount_by_identity() {
        let registry = MountRegistry::new();
        let mount = registry.mount(config("home")).await;

        assert!(registry.unmount(&mount).await);
        assert!(!registry.unmount(&mount).await);
        assert!(registry.resolve("home:/").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_mounts_coexist() {
        let registry = MountRegistry::new();
        let first = registry.mount(config("home")).await;
        let second = registry.mount(config("home")).await;

        assert_eq!(registry.list().await.len(), 2);
        let resolved = registry.resolve("home:/").await.unwrap();
        assert_eq!(resolved.id, first.id);

        registry.unmount(&first).await;
        let resolved = registry.resolve("home:/").await.unwrap();
        assert_eq!(resolved.id, second.id);
    }
}
