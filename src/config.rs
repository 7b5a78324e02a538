use crate::storage::mounts::MountConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Physical directory backing the `{vfs}` segment token.
    pub vfs_root: PathBuf,
    /// Global switch for filesystem watchers.
    pub watch: bool,
    pub jwt_secret: String,
    pub jwt_lifetime_secs: i64,
    pub mounts: Vec<MountConfig>,
    /// Filename-exact MIME overrides, consulted before extension lookup.
    pub mime_overrides: HashMap<String, String>,
}

/// On-disk part of the configuration (mountpoints, watch flag, MIME table).
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub mountpoints: Vec<MountConfig>,
    #[serde(default = "default_watch")]
    pub watch: bool,
    #[serde(default)]
    pub mime: HashMap<String, String>,
}

fn default_watch() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_defaults() {
        let cfg: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.mountpoints.is_empty());
        assert!(cfg.watch);
        assert!(cfg.mime.is_empty());
    }

    #[test]
    fn test_file_config_mounts() {
        let cfg: FileConfig = serde_json::from_str(
            r#"{
                "watch": false,
                "mountpoints": [
                    {"name": "home", "attributes": {"root": "{vfs}/{username}"}},
                    {"name": "osjs", "attributes": {"root": "{root}/dist", "readOnly": true}}
                ],
                "mime": {"defined file": "test/jest"}
            }"#,
        )
        .unwrap();

        assert!(!cfg.watch);
        assert_eq!(cfg.mountpoints.len(), 2);
        assert_eq!(cfg.mountpoints[0].name, "home");
        assert!(cfg.mountpoints[1].attributes.read_only);
        assert_eq!(cfg.mime["defined file"], "test/jest");
    }
}
