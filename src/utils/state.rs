use crate::config::Config;
use crate::service::broadcast::Broadcaster;
use crate::service::vfs::Filesystem;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub filesystem: Arc<Filesystem>,
    pub broadcaster: Arc<Broadcaster>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let broadcaster = Broadcaster::new();
        let filesystem = Filesystem::new(config.clone(), broadcaster.clone());
        filesystem.init().await;

        AppState {
            filesystem,
            broadcaster,
            config,
        }
    }
}
