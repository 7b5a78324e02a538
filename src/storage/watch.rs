//! Watch-to-broadcast bridge.
//!
//! Each watchable mountpoint gets a native watcher from its adapter. The
//! adapter translates raw filesystem events into [`WatchEvent`]s carrying
//! the recovered dynamic segment values and the change path relative to
//! the resolved root. The bridge turns those into `osjs/vfs:watch:change`
//! broadcasts scoped to matching sessions.

use crate::service::broadcast::Broadcaster;
use crate::storage::mounts::Mountpoint;
use notify::RecommendedWatcher;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// One translated filesystem change.
#[derive(Clone, Debug)]
pub struct WatchEvent {
    /// Recovered dynamic segment values, e.g. `username -> jest`.
    pub segments: HashMap<String, String>,
    /// Change path relative to the resolved mountpoint root.
    pub relative: String,
    /// `add`, `addDir`, `change`, `unlink` or `unlinkDir`.
    pub kind: &'static str,
}

pub type WatchSink = UnboundedSender<WatchEvent>;

/// Keeps the native watcher alive; dropping it stops event delivery.
pub struct WatchHandle {
    watcher: Option<RecommendedWatcher>,
}

impl WatchHandle {
    pub fn new(watcher: RecommendedWatcher) -> Self {
        Self {
            watcher: Some(watcher),
        }
    }

    pub fn close(&mut self) {
        self.watcher.take();
    }
}

/// A mounted watcher plus the task forwarding its events to the hub.
pub struct WatchRegistration {
    pub mount_id: Uuid,
    pub mount_name: String,
    handle: WatchHandle,
    task: JoinHandle<()>,
}

impl WatchRegistration {
    /// Spawns the forwarding task for a freshly attached watcher.
    pub fn start(
        mount: Arc<Mountpoint>,
        handle: WatchHandle,
        mut events: UnboundedReceiver<WatchEvent>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        let mount_id = mount.id;
        let mount_name = mount.name.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let target = format!("{}:/{}", mount.name, event.relative);
                tracing::debug!(path = %target, kind = event.kind, "vfs change");

                broadcaster
                    .broadcast_scoped(
                        "osjs/vfs:watch:change",
                        json!([{ "path": target, "type": event.kind }, event.segments]),
                        &event.segments,
                    )
                    .await;
            }
        });

        Self {
            mount_id,
            mount_name,
            handle,
            task,
        }
    }

    /// Stops the native watcher, then waits for the forwarding task to
    /// finish. Abnormal task exits are logged, never raised.
    pub async fn close(mut self) {
        self.handle.close();
        self.task.abort();
        if let Err(err) = self.task.await {
            if !err.is_cancelled() {
                tracing::warn!(mount = %self.mount_name, "watch task ended abnormally: {err}");
            }
        }
    }
}

/// Closes every registration, waiting for each close to complete.
pub async fn close_all(registrations: Vec<WatchRegistration>) {
    for registration in registrations {
        tracing::info!(mount = %registration.mount_name, "closing watcher");
        registration.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(task: JoinHandle<()>) -> WatchRegistration {
        WatchRegistration {
            mount_id: Uuid::new_v4(),
            mount_name: "home".into(),
            handle: WatchHandle { watcher: None },
            task,
        }
    }

    #[tokio::test]
    async fn test_close_waits_for_the_forwarding_task() {
        let task = tokio::spawn(std::future::pending::<()>());

        // close() must return even though the task never ends on its own
        registration(task).close().await;
    }

    #[tokio::test]
    async fn test_close_all_drains_every_registration() {
        let registrations = vec![
            registration(tokio::spawn(std::future::pending::<()>())),
            registration(tokio::spawn(async {})),
        ];

        close_all(registrations).await;
    }
}
