//! The filesystem service: mountpoint lifecycle, the request dispatcher
//! and the programmatic facade used by other subsystems.
//!
//! Every operation follows one pipeline: sanitize path fields, resolve
//! the mountpoint(s), check permissions, invoke the adapter, shape the
//! result. Nothing mutates storage before the adapter call.

use crate::config::Config;
use crate::error::VfsError;
use crate::service::broadcast::Broadcaster;
use crate::service::{Fields, VfsMethod, VfsPayload, VfsReply};
use crate::storage::mounts::{MountConfig, MountRegistry, Mountpoint};
use crate::storage::paths::sanitize;
use crate::storage::permission::check_permission;
use crate::storage::watch::{self, WatchRegistration};
use crate::storage::{Adapter, AdapterRegistry, ByteSource, VfsContext};
use crate::utils::mime;
use crate::utils::session::{Session, User};
use serde_json::{Value, json};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::unbounded_channel;

pub struct Filesystem {
    config: Arc<Config>,
    adapters: AdapterRegistry,
    mounts: MountRegistry,
    watches: Mutex<Vec<WatchRegistration>>,
    broadcaster: Arc<Broadcaster>,
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, VfsError> {
    serde_json::to_value(value).map_err(|e| VfsError::Adapter(io::Error::other(e)))
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Filesystem {
    pub fn new(config: Arc<Config>, broadcaster: Arc<Broadcaster>) -> Arc<Self> {
        let adapters = AdapterRegistry::new(config.clone());
        Self::with_adapters(config, broadcaster, adapters)
    }

    pub fn with_adapters(
        config: Arc<Config>,
        broadcaster: Arc<Broadcaster>,
        adapters: AdapterRegistry,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            adapters,
            mounts: MountRegistry::new(),
            watches: Mutex::new(Vec::new()),
            broadcaster,
        })
    }

    /// Mounts everything declared in the configuration.
    pub async fn init(self: &Arc<Self>) {
        for mount in self.config.mounts.clone() {
            self.mount(mount).await;
        }
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        self.broadcaster.clone()
    }

    /// Extension/override-based MIME lookup.
    pub fn mime(&self, filename: &str) -> String {
        mime::lookup(&self.config.mime_overrides, filename)
    }

    /// Mounts a new mountpoint and attaches its watcher when applicable.
    pub async fn mount(self: &Arc<Self>, config: MountConfig) -> Arc<Mountpoint> {
        let mountpoint = self.mounts.mount(config).await;
        self.setup_watch(&mountpoint).await;
        mountpoint
    }

    /// Unmounts a mountpoint, closing its watcher first. Returns `false`
    /// when the mountpoint is not active; never fails.
    pub async fn unmount(&self, mountpoint: &Mountpoint) -> bool {
        let mut watches = self.watches.lock().await;
        if let Some(idx) = watches.iter().position(|w| w.mount_id == mountpoint.id) {
            watches.remove(idx).close().await;
        }
        drop(watches);

        self.mounts.unmount(mountpoint).await
    }

    pub async fn mountpoints(&self) -> Vec<Arc<Mountpoint>> {
        self.mounts.list().await
    }

    /// Closes every open watcher. Used on shutdown; logs failures
    /// instead of raising them.
    pub async fn close_watches(&self) {
        let registrations = std::mem::take(&mut *self.watches.lock().await);
        watch::close_all(registrations).await;
    }

    async fn setup_watch(self: &Arc<Self>, mountpoint: &Arc<Mountpoint>) {
        if !self.config.watch || !mountpoint.attributes.watch || mountpoint.template.is_none() {
            return;
        }
        let Some(adapter) = self.adapters.get(&mountpoint.adapter_name) else {
            return;
        };

        let (tx, rx) = unbounded_channel();
        match adapter.watch(mountpoint, tx) {
            None => {}
            Some(Err(err)) => {
                tracing::warn!(mount = %mountpoint.name, "could not watch mountpoint: {err}");
            }
            Some(Ok(handle)) => {
                let registration = WatchRegistration::start(
                    mountpoint.clone(),
                    handle,
                    rx,
                    self.broadcaster.clone(),
                );
                self.watches.lock().await.push(registration);
                tracing::info!(mount = %mountpoint.name, "watching mountpoint");
            }
        }
    }

    /// Resolves a sanitized VFS path to its mountpoint and adapter.
    async fn resolve(
        &self,
        path: &str,
        method: VfsMethod,
    ) -> Result<(Arc<Mountpoint>, Arc<dyn Adapter>), VfsError> {
        let mountpoint = self.mounts.resolve(path).await?;
        let adapter = self
            .adapters
            .get(&mountpoint.adapter_name)
            .ok_or_else(|| VfsError::InvalidOperation(method.name().to_string()))?;
        Ok((mountpoint, adapter))
    }

    /// Runs one VFS operation through the full pipeline.
    pub async fn dispatch(
        &self,
        session: &Session,
        method: VfsMethod,
        payload: VfsPayload,
    ) -> Result<VfsReply, VfsError> {
        let VfsPayload {
            mut fields,
            upload,
            range,
        } = payload;
        sanitize_fields(&mut fields);

        let ctx = VfsContext {
            user: session.user.clone(),
        };

        if matches!(method, VfsMethod::Copy | VfsMethod::Rename) {
            return self.dispatch_diverged(session, &ctx, method, &fields).await;
        }

        let path = match method {
            VfsMethod::Search => fields.root.clone(),
            _ => fields.path.clone(),
        }
        .ok_or_else(|| VfsError::Validation("missing required path field".to_string()))?;

        let (mountpoint, adapter) = self.resolve(&path, method).await?;
        check_permission(
            session,
            method.name(),
            &mountpoint,
            method.write_intent(),
            mountpoint.attributes.strict_groups,
        )?;

        match method {
            VfsMethod::Exists => {
                to_json(adapter.exists(&ctx, &mountpoint, &path).await?).map(VfsReply::Json)
            }
            VfsMethod::Stat => {
                to_json(adapter.stat(&ctx, &mountpoint, &path).await?).map(VfsReply::Json)
            }
            VfsMethod::Readdir => {
                to_json(adapter.readdir(&ctx, &mountpoint, &path).await?).map(VfsReply::Json)
            }
            VfsMethod::Readfile => {
                let stream = adapter.readfile(&ctx, &mountpoint, &path, range).await?;
                Ok(VfsReply::Stream {
                    stream,
                    filename: basename(&path),
                    download: fields.options.download,
                })
            }
            VfsMethod::Writefile => {
                // The spool file is dropped (and removed) with `upload`,
                // whichever branch this takes
                let upload = upload
                    .as_ref()
                    .ok_or_else(|| VfsError::Validation("missing upload file".to_string()))?;
                let source: ByteSource = Box::new(
                    tokio::fs::File::open(upload.file.path())
                        .await
                        .map_err(VfsError::Adapter)?,
                );

                let written = adapter.writefile(&ctx, &mountpoint, &path, source).await?;
                Ok(VfsReply::Json(match written {
                    Some(count) => json!(count),
                    None => json!(false),
                }))
            }
            VfsMethod::Mkdir => {
                let created = adapter
                    .mkdir(&ctx, &mountpoint, &path, fields.options.ensure)
                    .await?;
                to_json(created).map(VfsReply::Json)
            }
            VfsMethod::Unlink => {
                to_json(adapter.unlink(&ctx, &mountpoint, &path).await?).map(VfsReply::Json)
            }
            VfsMethod::Touch => {
                to_json(adapter.touch(&ctx, &mountpoint, &path).await?).map(VfsReply::Json)
            }
            VfsMethod::Search => {
                if !mountpoint.attributes.searchable {
                    return Ok(VfsReply::Json(json!([])));
                }
                let pattern = fields
                    .pattern
                    .as_deref()
                    .ok_or_else(|| VfsError::Validation("missing search pattern".to_string()))?;
                to_json(adapter.search(&ctx, &mountpoint, &path, pattern).await?)
                    .map(VfsReply::Json)
            }
            VfsMethod::Realpath => {
                let real = adapter.realpath(&ctx, &mountpoint, &path).await?;
                to_json(real.to_string_lossy()).map(VfsReply::Json)
            }
            VfsMethod::Copy | VfsMethod::Rename => unreachable!("handled above"),
        }
    }

    /// Copy/rename: both mountpoints resolve and permission-check
    /// independently: read intent on the source, write intent on the
    /// destination. Cross-adapter pairs stream through readfile +
    /// writefile (+ unlink for rename).
    async fn dispatch_diverged(
        &self,
        session: &Session,
        ctx: &VfsContext,
        method: VfsMethod,
        fields: &Fields,
    ) -> Result<VfsReply, VfsError> {
        let from = fields
            .from
            .as_deref()
            .ok_or_else(|| VfsError::Validation("missing 'from' field".to_string()))?;
        let to = fields
            .to
            .as_deref()
            .ok_or_else(|| VfsError::Validation("missing 'to' field".to_string()))?;

        let (src_mount, src_adapter) = self.resolve(from, method).await?;
        let (dst_mount, dst_adapter) = self.resolve(to, method).await?;

        check_permission(
            session,
            "readfile",
            &src_mount,
            false,
            src_mount.attributes.strict_groups,
        )?;
        check_permission(
            session,
            "writefile",
            &dst_mount,
            true,
            dst_mount.attributes.strict_groups,
        )?;

        if self.adapters.same_adapter(&src_mount, &dst_mount) {
            let moved = match method {
                VfsMethod::Copy => {
                    src_adapter
                        .copy(ctx, &src_mount, from, &dst_mount, to)
                        .await?
                }
                _ => {
                    src_adapter
                        .rename(ctx, &src_mount, from, &dst_mount, to)
                        .await?
                }
            };
            return to_json(moved).map(VfsReply::Json);
        }

        // Manual emulation across adapters
        let stream = src_adapter.readfile(ctx, &src_mount, from, None).await?;
        dst_adapter
            .writefile(ctx, &dst_mount, to, stream.reader)
            .await?;
        if method == VfsMethod::Rename {
            src_adapter.unlink(ctx, &src_mount, from).await?;
        }

        Ok(VfsReply::Json(json!(true)))
    }

    /// Programmatic entry point for non-HTTP callers: synthesizes a
    /// request from positional arguments. `readfile`/`writefile` are not
    /// available here since they exchange streams, not JSON.
    pub async fn call(&self, user: User, method: &str, args: &[&str]) -> Result<Value, VfsError> {
        let method = VfsMethod::from_name(method)
            .ok_or_else(|| VfsError::Validation(format!("unknown VFS method '{method}'")))?;

        let arg = |idx: usize| -> Result<String, VfsError> {
            args.get(idx).map(|s| s.to_string()).ok_or_else(|| {
                VfsError::Validation(format!(
                    "missing argument {} for '{}'",
                    idx + 1,
                    method.name()
                ))
            })
        };

        let fields = match method {
            VfsMethod::Copy | VfsMethod::Rename => Fields {
                from: Some(arg(0)?),
                to: Some(arg(1)?),
                ..Default::default()
            },
            VfsMethod::Search => Fields {
                root: Some(arg(0)?),
                pattern: Some(arg(1)?),
                ..Default::default()
            },
            VfsMethod::Readfile | VfsMethod::Writefile => {
                return Err(VfsError::Validation(format!(
                    "'{}' is not available through call",
                    method.name()
                )));
            }
            _ => Fields {
                path: Some(arg(0)?),
                ..Default::default()
            },
        };

        let session = Session::new(user);
        let payload = VfsPayload {
            fields,
            upload: None,
            range: None,
        };

        let reply = self.dispatch(&session, method, payload).await?;
        reply
            .into_json()
            .ok_or_else(|| VfsError::Validation("method did not return JSON".to_string()))
    }

    /// Resolves a VFS path to its true filesystem path. Internal only:
    /// never exposed over an HTTP route.
    pub async fn realpath(&self, path: &str, user: &User) -> Result<PathBuf, VfsError> {
        let path = sanitize(path);
        let (mountpoint, adapter) = self.resolve(&path, VfsMethod::Realpath).await?;
        let ctx = VfsContext { user: user.clone() };
        Ok(adapter.realpath(&ctx, &mountpoint, &path).await?)
    }
}

fn sanitize_fields(fields: &mut Fields) {
    for field in [
        &mut fields.path,
        &mut fields.from,
        &mut fields.to,
        &mut fields.root,
    ] {
        if let Some(value) = field {
            *value = sanitize(value);
        }
    }
}
