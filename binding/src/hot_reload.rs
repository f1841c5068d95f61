//! # Configuration Hot Reload
//!
//! Watches the file behind a [`BoundConfig`] and reloads it when the file
//! changes on disk.

use crate::bound::BoundConfig;
use crate::schema::ConfigSchema;
use errors::{BindingError, Operation};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Configuration reload event.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigReloadEvent {
    Ready,

    /// File changed and the bound instance was reloaded
    Reloaded(PathBuf),

    /// Configuration file was removed
    Removed(PathBuf),

    /// Watching or reloading failed; the previous state is kept
    Error {
        path: PathBuf,
        error: String
    }
}

/// Reload `config` whenever its file changes and report each outcome.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Monitors the backing file with `notify` and calls
/// [`BoundConfig::reload`] on every create or modify event. The watcher
/// stops once the returned receiver is dropped.
///
/// ## Usage
/// ```rust,no_run
/// use binding::{BoundConfig, ConfigReloadEvent, ConfigSchema, FieldTable, Settings};
/// use std::sync::Arc;
///
/// #[derive(Debug, Default)]
/// struct Motd {
///     text: String
/// }
///
/// impl ConfigSchema for Motd {
///     fn settings() -> Settings {
///         Settings::new("motd.yml")
///     }
///
///     fn bind(fields: &mut FieldTable<Self>) {
///         fields.field("motd", |c| &c.text, |c| &mut c.text);
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Arc::new(BoundConfig::<Motd>::load("./data")?);
///     let mut rx = binding::watch_bound_config(Arc::clone(&config)).await?;
///
///     while let Some(event) = rx.recv().await {
///         if let ConfigReloadEvent::Reloaded(_) = event {
///             println!("motd is now {}", config.read().text);
///         }
///     }
///     Ok(())
/// }
/// ```
///
/// ## Event Types
/// - `Ready`: Watcher registered
/// - `Reloaded`: File content changed and was applied
/// - `Removed`: File deleted
/// - `Error`: Watcher setup or reload failed
///
/// Writes made through the same [`BoundConfig`] also trigger a reload,
/// which pulls the written values into the bound fields.
pub async fn watch_bound_config<C: ConfigSchema>(
    config: Arc<BoundConfig<C>>
) -> Result<mpsc::Receiver<ConfigReloadEvent>, BindingError> {
    let config_path = config.file_path().to_path_buf();

    if !config_path.exists() {
        return Err(BindingError::Io {
            operation: Operation::Reload,
            path: config_path,
            source: io::Error::new(io::ErrorKind::NotFound, "configuration file not found")
        });
    }

    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let (event_tx, mut event_rx) = mpsc::channel(100);
        let mut watcher = match RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            notify::Config::default()
        ) {
            Ok(w) => w,
            Err(e) => {
                let error_msg = format!("Failed to create file watcher: {}", e);
                error!(path = %config_path.display(), "{}", error_msg);
                let _ = tx
                    .send(ConfigReloadEvent::Error {
                        path: config_path,
                        error: error_msg
                    })
                    .await;
                return;
            }
        };

        if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
            let error_msg = format!("Failed to watch config file: {}", e);
            error!(path = %config_path.display(), "{}", error_msg);
            let _ = tx
                .send(ConfigReloadEvent::Error {
                    path: config_path,
                    error: error_msg
                })
                .await;
            return;
        }

        info!(path = %config_path.display(), "Watching config file");
        let _ = tx.send(ConfigReloadEvent::Ready).await;

        loop {
            tokio::select! {
                _ = tx.closed() => {
                    debug!(path = %config_path.display(), "Receiver dropped, stopping watcher");
                    break;
                }
                event_result = event_rx.recv() => {
                    let Some(event_result) = event_result else {
                        break;
                    };

                    let event = match event_result {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(error = %e, "Watch error");
                            continue;
                        }
                    };

                    let reload_event = match event.kind {
                        EventKind::Create(_) | EventKind::Modify(_) => {
                            reload(Arc::clone(&config), config_path.clone()).await
                        }
                        EventKind::Remove(_) => {
                            warn!(path = %config_path.display(), "Config file removed");
                            ConfigReloadEvent::Removed(config_path.clone())
                        }
                        _ => {
                            debug!(kind = ?event.kind, "Ignoring event");
                            continue;
                        }
                    };

                    if let Err(e) = tx.send(reload_event).await {
                        error!(error = %e, "Failed to send config reload event");
                        break;
                    }
                }
            }
        }
    });

    Ok(rx)
}

async fn reload<C: ConfigSchema>(config: Arc<BoundConfig<C>>, path: PathBuf) -> ConfigReloadEvent {
    match tokio::task::spawn_blocking(move || config.reload()).await {
        Ok(Ok(_)) => ConfigReloadEvent::Reloaded(path),
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Config reload failed");
            ConfigReloadEvent::Error {
                path,
                error: e.to_string()
            }
        }
        Err(e) => ConfigReloadEvent::Error {
            path,
            error: format!("Reload task failed: {}", e)
        }
    }
}
