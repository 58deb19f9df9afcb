use crate::channel::pusher::Subscription;
use crate::channel::ChannelId;
use crate::config::{AppConfig, PusherConfig};
use crate::event::AppEvent;
use crate::export::{self, Archive};
use crate::session::TurnRequest;
use std::path::PathBuf;
use std::sync::mpsc;
use tokio::runtime::Handle;
use tracing::{error, info};

pub mod http;

use http::{BackendError, TurnClient};

/// Runs the network and disk side of the app on the tokio runtime and reports
/// every outcome back to the UI thread as an `AppEvent`.
pub struct BackendBridge {
    runtime_handle: Handle,
    tx: mpsc::Sender<AppEvent>,
    turns: TurnClient,
    pusher: PusherConfig,
    download_dir: PathBuf,
    subscription: Option<Subscription>,
}

impl BackendBridge {
    pub fn new(
        config: &AppConfig,
        runtime_handle: Handle,
        tx: mpsc::Sender<AppEvent>,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            runtime_handle,
            tx,
            turns: TurnClient::new(
                config.backend_url.clone(),
                config.connect_timeout(),
                config.request_timeout(),
            )?,
            pusher: config.pusher.clone(),
            download_dir: config.resolved_download_dir(),
            subscription: None,
        })
    }

    /// Subscribes to `channel_id`, tearing down any previous subscription.
    pub fn open_channel(&mut self, channel_id: &ChannelId) {
        self.close_channel();
        self.subscription = Some(Subscription::spawn(
            &self.runtime_handle,
            self.pusher.clone(),
            channel_id.clone(),
            self.tx.clone(),
        ));
    }

    pub fn close_channel(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            info!(channel = %subscription.channel_id(), "unsubscribing");
            subscription.close();
        }
    }

    pub fn send_turn(&self, request: TurnRequest) {
        let tx = self.tx.clone();
        let turns = self.turns.clone();

        self.runtime_handle.spawn(async move {
            let channel_id = request.channel_id.clone();
            match turns.start_turn(&request).await {
                Ok(response) => {
                    let _ = tx.send(AppEvent::TurnAccepted {
                        channel_id,
                        thread_id: response.thread_id,
                    });
                }
                Err(err) => {
                    error!(endpoint = turns.endpoint(), error = %err, "failed to start turn");
                    let _ = tx.send(AppEvent::TurnFailed {
                        channel_id,
                        message: err.to_string(),
                    });
                }
            }
        });
    }

    pub fn save_archive(&self, archive: Archive) {
        let tx = self.tx.clone();
        let dir = self.download_dir.clone();

        self.runtime_handle.spawn_blocking(move || {
            match export::save_archive(&archive, &dir) {
                Ok(path) => {
                    info!(path = %path.display(), "archive saved");
                    let _ = tx.send(AppEvent::ArchiveSaved(path));
                }
                Err(err) => {
                    error!(dir = %dir.display(), error = %err, "failed to save archive");
                    let _ = tx.send(AppEvent::ArchiveFailed(err.to_string()));
                }
            }
        });
    }
}

impl Drop for BackendBridge {
    fn drop(&mut self) {
        self.close_channel();
    }
}
