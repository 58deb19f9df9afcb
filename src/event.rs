use crate::channel::{ChannelId, ChannelState, PushEvent};
use std::path::PathBuf;

/// Everything that reaches the UI thread from background tasks. Events are
/// drained in arrival order and applied one at a time.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Push {
        channel_id: ChannelId,
        event: PushEvent,
    },
    ChannelState {
        channel_id: ChannelId,
        state: ChannelState,
    },
    ChannelFault {
        channel_id: ChannelId,
        message: String,
    },
    TurnAccepted {
        channel_id: ChannelId,
        thread_id: String,
    },
    TurnFailed {
        channel_id: ChannelId,
        message: String,
    },
    ArchiveSaved(PathBuf),
    ArchiveFailed(String),
}

impl AppEvent {
    /// The session an event belongs to, if it is session-scoped.
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            Self::Push { channel_id, .. }
            | Self::ChannelState { channel_id, .. }
            | Self::ChannelFault { channel_id, .. }
            | Self::TurnAccepted { channel_id, .. }
            | Self::TurnFailed { channel_id, .. } => Some(channel_id),
            Self::ArchiveSaved(_) | Self::ArchiveFailed(_) => None,
        }
    }
}
