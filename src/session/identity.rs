use crate::channel::ChannelId;
use uuid::Uuid;

/// Hands out the channel identity for each new session.
pub trait SessionIds: Send {
    fn next_channel_id(&mut self) -> ChannelId;
}

#[derive(Debug, Default)]
pub struct UuidSessionIds;

impl SessionIds for UuidSessionIds {
    fn next_channel_id(&mut self) -> ChannelId {
        ChannelId::new(format!("user-{}", Uuid::new_v4().simple()))
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: u32,
}

#[cfg(test)]
impl SessionIds for SequentialIds {
    fn next_channel_id(&mut self) -> ChannelId {
        self.next += 1;
        ChannelId::new(format!("user-{}", self.next))
    }
}
