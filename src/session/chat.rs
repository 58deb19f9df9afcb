#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub content: String,
    pub is_error: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            content: content.into(),
            is_error: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            content: content.into(),
            is_error: true,
        }
    }
}

/// Append-only transcript plus the assistant message still being streamed.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    streaming: String,
}

impl Conversation {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn streaming(&self) -> &str {
        &self.streaming
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn begin_stream(&mut self) {
        self.streaming.clear();
    }

    pub fn push_chunk(&mut self, chunk: &str) {
        self.streaming.push_str(chunk);
    }

    /// Closes the streamed message. Only the server's full text is recorded;
    /// the local buffer is display-only and is discarded either way.
    pub fn finish_stream(&mut self, authoritative: Option<&str>) -> bool {
        self.streaming.clear();
        match authoritative {
            Some(content) if !content.trim().is_empty() => {
                self.messages.push(ChatMessage::assistant(content));
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.streaming.clear();
    }
}
