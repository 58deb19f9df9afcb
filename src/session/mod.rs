use crate::channel::{ChannelId, ChannelState, ChatResponse, CodeChunk, FileStatusUpdate, PushEvent};
use crate::event::AppEvent;
use crate::export::{self, Archive, ExportError};
use crate::files::registry::{follow_up, FileEntry, FileEvent, Registry};
use crate::files::tree::{self, ExpansionSet, TreeRows};
use crate::files::{collect_files, folder_paths, StructureNode};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

pub mod chat;
pub mod identity;

use chat::{ChatMessage, Conversation};
use identity::SessionIds;

pub const SEND_FAILED_MESSAGE: &str = "Error: Failed to send message. Please try again.";
const MAX_DIAGNOSTICS: usize = 500;

/// Body of the POST that starts one assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRequest {
    pub input: String,
    pub thread_id: Option<String>,
    pub channel_id: ChannelId,
}

/// The session controller: conversation, generated files and the identity of
/// the push channel they arrive on. All mutation goes through `handle_event`
/// and the user-action methods, one call at a time.
pub struct Session {
    ids: Box<dyn SessionIds>,
    channel_id: ChannelId,
    thread_id: Option<String>,
    channel_state: ChannelState,
    pub input: String,
    conversation: Conversation,
    loading: bool,
    structure: Vec<StructureNode>,
    registry: Registry,
    expansion: ExpansionSet,
    project_name: Option<String>,
    diagnostics: VecDeque<String>,
    notice: Option<String>,
}

impl Session {
    pub fn new(mut ids: Box<dyn SessionIds>) -> Self {
        let channel_id = ids.next_channel_id();
        Self {
            ids,
            channel_id,
            thread_id: None,
            channel_state: ChannelState::Disconnected,
            input: String::new(),
            conversation: Conversation::default(),
            loading: false,
            structure: Vec::new(),
            registry: Registry::new(),
            expansion: ExpansionSet::new(),
            project_name: None,
            diagnostics: VecDeque::new(),
            notice: None,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel_state
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.conversation.messages()
    }

    pub fn streaming_message(&self) -> &str {
        self.conversation.streaming()
    }

    pub fn structure(&self) -> &[StructureNode] {
        &self.structure
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[cfg(test)]
    pub fn expansion(&self) -> &ExpansionSet {
        &self.expansion
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project_name.as_deref()
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &String> {
        self.diagnostics.iter()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn tree_rows(&self) -> TreeRows<'_> {
        tree::rows(&self.structure, &self.expansion, &self.registry)
    }

    pub fn selected_file(&self) -> Option<(&str, &FileEntry)> {
        self.registry.selected()
    }

    fn log_diagnostic(&mut self, message: impl Into<String>) {
        if self.diagnostics.len() == MAX_DIAGNOSTICS {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(format!(
            "[{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            message.into()
        ));
    }

    /// Takes the composer text and starts a turn with it.
    pub fn submit_input(&mut self) -> Option<TurnRequest> {
        let text = std::mem::take(&mut self.input);
        let request = self.send_message(&text);
        if request.is_none() {
            self.input = text;
        }
        request
    }

    /// Records the user's message and returns the request to send. Blank
    /// input is ignored.
    pub fn send_message(&mut self, text: &str) -> Option<TurnRequest> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        self.conversation.push(ChatMessage::user(text));
        self.loading = true;
        info!(channel = %self.channel_id, thread = ?self.thread_id, "starting turn");
        Some(TurnRequest {
            input: text.to_string(),
            thread_id: self.thread_id.clone(),
            channel_id: self.channel_id.clone(),
        })
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        if let Some(channel_id) = event.channel_id() {
            if *channel_id != self.channel_id {
                debug!(stale = %channel_id, current = %self.channel_id, "dropping event from a previous session");
                return;
            }
        }

        match event {
            AppEvent::Push { event, .. } => self.handle_push(event),
            AppEvent::ChannelState { state, .. } => {
                self.channel_state = state;
                self.log_diagnostic(format!("channel {}", state.label().to_lowercase()));
            }
            AppEvent::ChannelFault { message, .. } => {
                self.log_diagnostic(format!("channel: {message}"));
            }
            AppEvent::TurnAccepted { thread_id, .. } => {
                debug!(%thread_id, "turn accepted");
                self.thread_id = Some(thread_id);
            }
            AppEvent::TurnFailed { message, .. } => {
                warn!(%message, "turn request failed");
                self.log_diagnostic(format!("send failed: {message}"));
                self.loading = false;
                self.conversation.push(ChatMessage::error(SEND_FAILED_MESSAGE));
            }
            AppEvent::ArchiveSaved(path) => {
                let message = format!("Saved {}", path.display());
                self.log_diagnostic(message.clone());
                self.notice = Some(message);
            }
            AppEvent::ArchiveFailed(message) => {
                self.log_diagnostic(format!("export failed: {message}"));
                self.notice = Some(format!("Export failed: {message}"));
            }
        }
    }

    fn handle_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::ChatResponse(response) => self.handle_chat_response(response),
            PushEvent::InitialStructure(initial) => self.handle_structure(initial.structure),
            PushEvent::CodeChunk(chunk) => self.handle_code_chunk(chunk),
            PushEvent::FileStatus(update) => self.handle_file_status(update),
            PushEvent::Error(error) => {
                warn!(message = %error.message, "backend reported an error");
                self.loading = false;
                self.conversation.push(ChatMessage::error(format!(
                    "Error: {}. Please try again.",
                    error.message
                )));
            }
        }
    }

    fn handle_chat_response(&mut self, response: ChatResponse) {
        if response.message_start {
            self.conversation.begin_stream();
            self.loading = false;
        } else if response.is_complete {
            self.conversation
                .finish_stream(response.message.as_deref());
            self.loading = false;
        } else if let Some(chunk) = response.message.as_deref() {
            self.conversation.push_chunk(chunk);
        }

        if response.run_completed {
            self.loading = false;
        }
    }

    fn handle_structure(&mut self, structure: Vec<StructureNode>) {
        if !self.structure.is_empty() || !self.registry.is_empty() {
            warn!("file structure received again; replacing the current one");
            self.log_diagnostic("file structure replaced mid-session");
        }
        if structure.is_empty() {
            self.log_diagnostic("received an empty file structure");
        }

        self.project_name = structure.first().map(|node| node.name.clone());
        self.expansion = ExpansionSet::expand_all(folder_paths(&structure));
        let files = collect_files(&structure);
        let distinct: HashSet<&str> = files.iter().map(|seed| seed.path.as_str()).collect();
        if distinct.len() < files.len() {
            warn!(
                duplicates = files.len() - distinct.len(),
                "file structure repeats paths; only the first node per path is shown"
            );
            self.log_diagnostic("file structure repeats paths");
        }
        info!(files = files.len(), project = ?self.project_name, "file structure received");
        self.structure = structure;
        self.dispatch(FileEvent::InitializeFiles(files));
    }

    fn handle_code_chunk(&mut self, chunk: CodeChunk) {
        let Some(path) = chunk.file_path else {
            self.log_diagnostic("code chunk without a file path ignored");
            return;
        };
        self.dispatch(FileEvent::AppendContent {
            path,
            chunk: chunk.content,
        });
    }

    fn handle_file_status(&mut self, update: FileStatusUpdate) {
        debug!(path = %update.file_path, status = %update.status, "file status");
        self.dispatch(FileEvent::SetStatus {
            path: update.file_path,
            status: update.status,
        });
    }

    /// Applies a registry transition and any transitions it implies, in order.
    fn dispatch(&mut self, event: FileEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let next = follow_up(&event);
            match self.registry.apply(event) {
                Ok(()) => queue.extend(next),
                Err(err) => {
                    warn!(error = %err, "registry transition rejected");
                    self.log_diagnostic(format!("protocol violation: {err}"));
                }
            }
        }
    }

    pub fn select_file(&mut self, path: &str) {
        self.dispatch(FileEvent::SelectFile(path.to_string()));
    }

    pub fn toggle_folder(&mut self, path: &str) {
        self.expansion.toggle(path);
    }

    pub fn export(&mut self) -> Result<Archive, ExportError> {
        let archive =
            export::build_archive(&self.structure, &self.registry, self.project_name.as_deref())?;
        for path in &archive.skipped {
            self.log_diagnostic(format!("duplicate archive path left out: {path}"));
        }
        Ok(archive)
    }

    /// Forgets everything about the current session and switches to a fresh
    /// channel identity. The caller re-subscribes under `channel_id()`.
    pub fn restart(&mut self) {
        let previous = std::mem::replace(&mut self.channel_id, self.ids.next_channel_id());
        info!(%previous, next = %self.channel_id, "restarting session");
        self.thread_id = None;
        self.channel_state = ChannelState::Disconnected;
        self.input.clear();
        self.conversation.clear();
        self.loading = false;
        self.structure.clear();
        self.registry = Registry::new();
        self.expansion.clear();
        self.project_name = None;
        self.notice = None;
        self.log_diagnostic(format!("session restarted on {}", self.channel_id));
    }
}
