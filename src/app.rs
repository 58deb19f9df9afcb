use crate::backend::BackendBridge;
use crate::event::AppEvent;
use crate::files::FileStatus;
use crate::session::chat::{ChatMessage, Sender};
use crate::session::Session;
use crate::theme::Theme;
use eframe::egui::{self, Align, Layout, RichText, ScrollArea};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;
use tracing::{error, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct CodeloomApp {
    rx: Receiver<AppEvent>,
    bridge: BackendBridge,
    session: Session,
    theme: Theme,
    theme_applied: bool,
    channel_closed: bool,
}

impl CodeloomApp {
    pub fn new(rx: Receiver<AppEvent>, mut bridge: BackendBridge, session: Session) -> Self {
        bridge.open_channel(session.channel_id());
        Self {
            rx,
            bridge,
            session,
            theme: Theme::default(),
            theme_applied: false,
            channel_closed: false,
        }
    }

    fn drain_events(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.session.handle_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.channel_closed {
                        error!("event channel disconnected");
                        self.channel_closed = true;
                    }
                    break;
                }
            }
        }
    }

    fn submit(&mut self) {
        if let Some(request) = self.session.submit_input() {
            self.bridge.send_turn(request);
        }
    }

    fn restart(&mut self) {
        self.bridge.close_channel();
        self.session.restart();
        self.bridge.open_channel(self.session.channel_id());
    }

    fn download(&mut self) {
        match self.session.export() {
            Ok(archive) => self.bridge.save_archive(archive),
            Err(err) => {
                warn!(error = %err, "failed to build archive");
                self.session
                    .handle_event(AppEvent::ArchiveFailed(err.to_string()));
            }
        }
    }

    fn render_top_bar(&mut self, ctx: &egui::Context) {
        let mut restart = false;
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.strong("Codeloom");
                ui.separator();
                if let Some(project) = self.session.project_name() {
                    ui.label(RichText::new(project).color(self.theme.accent_teal));
                    ui.separator();
                }
                let state = self.session.channel_state();
                ui.label(RichText::new(state.label()).color(self.theme.text_muted))
                    .on_hover_text(format!(
                        "channel {}\nthread {}",
                        self.session.channel_id(),
                        self.session.thread_id().unwrap_or("-")
                    ));

                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    ui.menu_button("Settings", |ui| {
                        if ui.button("Restart session").clicked() {
                            restart = true;
                            ui.close_menu();
                        }
                    });
                });
            });
        });

        if restart {
            self.restart();
        }
    }

    fn render_message(&self, ui: &mut egui::Ui, message: &ChatMessage) {
        let (fill, who, layout) = match (message.sender, message.is_error) {
            (_, true) => (self.theme.error_bubble, "AI", Layout::left_to_right(Align::Min)),
            (Sender::User, false) => (self.theme.user_bubble, "You", Layout::right_to_left(Align::Min)),
            (Sender::Assistant, false) => {
                (self.theme.assistant_bubble, "AI", Layout::left_to_right(Align::Min))
            }
        };
        ui.with_layout(layout, |ui| {
            self.theme.bubble_frame(fill).show(ui, |ui| {
                ui.set_max_width(ui.available_width() * 0.75);
                ui.vertical(|ui| {
                    ui.label(RichText::new(who).small().strong());
                    ui.label(&message.content);
                });
            });
        });
        ui.add_space(self.theme.spacing_8);
    }

    fn render_chat_panel(&mut self, ctx: &egui::Context) {
        let mut send_now = false;
        egui::SidePanel::left("chat_panel")
            .resizable(true)
            .default_width(420.0)
            .show(ctx, |ui| {
                let transcript_height = (ui.available_height() - 48.0).max(120.0);
                ScrollArea::vertical()
                    .id_salt("chat_transcript")
                    .max_height(transcript_height)
                    .auto_shrink([false, false])
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for message in self.session.messages() {
                            self.render_message(ui, message);
                        }

                        let streaming = self.session.streaming_message();
                        if !streaming.is_empty() {
                            let partial = ChatMessage::assistant(streaming);
                            self.render_message(ui, &partial);
                        }

                        if self.session.is_loading() {
                            ui.vertical_centered(|ui| {
                                ui.add(egui::Spinner::new().color(self.theme.accent_teal));
                            });
                        }
                    });

                ui.separator();
                ui.horizontal(|ui| {
                    let loading = self.session.is_loading();
                    let response = ui.add(
                        egui::TextEdit::singleline(&mut self.session.input)
                            .desired_width(ui.available_width() - 72.0)
                            .hint_text("Type your message..."),
                    );
                    if response.lost_focus()
                        && ui.input(|i| i.key_pressed(egui::Key::Enter))
                        && !loading
                    {
                        send_now = true;
                        response.request_focus();
                    }

                    let can_send = !loading && !self.session.input.trim().is_empty();
                    if ui.add_enabled(can_send, egui::Button::new("Send")).clicked() {
                        send_now = true;
                    }
                });
            });

        if send_now {
            self.submit();
        }
    }

    fn render_files_panel(&mut self, ctx: &egui::Context) {
        let mut toggle: Option<String> = None;
        let mut select: Option<String> = None;
        let mut download = false;

        egui::SidePanel::left("files_panel")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.heading(RichText::new("Generated Files").color(self.theme.accent_teal));
                let registry = self.session.registry();
                if !registry.is_empty() {
                    ui.label(
                        RichText::new(format!(
                            "{} of {} complete",
                            registry.count_with_status(FileStatus::Complete),
                            registry.len()
                        ))
                        .small()
                        .color(self.theme.text_muted),
                    );
                }
                ui.separator();

                let tree_height = (ui.available_height() - 64.0).max(80.0);
                ScrollArea::vertical()
                    .id_salt("file_tree")
                    .max_height(tree_height)
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        for row in self.session.tree_rows() {
                            ui.horizontal(|ui| {
                                ui.add_space(row.depth as f32 * self.theme.tree_indent);
                                if row.node.is_folder() {
                                    let marker = if row.expanded { "▾" } else { "▸" };
                                    let label = RichText::new(format!("{marker} {}", row.node.name))
                                        .color(self.theme.accent_primary);
                                    if ui.selectable_label(false, label).clicked() {
                                        toggle = Some(row.node.path.clone());
                                    }
                                    return;
                                }

                                let badge = row.file;
                                let selected = badge.is_some_and(|badge| badge.selected);
                                let generating =
                                    badge.is_some_and(|badge| badge.status == FileStatus::Generating);
                                let mut label = RichText::new(&row.node.name);
                                if generating {
                                    label = label.background_color(self.theme.generating_tint);
                                }
                                if let Some(badge) = badge {
                                    label = label.color(if selected {
                                        self.theme.text_on_accent
                                    } else {
                                        self.theme.status_color(badge.status)
                                    });
                                }
                                if ui.selectable_label(selected, label).clicked() {
                                    select = Some(row.node.path.clone());
                                }
                                if generating {
                                    ui.add(egui::Spinner::new().size(10.0));
                                }
                            });
                        }
                    });

                if !self.session.structure().is_empty() {
                    ui.separator();
                    ui.vertical_centered(|ui| {
                        if ui.button("Download Project").clicked() {
                            download = true;
                        }
                    });
                }
                if let Some(notice) = self.session.notice() {
                    ui.label(RichText::new(notice).small().color(self.theme.text_muted));
                }
            });

        if let Some(path) = toggle {
            self.session.toggle_folder(&path);
        }
        if let Some(path) = select {
            self.session.select_file(&path);
        }
        if download {
            self.download();
        }
    }

    fn render_code_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(RichText::new("Code").color(self.theme.accent_primary));
            ui.separator();

            let Some((path, entry)) = self.session.selected_file() else {
                ui.centered_and_justified(|ui| {
                    ui.label(RichText::new("Select a file to view code").color(self.theme.text_muted));
                });
                return;
            };

            let generating = entry.status == FileStatus::Generating;
            ui.horizontal(|ui| {
                ui.label(RichText::new(path).monospace());
                if generating {
                    ui.add(egui::Spinner::new().size(12.0));
                    ui.label(RichText::new("Generating...").small().color(self.theme.accent_teal));
                } else {
                    ui.label(
                        RichText::new(entry.status.as_str())
                            .small()
                            .color(self.theme.status_color(entry.status)),
                    );
                }
            });

            let code_height = (ui.available_height() - 24.0).max(120.0);
            self.render_code(ui, entry.content.as_str(), generating, code_height);
        });
    }

    /// Read-only view; `follow` keeps the newest streamed lines in sight.
    fn render_code(&self, ui: &mut egui::Ui, content: &str, follow: bool, height: f32) {
        let mut text = content;
        self.theme.code_frame().show(ui, |ui| {
            ScrollArea::both()
                .id_salt("code_view")
                .max_height(height)
                .auto_shrink([false, false])
                .stick_to_bottom(follow)
                .show(ui, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut text)
                            .code_editor()
                            .desired_width(f32::INFINITY),
                    );
                });
        });
    }

    fn render_diagnostics(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("diagnostics_panel")
            .resizable(false)
            .show(ctx, |ui| {
                egui::CollapsingHeader::new("Diagnostics")
                    .default_open(false)
                    .show(ui, |ui| {
                        ScrollArea::vertical()
                            .id_salt("diagnostics_log")
                            .max_height(120.0)
                            .stick_to_bottom(true)
                            .show(ui, |ui| {
                                for entry in self.session.diagnostics() {
                                    ui.label(RichText::new(entry).small().monospace());
                                }
                            });
                    });
            });
    }
}

impl eframe::App for CodeloomApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.theme_applied {
            self.theme.apply_visuals(ctx);
            self.theme_applied = true;
        }

        self.drain_events();
        self.render_top_bar(ctx);
        self.render_diagnostics(ctx);
        self.render_chat_panel(ctx);
        self.render_files_panel(ctx);
        self.render_code_panel(ctx);
        ctx.request_repaint_after(POLL_INTERVAL);
    }
}
