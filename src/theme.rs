use crate::files::FileStatus;
use eframe::egui::{self, Color32, CornerRadius, FontId, Frame, Margin, Stroke, TextStyle};

#[derive(Debug, Clone)]
pub struct Theme {
    pub surface_0: Color32,
    pub surface_1: Color32,
    pub surface_2: Color32,
    pub surface_3: Color32,
    pub accent_primary: Color32,
    pub accent_muted: Color32,
    pub accent_teal: Color32,
    pub success: Color32,
    pub danger: Color32,
    pub text_primary: Color32,
    pub text_muted: Color32,
    pub text_on_accent: Color32,
    pub user_bubble: Color32,
    pub assistant_bubble: Color32,
    pub error_bubble: Color32,
    pub generating_tint: Color32,
    pub selected_fill: Color32,
    pub spacing_8: f32,
    pub spacing_12: f32,
    pub tree_indent: f32,
    pub radius_8: u8,
    pub radius_12: u8,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            surface_0: Color32::from_rgb(0x11, 0x18, 0x27),
            surface_1: Color32::from_rgb(0x17, 0x1F, 0x2E),
            surface_2: Color32::from_rgb(0x1F, 0x29, 0x37),
            surface_3: Color32::from_rgb(0x37, 0x41, 0x51),
            accent_primary: Color32::from_rgb(0x3B, 0x82, 0xF6),
            accent_muted: Color32::from_rgb(0x25, 0x63, 0xEB),
            accent_teal: Color32::from_rgb(0x2D, 0xD4, 0xBF),
            success: Color32::from_rgb(0x22, 0xC5, 0x5E),
            danger: Color32::from_rgb(0xEF, 0x44, 0x44),
            text_primary: Color32::from_rgb(0xE5, 0xE7, 0xEB),
            text_muted: Color32::from_rgb(0x9C, 0xA3, 0xAF),
            text_on_accent: Color32::from_rgb(0xF8, 0xFB, 0xFF),
            user_bubble: Color32::from_rgba_premultiplied(0x25, 0x63, 0xEB, 128),
            assistant_bubble: Color32::from_rgb(0x37, 0x41, 0x51),
            error_bubble: Color32::from_rgba_premultiplied(0x7F, 0x1D, 0x1D, 128),
            generating_tint: Color32::from_rgb(0x14, 0x53, 0x2D),
            selected_fill: Color32::from_rgb(0x25, 0x63, 0xEB),
            spacing_8: 8.0,
            spacing_12: 12.0,
            tree_indent: 16.0,
            radius_8: 8,
            radius_12: 12,
        }
    }
}

impl Theme {
    pub fn apply_visuals(&self, ctx: &egui::Context) {
        let mut visuals = egui::Visuals::dark();
        visuals.panel_fill = self.surface_1;
        visuals.extreme_bg_color = self.surface_0;
        visuals.override_text_color = Some(self.text_primary);
        visuals.widgets.noninteractive.bg_fill = self.surface_2;
        visuals.widgets.noninteractive.bg_stroke = Stroke::NONE;
        visuals.widgets.inactive.bg_fill = self.surface_2;
        visuals.widgets.inactive.weak_bg_fill = self.surface_2;
        visuals.widgets.hovered.bg_fill = self.surface_3;
        visuals.widgets.hovered.weak_bg_fill = self.surface_3;
        visuals.widgets.active.bg_fill = self.accent_muted;
        visuals.selection.bg_fill = self.selected_fill;
        visuals.hyperlink_color = self.accent_primary;
        visuals.window_fill = self.surface_1;

        let mut style = (*ctx.style()).clone();
        style.visuals = visuals;
        style.spacing.item_spacing = egui::vec2(8.0, 6.0);
        style.spacing.button_padding = egui::vec2(10.0, 6.0);
        style.text_styles.insert(TextStyle::Heading, FontId::proportional(17.0));
        style.text_styles.insert(TextStyle::Body, FontId::proportional(13.0));
        style.text_styles.insert(TextStyle::Monospace, FontId::monospace(12.0));
        style.text_styles.insert(TextStyle::Small, FontId::proportional(11.0));
        ctx.set_style(style);
    }

    pub fn bubble_frame(&self, fill: Color32) -> Frame {
        Frame::new()
            .fill(fill)
            .inner_margin(Margin::same(self.spacing_12 as i8))
            .corner_radius(CornerRadius::same(self.radius_8))
            .stroke(Stroke::NONE)
    }

    pub fn code_frame(&self) -> Frame {
        Frame::new()
            .fill(self.surface_2)
            .inner_margin(Margin::same(self.spacing_12 as i8))
            .corner_radius(CornerRadius::same(self.radius_12))
    }

    pub fn status_color(&self, status: FileStatus) -> Color32 {
        match status {
            FileStatus::Pending => self.text_muted,
            FileStatus::Generating => self.accent_teal,
            FileStatus::Complete => self.success,
            FileStatus::Error => self.danger,
        }
    }
}
