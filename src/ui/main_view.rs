use std::sync::Arc;

use super::render_util::frame_to_image;
use super::{
    ActiveTheme, AnyElement, AppView, Button, ButtonVariants, CAMERA_MAX_HEIGHT, CAMERA_MIN_HEIGHT,
    CAMERA_PANEL_WIDTH, Context, DEFAULT_CAMERA_RATIO, IntoElement, OVERLAY_OFF_LABEL,
    OVERLAY_ON_LABEL, ObjectFit, ParentElement, Selectable, SharedString, Status, Styled,
    StyledExt, StyledImage, Window, div, h_flex, img, px, v_flex,
};
use crate::types::TARGET_LETTERS;

const LETTERS_PER_ROW: usize = 8;

impl AppView {
    pub(super) fn render_main(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        self.drain_channels(window, cx);

        let background = cx.theme().background;

        let hands_status = if self.latest_hands.is_empty() {
            "no hand in view".to_string()
        } else {
            self.latest_hands
                .iter()
                .map(|hand| hand.handedness.label())
                .collect::<Vec<_>>()
                .join(" + ")
        };
        let frame_status = self
            .latest_frame
            .as_ref()
            .map(|f| {
                format!(
                    "Camera: {} {}x{}, {hands_status}",
                    self.camera_label, f.width, f.height
                )
            })
            .unwrap_or_else(|| format!("Camera: {}, waiting for frames...", self.camera_label));

        let ratio = self.camera_aspect_ratio();
        let camera_height = (CAMERA_PANEL_WIDTH / ratio).clamp(CAMERA_MIN_HEIGHT, CAMERA_MAX_HEIGHT);

        let frame_view: AnyElement = if let Some(image) = &self.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .rounded_t_lg()
                .into_any_element()
        } else {
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .rounded_t_lg()
                .child("Waiting for camera...")
                .into_any_element()
        };

        let camera_card = v_flex()
            .w(px(CAMERA_PANEL_WIDTH))
            .rounded_lg()
            .overflow_hidden()
            .bg(gpui::rgb(0x0f1419))
            .child(
                div()
                    .relative()
                    .w_full()
                    .h(px(camera_height))
                    .overflow_hidden()
                    .bg(gpui::rgb(0x000000))
                    .child(frame_view),
            )
            .child(
                v_flex()
                    .gap_2()
                    .p_3()
                    .child(
                        div()
                            .text_xs()
                            .text_color(gpui::rgb(0x8b95a5))
                            .overflow_hidden()
                            .text_ellipsis()
                            .whitespace_nowrap()
                            .child(frame_status),
                    )
                    .child(self.render_overlay_toggle(cx)),
            );

        let controls = v_flex()
            .flex_1()
            .gap_3()
            .child(self.render_letter_picker(cx))
            .child(self.render_capture_controls(cx))
            .child(self.render_result_panel(cx));

        v_flex()
            .size_full()
            .bg(background)
            .child(
                h_flex()
                    .flex_1()
                    .gap_3()
                    .p_4()
                    .items_start()
                    .child(camera_card)
                    .child(controls),
            )
            .into_any_element()
    }

    /// Pulls everything the worker threads produced since the last paint:
    /// landmark results, camera frames and state-store notifications.
    fn drain_channels(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let hands_rx = self.hands_rx.take();
        if let Some(rx) = hands_rx.as_ref() {
            while let Ok(landmarked) = rx.try_recv() {
                self.latest_hands = landmarked.hands;
            }
        }
        self.hands_rx = hands_rx;

        let frame_rx = self.frame_rx.take();
        if let Some(rx) = frame_rx.as_ref() {
            let mut frames = Vec::new();
            while let Ok(frame) = rx.try_recv() {
                frames.push(frame);
            }

            for frame in frames {
                let hands = self.overlay_visible.then(|| self.latest_hands.clone());
                if let Some(image) = frame_to_image(&frame, hands.as_deref()) {
                    self.replace_latest_image(image, window, cx);
                }
                self.latest_frame = Some(frame);
            }
        }
        self.frame_rx = frame_rx;

        while let Ok(snapshot) = self.store_rx.try_recv() {
            self.snapshot = snapshot;
        }
    }

    fn render_overlay_toggle(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let label = if self.overlay_visible {
            OVERLAY_ON_LABEL
        } else {
            OVERLAY_OFF_LABEL
        };

        Button::new(SharedString::from("overlay-toggle"))
            .outline()
            .label(label)
            .on_click(cx.listener(|this, _, window, cx| {
                this.toggle_overlay(window, cx);
                cx.notify();
            }))
            .into_any_element()
    }

    /// Flips the skeleton flag and rebuilds the current image right away,
    /// so turning the overlay off clears it without waiting for the next
    /// camera frame.
    fn toggle_overlay(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        self.overlay_visible = !self.overlay_visible;

        if let Some(frame) = self.latest_frame.clone() {
            let hands = self.overlay_visible.then(|| self.latest_hands.clone());
            if let Some(image) = frame_to_image(&frame, hands.as_deref()) {
                self.replace_latest_image(image, window, cx);
            }
        }
    }

    fn render_letter_picker(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        let mut picker = v_flex()
            .gap_2()
            .p_3()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                div()
                    .text_sm()
                    .font_semibold()
                    .text_color(theme.foreground)
                    .child("Target letter"),
            );

        for row in TARGET_LETTERS.chunks(LETTERS_PER_ROW) {
            let mut letter_row = h_flex().gap_1();
            for &letter in row {
                let is_selected = self.selected_letter == Some(letter);
                letter_row = letter_row.child(
                    Button::new(SharedString::from(format!("letter-{letter}")))
                        .outline()
                        .label(letter)
                        .selected(is_selected)
                        .on_click(cx.listener(move |this, _, _, cx| {
                            this.selected_letter = Some(letter);
                            this.validation_message = None;
                            cx.notify();
                        })),
                );
            }
            picker = picker.child(letter_row);
        }

        picker.into_any_element()
    }

    fn render_capture_controls(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        let capturing = self.snapshot.status == Status::Loading;

        let mut controls = h_flex().gap_2().items_center().child(
            Button::new(SharedString::from("capture"))
                .primary()
                .label(if capturing {
                    "Classifying..."
                } else {
                    "Capture & Classify"
                })
                .on_click(cx.listener(|this, _, _, cx| {
                    this.start_capture();
                    cx.notify();
                })),
        );

        if let Some(message) = &self.validation_message {
            controls = controls.child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0xfbbf24))
                    .child(message.clone()),
            );
        }

        div()
            .p_3()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(controls)
            .into_any_element()
    }

    fn render_result_panel(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();

        let status_text = match self.snapshot.status {
            Status::Idle => "Ready".to_string(),
            Status::Loading => "Classifying...".to_string(),
            Status::RequestDone => "Classification done".to_string(),
            Status::Error => self
                .snapshot
                .error_message
                .clone()
                .unwrap_or_else(|| "Error".to_string()),
        };

        let mut panel = v_flex()
            .gap_2()
            .p_3()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex()
                    .justify_between()
                    .items_center()
                    .child(
                        div()
                            .text_sm()
                            .font_semibold()
                            .text_color(theme.foreground)
                            .child("Result"),
                    )
                    .child(
                        div()
                            .text_xs()
                            .text_color(theme.muted_foreground)
                            .child(status_text),
                    ),
            );

        if let Some(result) = &self.snapshot.result {
            panel = panel
                .child(result_row(
                    "Letter",
                    result.detected_letter.clone(),
                    theme.foreground,
                ))
                .child(result_row(
                    "Confidence",
                    result.confidence_pct(),
                    theme.foreground,
                ))
                .child(result_row(
                    "Hand",
                    result.hand_detected.clone(),
                    theme.foreground,
                ));
        } else {
            panel = panel.child(
                div()
                    .text_xs()
                    .text_color(theme.muted_foreground)
                    .child("No capture yet."),
            );
        }

        panel.into_any_element()
    }

    fn camera_aspect_ratio(&self) -> f32 {
        if let Some(frame) = &self.latest_frame {
            if frame.height > 0 {
                return frame.width as f32 / frame.height as f32;
            }
        }
        DEFAULT_CAMERA_RATIO
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<super::RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // Explicitly drop the previous GPU texture; otherwise the sprite atlas keeps
            // every frame and memory will climb rapidly while the camera is running.
            cx.drop_image(old_image, Some(window));
        }
    }
}

fn result_row(label: &'static str, value: String, color: gpui::Hsla) -> AnyElement {
    h_flex()
        .justify_between()
        .items_center()
        .child(
            div()
                .text_xs()
                .text_color(gpui::rgb(0x8b95a5))
                .child(label),
        )
        .child(div().text_sm().text_color(color).child(value))
        .into_any_element()
}
