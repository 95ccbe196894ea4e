use std::{mem, sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, unbounded};
use gpui::{
    AnyElement, App, AppContext, Context, IntoElement, ObjectFit, ParentElement, Render,
    RenderImage, SharedString, Styled, StyledImage, TitlebarOptions, Window, WindowOptions, div,
    img, px,
};
use gpui_component::{
    ActiveTheme, Root, Selectable, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    tag::Tag,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    config::Settings,
    model_download::ModelDownloadEvent,
    pipeline::{
        camera::{self, CameraStream},
        landmarker::{self, LandmarkerBackend},
    },
    state::{AppSnapshot, StateStore, Status, Subscription},
    types::{Frame, Hand, LandmarkedFrame},
    upload,
};

mod download;
mod main_view;
mod render_util;

const OVERLAY_ON_LABEL: &str = "Hide Skeleton";
const OVERLAY_OFF_LABEL: &str = "Show Skeleton";

const CAMERA_PANEL_WIDTH: f32 = 640.0;
const CAMERA_MIN_HEIGHT: f32 = 240.0;
const CAMERA_MAX_HEIGHT: f32 = 540.0;
const DEFAULT_CAMERA_RATIO: f32 = 4.0 / 3.0;

#[allow(clippy::too_many_arguments)]
pub fn launch_ui(
    app: &mut App,
    settings: Settings,
    ui_frame_rx: Receiver<Frame>,
    ui_frame_tx: Sender<Frame>,
    landmark_frame_rx: Receiver<Frame>,
    landmark_frame_tx: Sender<Frame>,
    hands_rx: Receiver<LandmarkedFrame>,
    hands_tx: Sender<LandmarkedFrame>,
    backend: LandmarkerBackend,
) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Sign Capture".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| {
            AppView::new(
                settings,
                ui_frame_rx,
                ui_frame_tx,
                landmark_frame_rx,
                landmark_frame_tx,
                hands_rx,
                hands_tx,
                backend,
            )
        });
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    screen: Screen,
    settings: Settings,
    http_client: reqwest::blocking::Client,

    store: StateStore,
    snapshot: AppSnapshot,
    store_rx: Receiver<AppSnapshot>,
    _store_sub: Subscription,

    frame_rx: Option<Receiver<Frame>>,
    hands_rx: Option<Receiver<LandmarkedFrame>>,
    landmark_frame_rx: Option<Receiver<Frame>>,
    hands_tx: Option<Sender<LandmarkedFrame>>,

    backend: LandmarkerBackend,
    landmarker_handle: Option<thread::JoinHandle<()>>,
    _camera_stream: Option<CameraStream>,
    camera_label: String,

    latest_frame: Option<Frame>,
    latest_hands: Vec<Hand>,
    latest_image: Option<Arc<RenderImage>>,

    overlay_visible: bool,
    selected_letter: Option<&'static str>,
    validation_message: Option<String>,

    download_rx: Receiver<DownloadMessage>,
    _download_handle: thread::JoinHandle<()>,
}

enum Screen {
    CameraFailed { message: String },
    Download(DownloadState),
    Main,
}

struct DownloadState {
    downloaded: u64,
    total: Option<u64>,
    message: String,
    error: Option<String>,
    palm_ready: bool,
    hand_ready: bool,
}

impl DownloadState {
    fn new() -> Self {
        Self {
            downloaded: 0,
            total: None,
            message: "Preparing model download...".to_string(),
            error: None,
            palm_ready: false,
            hand_ready: false,
        }
    }

    fn finished(&self) -> bool {
        self.palm_ready && self.hand_ready
    }
}

enum DownloadMessage {
    Event(ModelDownloadEvent),
    Error(String),
}

impl AppView {
    #[allow(clippy::too_many_arguments)]
    fn new(
        settings: Settings,
        ui_frame_rx: Receiver<Frame>,
        ui_frame_tx: Sender<Frame>,
        landmark_frame_rx: Receiver<Frame>,
        landmark_frame_tx: Sender<Frame>,
        hands_rx: Receiver<LandmarkedFrame>,
        hands_tx: Sender<LandmarkedFrame>,
        backend: LandmarkerBackend,
    ) -> Self {
        let store = StateStore::new();
        let (state_tx, store_rx) = unbounded();
        let store_sub = store.subscribe(move |snapshot| {
            let _ = state_tx.send(snapshot.clone());
        });
        let snapshot = store.get();

        let (download_tx, download_rx) = unbounded();
        let download_handle = download::spawn_model_download(backend.clone(), download_tx);

        let (screen, camera_stream, camera_label) =
            Self::start_default_camera(ui_frame_tx, landmark_frame_tx);

        Self {
            screen,
            settings,
            http_client: reqwest::blocking::Client::new(),
            store,
            snapshot,
            store_rx,
            _store_sub: store_sub,
            frame_rx: Some(ui_frame_rx),
            hands_rx: Some(hands_rx),
            landmark_frame_rx: Some(landmark_frame_rx),
            hands_tx: Some(hands_tx),
            backend,
            landmarker_handle: None,
            _camera_stream: camera_stream,
            camera_label,
            latest_frame: None,
            latest_hands: Vec::new(),
            latest_image: None,
            overlay_visible: true,
            selected_letter: None,
            validation_message: None,
            download_rx,
            _download_handle: download_handle,
        }
    }

    /// Takes the first camera the backend reports. Failure here is fatal to
    /// initialization: the UI degrades to a dedicated error screen.
    fn start_default_camera(
        ui_frame_tx: Sender<Frame>,
        landmark_frame_tx: Sender<Frame>,
    ) -> (Screen, Option<CameraStream>, String) {
        let device = match camera::default_camera() {
            Ok(device) => device,
            Err(err) => {
                log::error!("no usable camera: {err:?}");
                return (
                    Screen::CameraFailed {
                        message: format!("No usable camera: {err:#}"),
                    },
                    None,
                    String::new(),
                );
            }
        };

        match camera::start_camera_stream(device.index.clone(), ui_frame_tx, landmark_frame_tx) {
            Ok(stream) => (
                Screen::Download(DownloadState::new()),
                Some(stream),
                device.label,
            ),
            Err(err) => {
                log::error!("failed to start camera {}: {err:?}", device.label);
                (
                    Screen::CameraFailed {
                        message: format!("Could not start camera {}: {err:#}", device.label),
                    },
                    None,
                    device.label,
                )
            }
        }
    }

    fn start_landmarker_if_needed(&mut self) {
        if self.landmarker_handle.is_some() {
            return;
        }

        let Some(frame_rx) = self.landmark_frame_rx.take() else {
            log::warn!("missing frame receiver for landmark worker");
            return;
        };
        let Some(hands_tx) = self.hands_tx.take() else {
            log::warn!("missing result sender for landmark worker");
            return;
        };

        let handle = landmarker::start_landmarker(self.backend.clone(), frame_rx, hands_tx);
        self.landmarker_handle = Some(handle);
    }

    /// Validates the letter precondition, then ships the latest frame to
    /// the classification endpoint on a worker thread. Failures are logged
    /// and the status returns to whatever it was before the attempt.
    fn start_capture(&mut self) {
        let letter = match upload::require_letter(self.selected_letter) {
            Ok(letter) => letter,
            Err(message) => {
                self.validation_message = Some(message.to_string());
                return;
            }
        };
        let Some(frame) = self.latest_frame.clone() else {
            self.validation_message = Some("Waiting for the first camera frame".to_string());
            return;
        };
        self.validation_message = None;

        let store = self.store.clone();
        let client = self.http_client.clone();
        let url = self.settings.process_url();
        // Ignore the click while a request is already in flight.
        let Some(prior_status) = store.begin_loading() else {
            return;
        };

        thread::spawn(move || {
            let outcome = upload::encode_png(&frame)
                .and_then(|png| upload::classify_frame(&client, &url, letter, png));
            match outcome {
                Ok(detection) => store.set_result(detection),
                Err(err) => {
                    log::error!("classification upload failed: {err}");
                    store.set_status(prior_status);
                }
            }
        });
    }

    fn render_camera_failed(&self, message: &str, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(
                v_flex()
                    .gap_2()
                    .p_4()
                    .rounded_lg()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.group_box)
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.accent)
                            .font_semibold()
                            .child("⚠ Camera unavailable"),
                    )
                    .child(
                        div()
                            .text_xs()
                            .text_color(theme.muted_foreground)
                            .child("Check that a webcam is connected and not in use."),
                    )
                    .child(div().text_color(theme.foreground).child(message.to_string())),
            )
            .into_any_element()
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        // Re-arm on every paint so channels are drained at display rate.
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        let mut screen = mem::replace(&mut self.screen, Screen::Main);
        let view = match screen {
            Screen::CameraFailed { message } => {
                let view = self.render_camera_failed(&message, cx);
                screen = Screen::CameraFailed { message };
                view
            }
            Screen::Download(mut state) => {
                self.poll_download_events(&mut state);
                let should_switch = state.finished() && state.error.is_none();
                let view = self.render_download_view(&state, cx);
                if should_switch {
                    self.start_landmarker_if_needed();
                    screen = Screen::Main;
                } else {
                    screen = Screen::Download(state);
                }
                view
            }
            Screen::Main => {
                screen = Screen::Main;
                self.render_main(window, cx)
            }
        };
        self.screen = screen;
        view
    }
}
