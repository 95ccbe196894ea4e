#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod model_download;
mod pipeline;
mod state;
mod types;
mod ui;
mod upload;

use anyhow::Result;
use crossbeam_channel::bounded;
use gpui::Application;
use gpui_component;
use pipeline::LandmarkerBackend;

fn main() -> Result<()> {
    env_logger::init();

    let settings = config::Settings::from_env();
    log::info!("using classification API at {}", settings.api_base_url());

    // Latest-frame-wins everywhere: capacity 1 plus try_send keeps the camera
    // thread from ever blocking on a slow consumer.
    let (ui_frame_tx, ui_frame_rx) = bounded(1);
    let (landmark_frame_tx, landmark_frame_rx) = bounded(1);
    let (hands_tx, hands_rx) = bounded(1);

    let backend = LandmarkerBackend::default();

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(
                app,
                settings,
                ui_frame_rx,
                ui_frame_tx,
                landmark_frame_rx,
                landmark_frame_tx,
                hands_rx,
                hands_tx,
                backend.clone(),
            ) {
                eprintln!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
