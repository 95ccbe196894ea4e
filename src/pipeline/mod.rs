pub mod camera;
pub mod landmarker;
pub mod overlay;
pub mod rgba_converter;

// Re-exports for convenience
pub use camera::{CameraDevice, CameraStream, default_camera, start_camera_stream};
pub use landmarker::{LandmarkerBackend, start_landmarker};
