mod palm;
mod tensor;

use std::{path::PathBuf, thread, time::Instant};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use self::palm::{PalmDetector, PalmDetectorConfig, crop_from_palm};
use self::tensor::LANDMARK_INPUT_SIZE;
use crate::{
    model_download::{ModelKind, ensure_model_ready},
    types::{Frame, Hand, Handedness, LandmarkedFrame},
};

/// Fixed once at startup, continuous-video operation. The three confidence
/// thresholds all default to 0.5: palm detection score, landmark presence
/// and NMS overlap.
#[derive(Clone, Copy, Debug)]
pub struct LandmarkerConfig {
    pub max_hands: usize,
    pub min_detection_confidence: f32,
    pub min_presence_confidence: f32,
    pub overlap_threshold: f32,
}

impl Default for LandmarkerConfig {
    fn default() -> Self {
        Self {
            max_hands: 2,
            min_detection_confidence: 0.5,
            min_presence_confidence: 0.5,
            overlap_threshold: 0.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LandmarkerBackend {
    palm_model_path: PathBuf,
    hand_model_path: PathBuf,
    config: LandmarkerConfig,
}

impl LandmarkerBackend {
    pub fn palm_model_path(&self) -> PathBuf {
        self.palm_model_path.clone()
    }

    pub fn hand_model_path(&self) -> PathBuf {
        self.hand_model_path.clone()
    }

    pub fn config(&self) -> LandmarkerConfig {
        self.config
    }
}

impl Default for LandmarkerBackend {
    fn default() -> Self {
        Self {
            palm_model_path: ModelKind::PalmDetector.default_path(),
            hand_model_path: ModelKind::HandLandmarker.default_path(),
            config: LandmarkerConfig::default(),
        }
    }
}

pub(crate) trait LandmarkEngine: Send + 'static {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Hand>>;
}

/// Spawns the landmark worker. It always processes the freshest frame
/// available, dropping the backlog, and pushes one `LandmarkedFrame` per
/// inference to the UI.
pub fn start_landmarker(
    backend: LandmarkerBackend,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<LandmarkedFrame>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let palm_path = backend.palm_model_path();
        let hand_path = backend.hand_model_path();

        if let Err(err) = ensure_model_ready(ModelKind::PalmDetector, &palm_path, |_evt| {}) {
            log::error!(
                "failed to prepare palm detector at {}: {err:?}",
                palm_path.display()
            );
            return;
        }
        if let Err(err) = ensure_model_ready(ModelKind::HandLandmarker, &hand_path, |_evt| {}) {
            log::error!(
                "failed to prepare hand landmarker at {}: {err:?}",
                hand_path.display()
            );
            return;
        }

        let engine = match OrtEngine::new(&palm_path, &hand_path, backend.config()) {
            Ok(engine) => {
                log::info!(
                    "hand landmarker ready using {} and {}",
                    hand_path.display(),
                    palm_path.display()
                );
                engine
            }
            Err(err) => {
                log::error!("failed to load hand landmark models: {err:?}");
                return;
            }
        };

        run_worker_loop(engine, frame_rx, result_tx);
    })
}

fn run_worker_loop<E: LandmarkEngine>(
    mut engine: E,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<LandmarkedFrame>,
) {
    while let Some(frame) = recv_latest_frame(&frame_rx) {
        match engine.infer(&frame) {
            Ok(hands) => {
                let _ = result_tx.try_send(LandmarkedFrame {
                    hands,
                    timestamp: Instant::now(),
                });
            }
            Err(err) => {
                log::warn!("hand landmark inference failed: {err:?}");
            }
        }
    }
}

fn recv_latest_frame(frame_rx: &Receiver<Frame>) -> Option<Frame> {
    let mut frame = frame_rx.recv().ok()?;
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}

struct OrtEngine {
    landmark_session: Session,
    palm_detector: PalmDetector,
    config: LandmarkerConfig,
}

impl OrtEngine {
    fn new(palm_path: &PathBuf, hand_path: &PathBuf, config: LandmarkerConfig) -> Result<Self> {
        let landmark_session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(hand_path)
            .with_context(|| format!("failed to load ORT session from {}", hand_path.display()))?;

        let palm_detector = PalmDetector::new(
            palm_path,
            PalmDetectorConfig {
                score_threshold: config.min_detection_confidence,
                nms_threshold: config.overlap_threshold,
                max_results: config.max_hands,
            },
        )?;

        Ok(Self {
            landmark_session,
            palm_detector,
            config,
        })
    }

    fn landmark_region(&mut self, frame: &Frame, region: &palm::PalmRegion) -> Result<Option<Hand>> {
        let (center, side, angle) = crop_from_palm(region);
        let (input, transform) =
            tensor::rotated_crop(frame, center, side, angle, LANDMARK_INPUT_SIZE)?;
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .landmark_session
            .run(ort::inputs![input_tensor])
            .context("failed to run landmark session")?;

        if outputs.len() == 0 {
            return Err(anyhow!("landmark model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let raw_landmarks = tensor::decode_landmarks(&flattened)?;

        let presence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let score = (presence * region.score).clamp(0.0, 1.0);
        if score < self.config.min_presence_confidence {
            return Ok(None);
        }

        let handedness_raw = if outputs.len() > 2 {
            outputs[2]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let handedness = if handedness_raw >= 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        };

        // Project crop-space landmarks back to the frame, then normalize
        // to [0, 1] against the frame dimensions.
        let (w, h) = (frame.width.max(1) as f32, frame.height.max(1) as f32);
        let points = raw_landmarks
            .iter()
            .map(|[x, y, z]| {
                let (px, py) = transform.project(*x, *y);
                (
                    (px / w).clamp(0.0, 1.0),
                    (py / h).clamp(0.0, 1.0),
                    z / LANDMARK_INPUT_SIZE as f32,
                )
            })
            .collect();

        Ok(Some(Hand {
            points,
            handedness,
            score,
        }))
    }
}

impl LandmarkEngine for OrtEngine {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Hand>> {
        let regions = self.palm_detector.detect(frame).unwrap_or_else(|err| {
            log::warn!("palm detection failed: {err:?}");
            Vec::new()
        });

        let mut hands = Vec::with_capacity(regions.len());
        for region in regions.iter().take(self.config.max_hands) {
            match self.landmark_region(frame, region) {
                Ok(Some(hand)) => hands.push(hand),
                Ok(None) => {}
                Err(err) => log::warn!("landmark regression failed: {err:?}"),
            }
        }

        Ok(hands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    struct FixedEngine(Vec<Hand>);

    impl LandmarkEngine for FixedEngine {
        fn infer(&mut self, _frame: &Frame) -> Result<Vec<Hand>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn config_defaults_match_the_runtime_contract() {
        let config = LandmarkerConfig::default();
        assert_eq!(config.max_hands, 2);
        assert_eq!(config.min_detection_confidence, 0.5);
        assert_eq!(config.min_presence_confidence, 0.5);
        assert_eq!(config.overlap_threshold, 0.5);
    }

    #[test]
    fn worker_forwards_engine_output_and_stops_on_disconnect() {
        let (frame_tx, frame_rx) = bounded(4);
        let (result_tx, result_rx) = bounded(4);
        let engine = FixedEngine(vec![Hand {
            points: vec![(0.5, 0.5, 0.0); 21],
            handedness: Handedness::Left,
            score: 0.8,
        }]);

        frame_tx
            .send(Frame {
                rgba: vec![0; 16],
                width: 2,
                height: 2,
                timestamp: Instant::now(),
            })
            .unwrap();
        drop(frame_tx);

        run_worker_loop(engine, frame_rx, result_tx);

        let landmarked = result_rx.try_recv().unwrap();
        assert_eq!(landmarked.hands.len(), 1);
        assert_eq!(landmarked.hands[0].handedness, Handedness::Left);
    }
}
