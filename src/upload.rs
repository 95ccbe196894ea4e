use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};
use reqwest::{
    StatusCode,
    blocking::{Client, multipart},
};
use serde::Deserialize;
use thiserror::Error;

use crate::types::{DetectionResult, Frame, NO_HAND_DETECTED};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("classification request failed ({status}): {detail}")]
    Rejected { status: StatusCode, detail: String },
    #[error("classification request could not be sent: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not parse classification response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("could not encode snapshot: {0}")]
    Encode(#[from] image::ImageError),
    #[error("frame buffer does not match its dimensions")]
    InvalidFrame,
}

/// Precondition for every capture: a target letter must be picked first.
/// Returns the user-facing message shown instead of starting the upload.
pub fn require_letter(selected: Option<&'static str>) -> Result<&'static str, &'static str> {
    selected.ok_or("Select a letter before capturing")
}

pub fn snapshot_filename(letter: &str) -> String {
    format!("{letter}_{:08x}.png", rand::random::<u32>())
}

pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, UploadError> {
    let buffer = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or(UploadError::InvalidFrame)?;
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(buffer).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Posts one PNG snapshot to `{base_url}/process/` as multipart form data
/// with `image` and `label` fields and maps the response into a
/// `DetectionResult`. No retry, no timeout beyond the transport's own.
pub fn classify_frame(
    client: &Client,
    process_url: &str,
    letter: &str,
    png: Vec<u8>,
) -> Result<DetectionResult, UploadError> {
    let image_part = multipart::Part::bytes(png)
        .file_name(snapshot_filename(letter))
        .mime_str("image/png")?;
    let form = multipart::Form::new()
        .part("image", image_part)
        .text("label", letter.to_string());

    let response = client.post(process_url).multipart(form).send()?;
    let status = response.status();
    let body = response.text()?;

    if !status.is_success() {
        return Err(UploadError::Rejected {
            status,
            detail: error_detail(&body),
        });
    }

    Ok(parse_detection(&body)?)
}

/// Best-effort detail extraction from an error body: the JSON `detail`
/// field, else the whole JSON payload, else the raw text.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("detail")
            .and_then(|detail| detail.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Err(_) => body.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    detected_as: Option<String>,
    predicted_as: Option<String>,
    confidence: Option<f64>,
    metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    handedness: Vec<String>,
    landmarks: Option<SideLandmarks>,
}

#[derive(Debug, Deserialize)]
struct SideLandmarks {
    #[serde(default)]
    left: Vec<serde_json::Value>,
    #[serde(default)]
    right: Vec<serde_json::Value>,
}

fn parse_detection(body: &str) -> Result<DetectionResult, serde_json::Error> {
    let response: ClassifyResponse = serde_json::from_str(body)?;

    let detected_letter = response
        .detected_as
        .or(response.predicted_as)
        .unwrap_or_else(|| "-".to_string());
    let confidence = response.confidence.unwrap_or(0.0);
    let hand_detected = hand_from_metadata(response.metadata.as_ref());

    Ok(DetectionResult {
        detected_letter,
        confidence,
        hand_detected,
    })
}

fn hand_from_metadata(metadata: Option<&ResponseMetadata>) -> String {
    let Some(metadata) = metadata else {
        return NO_HAND_DETECTED.to_string();
    };

    if let Some(side) = metadata.handedness.iter().find(|side| !side.is_empty()) {
        return capitalize_first(side);
    }

    if let Some(landmarks) = &metadata.landmarks {
        if !landmarks.left.is_empty() {
            return "Left".to_string();
        }
        if !landmarks.right.is_empty() {
            return "Right".to_string();
        }
    }

    NO_HAND_DETECTED.to_string()
}

fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn full_response_maps_to_result() {
        let body = r#"{"detected_as":"A","confidence":0.873,"metadata":{"handedness":["right"]}}"#;
        let result = parse_detection(body).unwrap();
        assert_eq!(result.detected_letter, "A");
        assert_eq!(result.confidence, 0.873);
        assert_eq!(result.hand_detected, "Right");
        assert_eq!(result.confidence_pct(), "87%");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let result = parse_detection("{}").unwrap();
        assert_eq!(result.detected_letter, "-");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.hand_detected, NO_HAND_DETECTED);
        assert_eq!(result.confidence_pct(), "0%");
    }

    #[test]
    fn predicted_as_is_the_letter_fallback() {
        let body = r#"{"predicted_as":"L","confidence":0.4}"#;
        let result = parse_detection(body).unwrap();
        assert_eq!(result.detected_letter, "L");
    }

    #[test]
    fn hand_inferred_from_left_landmarks() {
        let body = r#"{"metadata":{"landmarks":{"left":[[0.1,0.2]],"right":[]}}}"#;
        let result = parse_detection(body).unwrap();
        assert_eq!(result.hand_detected, "Left");
    }

    #[test]
    fn hand_inferred_from_right_landmarks() {
        let body = r#"{"metadata":{"landmarks":{"right":[[0.3,0.4]]}}}"#;
        let result = parse_detection(body).unwrap();
        assert_eq!(result.hand_detected, "Right");
    }

    #[test]
    fn empty_metadata_means_no_hand() {
        let body = r#"{"metadata":{"handedness":[],"landmarks":{"left":[],"right":[]}}}"#;
        let result = parse_detection(body).unwrap();
        assert_eq!(result.hand_detected, NO_HAND_DETECTED);
    }

    #[test]
    fn rejection_carries_status_and_json_detail() {
        let err = UploadError::Rejected {
            status: StatusCode::BAD_REQUEST,
            detail: error_detail(r#"{"detail":"bad image"}"#),
        };
        let message = err.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("bad image"));
    }

    #[test]
    fn rejection_detail_falls_back_to_whole_json() {
        let detail = error_detail(r#"{"code":17}"#);
        assert_eq!(detail, r#"{"code":17}"#);
    }

    #[test]
    fn rejection_detail_falls_back_to_raw_text() {
        let detail = error_detail("<html>gateway timeout</html>");
        assert_eq!(detail, "<html>gateway timeout</html>");
    }

    #[test]
    fn missing_letter_blocks_the_capture() {
        assert!(require_letter(None).is_err());
        assert_eq!(require_letter(Some("A")), Ok("A"));
    }

    #[test]
    fn snapshot_filename_has_letter_and_hex_suffix() {
        let name = snapshot_filename("B");
        assert!(name.starts_with("B_"));
        assert!(name.ends_with(".png"));
        let hex = &name["B_".len()..name.len() - ".png".len()];
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn encode_png_rejects_mismatched_buffer() {
        let frame = Frame {
            rgba: vec![0; 8],
            width: 4,
            height: 4,
            timestamp: Instant::now(),
        };
        assert!(matches!(
            encode_png(&frame),
            Err(UploadError::InvalidFrame)
        ));
    }

    #[test]
    fn encode_png_produces_a_png_header() {
        let frame = Frame {
            rgba: vec![255; 4 * 4 * 4],
            width: 4,
            height: 4,
            timestamp: Instant::now(),
        };
        let png = encode_png(&frame).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
    }
}
