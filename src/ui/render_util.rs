use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use crate::pipeline::overlay;
use crate::types::{Frame, Hand};

/// Rebuilds the displayed image from the raw frame every call, so any
/// previous overlay is implicitly cleared; hands are only drawn when the
/// caller passes them in.
pub(super) fn frame_to_image(frame: &Frame, hands: Option<&[Hand]>) -> Option<Arc<RenderImage>> {
    let mut rgba = frame.rgba.clone();
    if let Some(hands) = hands {
        overlay::draw_hands(&mut rgba, frame.width, frame.height, hands);
    }

    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.width, frame.height, rgba)?;
    let frame = ImageFrame::new(buffer);

    Some(Arc::new(RenderImage::new(vec![frame])))
}
