use anyhow::Result;

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// This is the seam to the pretrained model: frames flow in as read-only
/// pixel slices, detections flow out. Any compliant detection backend can be
/// substituted here; the pipeline never looks behind this trait.
///
/// Implementations must treat the pixel slice as read-only and ephemeral and
/// must not retain it beyond the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Fixed id-to-label table for this backend's class ids.
    fn labels(&self) -> &'static [&'static str];

    /// Run detection on one RGB24 frame.
    ///
    /// Returns zero or more detections in model output order. A failure here
    /// is fatal for the current frame's processing; no partial result is
    /// produced.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook (model load, first-inference priming).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
