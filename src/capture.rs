use std::io::Cursor;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera produced no frame")]
    NoFrame,
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(String),
}

/// Quality/scale hints for one capture. Streaming captures trade fidelity for
/// speed, manual captures do the opposite; the concrete values come from
/// `CaptureConfig`.
#[derive(Debug, Clone, Copy)]
pub struct CaptureHint {
    pub quality: f32,
    pub scale: f32,
}

/// One encoded camera frame. Owned by the in-flight request that carries it
/// and dropped when that request resolves; only the dimensions outlive it,
/// copied into the reconciliation step for overlay projection.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub quality: f32,
    pub scale: f32,
    pub captured_at: Instant,
    pub index: Option<u64>,
}

/// External camera capability. The core never touches the sensor; it only
/// asks for "the current frame, encoded, at roughly this quality/scale".
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn capture(&self, hint: CaptureHint) -> Result<Frame, CaptureError>;
}

/// Deterministic gradient frames for the demo binary and tests, so the full
/// loop runs against a live backend without camera hardware.
pub struct TestPatternCapture {
    pub width: u32,
    pub height: u32,
}

impl TestPatternCapture {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[async_trait]
impl CaptureProvider for TestPatternCapture {
    async fn capture(&self, hint: CaptureHint) -> Result<Frame, CaptureError> {
        let width = ((self.width as f32 * hint.scale) as u32).max(1);
        let height = ((self.height as f32 * hint.scale) as u32).max(1);

        let pattern = RgbImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            Rgb([r, g, 128])
        });

        let jpeg_quality = (hint.quality.clamp(0.0, 1.0) * 100.0) as u8;
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), jpeg_quality.max(1));
        pattern
            .write_with_encoder(encoder)
            .map_err(|e| CaptureError::EncodeFrameFailed(e.to_string()))?;

        Ok(Frame {
            bytes: Bytes::from(buf),
            width,
            height,
            quality: hint.quality,
            scale: hint.scale,
            captured_at: Instant::now(),
            index: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_respects_scale_hint() {
        let provider = TestPatternCapture::new(640, 480);
        let frame = provider
            .capture(CaptureHint {
                quality: 0.5,
                scale: 0.5,
            })
            .await
            .unwrap();

        assert_eq!(frame.width, 320);
        assert_eq!(frame.height, 240);
        assert!(!frame.bytes.is_empty());
        assert!(frame.index.is_none());
    }
}
