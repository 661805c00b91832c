//! Frame encoder: quality transform + compression.
//!
//! Turns a provider [`RawFrame`] into a wire [`Frame`] under the
//! session's current [`QualitySettings`]:
//!
//! 1. If `scale < 1.0`, resample (nearest neighbour) to the scaled
//!    resolution; otherwise pack the possibly-padded rows tight.
//! 2. Compress per `compression` — zstd at a level derived from the
//!    quality slider, or raw packed bytes.
//!
//! Every produced frame is self-contained (`is_key_frame = true`);
//! freshest-frame-wins semantics make delta state pointless here.

use crate::error::VisorError;
use crate::hub::message::Frame;
use crate::provider::RawFrame;
use crate::session::{CompressionKind, QualitySettings, unix_ms};

const BYTES_PER_PIXEL: usize = 4;

/// Stateful frame encoder, one per capture pipeline.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    frames_encoded: u64,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames encoded so far.
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Encode one frame under `quality`.
    pub fn encode(
        &mut self,
        raw: &RawFrame,
        quality: &QualitySettings,
    ) -> Result<Frame, VisorError> {
        let (width, height, packed) = if quality.scale < 1.0 {
            resample(raw, quality.scale)?
        } else {
            (raw.width, raw.height, pack_rows(raw)?)
        };

        let bytes = match quality.compression {
            CompressionKind::Zstd => zstd::encode_all(packed.as_slice(), zstd_level(quality.quality))
                .map_err(|e| VisorError::Capture(format!("zstd encode failed: {e}")))?,
            CompressionKind::Raw => packed,
        };

        self.frames_encoded += 1;
        Ok(Frame {
            monitor_index: raw.monitor_index,
            width,
            height,
            bytes,
            timestamp_ms: unix_ms(),
            is_key_frame: true,
            compression: quality.compression,
            quality: quality.quality,
        })
    }
}

/// Map the 1..=100 quality slider onto zstd levels 9..=1 — lower
/// quality trades CPU for smaller frames.
fn zstd_level(quality: u8) -> i32 {
    1 + (100 - quality.clamp(1, 100) as i32) / 12
}

/// Emit all rows packed tightly (drop any stride padding).
fn pack_rows(raw: &RawFrame) -> Result<Vec<u8>, VisorError> {
    let row_len = raw.width as usize * BYTES_PER_PIXEL;
    let stride = raw.stride as usize;
    if stride < row_len || raw.bytes.len() < stride * raw.height as usize {
        return Err(VisorError::Capture(format!(
            "inconsistent raw frame: {}x{} stride {} with {} bytes",
            raw.width,
            raw.height,
            raw.stride,
            raw.bytes.len(),
        )));
    }

    if stride == row_len {
        return Ok(raw.bytes[..row_len * raw.height as usize].to_vec());
    }

    let mut out = Vec::with_capacity(row_len * raw.height as usize);
    for y in 0..raw.height as usize {
        let start = y * stride;
        out.extend_from_slice(&raw.bytes[start..start + row_len]);
    }
    Ok(out)
}

/// Nearest-neighbour downscale to `scale` of the source resolution.
fn resample(raw: &RawFrame, scale: f32) -> Result<(u32, u32, Vec<u8>), VisorError> {
    let out_w = ((raw.width as f32 * scale) as u32).max(1);
    let out_h = ((raw.height as f32 * scale) as u32).max(1);
    let stride = raw.stride as usize;
    if raw.bytes.len() < stride * raw.height as usize {
        return Err(VisorError::Capture("raw frame shorter than stride * height".into()));
    }

    let mut out = Vec::with_capacity(out_w as usize * out_h as usize * BYTES_PER_PIXEL);
    for oy in 0..out_h {
        let sy = (oy as u64 * raw.height as u64 / out_h as u64) as usize;
        let row = sy * stride;
        for ox in 0..out_w {
            let sx = (ox as u64 * raw.width as u64 / out_w as u64) as usize;
            let px = row + sx * BYTES_PER_PIXEL;
            out.extend_from_slice(&raw.bytes[px..px + BYTES_PER_PIXEL]);
        }
    }
    Ok((out_w, out_h, out))
}

// ── Tests ────────────────────────────────────────────────────────
