//! Session loader: reads `manifest.json` and the three protobuf batches,
//! auto-decompressing zstd framing and falling back to JSON, per spec.md
//! §4.12 / §6.2.

use anyhow::{Context, Result};
use prost::Message;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::proto::{DetectionBatch, FrameMeta, FrameMetaBatch, InputEvent, InputEventBatch};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub session_id: String,
    pub qpc_frequency_hz: u64,
    pub start_qpc_ticks: u64,
}

fn maybe_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() >= 4 && bytes[..4] == ZSTD_MAGIC {
        zstd::stream::decode_all(bytes).context("zstd-decoding batch")
    } else {
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct JsonFallback<T> {
    items: Vec<T>,
}

fn decode_frame_batch(raw: &[u8]) -> Result<Vec<FrameMeta>> {
    let bytes = maybe_decompress(raw)?;
    if let Ok(batch) = FrameMetaBatch::decode(bytes.as_slice()) {
        if !batch.items.is_empty() || bytes.is_empty() {
            return Ok(batch.items);
        }
    }
    let fallback: JsonFallback<FrameMeta> =
        serde_json::from_slice(&bytes).context("decoding frame batch as protobuf or json")?;
    Ok(fallback.items)
}

fn decode_input_batch(raw: &[u8]) -> Result<Vec<InputEvent>> {
    let bytes = maybe_decompress(raw)?;
    if let Ok(batch) = InputEventBatch::decode(bytes.as_slice()) {
        if !batch.items.is_empty() || bytes.is_empty() {
            return Ok(batch.items);
        }
    }
    let fallback: JsonFallback<InputEvent> =
        serde_json::from_slice(&bytes).context("decoding input batch as protobuf or json")?;
    Ok(fallback.items)
}

fn decode_detection_batch(raw: &[u8]) -> Result<Vec<super::proto::Detection>> {
    let bytes = maybe_decompress(raw)?;
    if let Ok(batch) = DetectionBatch::decode(bytes.as_slice()) {
        if !batch.items.is_empty() || bytes.is_empty() {
            return Ok(batch.items);
        }
    }
    let fallback: JsonFallback<super::proto::Detection> =
        serde_json::from_slice(&bytes).context("decoding detection batch as protobuf or json")?;
    Ok(fallback.items)
}

pub struct SessionLoader {
    pub session_dir: PathBuf,
    pub manifest: SessionManifest,
    pub frames: Vec<FrameMeta>,
    pub input_events: Vec<InputEvent>,
    pub detections: Vec<super::proto::Detection>,
}

impl SessionLoader {
    pub fn load(session_dir: &Path) -> Result<Self> {
        let manifest_text = std::fs::read_to_string(session_dir.join("manifest.json"))
            .with_context(|| format!("reading manifest for {}", session_dir.display()))?;
        let manifest: SessionManifest =
            serde_json::from_str(&manifest_text).context("parsing session manifest")?;

        let frames = match std::fs::read(session_dir.join("meta/frames.pb.zst")) {
            Ok(raw) => decode_frame_batch(&raw)?,
            Err(_) => Vec::new(),
        };
        let input_events = match std::fs::read(session_dir.join("meta/input.pb.zst")) {
            Ok(raw) => decode_input_batch(&raw)?,
            Err(_) => Vec::new(),
        };
        let detections = match std::fs::read(session_dir.join("meta/detections.pb.zst")) {
            Ok(raw) => decode_detection_batch(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(SessionLoader {
            session_dir: session_dir.to_path_buf(),
            manifest,
            frames,
            input_events,
            detections,
        })
    }

    /// `(image_path, frame_meta)` pairs, resolving `artifact_path`
    /// relative to the session root, in manifest order.
    pub fn iter_frames(&self) -> impl Iterator<Item = (PathBuf, &FrameMeta)> {
        self.frames
            .iter()
            .map(move |fm| (self.session_dir.join(&fm.artifact_path), fm))
    }
}
