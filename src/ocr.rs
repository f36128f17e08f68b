//! OCR engine contract: deterministic-cache-first text extraction with a
//! fallback chain. Per spec.md §4.13.

use anyhow::Result;
use std::collections::HashMap;

use crate::canon;
use crate::models::Span;

#[derive(Debug, Clone)]
pub struct Roi {
    pub bbox: [i64; 4],
}

/// An OCR backend. Implementations may be in-process or call out to a
/// plugin-provided extension (`ocr.engine` capability).
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, frame_sha: &str, rois: &[Roi]) -> Result<Vec<Span>>;
}

fn cache_key(frame_sha: &str, roi: &Roi, config_hash: &str) -> String {
    let value = serde_json::json!({
        "frame_sha": frame_sha,
        "roi": roi.bbox,
        "config_hash": config_hash,
    });
    canon::content_hash(&value)
}

/// In-memory cache keyed by `sha256(canonicalize({frame_sha, roi,
/// config_hash}))`. A persistent cache would back this with the metadata
/// store; kept in-memory here since callers own its lifetime per ingest
/// run.
#[derive(Default)]
pub struct OcrCache {
    entries: HashMap<String, Vec<Span>>,
}

impl OcrCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, frame_sha: &str, roi: &Roi, config_hash: &str) -> Option<&Vec<Span>> {
        self.entries.get(&cache_key(frame_sha, roi, config_hash))
    }

    pub fn put(&mut self, frame_sha: &str, roi: &Roi, config_hash: &str, spans: Vec<Span>) {
        self.entries.insert(cache_key(frame_sha, roi, config_hash), spans);
    }
}

/// Run OCR over `rois` for `frame_sha`, preferring the cache, then
/// `primary`, falling back to `secondary` on primary failure. Assigns
/// monotonic `reading_order` per ROI in scan order.
pub fn run_with_fallback(
    cache: &mut OcrCache,
    primary: &dyn OcrEngine,
    secondary: Option<&dyn OcrEngine>,
    frame_sha: &str,
    config_hash: &str,
    rois: &[Roi],
) -> Result<Vec<Span>> {
    let mut out = Vec::new();
    let mut next_order = 0u32;

    for roi in rois {
        if let Some(cached) = cache.get(frame_sha, roi, config_hash) {
            out.extend(cached.iter().cloned());
            next_order += cached.len() as u32;
            continue;
        }

        let spans = match primary.run(frame_sha, std::slice::from_ref(roi)) {
            Ok(spans) => spans,
            Err(primary_err) => match secondary {
                Some(engine) => engine
                    .run(frame_sha, std::slice::from_ref(roi))
                    .map_err(|e| anyhow::anyhow!("primary OCR failed ({primary_err}); secondary also failed: {e}"))?,
                None => return Err(primary_err),
            },
        };

        let mut ordered = spans;
        for span in ordered.iter_mut() {
            span.reading_order = next_order;
            next_order += 1;
        }

        cache.put(frame_sha, roi, config_hash, ordered.clone());
        out.extend(ordered);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEngine {
        spans: Vec<Span>,
        fail: bool,
    }
    impl OcrEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }
        fn run(&self, _frame_sha: &str, _rois: &[Roi]) -> Result<Vec<Span>> {
            if self.fail {
                anyhow::bail!("primary engine unavailable");
            }
            Ok(self.spans.clone())
        }
    }

    fn sample_span(text: &str) -> Span {
        Span::new(text.to_string(), [0.0, 0.0, 0.1, 0.1], "ocr".to_string(), 0, 0.9)
    }

    #[test]
    fn cache_hit_avoids_calling_engine() {
        let mut cache = OcrCache::new();
        let roi = Roi { bbox: [0, 0, 10, 10] };
        cache.put("sha1", &roi, "cfg1", vec![sample_span("cached")]);
        let primary = FixedEngine { spans: vec![sample_span("fresh")], fail: false };
        let spans = run_with_fallback(&mut cache, &primary, None, "sha1", "cfg1", &[roi]).unwrap();
        assert_eq!(spans[0].text, "cached");
    }

    #[test]
    fn falls_back_to_secondary_on_primary_failure() {
        let mut cache = OcrCache::new();
        let roi = Roi { bbox: [0, 0, 10, 10] };
        let primary = FixedEngine { spans: vec![], fail: true };
        let secondary = FixedEngine { spans: vec![sample_span("fallback")], fail: false };
        let spans = run_with_fallback(&mut cache, &primary, Some(&secondary), "sha1", "cfg1", &[roi]).unwrap();
        assert_eq!(spans[0].text, "fallback");
    }

    #[test]
    fn reading_order_is_monotonic_across_rois() {
        let mut cache = OcrCache::new();
        let roi1 = Roi { bbox: [0, 0, 10, 10] };
        let roi2 = Roi { bbox: [10, 10, 20, 20] };
        let primary = FixedEngine { spans: vec![sample_span("a"), sample_span("b")], fail: false };
        let spans = run_with_fallback(&mut cache, &primary, None, "sha1", "cfg1", &[roi1, roi2]).unwrap();
        let orders: Vec<u32> = spans.iter().map(|s| s.reading_order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn no_fallback_available_propagates_error() {
        let mut cache = OcrCache::new();
        let roi = Roi { bbox: [0, 0, 10, 10] };
        let primary = FixedEngine { spans: vec![], fail: true };
        let result = run_with_fallback(&mut cache, &primary, None, "sha1", "cfg1", &[roi]);
        assert!(result.is_err());
    }
}
