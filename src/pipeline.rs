//! Ingest pipeline: decode → OCR → layout → link → write tables → lexical
//! index, per spec.md §4.16. Single-threaded per session; callers may run
//! multiple sessions concurrently up to `ingest.max_parallel_sessions`.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::canon;
use crate::ingest::loader::SessionLoader;
use crate::ingest::proto::InputEventType;
use crate::journal;
use crate::layout;
use crate::lexical_index::LexicalIndex;
use crate::linker::TemporalLinker;
use crate::ocr::{self, OcrCache, OcrEngine, Roi};
use crate::timebase;

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub session_id: String,
    pub frames_processed: u64,
    pub input_events: u64,
    pub ocr_spans: u64,
    pub elements: u64,
    pub tracks: u64,
    pub id_switches: u64,
    pub generated_at: String,
}

fn png_dimensions(path: &Path) -> Result<(u32, u32)> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let decoder = png::Decoder::new(file);
    let reader = decoder.read_info().with_context(|| format!("reading PNG header {}", path.display()))?;
    let info = reader.info();
    Ok((info.width, info.height))
}

/// Writes `rows` as a table. When the `parquet` feature is compiled in, the
/// table is written as a single-column Parquet file of canonicalized JSON
/// rows; otherwise each row is written as one canonicalized NDJSON line.
fn write_table(dir: &Path, name: &str, rows: &[Value]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    #[cfg(feature = "parquet")]
    {
        write_table_parquet(dir, name, rows)
    }
    #[cfg(not(feature = "parquet"))]
    {
        write_table_ndjson(dir, name, rows)
    }
}

fn write_table_ndjson(dir: &Path, name: &str, rows: &[Value]) -> Result<PathBuf> {
    let path = dir.join(format!("{name}.ndjson"));
    let mut out = String::new();
    for row in rows {
        out.push_str(&String::from_utf8_lossy(&canon::canonicalize(row)));
        out.push('\n');
    }
    std::fs::write(&path, out).with_context(|| format!("writing table {}", path.display()))?;
    Ok(path)
}

#[cfg(feature = "parquet")]
fn write_table_parquet(dir: &Path, name: &str, rows: &[Value]) -> Result<PathBuf> {
    use arrow::array::StringArray;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;

    let path = dir.join(format!("{name}.parquet"));
    let schema = Arc::new(Schema::new(vec![Field::new("row_json", DataType::Utf8, false)]));
    let values: Vec<String> = rows
        .iter()
        .map(|row| String::from_utf8_lossy(&canon::canonicalize(row)).into_owned())
        .collect();
    let array = StringArray::from(values);
    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(array)])
        .context("building parquet record batch")?;
    let file = std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("opening parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(path)
}

pub struct IngestPipeline<'a> {
    pub output_root: PathBuf,
    pub journal_path: PathBuf,
    pub iou_threshold: f64,
    pub primary_ocr: &'a dyn OcrEngine,
    pub secondary_ocr: Option<&'a dyn OcrEngine>,
}

impl<'a> IngestPipeline<'a> {
    pub fn process_session(&self, session_dir: &Path) -> Result<IngestSummary> {
        let loader = SessionLoader::load(session_dir)?;
        let session_id = loader.manifest.session_id.clone();
        let out_dir = self.output_root.join(&session_id);
        std::fs::create_dir_all(&out_dir)?;

        let mut cache = OcrCache::new();
        let mut linker = TemporalLinker::new(self.iou_threshold);

        let mut frame_rows = Vec::new();
        let mut ocr_span_rows = Vec::new();
        let mut element_rows = Vec::new();
        let mut total_spans = 0u64;
        let mut global_row_idx = 0u64;

        for (frame_index, (image_path, frame_meta)) in loader.iter_frames().enumerate() {
            let (width, height) = png_dimensions(&image_path)
                .with_context(|| format!("decoding PNG dimensions for {}", image_path.display()))?;
            let bytes = std::fs::read(&image_path)
                .with_context(|| format!("reading frame {}", image_path.display()))?;
            let frame_sha = canon::hash_bytes(&bytes);

            let t_rel_s = if frame_meta.qpc_ticks >= loader.manifest.start_qpc_ticks
                && loader.manifest.qpc_frequency_hz > 0
            {
                (frame_meta.qpc_ticks - loader.manifest.start_qpc_ticks) as f64
                    / loader.manifest.qpc_frequency_hz as f64
            } else {
                0.0
            };

            frame_rows.push(json!({
                "session_id": session_id,
                "frame_index": frame_index as u64,
                "t_rel_s": t_rel_s,
                "width": width,
                "height": height,
                "frame_sha": frame_sha,
                "artifact_path": frame_meta.artifact_path,
            }));

            let roi = Roi { bbox: [0, 0, width as i64, height as i64] };
            let spans = ocr::run_with_fallback(
                &mut cache,
                self.primary_ocr,
                self.secondary_ocr,
                &frame_sha,
                "default",
                &[roi],
            )
            .context("running OCR")?;
            total_spans += spans.len() as u64;

            for span in &spans {
                ocr_span_rows.push(json!({
                    "session_id": session_id,
                    "frame_index": frame_index as u64,
                    "span_id": span.span_id,
                    "text": span.text,
                    "bbox": span.bbox,
                    "source": span.source,
                    "reading_order": span.reading_order,
                    "confidence": span.confidence,
                }));
            }

            let elements = layout::run_default(&spans, width as f64, height as f64);
            let click_point = find_click_point(&loader.input_events, frame_meta.qpc_ticks);
            linker.process_frame(frame_index as u64, &elements, click_point);

            for element in &elements {
                element_rows.push(json!({
                    "session_id": session_id,
                    "frame_index": frame_index as u64,
                    "row_idx": global_row_idx,
                    "element_id": element.element_id,
                    "type": format!("{:?}", element.element_type).to_uppercase(),
                    "bbox": element.bbox,
                    "confidence": element.confidence,
                    "label": element.label,
                    "text": element.text,
                    "parent_id": element.parent_id,
                }));
                global_row_idx += 1;
            }
        }

        let event_rows: Vec<Value> = loader
            .input_events
            .iter()
            .map(|event| {
                json!({
                    "session_id": event.session_id,
                    "event_index": event.event_index,
                    "qpc_ticks": event.qpc_ticks,
                    "unix_ns": event.unix_ns,
                    "device_id": event.device_id,
                    "type": event.r#type,
                    "mouse": event.mouse.as_ref().map(|m| json!({"x": m.x, "y": m.y, "buttons": m.buttons})),
                    "control": event.control.as_ref().map(|c| json!({"key": c.key})),
                })
            })
            .collect();

        let track_rows: Vec<Value> = linker
            .assignments
            .iter()
            .map(|a| {
                json!({
                    "session_id": session_id,
                    "track_id": a.track_id,
                    "frame_index": a.frame_index,
                    "element_id": a.element_id,
                })
            })
            .collect();

        write_table(&out_dir, "frames", &frame_rows)?;
        write_table(&out_dir, "events_input", &event_rows)?;
        write_table(&out_dir, "ocr_spans", &ocr_span_rows)?;
        write_table(&out_dir, "elements", &element_rows)?;
        write_table(&out_dir, "tracks", &track_rows)?;

        let mut index = LexicalIndex::new();
        for row in &element_rows {
            let row_idx = row["row_idx"].as_u64().unwrap_or(0);
            let text = row["text"].as_str().unwrap_or("");
            let label = row["label"].as_str().unwrap_or("");
            let kind = row["type"].as_str().unwrap_or("");
            index.add_row(row_idx, &format!("{text} {label} {kind}"));
        }
        let index_path = out_dir.join("lexical_index.json");
        std::fs::write(&index_path, canon::canonicalize(&serde_json::to_value(&index)?))
            .context("writing lexical index")?;

        let summary = IngestSummary {
            session_id: session_id.clone(),
            frames_processed: frame_rows.len() as u64,
            input_events: event_rows.len() as u64,
            ocr_spans: total_spans,
            elements: element_rows.len() as u64,
            tracks: track_rows.len() as u64,
            id_switches: linker.id_switches,
            generated_at: timebase::utc_now_z(),
        };
        let summary_path = out_dir.join("ingest_summary.json");
        std::fs::write(&summary_path, serde_json::to_vec_pretty(&summary)?)
            .context("writing ingest_summary.json")?;

        journal::append(
            &self.journal_path,
            &session_id,
            "UTC",
            "ingest.session_processed",
            serde_json::to_value(&summary)?,
        )?;

        Ok(summary)
    }
}

fn find_click_point(
    events: &[crate::ingest::proto::InputEvent],
    frame_qpc: u64,
) -> Option<(i64, i64)> {
    events
        .iter()
        .filter(|e| e.r#type == InputEventType::Mouse as i32 && e.qpc_ticks <= frame_qpc)
        .filter_map(|e| e.mouse.as_ref().map(|m| (e.qpc_ticks, m)))
        .max_by_key(|(qpc, _)| *qpc)
        .map(|(_, m)| (m.x as i64, m.y as i64))
}

#[derive(Default, Debug)]
pub struct FixedOcrEngine {
    pub spans_by_sha: BTreeMap<String, Vec<crate::models::Span>>,
}

impl OcrEngine for FixedOcrEngine {
    fn name(&self) -> &str {
        "fixed"
    }
    fn run(&self, frame_sha: &str, _rois: &[Roi]) -> Result<Vec<crate::models::Span>> {
        Ok(self.spans_by_sha.get(frame_sha).cloned().unwrap_or_default())
    }
}
