//! Layout engine: derives UiElements from OCR spans. The local default
//! produces one TEXT element per span; richer engines (WINDOW/PANE/BUTTON
//! hierarchies) are plugin-provided and optional. Per spec.md §4.14.

use crate::models::{ElementType, Span, UiElement};

/// Local default layout: one TEXT element per span, bbox taken from the
/// span's pixel-space bbox (callers pass already-denormalized bboxes).
pub fn run_default(spans: &[Span], image_w: f64, image_h: f64) -> Vec<UiElement> {
    spans
        .iter()
        .map(|span| {
            let bbox = [
                (span.bbox[0] * image_w).round() as i64,
                (span.bbox[1] * image_h).round() as i64,
                (span.bbox[2] * image_w).round() as i64,
                (span.bbox[3] * image_h).round() as i64,
            ];
            let element_id = UiElement::compute_element_id(&span.text, bbox);
            UiElement {
                element_id,
                element_type: ElementType::Text,
                bbox,
                confidence: span.confidence,
                label: None,
                text: Some(span.text.clone()),
                parent_id: None,
            }
        })
        .collect()
}
