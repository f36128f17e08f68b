//! Temporal linker: tracks UiElements across consecutive frames by IoU +
//! text similarity + click-anchor boost. Bit-identical across runs for
//! identical inputs. Grounded verbatim on
//! `autocapture_prime/link/temporal_linker.py`.

use similar::TextDiff;

use crate::models::{ElementType, UiElement};

fn iou(a: [i64; 4], b: [i64; 4]) -> f64 {
    let (ax0, ay0, ax1, ay1) = (a[0], a[1], a[2], a[3]);
    let (bx0, by0, bx1, by1) = (b[0], b[1], b[2], b[3]);

    let ix0 = ax0.max(bx0);
    let iy0 = ay0.max(by0);
    let ix1 = ax1.min(bx1);
    let iy1 = ay1.min(by1);

    let iw = (ix1 - ix0).max(0);
    let ih = (iy1 - iy0).max(0);
    let intersection = (iw * ih) as f64;

    let area_a = ((ax1 - ax0).max(0) * (ay1 - ay0).max(0)) as f64;
    let area_b = ((bx1 - bx0).max(0) * (by1 - by0).max(0)) as f64;
    let union = area_a + area_b - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn text_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    TextDiff::from_chars(a, b).ratio() as f64
}

fn point_in_bbox(point: (i64, i64), bbox: [i64; 4]) -> bool {
    point.0 >= bbox[0] && point.0 <= bbox[2] && point.1 >= bbox[1] && point.1 <= bbox[3]
}

#[derive(Debug, Clone)]
struct LiveTrack {
    track_id: String,
    element_type: ElementType,
    last_bbox: [i64; 4],
    last_text: String,
    last_element_id: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TrackAssignment {
    pub track_id: String,
    pub frame_index: u64,
    pub element_id: String,
}

pub struct TemporalLinker {
    iou_threshold: f64,
    next_track_seq: u64,
    live: Vec<LiveTrack>,
    pub id_switches: u64,
    pub assignments: Vec<TrackAssignment>,
}

impl TemporalLinker {
    pub fn new(iou_threshold: f64) -> Self {
        TemporalLinker {
            iou_threshold,
            next_track_seq: 1,
            live: Vec::new(),
            id_switches: 0,
            assignments: Vec::new(),
        }
    }

    fn mint_track_id(&mut self) -> String {
        let id = format!("trk_{:06}", self.next_track_seq);
        self.next_track_seq += 1;
        id
    }

    /// Process one frame's elements, in the order given, against the
    /// previous frame's live tracks. `click_point`, if present, boosts
    /// the score of whichever current element contains it.
    pub fn process_frame(
        &mut self,
        frame_index: u64,
        elements: &[UiElement],
        click_point: Option<(i64, i64)>,
    ) {
        let mut used_prev = vec![false; self.live.len()];
        let mut new_live: Vec<LiveTrack> = Vec::with_capacity(elements.len());

        for element in elements {
            let click_bonus = click_point
                .map(|p| point_in_bbox(p, element.bbox))
                .unwrap_or(false);

            let mut best: Option<(usize, f64)> = None;
            for (idx, prev) in self.live.iter().enumerate() {
                if used_prev[idx] {
                    continue;
                }
                if prev.element_type != element.element_type {
                    continue;
                }
                let i = iou(prev.last_bbox, element.bbox);
                if i < self.iou_threshold {
                    continue;
                }
                let text_sim = text_ratio(&prev.last_text, element.text.as_deref().unwrap_or(""));
                let mut score = 0.7 * i + 0.3 * text_sim;
                if click_bonus {
                    score += 0.2;
                }
                if best.map(|(_, s)| score > s).unwrap_or(true) {
                    best = Some((idx, score));
                }
            }

            let (track_id, prior_element_id) = match best {
                Some((idx, _)) => {
                    used_prev[idx] = true;
                    (self.live[idx].track_id.clone(), Some(self.live[idx].last_element_id.clone()))
                }
                None => (self.mint_track_id(), None),
            };

            if let Some(prior_id) = &prior_element_id {
                if prior_id != &element.element_id {
                    self.id_switches += 1;
                }
            }

            self.assignments.push(TrackAssignment {
                track_id: track_id.clone(),
                frame_index,
                element_id: element.element_id.clone(),
            });

            new_live.push(LiveTrack {
                track_id,
                element_type: element.element_type,
                last_bbox: element.bbox,
                last_text: element.text.clone().unwrap_or_default(),
                last_element_id: element.element_id.clone(),
            });
        }

        self.live = new_live;
    }
}
