//! Evidence providers contribute claims + citations to a query. Only a
//! lexical-index provider is implemented in-core; richer providers
//! (observation graph, UIA context, vision) are plugin-supplied via the
//! `retrieval.strategy`/`vision.extractor` capability slots.

use crate::models::{Citation, Locator};

use super::engine::RankedRow;

pub struct ProviderOutput {
    pub provider_id: String,
    pub claim_text: String,
    pub citations: Vec<Citation>,
    pub estimated_latency_ms: u64,
}

/// Builds one claim per top-ranked row, each carrying a citation back to
/// its `(session_id, frame_index, element_id)` locator.
pub fn lexical_provider_output(query: &str, ranked: &[RankedRow]) -> ProviderOutput {
    let citations: Vec<Citation> = ranked
        .iter()
        .map(|row| Citation {
            evidence_id: format!("{}/{}", row.session_id, row.element_id),
            locator: Locator {
                kind: "ui_element".to_string(),
                record_id: row.element_id.clone(),
                bbox: None,
                frame_index: Some(row.frame_index),
            },
        })
        .collect();

    let claim_text = if ranked.is_empty() {
        format!("No evidence found for \"{query}\".")
    } else {
        format!(
            "Found {} matching element(s) for \"{query}\".",
            ranked.len()
        )
    };

    ProviderOutput {
        provider_id: "lexical".to_string(),
        claim_text,
        citations,
        estimated_latency_ms: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ranked_rows_yield_no_citations() {
        let out = lexical_provider_output("inbox", &[]);
        assert!(out.citations.is_empty());
    }

    #[test]
    fn one_citation_per_ranked_row() {
        let rows = vec![RankedRow {
            session_id: "s1".to_string(),
            frame_index: 0,
            row_idx: 0,
            element_id: "e1".to_string(),
            text: "Inbox".to_string(),
            score: 2,
        }];
        let out = lexical_provider_output("inbox", &rows);
        assert_eq!(out.citations.len(), 1);
    }
}
