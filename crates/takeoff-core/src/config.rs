//! Tuning knobs for the extraction pipeline.
//!
//! Every constant here is a documented default that a deployment can
//! override through [`Overrides`], a flat key→value lookup consulted once
//! at stage start.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Fraction of page height treated as the bottom strip when scanning
    /// for viewport titles.
    pub viewport_title_strip: f32,
    /// X-gap between words, as a fraction of page width, that splits one
    /// text line into separate title segments.
    pub viewport_gap_fraction: f32,
    /// Minimum separation between two viewport title centers, as a
    /// fraction of page size, below which a split is rejected (wrapped
    /// multi-line titles).
    pub viewport_min_separation: f32,
    /// Fraction of page width kept for the full-page viewport retry
    /// (excludes the title block and notes column on the right).
    pub viewport_scan_width: f32,

    /// Outer border margin excluded from fixture counting, as a fraction
    /// of page size.
    pub count_border_margin: f32,
    /// Title-block exclusion corner: rightmost fraction of page width.
    pub title_block_width: f32,
    /// Title-block exclusion corner: bottom fraction of page height.
    pub title_block_height: f32,
    /// Tolerance for merging text and vision counts on ambiguous codes:
    /// within this absolute difference the larger count wins. Preserved
    /// from the tuned source behavior; do not re-derive.
    pub vision_merge_tolerance: u32,

    /// Pages per vision classification call.
    pub vision_classify_batch: usize,
    /// DPI for vision classification renders (kept very low on purpose).
    pub classify_dpi: u32,
    /// DPI for counting/schedule escalation renders.
    pub escalation_dpi: u32,
    /// DPI for OCR renders.
    pub ocr_dpi: u32,
    /// Max tokens requested from the vision model.
    pub vision_max_tokens: u32,
    /// Content streams larger than this many bytes skip slow text
    /// fallback paths entirely.
    pub dense_page_bytes: usize,

    /// Keynote numbers above this are treated as address/spec leakage.
    pub keynote_max_number: u32,
    /// Minimum keynote definition length in characters.
    pub keynote_min_text_len: usize,
    /// Segments shorter than this many points are ignored by the symbol
    /// detector (hatching).
    pub keynote_min_segment_len: f32,
    /// Inner and outer radius of the enclosure band around a candidate
    /// number, in multiples of its font size.
    pub keynote_radius_inner: f32,
    pub keynote_radius_outer: f32,

    /// QA pass threshold.
    pub confidence_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            viewport_title_strip: 0.15,
            viewport_gap_fraction: 0.03,
            viewport_min_separation: 0.10,
            viewport_scan_width: 0.65,
            count_border_margin: 0.02,
            title_block_width: 0.20,
            title_block_height: 0.15,
            vision_merge_tolerance: 2,
            vision_classify_batch: 8,
            classify_dpi: 40,
            escalation_dpi: 150,
            ocr_dpi: 300,
            vision_max_tokens: 4096,
            dense_page_bytes: 10 * 1024 * 1024,
            keynote_max_number: 20,
            keynote_min_text_len: 15,
            keynote_min_segment_len: 3.0,
            keynote_radius_inner: 0.3,
            keynote_radius_outer: 2.5,
            confidence_threshold: 0.95,
        }
    }
}

impl PipelineConfig {
    /// Apply persisted parameter overrides on top of the defaults.
    /// Unknown keys are ignored; unparsable values keep the default.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        overrides.apply_f32("viewport.min_separation", &mut self.viewport_min_separation);
        overrides.apply_f32("count.border_margin", &mut self.count_border_margin);
        overrides.apply_u32("count.merge_tolerance", &mut self.vision_merge_tolerance);
        overrides.apply_usize("vision.batch", &mut self.vision_classify_batch);
        overrides.apply_u32("vision.classify_dpi", &mut self.classify_dpi);
        overrides.apply_u32("vision.escalation_dpi", &mut self.escalation_dpi);
        overrides.apply_u32("ocr.dpi", &mut self.ocr_dpi);
        overrides.apply_u32("keynotes.max_number", &mut self.keynote_max_number);
        overrides.apply_f32("keynotes.radius_outer", &mut self.keynote_radius_outer);
        overrides.apply_f32("qa.threshold", &mut self.confidence_threshold);
        self
    }
}

/// Flat key→value parameter store handed in by the caller (persisted
/// tuning from outside the core). Values are strings; each consumer
/// parses what it needs and falls back to the default on parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Overrides {
    values: BTreeMap<String, String>,
}

impl Overrides {
    pub fn new() -> Self {
        Overrides::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn apply_f32(&self, key: &str, slot: &mut f32) {
        if let Some(v) = self.get(key).and_then(|s| s.parse().ok()) {
            *slot = v;
        }
    }

    fn apply_u32(&self, key: &str, slot: &mut u32) {
        if let Some(v) = self.get(key).and_then(|s| s.parse().ok()) {
            *slot = v;
        }
    }

    fn apply_usize(&self, key: &str, slot: &mut usize) {
        if let Some(v) = self.get(key).and_then(|s| s.parse().ok()) {
            *slot = v;
        }
    }
}
