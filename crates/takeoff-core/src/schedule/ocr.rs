//! OCR escalation for schedule pages whose text layer yielded nothing.
//!
//! Renders the page at high DPI and runs the OCR engine in both
//! segmentation modes over several crop regions, parsing each result with
//! two strategies: single-line table rows and multi-line fixture blocks.
//! The result with the most valid codes wins; ties prefer the table-row
//! strategy.

use tracing::debug;

use super::header::{assign_field, classify_cell, valid_code, FieldKind};
use crate::config::PipelineConfig;
use crate::geom::Rect;
use crate::model::{FixtureRecord, Page};
use crate::providers::{OcrMode, Providers};

/// Crop regions tried per page, as page fractions (x0, y0, x1, y1).
/// Schedules commonly occupy the full sheet, one half, or the area above
/// the title block strip.
const CROP_FRACTIONS: [Option<(f32, f32, f32, f32)>; 4] = [
    None,
    Some((0.0, 0.0, 0.55, 1.0)),
    Some((0.45, 0.0, 1.0, 1.0)),
    Some((0.0, 0.15, 1.0, 1.0)),
];

pub fn ocr_extract(
    page: &Page,
    page_size: Option<(f32, f32)>,
    providers: &Providers,
    config: &PipelineConfig,
) -> Result<Vec<FixtureRecord>, String> {
    if !providers.can_escalate_ocr() {
        return Err("no OCR engine configured".into());
    }
    let (Some(ocr), Some(rasterizer)) = (providers.ocr.as_ref(), providers.rasterizer.as_ref())
    else {
        return Err("no OCR engine configured".into());
    };

    let mut best: Vec<FixtureRecord> = Vec::new();
    let mut best_rank = (0usize, 0u8);

    for crop in CROP_FRACTIONS {
        let region = match (crop, page_size) {
            (Some((fx0, fy0, fx1, fy1)), Some((w, h))) => {
                Some(Rect::new(w * fx0, h * fy0, w * fx1, h * fy1))
            }
            (Some(_), None) => continue,
            (None, _) => None,
        };

        let image = rasterizer
            .render_crop(
                &page.source_path,
                page.pdf_page_index,
                config.ocr_dpi,
                region,
                page_size.map(|(_, h)| h),
            )
            .map_err(|e| e.to_string())?;

        for mode in [OcrMode::TableRows, OcrMode::AutoBlock] {
            let text = match ocr.recognize(&image, mode) {
                Ok(t) => t,
                Err(e) => {
                    debug!(mode = ?mode, error = %e, "OCR pass failed");
                    continue;
                }
            };
            let fixtures = match mode {
                OcrMode::TableRows => parse_table_rows(&text),
                OcrMode::AutoBlock => parse_fixture_blocks(&text),
            };
            // Rank: more valid codes first; on ties the table-row
            // strategy is preferred (rank bit 1 beats 0).
            let rank = (fixtures.len(), u8::from(mode == OcrMode::TableRows));
            if rank > best_rank {
                best_rank = rank;
                best = fixtures;
            }
        }
    }

    if best.is_empty() {
        Err("OCR produced no parsable fixture rows".into())
    } else {
        Ok(best)
    }
}

/// Single-line strategy: each OCR line is one schedule row with columns
/// separated by runs of 2+ spaces.
pub fn parse_table_rows(text: &str) -> Vec<FixtureRecord> {
    let mut fixtures = Vec::new();
    for line in text.lines() {
        let cells = split_by_gaps(line);
        if cells.len() < 2 {
            continue;
        }
        let Some(code) = valid_code(cells[0]) else {
            continue;
        };
        let mut rec = FixtureRecord::with_code(code);
        for cell in &cells[1..] {
            if let Some(kind) = classify_cell(cell) {
                assign_field(&mut rec, kind, cell.trim());
            }
        }
        if rec.populated_fields() > 0 {
            fixtures.push(rec);
        }
    }
    fixtures
}

/// Multi-line strategy: fixtures appear as blocks separated by blank
/// lines, the code leading the first line and spec lines following.
pub fn parse_fixture_blocks(text: &str) -> Vec<FixtureRecord> {
    let mut fixtures = Vec::new();

    for block in text.split("\n\n") {
        let mut lines = block.lines().filter(|l| !l.trim().is_empty());
        let Some(first) = lines.next() else { continue };

        let mut tokens = first.split_whitespace();
        let Some(head) = tokens.next() else { continue };
        let Some(code) = valid_code(head.trim_end_matches([':', '-'])) else {
            continue;
        };

        let mut rec = FixtureRecord::with_code(code);
        let first_rest: String = tokens.collect::<Vec<_>>().join(" ");
        let first_rest = first_rest.trim_start_matches(['-', ':', ' ']).to_string();
        if !first_rest.is_empty() {
            rec.description = first_rest;
        }

        for line in lines {
            let value = line.trim();
            match classify_cell(value) {
                Some(FieldKind::Description) if !rec.description.is_empty() => {
                    rec.description.push(' ');
                    rec.description.push_str(value);
                }
                Some(kind) => assign_field(&mut rec, kind, value),
                None => {}
            }
        }
        if rec.populated_fields() > 0 {
            fixtures.push(rec);
        }
    }
    fixtures
}

/// Split a line at runs of two or more spaces, the column convention of
/// aligned OCR output.
fn split_by_gaps(line: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start: Option<usize> = None;
    let mut spaces = 0;
    let mut seg_end = 0;

    for (i, c) in line.char_indices() {
        if c == ' ' {
            spaces += 1;
            if spaces == 2 {
                if let Some(s) = start.take() {
                    segments.push(line[s..seg_end].trim());
                }
            }
        } else {
            if start.is_none() {
                start = Some(i);
            }
            spaces = 0;
            seg_end = i + c.len_utf8();
        }
    }
    if let Some(s) = start {
        segments.push(line[s..seg_end].trim());
    }
    segments.into_iter().filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_by_gaps() {
        let cells = split_by_gaps("A1   2x4 LED TROFFER    120   3500 K");
        assert_eq!(cells, vec!["A1", "2x4 LED TROFFER", "120", "3500 K"]);
    }

    #[test]
    fn test_parse_table_rows() {
        let text = "LUMINAIRE SCHEDULE\nA1   2x4 LED TROFFER   120\nB2   6IN LED DOWNLIGHT   277\n";
        let fixtures = parse_table_rows(text);
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].code, "A1");
        assert_eq!(fixtures[0].voltage, "120");
        assert_eq!(fixtures[1].description, "6IN LED DOWNLIGHT");
    }

    #[test]
    fn test_parse_table_rows_skips_headers() {
        let text = "TYPE   DESCRIPTION   VOLTAGE\nA1   TROFFER LED   120";
        let fixtures = parse_table_rows(text);
        // "TYPE" is rejected as a 4-letter word; only A1 survives.
        assert_eq!(fixtures.len(), 1);
    }

    #[test]
    fn test_parse_fixture_blocks() {
        let text = "A1 - 2x4 LED TROFFER\nRECESSED GRID\n3500 K\n\nB2: 6IN LED DOWNLIGHT\n277\n";
        let fixtures = parse_fixture_blocks(text);
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].code, "A1");
        assert_eq!(fixtures[0].description, "2x4 LED TROFFER");
        assert_eq!(fixtures[0].mounting, "RECESSED GRID");
        assert_eq!(fixtures[0].cct, "3500 K");
        assert_eq!(fixtures[1].code, "B2");
        assert_eq!(fixtures[1].voltage, "277");
    }
}
