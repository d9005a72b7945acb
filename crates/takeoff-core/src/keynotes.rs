//! Keyed-note handling: find the notes legend, parse the numbered
//! definitions, and count the enclosed callout symbols on each plan.
//!
//! A keynote symbol is a small closed shape (diamond/hexagon/circle)
//! around a number. Counting therefore runs a geometric verification:
//! segment endpoints must surround the candidate number on enough sides,
//! and the candidate's font height must match the modal height of
//! shape-verified symbols — stray dimension digits fail one or both.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::geom::{group_words_into_lines, Rect, Word};
use crate::model::{KeyNote, Page, PageType};
use crate::pdf::{DrawingSource, PageGeometry};
use crate::providers::Providers;

/// Legend header phrases, matched case-insensitively with or without a
/// trailing colon.
const HEADER_PHRASES: [&str; 6] = [
    "key notes",
    "keyed notes",
    "keyed sheet notes",
    "keyed plan notes",
    "keynotes",
    "key notes:",
];

/// A numbered definition parsed from the legend.
#[derive(Debug, Clone)]
pub struct ParsedNote {
    pub number: String,
    pub text: String,
}

/// Detect and count keynotes across every lighting plan.
pub fn detect_keynotes(
    pages: &[Page],
    source: &dyn DrawingSource,
    providers: &Providers,
    config: &PipelineConfig,
    fixture_codes: &[String],
    warnings: &mut Vec<String>,
) -> Vec<KeyNote> {
    let plan_pages: Vec<&Page> = pages
        .iter()
        .filter(|p| p.page_type == PageType::LightingPlan)
        .collect();
    if plan_pages.is_empty() {
        return Vec::new();
    }

    // Per-plan work is independent: parse the legend from the unclipped
    // page, count symbols inside the viewport.
    let per_plan: Vec<PlanNotes> = plan_pages
        .par_iter()
        .map(|page| analyze_plan(page, source, config))
        .collect();

    let mut merged: BTreeMap<String, KeyNote> = BTreeMap::new();
    for plan in &per_plan {
        for note in &plan.notes {
            let entry = merged.entry(note.number.clone()).or_insert_with(|| KeyNote {
                number: note.number.clone(),
                text: note.text.clone(),
                ..KeyNote::default()
            });
            if entry.text.len() < note.text.len() {
                entry.text = note.text.clone();
            }
        }
    }

    for plan in &per_plan {
        let needs_escalation = plan.detection_weak && !plan.notes.is_empty();
        let mut counts = plan.counts.clone();

        if needs_escalation {
            match vision_count_plan(plan, providers, config) {
                Ok(vision_counts) => {
                    info!(plan = %plan.plan_code, "keynote counting escalated to vision");
                    counts = vision_counts;
                }
                Err(reason) => {
                    warnings.push(format!(
                        "keynote vision escalation failed on {}: {reason}",
                        plan.plan_code
                    ));
                }
            }
        }

        for (number, count) in counts {
            if let Some(note) = merged.get_mut(&number) {
                *note.counts_per_plan.entry(plan.plan_code.clone()).or_insert(0) += count;
            }
        }
    }

    // No legend parsed anywhere: a full-page vision pass per plan can
    // read the definitions and count them together.
    if merged.is_empty() {
        for plan in &per_plan {
            match vision_full_extract(plan, providers, config) {
                Ok(notes) => {
                    info!(plan = %plan.plan_code, "keynote definitions recovered by full-page vision");
                    for note in notes {
                        match merged.entry(note.number.clone()) {
                            std::collections::btree_map::Entry::Occupied(mut existing) => {
                                for (plan_code, count) in note.counts_per_plan {
                                    *existing
                                        .get_mut()
                                        .counts_per_plan
                                        .entry(plan_code)
                                        .or_insert(0) += count;
                                }
                            }
                            std::collections::btree_map::Entry::Vacant(slot) => {
                                slot.insert(note);
                            }
                        }
                    }
                }
                Err(reason) => {
                    warnings.push(format!(
                        "keynote extraction found nothing on {}: {reason}",
                        plan.plan_code
                    ));
                }
            }
        }
    }

    // Zero-fill every plan key and harvest fixture references.
    let plan_codes: Vec<String> = plan_pages.iter().map(|p| p.code()).collect();
    let mut notes: Vec<KeyNote> = merged.into_values().collect();
    for note in &mut notes {
        for code in &plan_codes {
            note.counts_per_plan.entry(code.clone()).or_insert(0);
        }
        note.fixture_references = find_fixture_references(&note.text, fixture_codes);
        note.recompute_total();
        debug!(number = %note.number, total = note.total, "keynote counted");
    }
    notes
}

/// Everything extracted from one plan page.
struct PlanNotes {
    plan_code: String,
    page: Page,
    notes: Vec<ParsedNote>,
    counts: HashMap<String, u32>,
    /// Total symbols found < distinct notes: geometric detection likely
    /// failed and vision should retry this plan.
    detection_weak: bool,
    legend_region: Option<Rect>,
    page_size: (f32, f32),
}

fn analyze_plan(page: &Page, source: &dyn DrawingSource, config: &PipelineConfig) -> PlanNotes {
    let geo = match source.geometry(page) {
        Ok(g) => g,
        Err(_) => {
            return PlanNotes {
                plan_code: page.code(),
                page: page.clone(),
                notes: Vec::new(),
                counts: HashMap::new(),
                detection_weak: false,
                legend_region: None,
                page_size: (0.0, 0.0),
            }
        }
    };

    let (notes, legend_region) = parse_legend(&geo, config);
    let numbers: Vec<String> = notes.iter().map(|n| n.number.clone()).collect();
    let counts = count_symbols(
        &geo,
        page.viewport_bbox.as_ref(),
        &numbers,
        legend_region.as_ref(),
        config,
    );

    let total: u32 = counts.values().sum();
    let detection_weak = (total as usize) < numbers.len();

    PlanNotes {
        plan_code: page.code(),
        page: page.clone(),
        notes,
        counts,
        detection_weak,
        legend_region,
        page_size: (geo.width, geo.height),
    }
}

/// Locate the legend via the header phrase and parse numbered entries.
/// Falls back to progressively wider right-side crops, then the full
/// page.
pub fn parse_legend(
    geo: &PageGeometry,
    config: &PipelineConfig,
) -> (Vec<ParsedNote>, Option<Rect>) {
    if geo.words.is_empty() {
        return (Vec::new(), None);
    }

    if let Some(header_rect) = find_header_phrase(geo) {
        // Tight column crop: from the header down, bounded to a notes
        // column width.
        let column = Rect::new(
            (header_rect.x0 - 12.0).max(0.0),
            0.0,
            (header_rect.x0 + geo.width * 0.28).min(geo.width),
            header_rect.y0,
        );
        let notes = parse_entries_in(geo, &column, config);
        if !notes.is_empty() {
            return (notes, Some(column));
        }
    }

    for fraction in [0.25_f32, 0.35] {
        let crop = Rect::new(geo.width * (1.0 - fraction), 0.0, geo.width, geo.height);
        let notes = parse_entries_in(geo, &crop, config);
        if !notes.is_empty() {
            return (notes, Some(crop));
        }
    }

    let full = Rect::new(0.0, 0.0, geo.width, geo.height);
    let notes = parse_entries_in(geo, &full, config);
    let region = if notes.is_empty() { None } else { Some(full) };
    (notes, region)
}

/// Find the legend header phrase position from word coordinates.
fn find_header_phrase(geo: &PageGeometry) -> Option<Rect> {
    let lines = group_words_into_lines(&geo.words, 3.0);
    for line in &lines {
        let text = line.text().to_lowercase();
        let text = text.trim_end_matches(':');
        if HEADER_PHRASES
            .iter()
            .any(|p| text == p.trim_end_matches(':') || text.starts_with(p))
        {
            let y = line.y;
            return Some(Rect::new(line.x_min(), y, line.x_max(), y));
        }
    }
    None
}

/// Parse `N. text` / `N) text` / `N - text` entries with continuation
/// lines, trimming at scale-marker or sheet-number lines.
fn parse_entries_in(geo: &PageGeometry, region: &Rect, config: &PipelineConfig) -> Vec<ParsedNote> {
    let words: Vec<Word> = geo.words_in(region).into_iter().cloned().collect();
    let lines = group_words_into_lines(&words, 3.0);

    let entry_re = Regex::new(r"^(\d{1,3}[A-Z]?)[.)\-]?$").expect("static regex");
    let scale_re = Regex::new(r#"(?i)^scale\b|^\d+/\d+\s*"|="#).expect("static regex");
    let sheet_line_re = Regex::new(r"^[A-Z]{1,3}-?\d{1,4}(\.\d+)?$").expect("static regex");

    let mut notes: Vec<ParsedNote> = Vec::new();
    let mut current: Option<ParsedNote> = None;

    for line in &lines {
        let text = line.text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        // Section ends at a scale marker or a bare sheet number.
        if scale_re.is_match(trimmed) || sheet_line_re.is_match(trimmed) {
            if current.is_some() {
                break;
            }
            continue;
        }

        let first = line.words.first().map(|w| w.text.as_str()).unwrap_or("");
        if let Some(cap) = entry_re.captures(first) {
            let number = cap[1].to_string();
            let rest = line
                .words
                .iter()
                .skip(1)
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let rest = rest.trim_start_matches(['-', '.', ')', ' ']).to_string();
            if let Some(done) = current.take() {
                notes.push(done);
            }
            current = Some(ParsedNote { number, text: rest });
            continue;
        }

        // Continuation line for the open entry.
        if let Some(note) = current.as_mut() {
            if !note.text.is_empty() {
                note.text.push(' ');
            }
            note.text.push_str(trimmed);
        }
    }
    if let Some(done) = current.take() {
        notes.push(done);
    }

    notes.retain(|n| {
        let numeric: u32 = n
            .number
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .unwrap_or(0);
        numeric >= 1
            && numeric <= config.keynote_max_number
            && n.text.len() >= config.keynote_min_text_len
    });
    notes
}

/// Count symbol occurrences of each keynote number.
pub fn count_symbols(
    geo: &PageGeometry,
    viewport: Option<&Rect>,
    numbers: &[String],
    legend_region: Option<&Rect>,
    config: &PipelineConfig,
) -> HashMap<String, u32> {
    let mut counts: HashMap<String, u32> =
        numbers.iter().map(|n| (n.clone(), 0)).collect();
    if numbers.is_empty() {
        return counts;
    }

    let candidates: Vec<&Word> = geo
        .words
        .iter()
        .filter(|w| numbers.iter().any(|n| n == w.text.trim()))
        .filter(|w| {
            let (cx, cy) = w.center();
            if let Some(vp) = viewport {
                if !vp.contains(cx, cy) {
                    return false;
                }
            }
            if let Some(legend) = legend_region {
                if legend.contains(cx, cy) {
                    return false;
                }
            }
            true
        })
        .collect();
    if candidates.is_empty() {
        return counts;
    }

    let segments: Vec<&crate::geom::Segment> = geo
        .segments
        .iter()
        .filter(|s| s.len() >= config.keynote_min_segment_len)
        .collect();

    // No vector geometry at all: plain text-position counting is all
    // that is possible.
    if segments.is_empty() {
        for word in &candidates {
            if let Some(c) = counts.get_mut(word.text.trim()) {
                *c += 1;
            }
        }
        return counts;
    }

    let verdicts: Vec<SymbolVerdict> = candidates
        .iter()
        .map(|w| verify_candidate(w, &segments, config))
        .collect();

    // Modal font height of shape-verified candidates defines the real
    // symbol size on this sheet.
    let modal = modal_height(
        verdicts
            .iter()
            .zip(&candidates)
            .filter(|(v, _)| v.shape_verified)
            .map(|(_, w)| w.font_size),
    );

    match modal {
        Some(height) => {
            for (verdict, word) in verdicts.iter().zip(&candidates) {
                if verdict.quadrants >= 3 && (word.font_size - height).abs() < 0.26 {
                    if let Some(c) = counts.get_mut(word.text.trim()) {
                        *c += 1;
                    }
                }
            }
        }
        None => {
            // Nothing shape-verified: fall back to the quadrant majority
            // alone.
            for (verdict, word) in verdicts.iter().zip(&candidates) {
                if verdict.quadrants >= 3 {
                    if let Some(c) = counts.get_mut(word.text.trim()) {
                        *c += 1;
                    }
                }
            }
        }
    }
    counts
}

#[derive(Debug, Clone, Copy)]
struct SymbolVerdict {
    quadrants: u32,
    shape_verified: bool,
}

/// Enclosure test for one candidate number.
fn verify_candidate(
    word: &Word,
    segments: &[&crate::geom::Segment],
    config: &PipelineConfig,
) -> SymbolVerdict {
    let (cx, cy) = word.center();
    let size = word.font_size.max(4.0);
    let inner = size * config.keynote_radius_inner;
    let outer = size * config.keynote_radius_outer;

    // Segments with at least one endpoint inside the radius band.
    let mut nearby: Vec<&crate::geom::Segment> = Vec::new();
    let mut quadrant_hit = [false; 4];
    for seg in segments {
        let mut in_band = false;
        for (px, py) in [(seg.x0, seg.y0), (seg.x1, seg.y1)] {
            let dx = px - cx;
            let dy = py - cy;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist >= inner && dist <= outer {
                in_band = true;
                let q = match (dx >= 0.0, dy >= 0.0) {
                    (true, true) => 0,
                    (false, true) => 1,
                    (false, false) => 2,
                    (true, false) => 3,
                };
                quadrant_hit[q] = true;
            }
        }
        if in_band {
            nearby.push(seg);
        }
    }
    let quadrants = quadrant_hit.iter().filter(|q| **q).count() as u32;

    SymbolVerdict {
        quadrants,
        shape_verified: quadrants >= 3 && polygon_quality(&nearby, cx, cy),
    }
}

/// Closed-polygon check: a hexagon or diamond around the center has a
/// bounded number of edges, shares vertices pairwise, and keeps its edge
/// midpoints at a near-constant distance from the center. Random wiring
/// fails at least one.
fn polygon_quality(nearby: &[&crate::geom::Segment], cx: f32, cy: f32) -> bool {
    if nearby.len() < 4 || nearby.len() > 12 {
        return false;
    }

    // Count vertices shared by exactly two segments (quantized endpoint
    // positions).
    let mut vertex_uses: HashMap<(i32, i32), u32> = HashMap::new();
    for seg in nearby {
        for (px, py) in [(seg.x0, seg.y0), (seg.x1, seg.y1)] {
            let key = ((px * 2.0).round() as i32, (py * 2.0).round() as i32);
            *vertex_uses.entry(key).or_insert(0) += 1;
        }
    }
    let shared = vertex_uses.values().filter(|&&c| c == 2).count();
    if shared < 2 {
        return false;
    }

    // Midpoint distances from center should be tight for a closed shape.
    let dists: Vec<f32> = nearby
        .iter()
        .map(|s| {
            let (mx, my) = s.midpoint();
            ((mx - cx).powi(2) + (my - cy).powi(2)).sqrt()
        })
        .collect();
    let mean = dists.iter().sum::<f32>() / dists.len() as f32;
    if mean <= 0.0 {
        return false;
    }
    let var = dists.iter().map(|d| (d - mean).powi(2)).sum::<f32>() / dists.len() as f32;
    let stddev = var.sqrt();
    stddev / mean < 0.35
}

/// Most common font height, quantized to half points.
fn modal_height(heights: impl Iterator<Item = f32>) -> Option<f32> {
    let mut buckets: HashMap<i32, (u32, f32)> = HashMap::new();
    for h in heights {
        let key = (h * 2.0).round() as i32;
        let entry = buckets.entry(key).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += h;
    }
    buckets
        .into_iter()
        .max_by_key(|(_, (count, _))| *count)
        .map(|(_, (count, sum))| sum / count as f32)
}

/// Fixture codes referenced in the note text.
fn find_fixture_references(text: &str, fixture_codes: &[String]) -> Vec<String> {
    let upper = text.to_uppercase();
    let mut refs: Vec<String> = fixture_codes
        .iter()
        .filter(|code| {
            Regex::new(&format!(r"\b{}\b", regex::escape(code)))
                .map(|re| re.is_match(&upper))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    refs.sort();
    refs.dedup();
    refs
}


/// Two-image vision escalation: the legend crop teaches the model this
/// sheet's symbol shape, the drawing crop is what it counts.
fn vision_count_plan(
    plan: &PlanNotes,
    providers: &Providers,
    config: &PipelineConfig,
) -> Result<HashMap<String, u32>, String> {
    if !providers.can_escalate_vision() {
        return Err("no vision provider configured".into());
    }
    let (Some(vision), Some(rasterizer)) =
        (providers.vision.as_ref(), providers.rasterizer.as_ref())
    else {
        return Err("no vision provider configured".into());
    };
    let (w, h) = plan.page_size;

    let legend = plan
        .legend_region
        .unwrap_or_else(|| Rect::new(w * 0.7, 0.0, w, h));
    let drawing = plan
        .page
        .viewport_bbox
        .unwrap_or_else(|| Rect::new(0.0, 0.0, w * 0.75, h));

    let legend_img = rasterizer
        .render_crop(
            &plan.page.source_path,
            plan.page.pdf_page_index,
            config.escalation_dpi,
            Some(legend),
            Some(h),
        )
        .map_err(|e| e.to_string())?;
    let drawing_img = rasterizer
        .render_crop(
            &plan.page.source_path,
            plan.page.pdf_page_index,
            config.escalation_dpi,
            Some(drawing),
            Some(h),
        )
        .map_err(|e| e.to_string())?;

    let numbers: Vec<&str> = plan.notes.iter().map(|n| n.number.as_str()).collect();
    let prompt = format!(
        "The first image shows a keyed-notes legend from an electrical drawing; note how the \
         keynote symbol encloses its number (diamond, hexagon, or circle). The second image is \
         the plan drawing. Step 1: describe the symbol shape used. Step 2: scan the drawing and \
         count only numbers enclosed in that symbol shape, for these keynote numbers: {}. Do not \
         count bare dimension or circuit numbers. Reply with your reasoning followed by a JSON \
         array of {{\"number\": ..., \"count\": ...}}.",
        numbers.join(", ")
    );

    let reply = vision
        .query(&[legend_img, drawing_img], &prompt, config.vision_max_tokens)
        .map_err(|e| e.to_string())?;
    let items = crate::jsonx::extract_json_array(&reply)
        .ok_or_else(|| "vision reply contained no JSON".to_string())?;

    let mut counts = HashMap::new();
    for item in items {
        let Some(number) = item.get("number").and_then(crate::jsonx::value_to_string) else {
            continue;
        };
        let count = item
            .get("count")
            .and_then(crate::jsonx::value_to_u32)
            .unwrap_or(0);
        counts.insert(number, count);
    }
    if counts.is_empty() {
        return Err("vision reply contained no counts".into());
    }
    Ok(counts)
}

/// Full-page vision fallback when text parsing found no definitions at
/// all: read the legend and count symbols in one pass. Truncated replies
/// recover whatever complete entries exist.
fn vision_full_extract(
    plan: &PlanNotes,
    providers: &Providers,
    config: &PipelineConfig,
) -> Result<Vec<KeyNote>, String> {
    if !providers.can_escalate_vision() {
        return Err("no vision provider configured".into());
    }
    let Some(vision) = providers.vision.as_ref() else {
        return Err("no vision provider configured".into());
    };

    let image = providers
        .render(
            &plan.page.source_path,
            plan.page.pdf_page_index,
            config.escalation_dpi,
        )
        .map_err(|e| e.to_string())?;

    let prompt = "This electrical drawing page contains a keyed-notes legend (numbered notes) \
                  and a plan where those numbers appear inside small symbols. Read every keyed \
                  note and count its symbol occurrences on the plan. Reply with a JSON array of \
                  {\"number\": ..., \"text\": ..., \"count\": ...}.";

    let reply = vision
        .query(&[image], prompt, config.vision_max_tokens)
        .map_err(|e| e.to_string())?;
    let items = crate::jsonx::extract_json_array(&reply)
        .ok_or_else(|| "vision reply contained no JSON".to_string())?;

    let mut notes = Vec::new();
    for item in items {
        let Some(number) = item.get("number").and_then(crate::jsonx::value_to_string) else {
            continue;
        };
        let text = item
            .get("text")
            .and_then(crate::jsonx::value_to_string)
            .unwrap_or_default();
        let count = item
            .get("count")
            .and_then(crate::jsonx::value_to_u32)
            .unwrap_or(0);
        let mut note = KeyNote {
            number,
            text,
            ..KeyNote::default()
        };
        note.counts_per_plan.insert(plan.plan_code.clone(), count);
        notes.push(note);
    }
    if notes.is_empty() {
        warn!("full-page keynote vision returned no entries");
        return Err("vision reply contained no entries".into());
    }
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Segment;

    fn word(text: &str, x: f32, y: f32, size: f32) -> Word {
        Word {
            text: text.into(),
            x,
            y,
            width: text.len() as f32 * size * 0.5,
            height: size,
            font_size: size,
        }
    }

    fn legend_geo() -> PageGeometry {
        let mut words = Vec::new();
        words.extend([
            word("KEY", 800.0, 700.0, 10.0),
            word("NOTES:", 830.0, 700.0, 10.0),
            word("1.", 800.0, 680.0, 9.0),
            word("PROVIDE", 815.0, 680.0, 9.0),
            word("FIXTURE", 860.0, 680.0, 9.0),
            word("TYPE", 900.0, 680.0, 9.0),
            word("A1", 925.0, 680.0, 9.0),
            word("2.", 800.0, 664.0, 9.0),
            word("ROUTE", 815.0, 664.0, 9.0),
            word("CONDUIT", 850.0, 664.0, 9.0),
            word("TO", 895.0, 664.0, 9.0),
            word("PANEL", 910.0, 664.0, 9.0),
            word("ABOVE", 945.0, 664.0, 9.0),
            word("CEILING", 985.0, 664.0, 9.0),
        ]);
        PageGeometry {
            width: 1100.0,
            height: 800.0,
            words,
            segments: Vec::new(),
            content_len: 0,
        }
    }

    #[test]
    fn test_parse_legend_entries() {
        let geo = legend_geo();
        let (notes, region) = parse_legend(&geo, &PipelineConfig::default());
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].number, "1");
        assert!(notes[0].text.contains("PROVIDE FIXTURE"));
        assert_eq!(notes[1].number, "2");
        assert!(region.is_some());
    }

    #[test]
    fn test_short_entries_rejected() {
        let mut geo = legend_geo();
        // Entry 3 with text under the 15-char minimum.
        geo.words.extend([
            word("3.", 800.0, 648.0, 9.0),
            word("N/A", 815.0, 648.0, 9.0),
        ]);
        let (notes, _) = parse_legend(&geo, &PipelineConfig::default());
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn test_large_numbers_rejected() {
        let mut geo = legend_geo();
        // "101." looks like an address, not a keynote.
        geo.words.extend([
            word("101.", 800.0, 648.0, 9.0),
            word("MAIN", 820.0, 648.0, 9.0),
            word("STREET", 850.0, 648.0, 9.0),
            word("BUILDING", 890.0, 648.0, 9.0),
        ]);
        let (notes, _) = parse_legend(&geo, &PipelineConfig::default());
        assert_eq!(notes.len(), 2);
    }

    /// Hexagon of six segments centered on (x, y) with the given radius.
    fn hexagon(x: f32, y: f32, r: f32) -> Vec<Segment> {
        let mut pts = Vec::new();
        for i in 0..6 {
            let a = std::f32::consts::PI / 3.0 * i as f32;
            pts.push((x + r * a.cos(), y + r * a.sin()));
        }
        (0..6)
            .map(|i| {
                let (x0, y0) = pts[i];
                let (x1, y1) = pts[(i + 1) % 6];
                Segment { x0, y0, x1, y1 }
            })
            .collect()
    }

    fn symbol_word(n: &str, x: f32, y: f32) -> Word {
        // Center the word on (x, y): width/height follow font size 8.
        let w = n.len() as f32 * 4.0;
        Word {
            text: n.into(),
            x: x - w / 2.0,
            y: y - 4.0,
            width: w,
            height: 8.0,
            font_size: 8.0,
        }
    }

    #[test]
    fn test_enclosed_symbol_counted() {
        let mut geo = PageGeometry {
            width: 1000.0,
            height: 800.0,
            ..PageGeometry::default()
        };
        geo.words.push(symbol_word("1", 300.0, 400.0));
        geo.segments.extend(hexagon(300.0, 400.0, 12.0));
        let counts = count_symbols(
            &geo,
            None,
            &["1".to_string()],
            None,
            &PipelineConfig::default(),
        );
        assert_eq!(counts["1"], 1);
    }

    #[test]
    fn test_two_quadrant_candidate_never_counted() {
        let mut geo = PageGeometry {
            width: 1000.0,
            height: 800.0,
            ..PageGeometry::default()
        };
        geo.words.push(symbol_word("1", 300.0, 400.0));
        // Segments only above-right and above-left: two quadrants.
        geo.segments.push(Segment {
            x0: 305.0,
            y0: 410.0,
            x1: 315.0,
            y1: 412.0,
        });
        geo.segments.push(Segment {
            x0: 290.0,
            y0: 410.0,
            x1: 285.0,
            y1: 412.0,
        });
        let counts = count_symbols(
            &geo,
            None,
            &["1".to_string()],
            None,
            &PipelineConfig::default(),
        );
        assert_eq!(counts["1"], 0);
    }

    #[test]
    fn test_modal_font_height_filters_strays() {
        let mut geo = PageGeometry {
            width: 1000.0,
            height: 800.0,
            ..PageGeometry::default()
        };
        // Two real symbols at font 8 with hexagons.
        geo.words.push(symbol_word("1", 300.0, 400.0));
        geo.segments.extend(hexagon(300.0, 400.0, 12.0));
        geo.words.push(symbol_word("2", 500.0, 400.0));
        geo.segments.extend(hexagon(500.0, 400.0, 12.0));
        // A stray dimension "1" at a much larger font, surrounded by
        // random construction lines on three sides.
        let mut stray = symbol_word("1", 700.0, 200.0);
        stray.font_size = 14.0;
        stray.height = 14.0;
        geo.words.push(stray);
        geo.segments.push(Segment {
            x0: 705.0,
            y0: 210.0,
            x1: 730.0,
            y1: 215.0,
        });
        geo.segments.push(Segment {
            x0: 690.0,
            y0: 212.0,
            x1: 680.0,
            y1: 220.0,
        });
        geo.segments.push(Segment {
            x0: 692.0,
            y0: 188.0,
            x1: 680.0,
            y1: 180.0,
        });

        let counts = count_symbols(
            &geo,
            None,
            &["1".to_string(), "2".to_string()],
            None,
            &PipelineConfig::default(),
        );
        assert_eq!(counts["1"], 1, "stray dimension digit must not count");
        assert_eq!(counts["2"], 1);
    }

    #[test]
    fn test_no_geometry_falls_back_to_text_counting() {
        let mut geo = PageGeometry {
            width: 1000.0,
            height: 800.0,
            ..PageGeometry::default()
        };
        geo.words.push(symbol_word("1", 300.0, 400.0));
        geo.words.push(symbol_word("1", 500.0, 300.0));
        let counts = count_symbols(
            &geo,
            None,
            &["1".to_string()],
            None,
            &PipelineConfig::default(),
        );
        assert_eq!(counts["1"], 2);
    }

    #[test]
    fn test_legend_region_excluded_from_counting() {
        let mut geo = PageGeometry {
            width: 1000.0,
            height: 800.0,
            ..PageGeometry::default()
        };
        geo.words.push(symbol_word("1", 900.0, 700.0));
        geo.words.push(symbol_word("1", 300.0, 400.0));
        let legend = Rect::new(850.0, 0.0, 1000.0, 800.0);
        let counts = count_symbols(
            &geo,
            None,
            &["1".to_string()],
            Some(&legend),
            &PipelineConfig::default(),
        );
        assert_eq!(counts["1"], 1);
    }

    #[test]
    fn test_fixture_references() {
        let refs = find_fixture_references(
            "PROVIDE TYPE A1 AND B2 FIXTURES ON EMERGENCY CIRCUIT",
            &["A1".into(), "B2".into(), "C3".into()],
        );
        assert_eq!(refs, vec!["A1".to_string(), "B2".to_string()]);
    }
}
