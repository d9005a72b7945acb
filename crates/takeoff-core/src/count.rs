//! Fixture counting: how many of each schedule code appear on each plan.
//!
//! Counting is pure text-geometry work — a word matches a code regex and
//! sits outside the exclusion zones (sheet border, title block, embedded
//! schedule tables). Vision escalation exists for the genuinely ambiguous
//! case of single-character codes; its merge rule is fixed configuration,
//! not something this module re-derives.

use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::geom::{group_words_into_lines, Rect, Word, WordLine};
use crate::model::{FixtureRecord, Page, PageType};
use crate::pdf::tables::{detect_ruled_tables, TableConfig};
use crate::pdf::{DrawingSource, PageGeometry};
use crate::providers::Providers;

/// Words preceding a match that mark it as a cross-reference, not a
/// fixture tag ("SEE E1A", "REFER TO SHEET E101").
const CROSS_REF_TERMS: [&str; 6] = ["see", "sheet", "refer", "plan", "drawing", "dwg"];

/// Count every fixture on every lighting plan, filling `counts_per_plan`
/// (zero entries included for every known plan) and `total`.
pub fn count_fixtures(
    fixtures: &mut [FixtureRecord],
    pages: &[Page],
    source: &dyn DrawingSource,
    providers: &Providers,
    config: &PipelineConfig,
    force_vision: bool,
    warnings: &mut Vec<String>,
) {
    let plan_pages: Vec<&Page> = pages
        .iter()
        .filter(|p| p.page_type == PageType::LightingPlan)
        .collect();
    if plan_pages.is_empty() || fixtures.is_empty() {
        for rec in fixtures.iter_mut() {
            rec.recompute_total();
        }
        return;
    }

    let sheet_codes: HashSet<String> = pages.iter().map(|p| p.code().to_uppercase()).collect();
    let codes: Vec<String> = fixtures.iter().map(|f| f.code.clone()).collect();
    let matchers: Vec<CodeMatcher> = codes.iter().map(|c| CodeMatcher::new(c)).collect();

    // Per-page counting is independent; fan out and merge the maps.
    let per_page: Vec<(String, HashMap<String, u32>)> = plan_pages
        .par_iter()
        .map(|page| {
            let counts = match source.geometry(page) {
                Ok(geo) => count_on_page(page, &geo, &matchers, &sheet_codes, config),
                Err(_) => HashMap::new(),
            };
            (page.code(), counts)
        })
        .collect();

    let mut text_counts: HashMap<(String, String), u32> = HashMap::new();
    for (plan, counts) in &per_page {
        for (code, n) in counts {
            text_counts.insert((plan.clone(), code.clone()), *n);
        }
    }

    let has_single_char = codes.iter().any(|c| c.len() == 1);
    let vision_counts = if force_vision || has_single_char {
        if has_single_char {
            info!("single-character fixture code present; escalating counting to vision");
        }
        count_with_vision(&plan_pages, &codes, providers, config, warnings)
    } else {
        HashMap::new()
    };

    for rec in fixtures.iter_mut() {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for page in &plan_pages {
            let plan = page.code();
            let text = text_counts
                .get(&(plan.clone(), rec.code.clone()))
                .copied()
                .unwrap_or(0);
            let vision = vision_counts.get(&(plan.clone(), rec.code.clone())).copied();
            let merged = merge_counts(&rec.code, text, vision, config.vision_merge_tolerance);
            counts.insert(plan, merged);
        }
        rec.counts_per_plan = counts;
        rec.recompute_total();
        debug!(code = %rec.code, total = rec.total, "fixture counted");
    }
}

/// The tuned text/vision merge rule, preserved as-is: multi-character
/// codes always trust text; single-character codes take vision when text
/// found nothing, the larger of the two when they roughly agree, and text
/// otherwise.
pub fn merge_counts(code: &str, text: u32, vision: Option<u32>, tolerance: u32) -> u32 {
    let Some(vision) = vision else {
        return text;
    };
    if code.chars().count() > 1 {
        return text;
    }
    if text == 0 {
        return vision;
    }
    if text.abs_diff(vision) <= tolerance {
        return text.max(vision);
    }
    text
}

/// Word-boundary matcher for one fixture code. An embedded hyphen
/// between letters and digits is optional in both directions: "A-1"
/// matches "A1" and vice versa.
pub struct CodeMatcher {
    code: String,
    regex: Regex,
}

impl CodeMatcher {
    pub fn new(code: &str) -> CodeMatcher {
        let mut pattern = String::from(r"\b");
        let chars: Vec<char> = code.to_uppercase().chars().collect();
        for (i, &c) in chars.iter().enumerate() {
            if c == '-' {
                pattern.push_str("-?");
                continue;
            }
            pattern.push_str(&regex::escape(&c.to_string()));
            if let Some(&next) = chars.get(i + 1) {
                let joint = (c.is_ascii_alphabetic() && next.is_ascii_digit())
                    || (c.is_ascii_digit() && next.is_ascii_alphabetic());
                if joint {
                    pattern.push_str("-?");
                }
            }
        }
        pattern.push_str(r"\b");
        CodeMatcher {
            code: code.to_uppercase(),
            regex: Regex::new(&pattern).unwrap_or_else(|_| {
                Regex::new(&format!(r"\b{}\b", regex::escape(code))).expect("escaped code regex")
            }),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn matches_word(&self, word: &str) -> bool {
        let upper = word.to_uppercase();
        self.regex
            .find(&upper)
            .map(|m| m.start() == 0 && m.end() == upper.len())
            .unwrap_or(false)
    }

    pub fn count_in_text(&self, text: &str) -> u32 {
        self.regex.find_iter(&text.to_uppercase()).count() as u32
    }
}

/// Count every code on one plan page.
fn count_on_page(
    page: &Page,
    geo: &PageGeometry,
    matchers: &[CodeMatcher],
    sheet_codes: &HashSet<String>,
    config: &PipelineConfig,
) -> HashMap<String, u32> {
    let exclusions = exclusion_zones(geo, config);
    let words: Vec<Word> = geo
        .words
        .iter()
        .filter(|w| {
            let (cx, cy) = w.center();
            if let Some(vp) = &page.viewport_bbox {
                if !vp.contains(cx, cy) {
                    return false;
                }
            }
            !exclusions.iter().any(|z| z.contains(cx, cy))
        })
        .cloned()
        .collect();
    let lines = group_words_into_lines(&words, 3.0);

    let mut counts = HashMap::new();
    for matcher in matchers {
        let is_sheet_code = sheet_codes.contains(matcher.code());

        let mut word_count = 0u32;
        for line in &lines {
            for (i, word) in line.words.iter().enumerate() {
                if !matcher.matches_word(&word.text) {
                    continue;
                }
                if is_sheet_code && preceded_by_cross_ref(line, i) {
                    continue;
                }
                word_count += 1;
            }
        }

        // Codes split across adjacent fragments ("AL" + "1") only
        // reassemble in merged text. Sheet-code lookalikes skip this
        // path: merged text defeats the cross-reference guard.
        let count = if is_sheet_code {
            word_count
        } else {
            let merged = merged_text_count(&lines, matcher);
            word_count.max(merged)
        };
        counts.insert(matcher.code().to_string(), count);
    }
    counts
}

/// Exclusion zones: outer border, title-block corner, and any embedded
/// schedule table (a ruled table whose header maps 3+ schedule fields).
fn exclusion_zones(geo: &PageGeometry, config: &PipelineConfig) -> Vec<Rect> {
    let mut zones = Vec::new();
    let (w, h) = (geo.width, geo.height);
    if w <= 0.0 || h <= 0.0 {
        return zones;
    }
    let m = config.count_border_margin;
    zones.push(Rect::new(0.0, 0.0, w, h * m));
    zones.push(Rect::new(0.0, h * (1.0 - m), w, h));
    zones.push(Rect::new(0.0, 0.0, w * m, h));
    zones.push(Rect::new(w * (1.0 - m), 0.0, w, h));
    zones.push(Rect::new(
        w * (1.0 - config.title_block_width),
        0.0,
        w,
        h * config.title_block_height,
    ));

    for table in detect_ruled_tables(&geo.words, &geo.segments, None, &TableConfig::default()) {
        if let Some(header) = crate::schedule::header::find_header(&table) {
            let mapped = header.columns.iter().flatten().count();
            if mapped >= 3 {
                zones.push(table.bbox);
            }
        }
    }
    zones
}

/// Is the matched word preceded (within 1-3 words on its line) by a
/// cross-reference term?
fn preceded_by_cross_ref(line: &WordLine, index: usize) -> bool {
    let start = index.saturating_sub(3);
    line.words[start..index]
        .iter()
        .any(|w| CROSS_REF_TERMS.contains(&w.text.to_lowercase().trim_end_matches('.')))
}

/// Count in per-line text with small inter-word gaps collapsed, so code
/// fragments split by the writer reassemble.
fn merged_text_count(lines: &[WordLine], matcher: &CodeMatcher) -> u32 {
    let mut total = 0u32;
    for line in lines {
        let mut text = String::new();
        let mut prev_end: Option<f32> = None;
        for word in &line.words {
            if let Some(end) = prev_end {
                let gap = word.x - end;
                if gap > word.font_size.max(4.0) * 0.4 {
                    text.push(' ');
                }
            }
            text.push_str(&word.text);
            prev_end = Some(word.x + word.width);
        }
        total += matcher.count_in_text(&text);
    }
    total
}

/// Code-like words observed on the plans, used by the schedule stage for
/// cross-reference corrections and as a vision reading hint.
pub fn collect_plan_code_candidates(
    pages: &[Page],
    source: &dyn DrawingSource,
    config: &PipelineConfig,
) -> HashSet<String> {
    let shape = Regex::new(r"^[A-Z]{1,3}-?\d{0,3}[A-Z]?$").expect("static regex");
    let mut out = HashSet::new();
    for page in pages {
        if page.page_type != PageType::LightingPlan {
            continue;
        }
        let Ok(geo) = source.geometry(page) else {
            continue;
        };
        let exclusions = exclusion_zones(&geo, config);
        for word in &geo.words {
            let (cx, cy) = word.center();
            if exclusions.iter().any(|z| z.contains(cx, cy)) {
                continue;
            }
            let text = word.text.to_uppercase();
            if text.len() <= 6 && shape.is_match(&text) {
                out.insert(text);
            }
        }
    }
    out
}

/// Vision counting per plan page: one call per page, cropped to the
/// viewport when the page is virtual. Failures keep the text counts.
fn count_with_vision(
    plan_pages: &[&Page],
    codes: &[String],
    providers: &Providers,
    config: &PipelineConfig,
    warnings: &mut Vec<String>,
) -> HashMap<(String, String), u32> {
    let mut out = HashMap::new();
    if !providers.can_escalate_vision() {
        warnings.push("vision counting requested but no vision provider configured".into());
        return out;
    }
    let (Some(vision), Some(rasterizer)) =
        (providers.vision.as_ref(), providers.rasterizer.as_ref())
    else {
        return out;
    };

    for page in plan_pages {
        let image = match rasterizer.render_crop(
            &page.source_path,
            page.pdf_page_index,
            config.escalation_dpi,
            page.viewport_bbox,
            None,
        ) {
            Ok(bytes) => bytes,
            Err(e) => {
                warnings.push(format!("render failed for plan {}: {e}", page.code()));
                continue;
            }
        };

        let prompt = format!(
            "This is a lighting plan drawing. Count how many times each of these fixture type \
             tags appears as a label next to a fixture symbol: {}. Ignore the title block, \
             general notes, and any schedule tables. Reply with a JSON array of objects \
             {{\"code\": ..., \"count\": ...}}.",
            codes.join(", ")
        );
        let reply = match vision.query(&[image], &prompt, config.vision_max_tokens) {
            Ok(r) => r,
            Err(e) => {
                warn!(plan = %page.code(), error = %e, "vision counting failed");
                warnings.push(format!("vision counting failed on {}: {e}", page.code()));
                continue;
            }
        };
        let Some(items) = crate::jsonx::extract_json_array(&reply) else {
            warnings.push(format!(
                "vision counting reply for {} contained no JSON",
                page.code()
            ));
            continue;
        };
        for item in items {
            let Some(code) = item.get("code").and_then(crate::jsonx::value_to_string) else {
                continue;
            };
            let count = item
                .get("count")
                .and_then(crate::jsonx::value_to_u32)
                .unwrap_or(0);
            out.insert((page.code(), code.to_uppercase()), count);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matcher_optional_hyphen() {
        let m = CodeMatcher::new("A1");
        assert!(m.matches_word("A1"));
        assert!(m.matches_word("A-1"));
        assert!(m.matches_word("a1"));
        assert!(!m.matches_word("AL1"));
        assert!(!m.matches_word("A11"));

        let h = CodeMatcher::new("A-1");
        assert!(h.matches_word("A1"));
        assert!(h.matches_word("A-1"));
    }

    #[test]
    fn test_matcher_requires_whole_word() {
        let m = CodeMatcher::new("AL1");
        assert!(!m.matches_word("HALL1"));
        assert!(m.matches_word("AL1"));
        assert!(m.matches_word("AL-1"));
    }

    #[test]
    fn test_merge_rule_multichar_trusts_text() {
        assert_eq!(merge_counts("A1", 5, Some(9), 2), 5);
        assert_eq!(merge_counts("A1", 0, Some(9), 2), 0);
    }

    #[test]
    fn test_merge_rule_single_char() {
        // Text found nothing: take vision.
        assert_eq!(merge_counts("Z", 0, Some(7), 2), 7);
        // Close counts: take the larger.
        assert_eq!(merge_counts("Z", 6, Some(8), 2), 8);
        assert_eq!(merge_counts("Z", 8, Some(6), 2), 8);
        // Far apart: trust text.
        assert_eq!(merge_counts("Z", 10, Some(40), 2), 10);
        // No vision data at all.
        assert_eq!(merge_counts("Z", 3, None, 2), 3);
    }

    fn word(text: &str, x: f32, y: f32) -> Word {
        Word {
            text: text.into(),
            x,
            y,
            width: text.len() as f32 * 5.0,
            height: 8.0,
            font_size: 8.0,
        }
    }

    fn plan_geo(words: Vec<Word>) -> PageGeometry {
        PageGeometry {
            width: 1000.0,
            height: 800.0,
            words,
            segments: Vec::new(),
            content_len: 0,
        }
    }

    fn plan_page(code: &str) -> Page {
        let mut p = Page::new(1, std::path::PathBuf::from("set.pdf"), 0);
        p.sheet_code = Some(code.into());
        p.page_type = PageType::LightingPlan;
        p
    }

    #[test]
    fn test_count_on_page_basic() {
        let geo = plan_geo(vec![
            word("A1", 100.0, 400.0),
            word("A1", 300.0, 500.0),
            word("A1", 500.0, 200.0),
            word("B2", 400.0, 400.0),
        ]);
        let page = plan_page("E101");
        let matchers = vec![CodeMatcher::new("A1"), CodeMatcher::new("B2")];
        let counts = count_on_page(
            &page,
            &geo,
            &matchers,
            &HashSet::new(),
            &PipelineConfig::default(),
        );
        assert_eq!(counts["A1"], 3);
        assert_eq!(counts["B2"], 1);
    }

    #[test]
    fn test_title_block_words_excluded() {
        let geo = plan_geo(vec![
            word("A1", 100.0, 400.0),
            // Inside the right-20% x bottom-15% corner.
            word("A1", 900.0, 50.0),
        ]);
        let page = plan_page("E101");
        let matchers = vec![CodeMatcher::new("A1")];
        let counts = count_on_page(
            &page,
            &geo,
            &matchers,
            &HashSet::new(),
            &PipelineConfig::default(),
        );
        assert_eq!(counts["A1"], 1);
    }

    #[test]
    fn test_viewport_bbox_restricts_counting() {
        let geo = plan_geo(vec![word("A1", 100.0, 400.0), word("A1", 700.0, 400.0)]);
        let mut page = plan_page("E101-L1");
        page.viewport_bbox = Some(Rect::new(0.0, 0.0, 500.0, 800.0));
        let matchers = vec![CodeMatcher::new("A1")];
        let counts = count_on_page(
            &page,
            &geo,
            &matchers,
            &HashSet::new(),
            &PipelineConfig::default(),
        );
        assert_eq!(counts["A1"], 1);
    }

    #[test]
    fn test_cross_reference_suppressed_for_sheet_codes() {
        let geo = plan_geo(vec![
            word("SEE", 100.0, 400.0),
            word("E1A", 130.0, 400.0),
            word("E1A", 500.0, 300.0),
        ]);
        let page = plan_page("E101");
        let matchers = vec![CodeMatcher::new("E1A")];
        let mut sheet_codes = HashSet::new();
        sheet_codes.insert("E1A".to_string());
        let counts = count_on_page(
            &page,
            &geo,
            &matchers,
            &sheet_codes,
            &PipelineConfig::default(),
        );
        // Only the standalone occurrence counts.
        assert_eq!(counts["E1A"], 1);
    }

    #[test]
    fn test_split_fragment_recovered_by_merged_text() {
        // "AL" and "1" drawn as adjacent fragments with a tiny gap.
        let mut a = word("AL", 100.0, 400.0);
        a.width = 10.0;
        let b = word("1", 110.5, 400.0);
        let geo = plan_geo(vec![a, b]);
        let page = plan_page("E101");
        let matchers = vec![CodeMatcher::new("AL1")];
        let counts = count_on_page(
            &page,
            &geo,
            &matchers,
            &HashSet::new(),
            &PipelineConfig::default(),
        );
        assert_eq!(counts["AL1"], 1);
    }

    #[test]
    fn test_counting_is_idempotent() {
        let geo = plan_geo(vec![word("A1", 100.0, 400.0), word("A1", 300.0, 500.0)]);
        let page = plan_page("E101");
        let matchers = vec![CodeMatcher::new("A1")];
        let first = count_on_page(
            &page,
            &geo,
            &matchers,
            &HashSet::new(),
            &PipelineConfig::default(),
        );
        let second = count_on_page(
            &page,
            &geo,
            &matchers,
            &HashSet::new(),
            &PipelineConfig::default(),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_collect_plan_code_candidates_shape() {
        let shape = Regex::new(r"^[A-Z]{1,3}-?\d{0,3}[A-Z]?$").unwrap();
        for good in ["A1", "AL1", "F1E", "EM", "W-2"] {
            assert!(shape.is_match(good), "{good}");
        }
        for bad in ["TROFFER", "2X4", "120V", "NOTE1X"] {
            assert!(!shape.is_match(bad), "{bad}");
        }
    }
}
