//! Page classification.
//!
//! A per-page priority chain, first success wins: sheet-index lookup,
//! title-block phrase match, sheet-code prefix rules, full-page keyword
//! scan. When no index exists and plan or schedule pages are still
//! missing, candidate pages escalate to a batched vision classifier.

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::geom::Rect;
use crate::index::index_lookup;
use crate::model::{Page, PageType, SheetIndexEntry};
use crate::pdf::{DrawingSource, PageGeometry};
use crate::providers::Providers;

/// Ordered title phrases. Demolition must precede lighting and schedule
/// phrases are checked after cross-reference stripping, so "SEE SHEET
/// E601 FOR LIGHTING FIXTURE SCHEDULE" never marks a plan as a schedule.
const TITLE_PHRASES: [(&str, PageType); 16] = [
    ("demolition", PageType::DemolitionPlan),
    ("demo plan", PageType::DemolitionPlan),
    ("luminaire schedule", PageType::Schedule),
    ("fixture schedule", PageType::Schedule),
    ("lighting schedule", PageType::Schedule),
    ("site lighting", PageType::SitePlan),
    ("lighting plan", PageType::LightingPlan),
    ("enlarged lighting", PageType::LightingPlan),
    ("legend", PageType::Legend),
    ("symbols", PageType::Legend),
    ("power plan", PageType::PowerPlan),
    ("site plan", PageType::SitePlan),
    ("fire alarm", PageType::FireAlarm),
    ("riser", PageType::Riser),
    ("detail", PageType::Detail),
    ("cover sheet", PageType::Cover),
];

/// Sheet-code prefix defaults, applied only when the title block did not
/// already decide. The demo keyword still overrides a lighting prefix.
const PREFIX_RULES: [(&str, PageType); 7] = [
    ("ED", PageType::DemolitionPlan),
    ("E1", PageType::LightingPlan),
    ("E2", PageType::PowerPlan),
    ("E6", PageType::Schedule),
    ("E0", PageType::Legend),
    ("ES", PageType::SitePlan),
    ("FA", PageType::FireAlarm),
];

/// How a page got its type; kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedBy {
    IndexLookup,
    TitleBlock,
    PrefixRule,
    FullPageScan,
    Vision,
    Unclassified,
}

/// Classify every page in place, then backfill sheet codes from the index
/// and assign synthetic codes so the downstream invariant holds.
pub fn classify_pages(
    pages: &mut [Page],
    sheet_index: &[SheetIndexEntry],
    source: &dyn DrawingSource,
    providers: &Providers,
    config: &PipelineConfig,
    warnings: &mut Vec<String>,
) {
    let lookup = index_lookup(sheet_index);

    for page in pages.iter_mut() {
        let geo = source.geometry(page).ok();
        let (page_type, by) = classify_one(page, geo.as_deref(), &lookup, config);
        page.page_type = page_type;
        debug!(
            page = page.page_number,
            code = page.sheet_code.as_deref().unwrap_or("-"),
            kind = %page_type,
            by = ?by,
            "classified"
        );
    }

    let missing_plan = !pages.iter().any(|p| p.page_type == PageType::LightingPlan);
    let missing_schedule = !pages.iter().any(|p| p.page_type == PageType::Schedule);
    if sheet_index.is_empty() && (missing_plan || missing_schedule) {
        escalate_with_vision(pages, source, providers, config, warnings);
    }

    backfill_sheet_codes(pages, sheet_index);
}

fn classify_one(
    page: &Page,
    geo: Option<&PageGeometry>,
    lookup: &std::collections::HashMap<String, &SheetIndexEntry>,
    config: &PipelineConfig,
) -> (PageType, ClassifiedBy) {
    // 1. Exact index lookup.
    if let Some(code) = &page.sheet_code {
        if let Some(entry) = lookup.get(&code.to_uppercase()) {
            if let Some(t) = entry.inferred_type {
                return (t, ClassifiedBy::IndexLookup);
            }
        }
    }

    // 2. Title-block region phrases.
    if let Some(geo) = geo {
        let block = title_block_text(geo, config);
        let combined = format!("{} {}", page.sheet_title, block);
        if let Some(t) = match_title_phrases(&combined) {
            return (t, ClassifiedBy::TitleBlock);
        }

        // 3. Sheet-code prefix rules.
        if let Some(code) = &page.sheet_code {
            if let Some(t) = prefix_rule(code, &combined) {
                return (t, ClassifiedBy::PrefixRule);
            }
        }

        // 4. Full-page scan, skipped for very dense vector pages where
        // text assembly is the expensive part. A page carrying the
        // drawing index is the cover, whatever else it mentions.
        if geo.content_len <= config.dense_page_bytes {
            let text = geo.full_text();
            let lower = text.to_lowercase();
            if lower.contains("drawing index")
                || lower.contains("sheet index")
                || lower.contains("index of drawings")
            {
                return (PageType::Cover, ClassifiedBy::FullPageScan);
            }
            if let Some(t) = match_title_phrases(&text) {
                return (t, ClassifiedBy::FullPageScan);
            }
        }
    } else if let Some(code) = &page.sheet_code {
        if let Some(t) = prefix_rule(code, &page.sheet_title) {
            return (t, ClassifiedBy::PrefixRule);
        }
    }

    (PageType::Other, ClassifiedBy::Unclassified)
}

/// Text of the bottom-right title-block corner.
fn title_block_text(geo: &PageGeometry, config: &PipelineConfig) -> String {
    if geo.width <= 0.0 {
        return String::new();
    }
    let region = Rect::new(
        geo.width * (1.0 - config.title_block_width),
        0.0,
        geo.width,
        geo.height * config.title_block_height,
    );
    geo.words_in(&region)
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn match_title_phrases(text: &str) -> Option<PageType> {
    let lower = strip_cross_references(&text.to_lowercase());
    TITLE_PHRASES
        .iter()
        .find(|(phrase, _)| lower.contains(phrase))
        .map(|(_, t)| *t)
}

/// Remove "SEE <sheet> FOR ..." stretches so a cross-reference to a
/// schedule elsewhere does not classify this page.
fn strip_cross_references(lower: &str) -> String {
    let re = Regex::new(r"(?:see|refer\s+to)\s+(?:sheet\s+)?[a-z]{0,3}[\d.\-]*\s+for[^.;\n]*")
        .expect("static regex");
    re.replace_all(lower, " ").into_owned()
}

fn prefix_rule(code: &str, context: &str) -> Option<PageType> {
    let upper = code.to_uppercase();
    let (_, page_type) = PREFIX_RULES
        .iter()
        .find(|(prefix, _)| upper.starts_with(prefix))?;
    // A lighting prefix with demolition wording in the title block is a
    // demo sheet drawn on the lighting series.
    if *page_type == PageType::LightingPlan && context.to_lowercase().contains("demo") {
        return Some(PageType::DemolitionPlan);
    }
    Some(*page_type)
}

#[derive(Debug, Deserialize)]
struct VisionPageLabel {
    page: usize,
    #[serde(default)]
    labels: Vec<String>,
}

/// Batched vision classification of still-unresolved pages.
///
/// Only Other/PowerPlan/Detail classifications may be overridden; when a
/// combo page returns both labels, the plan label wins here and the
/// schedule parser still visits the page later.
fn escalate_with_vision(
    pages: &mut [Page],
    source: &dyn DrawingSource,
    providers: &Providers,
    config: &PipelineConfig,
    warnings: &mut Vec<String>,
) {
    if !providers.can_escalate_vision() {
        warnings.push(
            "page types incomplete and no vision provider configured; classification left as-is"
                .into(),
        );
        return;
    }
    let Some(vision) = providers.vision.as_ref() else {
        return;
    };

    let candidates: Vec<usize> = pages
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            matches!(
                p.page_type,
                PageType::Other | PageType::PowerPlan | PageType::Detail
            )
        })
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return;
    }
    info!(
        candidates = candidates.len(),
        batch = config.vision_classify_batch,
        "escalating page classification to vision model"
    );

    for batch in candidates.chunks(config.vision_classify_batch.max(1)) {
        let mut images = Vec::new();
        let mut batch_pages = Vec::new();
        for &i in batch {
            let page = &pages[i];
            match providers.render(&page.source_path, page.pdf_page_index, config.classify_dpi) {
                Ok(bytes) => {
                    images.push(bytes);
                    batch_pages.push(i);
                }
                Err(e) => {
                    warnings.push(format!(
                        "render failed for page {}: {e}",
                        page.page_number
                    ));
                }
            }
        }
        if images.is_empty() {
            continue;
        }

        let numbers: Vec<String> = batch_pages
            .iter()
            .map(|&i| pages[i].page_number.to_string())
            .collect();
        let prompt = format!(
            "These {} images are pages {} of an electrical construction drawing set, in order. \
             For each page decide whether it contains a luminaire schedule table, a lighting \
             plan drawing, or neither. A page may be both. Reply with a JSON array, one object \
             per page: {{\"page\": <number>, \"labels\": [\"luminaire_schedule\" and/or \
             \"lighting_plan\" and/or \"other\"]}}.",
            images.len(),
            numbers.join(", ")
        );

        let reply = match vision.query(&images, &prompt, config.vision_max_tokens) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "vision classification batch failed");
                warnings.push(format!("vision classification failed: {e}"));
                continue;
            }
        };

        let Some(items) = crate::jsonx::extract_json_array(&reply) else {
            warnings.push("vision classification reply contained no JSON".into());
            continue;
        };
        for item in items {
            let Ok(label) = serde_json::from_value::<VisionPageLabel>(item) else {
                continue;
            };
            let Some(&idx) = batch_pages
                .iter()
                .find(|&&i| pages[i].page_number == label.page)
            else {
                continue;
            };
            if let Some(t) = merge_vision_labels(&label.labels) {
                info!(page = label.page, kind = %t, "vision reclassified page");
                pages[idx].page_type = t;
            }
        }
    }
}

/// LightingPlan outranks Schedule when a combo page carries both labels.
fn merge_vision_labels(labels: &[String]) -> Option<PageType> {
    let has_plan = labels.iter().any(|l| l == "lighting_plan");
    let has_schedule = labels.iter().any(|l| l == "luminaire_schedule");
    if has_plan {
        Some(PageType::LightingPlan)
    } else if has_schedule {
        Some(PageType::Schedule)
    } else {
        None
    }
}

/// Fill missing sheet codes from index descriptions, then synthesize
/// `pg{N}` codes for plan/schedule pages so every downstream key exists.
fn backfill_sheet_codes(pages: &mut [Page], sheet_index: &[SheetIndexEntry]) {
    for page in pages.iter_mut() {
        if page.sheet_code.is_some() {
            continue;
        }
        if !page.sheet_title.is_empty() {
            let title = normalize_title(&page.sheet_title);
            if let Some(entry) = sheet_index
                .iter()
                .find(|e| !title.is_empty() && normalize_title(&e.description) == title)
            {
                page.sheet_code = Some(entry.sheet_code.clone());
                continue;
            }
        }
        if matches!(
            page.page_type,
            PageType::LightingPlan | PageType::Schedule | PageType::DemolitionPlan
        ) {
            page.sheet_code = Some(format!("pg{}", page.page_number));
        }
    }
}

fn normalize_title(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Word;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn page_with(code: &str, title: &str) -> Page {
        let mut p = Page::new(1, PathBuf::from("set.pdf"), 0);
        p.sheet_code = Some(code.into());
        p.sheet_title = title.into();
        p
    }

    fn geo_with_title_block(text: &str) -> PageGeometry {
        let mut words = Vec::new();
        let mut x = 1000.0;
        for token in text.split_whitespace() {
            words.push(Word {
                text: token.into(),
                x,
                y: 30.0,
                width: token.len() as f32 * 5.0,
                height: 10.0,
                font_size: 10.0,
            });
            x += token.len() as f32 * 5.0 + 5.0;
        }
        PageGeometry {
            width: 1200.0,
            height: 800.0,
            words,
            segments: Vec::new(),
            content_len: 0,
        }
    }

    #[test]
    fn test_demolition_title_beats_lighting_prefix() {
        let page = page_with("E101", "");
        let geo = geo_with_title_block("DEMOLITION LIGHTING PLAN");
        let lookup = HashMap::new();
        let (t, by) = classify_one(&page, Some(&geo), &lookup, &PipelineConfig::default());
        assert_eq!(t, PageType::DemolitionPlan);
        assert_eq!(by, ClassifiedBy::TitleBlock);
    }

    #[test]
    fn test_cross_reference_does_not_mark_schedule() {
        let page = page_with("E101", "");
        let geo = geo_with_title_block("SEE SHEET E601 FOR LIGHTING FIXTURE SCHEDULE");
        let lookup = HashMap::new();
        let (t, _) = classify_one(&page, Some(&geo), &lookup, &PipelineConfig::default());
        // The stripped text leaves nothing; prefix rule takes over.
        assert_eq!(t, PageType::LightingPlan);
    }

    #[test]
    fn test_index_lookup_wins_first() {
        let page = page_with("E101", "");
        let geo = geo_with_title_block("POWER PLAN");
        let entry = SheetIndexEntry {
            sheet_code: "E101".into(),
            description: "FIRST FLOOR LIGHTING PLAN".into(),
            inferred_type: Some(PageType::LightingPlan),
        };
        let mut lookup = HashMap::new();
        lookup.insert("E101".to_string(), &entry);
        let (t, by) = classify_one(&page, Some(&geo), &lookup, &PipelineConfig::default());
        assert_eq!(t, PageType::LightingPlan);
        assert_eq!(by, ClassifiedBy::IndexLookup);
    }

    #[test]
    fn test_prefix_rules() {
        let lookup = HashMap::new();
        let geo = geo_with_title_block("MISC");
        for (code, expected) in [
            ("E101", PageType::LightingPlan),
            ("E201", PageType::PowerPlan),
            ("E601", PageType::Schedule),
            ("ED101", PageType::DemolitionPlan),
        ] {
            let page = page_with(code, "");
            let (t, _) = classify_one(&page, Some(&geo), &lookup, &PipelineConfig::default());
            assert_eq!(t, expected, "prefix {code}");
        }
    }

    #[test]
    fn test_lighting_prefix_with_demo_context() {
        let page = page_with("E102", "");
        let geo = geo_with_title_block("DEMO WORK THIS AREA");
        let lookup = HashMap::new();
        let (t, _) = classify_one(&page, Some(&geo), &lookup, &PipelineConfig::default());
        assert_eq!(t, PageType::DemolitionPlan);
    }

    #[test]
    fn test_merge_vision_labels_plan_wins() {
        let labels = vec!["luminaire_schedule".to_string(), "lighting_plan".to_string()];
        assert_eq!(merge_vision_labels(&labels), Some(PageType::LightingPlan));
        assert_eq!(
            merge_vision_labels(&["luminaire_schedule".to_string()]),
            Some(PageType::Schedule)
        );
        assert_eq!(merge_vision_labels(&["other".to_string()]), None);
    }

    #[test]
    fn test_synthetic_codes_backfilled() {
        let mut p = Page::new(3, PathBuf::from("set.pdf"), 2);
        p.page_type = PageType::LightingPlan;
        let mut pages = vec![p];
        backfill_sheet_codes(&mut pages, &[]);
        assert_eq!(pages[0].sheet_code.as_deref(), Some("pg3"));
    }

    #[test]
    fn test_backfill_from_index_by_title() {
        let mut p = Page::new(2, PathBuf::from("set.pdf"), 1);
        p.sheet_title = "FIRST FLOOR LIGHTING PLAN".into();
        p.page_type = PageType::LightingPlan;
        let index = vec![SheetIndexEntry {
            sheet_code: "E101".into(),
            description: "First Floor Lighting Plan".into(),
            inferred_type: Some(PageType::LightingPlan),
        }];
        let mut pages = vec![p];
        backfill_sheet_codes(&mut pages, &index);
        assert_eq!(pages[0].sheet_code.as_deref(), Some("E101"));
    }
}
