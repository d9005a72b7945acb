//! Viewport detection: one physical sheet often carries several lighting
//! sub-plans ("LEVEL 1 LIGHTING PLAN" next to "LEVEL 2 LIGHTING PLAN").
//! Each detected viewport becomes a virtual page with its own sheet code
//! and clipping bbox; counting treats them independently.

use regex::Regex;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::geom::{group_words_into_lines, split_line_at_gaps, Rect, WordLine};
use crate::model::{Page, PageType, Viewport};
use crate::pdf::PageGeometry;

/// Words that appear in every plan caption and never distinguish one
/// viewport from another.
const GENERIC_TITLE_WORDS: [&str; 8] = [
    "lighting", "plan", "enlarged", "new", "overall", "partial", "scale", "layout",
];

/// A caption containing one of these is a different discipline's viewport
/// and must not produce a lighting virtual page (it still bounds the
/// outer edge of its neighbors).
const DISQUALIFIERS: [&str; 10] = [
    "power",
    "demolition",
    "demo",
    "fire alarm",
    "fire-alarm",
    "security",
    "systems",
    "mechanical",
    "plumbing",
    "communication",
];

/// Structural words required by the full-page retry, where body text
/// would otherwise produce false captions.
const STRUCTURAL_QUALIFIERS: [&str; 12] = [
    "level",
    "floor",
    "area",
    "enlarged",
    "mezzanine",
    "basement",
    "roof",
    "wing",
    "building",
    "zone",
    "unit",
    "phase",
];

#[derive(Debug, Clone)]
struct TitleHit {
    text: String,
    center_x: f32,
    center_y: f32,
    qualifying: bool,
}

/// Detect lighting viewports on a plan page. Fewer than two qualifying
/// captions means the sheet is a single plan: empty result.
pub fn detect_viewports(geo: &PageGeometry, config: &PipelineConfig) -> Vec<Viewport> {
    if geo.words.is_empty() || geo.width <= 0.0 {
        return Vec::new();
    }

    // Pass 1: caption strip along the bottom of the sheet.
    let strip = Rect::new(0.0, 0.0, geo.width, geo.height * config.viewport_title_strip);
    let mut hits = collect_title_hits(geo, &strip, config, false);

    // Pass 2: grid layouts put captions mid-page; rescan the drawing area
    // (left of the notes column) demanding a structural qualifier.
    if hits.iter().filter(|h| h.qualifying).count() < 2 {
        let area = Rect::new(0.0, 0.0, geo.width * config.viewport_scan_width, geo.height);
        hits = collect_title_hits(geo, &area, config, true);
    }

    let qualifying: Vec<&TitleHit> = hits.iter().filter(|h| h.qualifying).collect();
    if qualifying.len() < 2 {
        return Vec::new();
    }

    // Wrapped two-line captions of a single plan sit close together;
    // real viewports are far apart in at least one axis.
    let max_dx = pairwise_max(&qualifying, |h| h.center_x) / geo.width;
    let max_dy = pairwise_max(&qualifying, |h| h.center_y) / geo.height;
    if max_dx < config.viewport_min_separation && max_dy < config.viewport_min_separation {
        debug!(
            max_dx,
            max_dy, "viewport captions too close together, treating as wrapped title"
        );
        return Vec::new();
    }

    build_viewports(&hits, geo, config)
}

/// Expand one physical plan page into virtual pages, one per detected
/// viewport. Returns the page unchanged when 0 or 1 viewports exist.
pub fn split_page_into_viewports(
    page: &Page,
    geo: &PageGeometry,
    config: &PipelineConfig,
) -> Vec<Page> {
    let viewports = detect_viewports(geo, config);
    if viewports.len() < 2 {
        return vec![page.clone()];
    }

    let parent_code = page.code();
    info!(
        parent = %parent_code,
        count = viewports.len(),
        labels = ?viewports.iter().map(|v| v.label.as_str()).collect::<Vec<_>>(),
        "splitting sheet into viewports"
    );

    viewports
        .into_iter()
        .map(|vp| {
            let mut virtual_page = page.clone();
            virtual_page.sheet_code = Some(format!("{parent_code}-{}", vp.label));
            virtual_page.sheet_title = vp.title;
            virtual_page.page_type = vp.page_type;
            virtual_page.viewport_bbox = Some(vp.bbox);
            virtual_page.parent_sheet_code = Some(parent_code.clone());
            virtual_page
        })
        .collect()
}

fn collect_title_hits(
    geo: &PageGeometry,
    region: &Rect,
    config: &PipelineConfig,
    require_structural: bool,
) -> Vec<TitleHit> {
    let words: Vec<_> = geo.words_in(region).into_iter().cloned().collect();
    let lines = group_words_into_lines(&words, 4.0);
    let max_gap = geo.width * config.viewport_gap_fraction;

    let mut hits = Vec::new();
    for line in &lines {
        for segment in split_line_at_gaps(line, max_gap) {
            if let Some(hit) = title_hit_from(&segment, require_structural) {
                hits.push(hit);
            }
        }
    }
    hits
}

fn title_hit_from(segment: &WordLine, require_structural: bool) -> Option<TitleHit> {
    let text = segment.text();
    let lower = text.to_lowercase();
    let has_lighting = lower.contains("lighting");
    let disqualified = DISQUALIFIERS.iter().any(|d| lower.contains(d));

    // Non-lighting captions are kept as boundary hits: an adjacent power
    // or systems viewport bounds its lighting neighbor's outer edge.
    if !has_lighting && !disqualified {
        return None;
    }
    if disqualified && !lower.contains("plan") {
        return None;
    }
    if require_structural
        && !disqualified
        && !STRUCTURAL_QUALIFIERS.iter().any(|q| lower.contains(q))
    {
        return None;
    }

    let center_x = (segment.x_min() + segment.x_max()) / 2.0;
    Some(TitleHit {
        text,
        center_x,
        center_y: segment.y,
        qualifying: has_lighting && !disqualified,
    })
}

fn pairwise_max(hits: &[&TitleHit], axis: impl Fn(&TitleHit) -> f32) -> f32 {
    let mut max = 0.0f32;
    for (i, a) in hits.iter().enumerate() {
        for b in hits.iter().skip(i + 1) {
            max = max.max((axis(a) - axis(b)).abs());
        }
    }
    max
}

fn build_viewports(
    hits: &[TitleHit],
    geo: &PageGeometry,
    config: &PipelineConfig,
) -> Vec<Viewport> {
    // Row bands: captions whose centers share a horizontal band belong to
    // one row of the grid. A single band is the common side-by-side case.
    let band_height = geo.height * config.viewport_min_separation / 2.0;
    let mut rows: Vec<Vec<&TitleHit>> = Vec::new();
    let mut sorted: Vec<&TitleHit> = hits.iter().collect();
    sorted.sort_by(|a, b| {
        b.center_y
            .partial_cmp(&a.center_y)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for hit in sorted {
        match rows
            .iter_mut()
            .find(|row| (row[0].center_y - hit.center_y).abs() <= band_height)
        {
            Some(row) => row.push(hit),
            None => rows.push(vec![hit]),
        }
    }

    // The caption sits under its drawing, so a row's drawing area runs
    // from its own caption line up to the caption line of the row above
    // (or the top of the sheet for the first row).
    let row_tops: Vec<f32> = rows
        .iter()
        .map(|row| row.iter().map(|h| h.center_y).fold(0.0f32, f32::max))
        .collect();

    let mut used_labels: Vec<String> = Vec::new();
    let mut viewports = Vec::new();

    for (r, row) in rows.iter().enumerate() {
        let mut in_row: Vec<&TitleHit> = row.clone();
        in_row.sort_by(|a, b| {
            a.center_x
                .partial_cmp(&b.center_x)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let y0 = in_row
            .iter()
            .map(|h| h.center_y)
            .fold(f32::INFINITY, f32::min)
            - geo.height * 0.01;
        let y1 = if r == 0 {
            geo.height
        } else {
            row_tops[r - 1]
        };

        for (c, hit) in in_row.iter().enumerate() {
            if !hit.qualifying {
                continue;
            }
            // Column edges: midpoints to neighbors (qualifying or not, so
            // an adjacent power plan bounds the lighting viewport), page
            // edge otherwise.
            let x0 = if c == 0 {
                0.0
            } else {
                (in_row[c - 1].center_x + hit.center_x) / 2.0
            };
            let x1 = if c + 1 == in_row.len() {
                geo.width
            } else {
                (hit.center_x + in_row[c + 1].center_x) / 2.0
            };

            let label = unique_label(derive_label(&hit.text), &mut used_labels);
            viewports.push(Viewport {
                label,
                title: hit.text.clone(),
                bbox: Rect::new(x0, y0.max(0.0), x1, y1),
                page_type: PageType::LightingPlan,
            });
        }
    }

    viewports
}

/// Short label for a viewport caption: known phrase patterns first, then
/// the first three letters of the first non-generic word.
pub fn derive_label(title: &str) -> String {
    let upper = title.to_uppercase();

    let level = Regex::new(r"LEVEL\s+(\d+)").expect("static regex");
    if let Some(cap) = level.captures(&upper) {
        return format!("L{}", &cap[1]);
    }
    let ordinal = Regex::new(r"(\d+)(?:ST|ND|RD|TH)\s+(?:FLOOR|LEVEL)").expect("static regex");
    if let Some(cap) = ordinal.captures(&upper) {
        return format!("L{}", &cap[1]);
    }
    if upper.contains("MEZZANINE") || upper.contains("MEZZ") {
        return "MEZ".to_string();
    }
    let area = Regex::new(r"AREA\s+([A-Z0-9])\b").expect("static regex");
    if let Some(cap) = area.captures(&upper) {
        return format!("A{}", &cap[1]);
    }
    if upper.contains("ROOF") {
        return "RF".to_string();
    }
    if upper.contains("BASEMENT") {
        return "BSMT".to_string();
    }

    upper
        .split_whitespace()
        .find(|w| {
            let lower = w.to_lowercase();
            !GENERIC_TITLE_WORDS.contains(&lower.as_str())
        })
        .map(|w| w.chars().filter(|c| c.is_ascii_alphanumeric()).take(3).collect())
        .unwrap_or_else(|| "VP".to_string())
}

fn unique_label(base: String, used: &mut Vec<String>) -> String {
    let mut label = base.clone();
    let mut n = 2;
    while used.contains(&label) {
        label = format!("{base}{n}");
        n += 1;
    }
    used.push(label.clone());
    label
}
