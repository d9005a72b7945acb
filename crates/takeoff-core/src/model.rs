use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geom::Rect;

/// Classification assigned to every drawing page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    LightingPlan,
    DemolitionPlan,
    Schedule,
    Legend,
    PowerPlan,
    SitePlan,
    FireAlarm,
    Riser,
    Detail,
    Cover,
    #[default]
    Other,
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageType::LightingPlan => "lighting plan",
            PageType::DemolitionPlan => "demolition plan",
            PageType::Schedule => "schedule",
            PageType::Legend => "legend",
            PageType::PowerPlan => "power plan",
            PageType::SitePlan => "site plan",
            PageType::FireAlarm => "fire alarm",
            PageType::Riser => "riser",
            PageType::Detail => "detail",
            PageType::Cover => "cover",
            PageType::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl PageType {
    /// Infer a page type from a free-text sheet description.
    ///
    /// Order matters: demolition must be checked before lighting so that
    /// "LIGHTING DEMOLITION PLAN" does not classify as a lighting plan.
    pub fn from_description(text: &str) -> Option<PageType> {
        let lower = text.to_lowercase();
        if lower.contains("demo") {
            return Some(PageType::DemolitionPlan);
        }
        if lower.contains("schedule") {
            return Some(PageType::Schedule);
        }
        if lower.contains("lighting") || lower.contains("luminaire") {
            return Some(PageType::LightingPlan);
        }
        if lower.contains("legend") || lower.contains("symbol") || lower.contains("abbreviation") {
            return Some(PageType::Legend);
        }
        if lower.contains("power") || lower.contains("receptacle") || lower.contains("panel") {
            return Some(PageType::PowerPlan);
        }
        if lower.contains("site") {
            return Some(PageType::SitePlan);
        }
        if lower.contains("fire alarm") || lower.contains("fire-alarm") {
            return Some(PageType::FireAlarm);
        }
        if lower.contains("riser") || lower.contains("one-line") || lower.contains("one line") {
            return Some(PageType::Riser);
        }
        if lower.contains("detail") {
            return Some(PageType::Detail);
        }
        if lower.contains("cover") || lower.contains("title sheet") || lower.contains("index") {
            return Some(PageType::Cover);
        }
        None
    }

    /// Pages that carry countable lighting content.
    pub fn is_plan(&self) -> bool {
        matches!(self, PageType::LightingPlan)
    }
}

/// One drawing page, physical or virtual.
///
/// Virtual pages come from viewport splitting: they share the physical
/// source (`source_path` + `pdf_page_index`) but carry their own
/// `sheet_code`, a `viewport_bbox` restricting analysis, and the parent's
/// code in `parent_sheet_code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 1-based position in the assembled document.
    pub page_number: usize,
    /// Short drawing identifier from the title block (e.g. "E601").
    pub sheet_code: Option<String>,
    pub sheet_title: String,
    pub page_type: PageType,
    pub source_path: PathBuf,
    /// 0-based index into the physical source file.
    pub pdf_page_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport_bbox: Option<Rect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_sheet_code: Option<String>,
}

impl Page {
    pub fn new(page_number: usize, source_path: PathBuf, pdf_page_index: usize) -> Self {
        Page {
            page_number,
            sheet_code: None,
            sheet_title: String::new(),
            page_type: PageType::Other,
            source_path,
            pdf_page_index,
            viewport_bbox: None,
            parent_sheet_code: None,
        }
    }

    /// The code downstream stages key results by. Callers must have run
    /// sheet-code backfill first; the synthetic fallback is only a guard.
    pub fn code(&self) -> String {
        self.sheet_code
            .clone()
            .unwrap_or_else(|| format!("pg{}", self.page_number))
    }

    pub fn is_virtual(&self) -> bool {
        self.parent_sheet_code.is_some()
    }
}

/// One row of the project's drawing index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetIndexEntry {
    pub sheet_code: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferred_type: Option<PageType>,
}

/// A detected sub-plan region on a multi-plan sheet. Ephemeral: consumed
/// to build virtual pages.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub label: String,
    pub title: String,
    pub bbox: Rect,
    pub page_type: PageType,
}

/// A lighting fixture type extracted from a luminaire schedule, with
/// per-plan occurrence counts filled in by the fixture counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureRecord {
    /// Short alphanumeric identifier (e.g. "A1", "EX", "AL-2").
    pub code: String,
    pub description: String,
    pub style: String,
    pub voltage: String,
    pub mounting: String,
    pub lumens: String,
    pub cct: String,
    pub dimming: String,
    pub max_va: String,
    /// Keys are every known plan sheet code, including zero counts.
    pub counts_per_plan: BTreeMap<String, u32>,
    pub total: u32,
}

impl FixtureRecord {
    pub fn with_code(code: impl Into<String>) -> Self {
        FixtureRecord {
            code: code.into(),
            ..FixtureRecord::default()
        }
    }

    /// Number of populated spec fields, used when deduplicating.
    pub fn populated_fields(&self) -> usize {
        [
            &self.description,
            &self.style,
            &self.voltage,
            &self.mounting,
            &self.lumens,
            &self.cct,
            &self.dimming,
            &self.max_va,
        ]
        .iter()
        .filter(|f| !f.trim().is_empty())
        .count()
    }

    /// Recompute `total` from the per-plan map.
    pub fn recompute_total(&mut self) {
        self.total = self.counts_per_plan.values().sum();
    }
}

/// A keyed note: its definition text plus per-plan symbol counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyNote {
    /// Numeric label, possibly suffixed (e.g. "3", "3A").
    pub number: String,
    pub text: String,
    pub counts_per_plan: BTreeMap<String, u32>,
    pub total: u32,
    /// Fixture codes mentioned in the note text.
    pub fixture_references: Vec<String>,
}

impl KeyNote {
    pub fn recompute_total(&mut self) {
        self.total = self.counts_per_plan.values().sum();
    }
}

/// Everything a single run produces, handed to the confidence aggregator
/// and then to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TakeoffResult {
    pub pages: Vec<Page>,
    pub sheet_index: Vec<SheetIndexEntry>,
    pub fixtures: Vec<FixtureRecord>,
    pub keynotes: Vec<KeyNote>,
    pub warnings: Vec<String>,
}

impl TakeoffResult {
    pub fn plan_codes(&self) -> Vec<String> {
        self.pages
            .iter()
            .filter(|p| p.page_type.is_plan())
            .map(|p| p.code())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demolition_checked_before_lighting() {
        assert_eq!(
            PageType::from_description("LIGHTING DEMOLITION PLAN"),
            Some(PageType::DemolitionPlan)
        );
        assert_eq!(
            PageType::from_description("FIRST FLOOR LIGHTING PLAN"),
            Some(PageType::LightingPlan)
        );
    }

    #[test]
    fn test_schedule_beats_lighting_in_description() {
        // "LIGHTING FIXTURE SCHEDULE" is a schedule sheet, not a plan.
        assert_eq!(
            PageType::from_description("LIGHTING FIXTURE SCHEDULE"),
            Some(PageType::Schedule)
        );
    }

    #[test]
    fn test_unknown_description() {
        assert_eq!(PageType::from_description("MECHANICAL NOTES"), None);
    }

    #[test]
    fn test_synthetic_code_fallback() {
        let page = Page::new(7, PathBuf::from("set.pdf"), 6);
        assert_eq!(page.code(), "pg7");
    }

    #[test]
    fn test_populated_fields_counts_only_nonempty() {
        let mut rec = FixtureRecord::with_code("A1");
        rec.description = "2x4 TROFFER".into();
        rec.voltage = "120".into();
        assert_eq!(rec.populated_fields(), 2);
    }

    #[test]
    fn test_recompute_total() {
        let mut rec = FixtureRecord::with_code("A1");
        rec.counts_per_plan.insert("E101".into(), 3);
        rec.counts_per_plan.insert("E102".into(), 4);
        rec.recompute_total();
        assert_eq!(rec.total, 7);
    }
}
