//! End-to-end pipeline tests against a mock drawing source.
//!
//! MockSource returns prebuilt page geometry, so these tests exercise the
//! full stage chain (index, classification, splitting, schedule parsing,
//! counting, keynotes, QA) without any PDF files or network providers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use takeoff_core::analyze;
use takeoff_core::config::PipelineConfig;
use takeoff_core::error::TakeoffError;
use takeoff_core::geom::{Segment, Word};
use takeoff_core::model::{Page, PageType};
use takeoff_core::pdf::{DrawingSource, PageGeometry};
use takeoff_core::providers::{OcrEngine, OcrMode, Providers, Rasterizer};
use takeoff_core::AnalyzeOptions;

struct MockSource {
    pages: Vec<Page>,
    geometry: HashMap<usize, Arc<PageGeometry>>,
}

impl MockSource {
    fn new() -> Self {
        MockSource {
            pages: Vec::new(),
            geometry: HashMap::new(),
        }
    }

    fn add_page(&mut self, sheet_code: &str, geo: PageGeometry) {
        let index = self.pages.len();
        let mut page = Page::new(index + 1, PathBuf::from("mock.pdf"), index);
        if !sheet_code.is_empty() {
            page.sheet_code = Some(sheet_code.to_string());
        }
        self.pages.push(page);
        self.geometry.insert(index, Arc::new(geo));
    }
}

impl DrawingSource for MockSource {
    fn pages(&self) -> Result<Vec<Page>, TakeoffError> {
        Ok(self.pages.clone())
    }

    fn geometry(&self, page: &Page) -> Result<Arc<PageGeometry>, TakeoffError> {
        self.geometry
            .get(&page.pdf_page_index)
            .cloned()
            .ok_or_else(|| TakeoffError::Extraction("no mock geometry".into()))
    }

    fn source_name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Geometry builders
// ---------------------------------------------------------------------------

fn word(text: &str, x: f32, y: f32) -> Word {
    Word {
        text: text.into(),
        x,
        y,
        width: text.len() as f32 * 5.0,
        height: 9.0,
        font_size: 9.0,
    }
}

fn words_line(text: &str, x: f32, y: f32) -> Vec<Word> {
    let mut out = Vec::new();
    let mut cx = x;
    for token in text.split_whitespace() {
        out.push(word(token, cx, y));
        cx += token.len() as f32 * 5.0 + 6.0;
    }
    out
}

fn hline(y: f32, x0: f32, x1: f32) -> Segment {
    Segment { x0, y0: y, x1, y1: y }
}

fn vline(x: f32, y0: f32, y1: f32) -> Segment {
    Segment { x0: x, y0, x1: x, y1 }
}

fn empty_geo(width: f32, height: f32) -> PageGeometry {
    PageGeometry {
        width,
        height,
        words: Vec::new(),
        segments: Vec::new(),
        content_len: 0,
    }
}

/// A 1000x800 schedule page: ruled grid with TYPE/DESCRIPTION/VOLTAGE and
/// two fixture rows, plus a title-block caption.
fn schedule_geo() -> PageGeometry {
    let mut geo = empty_geo(1000.0, 800.0);
    geo.segments.extend([
        hline(700.0, 50.0, 450.0),
        hline(680.0, 50.0, 450.0),
        hline(660.0, 50.0, 450.0),
        hline(640.0, 50.0, 450.0),
        vline(50.0, 640.0, 700.0),
        vline(150.0, 640.0, 700.0),
        vline(350.0, 640.0, 700.0),
        vline(450.0, 640.0, 700.0),
    ]);
    geo.words.extend([
        word("TYPE", 60.0, 685.0),
        word("DESCRIPTION", 160.0, 685.0),
        word("VOLTAGE", 360.0, 685.0),
        word("A1", 60.0, 665.0),
        word("2x4", 160.0, 665.0),
        word("TROFFER", 185.0, 665.0),
        word("120", 360.0, 665.0),
        word("B2", 60.0, 645.0),
        word("DOWNLIGHT", 160.0, 645.0),
        word("277", 360.0, 645.0),
    ]);
    geo.words.extend(words_line("LUMINAIRE SCHEDULE", 840.0, 40.0));
    geo
}

/// A 1000x800 lighting plan with "A1" appearing three times.
fn plan_geo() -> PageGeometry {
    let mut geo = empty_geo(1000.0, 800.0);
    geo.words.extend([
        word("A1", 100.0, 300.0),
        word("A1", 300.0, 400.0),
        word("A1", 500.0, 350.0),
    ]);
    geo.words.extend(words_line("LIGHTING PLAN", 840.0, 40.0));
    geo
}

// ---------------------------------------------------------------------------
// Test 1: spec end-to-end — schedule + plan, A1 x3, B2 x0
// ---------------------------------------------------------------------------
#[test]
fn two_page_takeoff_counts_and_flags_zero() {
    let mut source = MockSource::new();
    source.add_page("E601", schedule_geo());
    source.add_page("E101", plan_geo());

    let output = analyze(
        &source,
        &Providers::none(),
        &PipelineConfig::default(),
        &AnalyzeOptions::default(),
    )
    .unwrap();

    let fixtures = &output.result.fixtures;
    assert_eq!(fixtures.len(), 2);

    let a1 = fixtures.iter().find(|f| f.code == "A1").unwrap();
    assert_eq!(a1.total, 3);
    assert_eq!(a1.counts_per_plan.get("E101"), Some(&3));
    assert_eq!(a1.description, "2x4 TROFFER");
    assert_eq!(a1.voltage, "120");

    let b2 = fixtures.iter().find(|f| f.code == "B2").unwrap();
    assert_eq!(b2.total, 0);
    assert_eq!(b2.counts_per_plan.get("E101"), Some(&0));

    assert!(output
        .qa
        .warnings
        .iter()
        .any(|w| w.contains("B2") && w.contains("zero")));
}

// ---------------------------------------------------------------------------
// Test 2: page classification through the priority chain
// ---------------------------------------------------------------------------
#[test]
fn pages_classified_schedule_and_plan() {
    let mut source = MockSource::new();
    source.add_page("E601", schedule_geo());
    source.add_page("E101", plan_geo());

    let output = analyze(
        &source,
        &Providers::none(),
        &PipelineConfig::default(),
        &AnalyzeOptions::default(),
    )
    .unwrap();

    let types: Vec<PageType> = output.result.pages.iter().map(|p| p.page_type).collect();
    assert_eq!(types, vec![PageType::Schedule, PageType::LightingPlan]);
}

// ---------------------------------------------------------------------------
// Test 3: totals always equal the per-plan sum
// ---------------------------------------------------------------------------
#[test]
fn totals_match_per_plan_sums() {
    let mut source = MockSource::new();
    source.add_page("E601", schedule_geo());
    source.add_page("E101", plan_geo());

    let output = analyze(
        &source,
        &Providers::none(),
        &PipelineConfig::default(),
        &AnalyzeOptions::default(),
    )
    .unwrap();

    for rec in &output.result.fixtures {
        let sum: u32 = rec.counts_per_plan.values().sum();
        assert_eq!(rec.total, sum, "fixture {}", rec.code);
    }
}

// ---------------------------------------------------------------------------
// Test 4: multi-viewport sheet splits into virtual plans with own counts
// ---------------------------------------------------------------------------
#[test]
fn viewport_sheet_splits_and_counts_independently() {
    let mut plan = empty_geo(2000.0, 1200.0);
    plan.words.extend(words_line("LEVEL 1 LIGHTING PLAN", 300.0, 60.0));
    plan.words.extend(words_line("LEVEL 2 LIGHTING PLAN", 1300.0, 60.0));
    plan.words.extend([
        word("A1", 200.0, 600.0),
        word("A1", 500.0, 700.0),
        word("A1", 1500.0, 600.0),
    ]);

    let mut schedule = schedule_geo();
    schedule.words.retain(|w| w.text != "B2" && w.text != "DOWNLIGHT" && w.text != "277");

    let mut source = MockSource::new();
    source.add_page("E601", schedule);
    source.add_page("E101", plan);

    let output = analyze(
        &source,
        &Providers::none(),
        &PipelineConfig::default(),
        &AnalyzeOptions::default(),
    )
    .unwrap();

    let codes: Vec<String> = output
        .result
        .pages
        .iter()
        .filter(|p| p.page_type == PageType::LightingPlan)
        .map(|p| p.code())
        .collect();
    assert_eq!(codes, vec!["E101-L1".to_string(), "E101-L2".to_string()]);

    let a1 = output
        .result
        .fixtures
        .iter()
        .find(|f| f.code == "A1")
        .unwrap();
    assert_eq!(a1.counts_per_plan.get("E101-L1"), Some(&2));
    assert_eq!(a1.counts_per_plan.get("E101-L2"), Some(&1));
    assert_eq!(a1.total, 3);
}

// ---------------------------------------------------------------------------
// Test 5: keynote legend parsed and symbols counted geometrically
// ---------------------------------------------------------------------------
#[test]
fn keynotes_parsed_and_counted() {
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

    let mut plan = plan_geo();
    plan.words.extend(words_line("KEY NOTES:", 800.0, 700.0));
    plan.words
        .extend(words_line("1. PROVIDE FIXTURE TYPE A1 AS SHOWN", 800.0, 680.0));
    plan.words
        .extend(words_line("2. ROUTE CONDUIT ABOVE ACCESSIBLE CEILING", 800.0, 664.0));

    // Two enclosed "1" symbols and one enclosed "2" in the drawing area.
    for (n, x, y) in [("1", 250.0, 500.0), ("1", 450.0, 550.0), ("2", 350.0, 600.0)] {
        let w = word(n, x, y);
        let (cx, cy) = w.center();
        plan.words.push(w);
        plan.segments.extend(hexagon(cx, cy, 13.0));
    }

    let mut source = MockSource::new();
    source.add_page("E601", schedule_geo());
    source.add_page("E101", plan);

    let output = analyze(
        &source,
        &Providers::none(),
        &PipelineConfig::default(),
        &AnalyzeOptions::default(),
    )
    .unwrap();

    let notes = &output.result.keynotes;
    assert_eq!(notes.len(), 2);
    let one = notes.iter().find(|n| n.number == "1").unwrap();
    assert_eq!(one.total, 2);
    assert!(one.fixture_references.contains(&"A1".to_string()));
    let two = notes.iter().find(|n| n.number == "2").unwrap();
    assert_eq!(two.total, 1);
}

// ---------------------------------------------------------------------------
// Test 6: empty schedule page escalates to OCR
// ---------------------------------------------------------------------------
struct StubRaster;
impl Rasterizer for StubRaster {
    fn render_page(
        &self,
        _source: &Path,
        _page_index: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, TakeoffError> {
        Ok(vec![1, 2, 3])
    }
}

struct StubOcr;
impl OcrEngine for StubOcr {
    fn recognize(&self, _image: &[u8], mode: OcrMode) -> Result<String, TakeoffError> {
        match mode {
            OcrMode::TableRows => {
                Ok("LUMINAIRE SCHEDULE\nA1   2x4 LED TROFFER   120\nB2   6IN LED DOWNLIGHT   277\n"
                    .to_string())
            }
            OcrMode::AutoBlock => Ok(String::new()),
        }
    }
    fn engine_name(&self) -> &str {
        "stub"
    }
}

#[test]
fn empty_schedule_page_recovers_via_ocr() {
    let mut source = MockSource::new();
    // Schedule page with no extractable text at all (scanned sheet).
    source.add_page("E601", empty_geo(1000.0, 800.0));
    source.add_page("E101", plan_geo());

    let providers = Providers {
        rasterizer: Some(Box::new(StubRaster)),
        ocr: Some(Box::new(StubOcr)),
        vision: None,
    };

    let output = analyze(
        &source,
        &providers,
        &PipelineConfig::default(),
        &AnalyzeOptions::default(),
    )
    .unwrap();

    let fixtures = &output.result.fixtures;
    assert_eq!(fixtures.len(), 2);
    let a1 = fixtures.iter().find(|f| f.code == "A1").unwrap();
    assert_eq!(a1.description, "2x4 LED TROFFER");
    assert_eq!(a1.total, 3);
}

// ---------------------------------------------------------------------------
// Test 7: sheet index drives classification when present
// ---------------------------------------------------------------------------
#[test]
fn sheet_index_discovered_and_applied() {
    let mut cover = empty_geo(1000.0, 800.0);
    cover.words.extend(words_line("DRAWING INDEX", 100.0, 760.0));
    cover
        .words
        .extend(words_line("E601 LIGHTING FIXTURE SCHEDULE", 100.0, 740.0));
    cover
        .words
        .extend(words_line("E101 FIRST FLOOR LIGHTING PLAN", 100.0, 726.0));

    let mut source = MockSource::new();
    source.add_page("CS", cover);
    source.add_page("E601", schedule_geo());
    source.add_page("E101", plan_geo());

    let output = analyze(
        &source,
        &Providers::none(),
        &PipelineConfig::default(),
        &AnalyzeOptions::default(),
    )
    .unwrap();

    assert_eq!(output.result.sheet_index.len(), 2);
    assert_eq!(output.result.pages[1].page_type, PageType::Schedule);
    assert_eq!(output.result.pages[2].page_type, PageType::LightingPlan);
    // With an index present and both page kinds found, QA should rate the
    // sheet-index stage cleanly.
    assert_eq!(output.qa.stage_scores["sheet_index"], 1.0);
}
