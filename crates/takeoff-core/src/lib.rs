pub mod classify;
pub mod config;
pub mod count;
pub mod error;
pub mod geom;
pub mod index;
pub mod jsonx;
pub mod keynotes;
pub mod model;
pub mod pdf;
pub mod providers;
pub mod qa;
pub mod schedule;
pub mod viewport;

use std::path::Path;

use tracing::info;

use crate::config::{Overrides, PipelineConfig};
use crate::error::TakeoffError;
use crate::model::{PageType, TakeoffResult};
use crate::pdf::{DrawingSource, PdfSource};
use crate::providers::Providers;
use crate::qa::QAReport;

/// Caller switches for one run.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Force vision counting even when no ambiguous codes exist.
    pub force_vision_counting: bool,
}

/// Everything a run produces.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AnalysisOutput {
    #[serde(flatten)]
    pub result: TakeoffResult,
    pub qa: QAReport,
}

/// Main API entry point: run the full takeoff pipeline against a drawing
/// source.
///
/// Stages run in dependency order — loader, sheet index, classifier,
/// viewport splitter, schedule parser — then fixture counting and keynote
/// detection fan out concurrently and rejoin before confidence
/// aggregation. Only load failures abort; every stage-local failure
/// degrades into warnings and a lower confidence score.
pub fn analyze(
    source: &dyn DrawingSource,
    providers: &Providers,
    config: &PipelineConfig,
    options: &AnalyzeOptions,
) -> Result<AnalysisOutput, TakeoffError> {
    let mut pages = source.pages()?;
    let mut warnings: Vec<String> = Vec::new();
    info!(pages = pages.len(), source = source.source_name(), "drawing set loaded");

    let sheet_index = index::discover_sheet_index(&pages, source, &mut warnings);

    classify::classify_pages(
        &mut pages,
        &sheet_index,
        source,
        providers,
        config,
        &mut warnings,
    );

    // Expand multi-viewport sheets into virtual pages.
    let mut expanded = Vec::with_capacity(pages.len());
    for page in &pages {
        if page.page_type == PageType::LightingPlan && !page.is_virtual() {
            match source.geometry(page) {
                Ok(geo) => {
                    expanded.extend(viewport::split_page_into_viewports(page, &geo, config))
                }
                Err(_) => expanded.push(page.clone()),
            }
        } else {
            expanded.push(page.clone());
        }
    }
    let pages = expanded;

    let plan_code_candidates = count::collect_plan_code_candidates(&pages, source, config);

    let mut fixtures = schedule::extract_fixtures(
        &pages,
        source,
        providers,
        config,
        &plan_code_candidates,
        &mut warnings,
    );

    // The one fan-out point: counting and keynote detection are
    // independent once schedule extraction is done.
    let fixture_codes: Vec<String> = fixtures.iter().map(|f| f.code.clone()).collect();
    let (count_warnings, (keynotes, keynote_warnings)) = rayon::join(
        || {
            let mut w = Vec::new();
            count::count_fixtures(
                &mut fixtures,
                &pages,
                source,
                providers,
                config,
                options.force_vision_counting,
                &mut w,
            );
            w
        },
        || {
            let mut w = Vec::new();
            let notes =
                keynotes::detect_keynotes(&pages, source, providers, config, &fixture_codes, &mut w);
            (notes, w)
        },
    );
    warnings.extend(count_warnings);
    warnings.extend(keynote_warnings);

    let result = TakeoffResult {
        pages,
        sheet_index,
        fixtures,
        keynotes,
        warnings,
    };
    let qa = qa::aggregate_confidence(&result, config);

    Ok(AnalysisOutput { result, qa })
}

/// Convenience wrapper: open a PDF file or a folder of PDFs and analyze
/// it with parameter overrides applied.
pub fn analyze_path(
    path: &Path,
    providers: &Providers,
    overrides: &Overrides,
    options: &AnalyzeOptions,
) -> Result<AnalysisOutput, TakeoffError> {
    let source = PdfSource::open(path)?;
    let config = PipelineConfig::default().with_overrides(overrides);
    analyze(&source, providers, &config, options)
}
