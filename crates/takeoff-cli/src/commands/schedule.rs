use std::path::PathBuf;

use takeoff_core::classify::classify_pages;
use takeoff_core::config::PipelineConfig;
use takeoff_core::count::collect_plan_code_candidates;
use takeoff_core::error::TakeoffError;
use takeoff_core::index::discover_sheet_index;
use takeoff_core::pdf::{DrawingSource, PdfSource};
use takeoff_core::providers::Providers;
use takeoff_core::schedule::extract_fixtures;

use crate::output;

pub fn run(input: PathBuf, output_format: &str) -> Result<(), TakeoffError> {
    let source = PdfSource::open(&input)?;
    let config = PipelineConfig::default();
    let providers = Providers::none();

    let mut pages = source.pages()?;
    let mut warnings = Vec::new();
    let sheet_index = discover_sheet_index(&pages, &source, &mut warnings);
    classify_pages(
        &mut pages,
        &sheet_index,
        &source,
        &providers,
        &config,
        &mut warnings,
    );
    let plan_codes = collect_plan_code_candidates(&pages, &source, &config);
    let fixtures = extract_fixtures(
        &pages,
        &source,
        &providers,
        &config,
        &plan_codes,
        &mut warnings,
    );

    match output_format {
        "json" => output::json::print(&fixtures)?,
        _ => output::table::print_fixtures(&fixtures, false),
    }

    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}
