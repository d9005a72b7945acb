use std::path::PathBuf;

use takeoff_core::config::Overrides;
use takeoff_core::error::TakeoffError;
use takeoff_core::providers::Providers;
use takeoff_core::AnalyzeOptions;

use crate::output;

pub fn run(
    input: PathBuf,
    output_format: &str,
    threshold: Option<f32>,
    vision_count: bool,
    set: Vec<String>,
) -> Result<(), TakeoffError> {
    let mut overrides = Overrides::new();
    for pair in &set {
        match pair.split_once('=') {
            Some((key, value)) => overrides.set(key.trim(), value.trim()),
            None => {
                return Err(TakeoffError::Extraction(format!(
                    "invalid --set value '{pair}', expected KEY=VALUE"
                )))
            }
        }
    }
    if let Some(t) = threshold {
        overrides.set("qa.threshold", t.to_string());
    }

    // Escalation providers (rasterizer, OCR, vision) are deployment
    // concerns wired in by embedding applications; the CLI runs the
    // deterministic text/geometry path.
    let providers = Providers::none();
    let options = AnalyzeOptions {
        force_vision_counting: vision_count,
    };

    let result = takeoff_core::analyze_path(&input, &providers, &overrides, &options)?;

    match output_format {
        "json" => output::json::print(&result)?,
        _ => output::table::print_analysis(&result),
    }
    Ok(())
}
