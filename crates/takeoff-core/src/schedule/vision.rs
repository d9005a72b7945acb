//! Vision-model escalation for schedule extraction: the last resort after
//! both the text layer and OCR come up empty.

use serde::Deserialize;
use tracing::debug;

use super::header::{mostly_numeric_codes, valid_code};
use crate::config::PipelineConfig;
use crate::model::{FixtureRecord, Page};
use crate::providers::Providers;

#[derive(Debug, Deserialize)]
struct VisionFixture {
    code: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    style: String,
    #[serde(default)]
    voltage: String,
    #[serde(default)]
    mounting: String,
    #[serde(default)]
    lumens: String,
    #[serde(default)]
    cct: String,
    #[serde(default)]
    dimming: String,
    #[serde(default)]
    max_va: String,
}

/// Ask the vision model to read the schedule table as a JSON array of
/// fixture objects. Plan codes already observed are passed as a reading
/// hint; panel-looking replies are rejected outright.
pub fn vision_extract(
    page: &Page,
    plan_codes: &[String],
    providers: &Providers,
    config: &PipelineConfig,
) -> Result<Vec<FixtureRecord>, String> {
    if !providers.can_escalate_vision() {
        return Err("no vision provider configured".into());
    }
    let Some(vision) = providers.vision.as_ref() else {
        return Err("no vision provider configured".into());
    };

    let image = providers
        .render(&page.source_path, page.pdf_page_index, config.escalation_dpi)
        .map_err(|e| e.to_string())?;

    let mut prompt = String::from(
        "This drawing page contains a luminaire (lighting fixture) schedule table. \
         Read every data row and reply with a JSON array of objects with keys: \
         code, description, style, voltage, mounting, lumens, cct, dimming, max_va. \
         Use empty strings for blank cells. Do not include panelboard or breaker rows.",
    );
    if !plan_codes.is_empty() {
        prompt.push_str(&format!(
            " Fixture codes already seen on the plan drawings include: {}. \
             Prefer these spellings when a table cell is hard to read.",
            plan_codes.join(", ")
        ));
    }

    let reply = vision
        .query(&[image], &prompt, config.vision_max_tokens)
        .map_err(|e| e.to_string())?;

    let Some(items) = crate::jsonx::extract_json_array(&reply) else {
        return Err("vision reply contained no JSON array".into());
    };

    let mut fixtures = Vec::new();
    for item in items {
        let Ok(vf) = serde_json::from_value::<VisionFixture>(item) else {
            continue;
        };
        let Some(code) = valid_code(&vf.code) else {
            debug!(code = %vf.code, "vision fixture code failed validation");
            continue;
        };
        let mut rec = FixtureRecord::with_code(code);
        rec.description = vf.description;
        rec.style = vf.style;
        rec.voltage = vf.voltage;
        rec.mounting = vf.mounting;
        rec.lumens = vf.lumens;
        rec.cct = vf.cct;
        rec.dimming = vf.dimming;
        rec.max_va = vf.max_va;
        fixtures.push(rec);
    }

    if fixtures.is_empty() {
        return Err("vision reply contained no valid fixtures".into());
    }
    if mostly_numeric_codes(&fixtures) {
        return Err("vision reply looks like a panel schedule (numeric codes)".into());
    }
    Ok(fixtures)
}
