//! Confidence aggregation: four independent validators cross-check the
//! pipeline's joint output and produce the weighted score that decides
//! whether a run passes. Validators read everything and mutate nothing —
//! accumulated degradation becomes visible here instead of as crashes
//! upstream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PipelineConfig;
use crate::model::{PageType, TakeoffResult};

/// Fixed stage weights; counting dominates because the takeoff totals are
/// the product.
const WEIGHT_SHEET_INDEX: f32 = 0.15;
const WEIGHT_SCHEDULE: f32 = 0.30;
const WEIGHT_COUNTING: f32 = 0.40;
const WEIGHT_KEYNOTES: f32 = 0.15;

/// The four spec fields whose absence marks a fixture record incomplete.
const IMPORTANT_FIELDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaFlag {
    MissingIndex,
    IndexEntryWithoutPage,
    NoPlanPages,
    NoSchedulePages,
    EmptySchedule,
    MissingSpecFields,
    AllSpecsEmpty,
    ZeroCount,
    AmbiguousCodeMatch,
    TotalMismatch,
    ShortKeynoteText,
    NoFixtureReferences,
}

/// Confidence result for a single item (fixture, keynote, index entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemConfidence {
    pub item: String,
    pub score: f32,
    pub flags: Vec<QaFlag>,
    /// Human-readable explanation of the score.
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QAReport {
    pub overall_confidence: f32,
    pub passed: bool,
    pub threshold: f32,
    pub stage_scores: BTreeMap<String, f32>,
    pub items: Vec<ItemConfidence>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Build the report. Never mutates `result`.
pub fn aggregate_confidence(result: &TakeoffResult, config: &PipelineConfig) -> QAReport {
    let mut items = Vec::new();
    let mut warnings: Vec<String> = result.warnings.clone();
    let mut recommendations = Vec::new();

    let sheet_index = score_sheet_index(result, &mut items, &mut warnings, &mut recommendations);
    let schedule = score_schedule(result, &mut items, &mut warnings, &mut recommendations);
    let counting = score_counting(result, &mut items, &mut warnings, &mut recommendations);
    let keynotes = score_keynotes(result, &mut items, &mut warnings);

    let overall = (sheet_index * WEIGHT_SHEET_INDEX
        + schedule * WEIGHT_SCHEDULE
        + counting * WEIGHT_COUNTING
        + keynotes * WEIGHT_KEYNOTES)
        .clamp(0.0, 1.0);
    let passed = overall >= config.confidence_threshold;

    info!(
        overall,
        passed,
        sheet_index,
        schedule,
        counting,
        keynotes,
        "confidence aggregated"
    );

    let mut stage_scores = BTreeMap::new();
    stage_scores.insert("sheet_index".to_string(), sheet_index);
    stage_scores.insert("schedule_extraction".to_string(), schedule);
    stage_scores.insert("fixture_counting".to_string(), counting);
    stage_scores.insert("keynote_extraction".to_string(), keynotes);

    QAReport {
        overall_confidence: overall,
        passed,
        threshold: config.confidence_threshold,
        stage_scores,
        items,
        warnings,
        recommendations,
    }
}

fn score_sheet_index(
    result: &TakeoffResult,
    items: &mut Vec<ItemConfidence>,
    warnings: &mut Vec<String>,
    recommendations: &mut Vec<String>,
) -> f32 {
    let mut score = 1.0f32;

    if result.sheet_index.is_empty() {
        score -= 0.4;
        items.push(ItemConfidence {
            item: "sheet_index".into(),
            score: 0.6,
            flags: vec![QaFlag::MissingIndex],
            reason: "no drawing index found on any candidate page".into(),
        });
        recommendations
            .push("verify page classification manually; no drawing index was found".into());
    } else {
        let page_codes: Vec<String> = result
            .pages
            .iter()
            .filter_map(|p| p.sheet_code.clone())
            .map(|c| c.to_uppercase())
            .collect();
        let orphans: Vec<&str> = result
            .sheet_index
            .iter()
            .filter(|e| !page_codes.contains(&e.sheet_code.to_uppercase()))
            .map(|e| e.sheet_code.as_str())
            .collect();
        if !orphans.is_empty() {
            let fraction = orphans.len() as f32 / result.sheet_index.len() as f32;
            score -= (0.3 * fraction).min(0.3);
            warnings.push(format!(
                "{} index entries have no matching page: {}",
                orphans.len(),
                orphans.join(", ")
            ));
            items.push(ItemConfidence {
                item: "sheet_index".into(),
                score: 1.0 - fraction,
                flags: vec![QaFlag::IndexEntryWithoutPage],
                reason: format!("{} of {} index entries unmatched", orphans.len(), result.sheet_index.len()),
            });
        }
    }

    if !result.pages.iter().any(|p| p.page_type == PageType::LightingPlan) {
        score -= 0.3;
        warnings.push("no lighting plan pages identified".into());
        items.push(ItemConfidence {
            item: "pages".into(),
            score: 0.0,
            flags: vec![QaFlag::NoPlanPages],
            reason: "no page classified as a lighting plan".into(),
        });
    }
    if !result.pages.iter().any(|p| p.page_type == PageType::Schedule) {
        score -= 0.2;
        warnings.push("no schedule pages identified".into());
        items.push(ItemConfidence {
            item: "pages".into(),
            score: 0.0,
            flags: vec![QaFlag::NoSchedulePages],
            reason: "no page classified as a luminaire schedule".into(),
        });
    }

    score.clamp(0.0, 1.0)
}

fn score_schedule(
    result: &TakeoffResult,
    items: &mut Vec<ItemConfidence>,
    warnings: &mut Vec<String>,
    recommendations: &mut Vec<String>,
) -> f32 {
    if result.fixtures.is_empty() {
        warnings.push("no fixtures extracted from any schedule".into());
        recommendations.push("rerun with OCR/vision escalation enabled".into());
        items.push(ItemConfidence {
            item: "schedule".into(),
            score: 0.0,
            flags: vec![QaFlag::EmptySchedule],
            reason: "schedule extraction produced nothing".into(),
        });
        return 0.0;
    }

    let mut sum = 0.0f32;
    let mut any_fields = false;
    for rec in &result.fixtures {
        let present = [&rec.description, &rec.voltage, &rec.mounting, &rec.max_va]
            .iter()
            .filter(|f| !f.trim().is_empty())
            .count();
        if rec.populated_fields() > 0 {
            any_fields = true;
        }
        let item_score = present as f32 / IMPORTANT_FIELDS as f32;
        if present < IMPORTANT_FIELDS {
            items.push(ItemConfidence {
                item: format!("fixture {}", rec.code),
                score: item_score,
                flags: vec![QaFlag::MissingSpecFields],
                reason: format!(
                    "{} of {} important spec fields populated",
                    present, IMPORTANT_FIELDS
                ),
            });
        }
        sum += item_score;
    }

    let mut score = sum / result.fixtures.len() as f32;
    if !any_fields {
        warnings.push("every extracted fixture has an empty spec".into());
        items.push(ItemConfidence {
            item: "schedule".into(),
            score: 0.0,
            flags: vec![QaFlag::AllSpecsEmpty],
            reason: "codes extracted but no spec fields anywhere".into(),
        });
        score = score.min(0.2);
    }
    score.clamp(0.0, 1.0)
}

fn score_counting(
    result: &TakeoffResult,
    items: &mut Vec<ItemConfidence>,
    warnings: &mut Vec<String>,
    recommendations: &mut Vec<String>,
) -> f32 {
    if result.fixtures.is_empty() {
        return 0.0;
    }

    let mut sum = 0.0f32;
    let mut any_zero = false;
    for rec in &result.fixtures {
        let mut item_score = 1.0f32;
        let mut flags = Vec::new();
        let mut reasons: Vec<String> = Vec::new();

        if rec.total == 0 {
            item_score = 0.3;
            any_zero = true;
            flags.push(QaFlag::ZeroCount);
            reasons.push("no occurrences found on any plan".into());
            warnings.push(format!("fixture {} counted zero times", rec.code));
        }
        if rec.code.chars().count() == 1 {
            item_score -= 0.3;
            flags.push(QaFlag::AmbiguousCodeMatch);
            reasons.push("single-character code matches ambiguously".into());
            warnings.push(format!(
                "fixture code {} is a single character; text matches are ambiguous",
                rec.code
            ));
        }
        let sum_counts: u32 = rec.counts_per_plan.values().sum();
        if sum_counts != rec.total {
            item_score -= 0.5;
            flags.push(QaFlag::TotalMismatch);
            reasons.push(format!(
                "stored total {} != per-plan sum {}",
                rec.total, sum_counts
            ));
            warnings.push(format!(
                "fixture {} total mismatch: {} stored vs {} summed",
                rec.code, rec.total, sum_counts
            ));
        }

        if !flags.is_empty() {
            items.push(ItemConfidence {
                item: format!("fixture {}", rec.code),
                score: item_score.clamp(0.0, 1.0),
                flags,
                reason: reasons.join("; "),
            });
        }
        sum += item_score.clamp(0.0, 1.0);
    }

    if any_zero {
        recommendations.push("rerun with vision counting for zero-count fixtures".into());
    }
    (sum / result.fixtures.len() as f32).clamp(0.0, 1.0)
}

fn score_keynotes(
    result: &TakeoffResult,
    items: &mut Vec<ItemConfidence>,
    warnings: &mut Vec<String>,
) -> f32 {
    if result.keynotes.is_empty() {
        // Many small sets simply have no keyed notes; mildly degraded,
        // not failing.
        return 0.6;
    }

    let mut sum = 0.0f32;
    for note in &result.keynotes {
        let mut item_score = 1.0f32;
        let mut flags = Vec::new();
        let mut reasons: Vec<String> = Vec::new();

        if note.text.trim().len() < 10 {
            item_score -= 0.5;
            flags.push(QaFlag::ShortKeynoteText);
            reasons.push("definition text nearly empty".into());
            warnings.push(format!("keynote {} has nearly empty text", note.number));
        }
        if note.total == 0 {
            item_score -= 0.3;
            flags.push(QaFlag::NoFixtureReferences);
            reasons.push("never referenced on any plan".into());
        }

        if !flags.is_empty() {
            items.push(ItemConfidence {
                item: format!("keynote {}", note.number),
                score: item_score.clamp(0.0, 1.0),
                flags,
                reason: reasons.join("; "),
            });
        }
        sum += item_score.clamp(0.0, 1.0);
    }
    (sum / result.keynotes.len() as f32).clamp(0.0, 1.0)
}
