//! Schedule extraction: luminaire-schedule tables in, fixture records out.
//!
//! The fast path reads ruled or text-aligned tables straight from page
//! geometry. A schedule page that still yields nothing escalates through
//! an explicit strategy list — OCR, then vision — recording every failure
//! reason instead of silently swallowing it.

pub mod header;
pub mod ocr;
pub mod vision;

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::model::{FixtureRecord, Page, PageType};
use crate::pdf::tables::{detect_ruled_tables, detect_text_table, TableConfig};
use crate::pdf::DrawingSource;
use crate::providers::Providers;

/// Escalation steps, in order. Kept as data so the fallback policy reads
/// in one place and each step stays testable on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscalationStep {
    Ocr,
    Vision,
}

const ESCALATION_ORDER: [EscalationStep; 2] = [EscalationStep::Ocr, EscalationStep::Vision];

/// What happened to a schedule code during plan cross-referencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeCorrection {
    /// The code matched the plans as-is.
    Kept,
    /// An unambiguous longer/letter-prefixed plan code replaced it.
    Replaced { from: String, to: String },
    /// Emergency wording plus a "+E" plan code appended the suffix.
    AppendedEmergency { from: String, to: String },
    /// Multiple plan candidates existed; original kept conservatively.
    Ambiguous { code: String, candidates: Vec<String> },
}

/// Extract fixture records from every schedule page (and combo plan
/// pages). `plan_code_candidates` is the set of code-like words seen on
/// plan drawings, used both as a vision hint and for post-hoc code
/// correction.
pub fn extract_fixtures(
    pages: &[Page],
    source: &dyn DrawingSource,
    providers: &Providers,
    config: &PipelineConfig,
    plan_code_candidates: &HashSet<String>,
    warnings: &mut Vec<String>,
) -> Vec<FixtureRecord> {
    let mut fixtures: Vec<FixtureRecord> = Vec::new();
    let mut seen_physical: HashSet<(std::path::PathBuf, usize)> = HashSet::new();

    for page in pages {
        // Combo sheets are visited once per physical page; virtual
        // viewport copies share the same embedded table.
        let is_schedule = page.page_type == PageType::Schedule;
        let is_plan = page.page_type == PageType::LightingPlan;
        if !is_schedule && !is_plan {
            continue;
        }
        if !seen_physical.insert((page.source_path.clone(), page.pdf_page_index)) {
            continue;
        }

        let mut page_fixtures = parse_page_tables(page, source, config);

        if page_fixtures.is_empty() && is_schedule {
            page_fixtures = escalate(page, source, providers, config, plan_code_candidates, warnings);
        }

        if !page_fixtures.is_empty() {
            info!(
                page = page.page_number,
                code = %page.code(),
                fixtures = page_fixtures.len(),
                "schedule fixtures extracted"
            );
        } else if is_schedule {
            warnings.push(format!(
                "schedule page {} produced no fixtures",
                page.code()
            ));
        }
        fixtures.extend(page_fixtures);
    }

    let corrections = apply_code_corrections(&mut fixtures, plan_code_candidates);
    for correction in &corrections {
        match correction {
            CodeCorrection::Replaced { from, to } => {
                warnings.push(format!("schedule code {from} corrected to plan code {to}"));
            }
            CodeCorrection::AppendedEmergency { from, to } => {
                warnings.push(format!(
                    "emergency fixture {from} matched to plan code {to}"
                ));
            }
            CodeCorrection::Ambiguous { code, candidates } => {
                warnings.push(format!(
                    "code {code} has multiple plan candidates {candidates:?}; keeping original"
                ));
            }
            CodeCorrection::Kept => {}
        }
    }

    dedup_fixtures(fixtures)
}

/// Fast path: ruled tables first, text-position fallback second.
fn parse_page_tables(
    page: &Page,
    source: &dyn DrawingSource,
    _config: &PipelineConfig,
) -> Vec<FixtureRecord> {
    let Ok(geo) = source.geometry(page) else {
        return Vec::new();
    };
    let table_config = TableConfig::default();

    let mut tables = detect_ruled_tables(&geo.words, &geo.segments, None, &table_config);
    if tables.is_empty() {
        if let Some(t) = detect_text_table(&geo.words, None, &table_config) {
            tables.push(t);
        }
    }

    let mut fixtures = Vec::new();
    for table in &tables {
        if header::is_panel_schedule(table) {
            debug!(page = page.page_number, "table rejected as panel schedule");
            continue;
        }
        let parsed = match header::find_header(table) {
            Some(h) => header::rows_to_fixtures(table, &h),
            None => header::parse_headerless(table),
        };
        if parsed.is_empty() {
            continue;
        }
        if header::mostly_numeric_codes(&parsed) {
            debug!(
                page = page.page_number,
                "table rejected: codes mostly numeric"
            );
            continue;
        }
        fixtures.extend(parsed);
    }
    fixtures
}

/// Run the escalation strategy list, stopping at the first success.
fn escalate(
    page: &Page,
    source: &dyn DrawingSource,
    providers: &Providers,
    config: &PipelineConfig,
    plan_code_candidates: &HashSet<String>,
    warnings: &mut Vec<String>,
) -> Vec<FixtureRecord> {
    let page_size = source
        .geometry(page)
        .ok()
        .map(|g| (g.width, g.height))
        .filter(|(w, h)| *w > 0.0 && *h > 0.0);
    let mut plan_codes: Vec<String> = plan_code_candidates.iter().cloned().collect();
    plan_codes.sort();

    for step in ESCALATION_ORDER {
        let outcome = match step {
            EscalationStep::Ocr => ocr::ocr_extract(page, page_size, providers, config),
            EscalationStep::Vision => vision::vision_extract(page, &plan_codes, providers, config),
        };
        match outcome {
            Ok(fixtures) => {
                info!(
                    page = page.page_number,
                    step = ?step,
                    fixtures = fixtures.len(),
                    "schedule escalation succeeded"
                );
                return fixtures;
            }
            Err(reason) => {
                warn!(page = page.page_number, step = ?step, reason = %reason, "schedule escalation step failed");
                warnings.push(format!(
                    "schedule escalation {:?} failed on page {}: {}",
                    step,
                    page.code(),
                    reason
                ));
            }
        }
    }
    Vec::new()
}

/// Cross-reference schedule codes against codes observed on the plans,
/// correcting misreads conservatively: only unambiguous candidates ever
/// change a code.
pub fn apply_code_corrections(
    fixtures: &mut [FixtureRecord],
    plan_codes: &HashSet<String>,
) -> Vec<CodeCorrection> {
    if plan_codes.is_empty() {
        return Vec::new();
    }

    let mut corrections = Vec::new();
    for rec in fixtures.iter_mut() {
        let code = rec.code.clone();

        // Emergency variant: the schedule row describes a battery/EM
        // fixture but the plans label it with a trailing E.
        let desc = rec.description.to_lowercase();
        let em_code = format!("{code}E");
        if (desc.contains("emergency") || desc.contains("battery"))
            && !code.ends_with('E')
            && plan_codes.contains(&em_code)
            && !plan_codes.contains(&code)
        {
            rec.code = em_code.clone();
            corrections.push(CodeCorrection::AppendedEmergency {
                from: code,
                to: em_code,
            });
            continue;
        }

        if plan_codes.contains(&code) {
            corrections.push(CodeCorrection::Kept);
            continue;
        }

        let mut candidates: Vec<String> = plan_codes
            .iter()
            .filter(|p| is_expansion(&code, p))
            .cloned()
            .collect();
        candidates.sort();
        match candidates.len() {
            0 => corrections.push(CodeCorrection::Kept),
            1 => {
                let to = candidates.remove(0);
                corrections.push(CodeCorrection::Replaced {
                    from: code,
                    to: to.clone(),
                });
                rec.code = to;
            }
            _ => corrections.push(CodeCorrection::Ambiguous { code, candidates }),
        }
    }
    corrections
}

/// "AL1" expands "A1": longer, same leading letter, same trailing
/// digits, and the short code is an in-order subsequence of the long one.
fn is_expansion(short: &str, long: &str) -> bool {
    if long.len() <= short.len() || long.len() > short.len() + 2 {
        return false;
    }
    if short.chars().next() != long.chars().next() {
        return false;
    }
    let short_digits: String = short.chars().filter(|c| c.is_ascii_digit()).collect();
    let long_digits: String = long.chars().filter(|c| c.is_ascii_digit()).collect();
    if short_digits != long_digits {
        return false;
    }
    is_subsequence(short, long)
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = haystack.chars();
    needle.chars().all(|n| chars.any(|h| h == n))
}

/// Deduplicate by code, keeping the record with the most populated spec
/// fields (first one wins ties).
pub fn dedup_fixtures(fixtures: Vec<FixtureRecord>) -> Vec<FixtureRecord> {
    let mut by_code: BTreeMap<String, FixtureRecord> = BTreeMap::new();
    for rec in fixtures {
        let keep = match by_code.get(&rec.code) {
            Some(existing) => existing.populated_fields() < rec.populated_fields(),
            None => true,
        };
        if keep {
            by_code.insert(rec.code.clone(), rec);
        }
    }
    by_code.into_values().collect()
}
