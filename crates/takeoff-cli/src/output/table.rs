use takeoff_core::model::{FixtureRecord, Page, SheetIndexEntry};
use takeoff_core::AnalysisOutput;

pub fn print_analysis(output: &AnalysisOutput) {
    let qa = &output.qa;
    let verdict = if qa.passed { "PASS" } else { "REVIEW" };
    println!(
        "Confidence: {:.1}% ({verdict}, threshold {:.1}%)\n",
        qa.overall_confidence * 100.0,
        qa.threshold * 100.0
    );

    for (stage, score) in &qa.stage_scores {
        println!("  {stage:<22} {:.2}", score);
    }
    println!();

    print_fixtures(&output.result.fixtures, true);

    if !output.result.keynotes.is_empty() {
        println!("Keynotes:");
        for note in &output.result.keynotes {
            println!("  {:>3}  x{:<4} {}", note.number, note.total, truncate(&note.text, 70));
        }
        println!();
    }

    if !qa.warnings.is_empty() {
        println!("Warnings:");
        for warning in &qa.warnings {
            println!("  - {warning}");
        }
        println!();
    }
    if !qa.recommendations.is_empty() {
        println!("Recommendations:");
        for rec in &qa.recommendations {
            println!("  - {rec}");
        }
    }
}

pub fn print_fixtures(fixtures: &[FixtureRecord], with_counts: bool) {
    if fixtures.is_empty() {
        println!("No fixtures extracted.\n");
        return;
    }

    let code_width = fixtures
        .iter()
        .map(|f| f.code.len())
        .max()
        .unwrap_or(4)
        .max(4);

    println!("Fixtures:");
    for rec in fixtures {
        if with_counts {
            println!(
                "  {:<width$}  x{:<5} {}",
                rec.code,
                rec.total,
                truncate(&rec.description, 60),
                width = code_width
            );
            let per_plan: Vec<String> = rec
                .counts_per_plan
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(plan, n)| format!("{plan}: {n}"))
                .collect();
            if !per_plan.is_empty() {
                println!("  {:<width$}  ({})", "", per_plan.join(", "), width = code_width);
            }
        } else {
            println!(
                "  {:<width$}  {:<8} {:<10} {}",
                rec.code,
                rec.voltage,
                rec.mounting,
                truncate(&rec.description, 50),
                width = code_width
            );
        }
    }
    println!();
}

pub fn print_sheets(pages: &[Page], sheet_index: &[SheetIndexEntry]) {
    if !sheet_index.is_empty() {
        println!("Drawing index ({} entries):", sheet_index.len());
        for entry in sheet_index {
            let kind = entry
                .inferred_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".into());
            println!("  {:<8} {:<12} {}", entry.sheet_code, kind, entry.description);
        }
        println!();
    }

    println!("Pages:");
    for page in pages {
        println!(
            "  {:>3}  {:<10} {:<16} {}",
            page.page_number,
            page.sheet_code.as_deref().unwrap_or("-"),
            page.page_type.to_string(),
            page.sheet_title
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}\u{2026}")
    }
}
