use comfy_table::presets::ASCII_FULL;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table};
use poolforge::assignment::{BlockAssignment, VerificationReport};
use poolforge::deconv::{DeconvolutionLabel, DeconvolvedPeptideSet};

pub fn print_assignment_summary(assignment: &BlockAssignment) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Metric", "Value"]);

    table.add_row(vec![
        Cell::new("Peptides"),
        Cell::new(assignment.num_peptides()).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Pools"),
        Cell::new(assignment.num_pools()).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Coverage rounds"),
        Cell::new(assignment.coverage_ids().len()).set_alignment(CellAlignment::Right),
    ]);
    let violations = assignment.num_violations();
    let cell = Cell::new(violations).set_alignment(CellAlignment::Right);
    table.add_row(vec![
        Cell::new("Pair violations"),
        if violations == 0 {
            cell.fg(Color::Green)
        } else {
            cell.fg(Color::Red)
        },
    ]);
    table.add_row(vec![
        Cell::new("Decodable"),
        Cell::new(if assignment.is_decodable() { "yes" } else { "no" }),
    ]);

    println!("\n📋 === ASSIGNMENT SUMMARY ===");
    println!("{table}");
}

pub fn print_verification_report(report: &VerificationReport) {
    if report.is_optimal() {
        println!("\n✅ All design constraints hold.");
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Constraint violation"]);
    for violation in &report.violations {
        table.add_row(vec![Cell::new(violation).fg(Color::Red)]);
    }
    println!("\n⚠️  === VERIFICATION FAILURES ===");
    println!("{table}");
}

pub fn print_deconvolution_report(result: &DeconvolvedPeptideSet) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Peptide",
            "Estimated spots",
            "Hit pools",
            "Result",
        ]);

    let mut sorted: Vec<_> = result.peptides.iter().collect();
    sorted.sort_by(|a, b| {
        b.estimated_spot_count
            .partial_cmp(&a.estimated_spot_count)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.peptide.id.cmp(&b.peptide.id))
    });
    for p in sorted {
        let color = match p.label {
            DeconvolutionLabel::ConfidentHit => Color::Green,
            DeconvolutionLabel::CandidateHit => Color::Yellow,
            DeconvolutionLabel::NotAHit => Color::Grey,
        };
        table.add_row(vec![
            Cell::new(&p.peptide.id),
            Cell::new(format!("{:.1}", p.estimated_spot_count))
                .set_alignment(CellAlignment::Right),
            Cell::new(
                p.hit_pool_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(";"),
            ),
            Cell::new(p.label).fg(color),
        ]);
    }

    println!("\n🎯 === DECONVOLUTION RESULTS ===");
    if let Some(background) = result.background_spot_count {
        println!("Estimated background spot count: {background:.2}");
    }
    println!(
        "Confident hits: {} | Candidate hits: {}",
        result.confident_hits().len(),
        result.candidate_hits().len()
    );
    println!("{table}");
}
