use crate::reports;
use clap::Args;
use poolforge::api;
use poolforge::config::{build_generate_config, DesignParams, SolverParams};
use poolforge::design::DesignArtifact;
use poolforge::error::PfResult;
use poolforge::peptide::PeptideSet;

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Peptide roster CSV (peptide_id, peptide_sequence).
    #[arg(short, long)]
    pub peptides: String,

    /// Output path for the assignment CSV.
    #[arg(short, long, default_value = "assignment.csv")]
    pub output: String,

    /// Also write the design parameters and roster as JSON.
    #[arg(long)]
    pub design_output: Option<String>,

    /// Also write a bench-ready CSV: one row per well with the peptides
    /// to pipette into it.
    #[arg(long)]
    pub bench_ready_output: Option<String>,

    #[command(flatten)]
    pub design: DesignParams,

    #[command(flatten)]
    pub solver: SolverParams,
}

pub fn run(args: GenerateArgs) -> PfResult<()> {
    println!("📂 Loading peptides: {}", args.peptides);
    let peptides = PeptideSet::load_from_file(&args.peptides)?;
    println!(
        "🧪 {} peptides, {} per pool, {}x coverage ({} mode)",
        peptides.len(),
        args.design.num_peptides_per_pool,
        args.design.num_coverage,
        args.solver.mode
    );

    let config = build_generate_config(&args.design, &args.solver)?;
    let (assignment, design) = api::generate(peptides, &config)?;

    let report = api::verify(
        &assignment,
        args.design.num_peptides_per_pool,
        args.design.num_coverage,
    );
    reports::print_assignment_summary(&assignment);
    reports::print_verification_report(&report);

    assignment.write_csv(&args.output)?;
    println!("💾 Assignment written to {}", args.output);

    if let Some(path) = &args.design_output {
        DesignArtifact::from_design(&design).write_json(path)?;
        println!("💾 Design artifact written to {path}");
    }

    if let Some(path) = &args.bench_ready_output {
        assignment.write_bench_ready_csv(path)?;
        println!("💾 Bench-ready sheet written to {path}");
    }
    Ok(())
}
