use crate::reports;
use clap::Args;
use poolforge::api;
use poolforge::assignment::BlockAssignment;
use poolforge::design::DesignArtifact;
use poolforge::error::PfResult;

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Assignment CSV produced by `generate`.
    #[arg(short, long)]
    pub assignment: String,

    /// Design artifact JSON from `generate --design-output`. When given,
    /// its geometry overrides the flags below.
    #[arg(short, long)]
    pub design: Option<String>,

    #[arg(long, default_value_t = 5)]
    pub num_peptides_per_pool: usize,

    #[arg(long, default_value_t = 3)]
    pub num_coverage: usize,
}

pub fn run(args: VerifyArgs) -> PfResult<()> {
    println!("📂 Loading assignment: {}", args.assignment);
    let assignment = BlockAssignment::read_csv(&args.assignment)?;

    let (num_peptides_per_pool, num_coverage) = match &args.design {
        Some(path) => {
            println!("📂 Loading design artifact: {path}");
            let artifact = DesignArtifact::read_json(path)?;
            (artifact.num_peptides_per_pool, artifact.num_coverage)
        }
        None => (args.num_peptides_per_pool, args.num_coverage),
    };

    println!("\n🔎 === ASSIGNMENT AUDIT === 🔎");
    reports::print_assignment_summary(&assignment);

    let report = api::verify(&assignment, num_peptides_per_pool, num_coverage);
    reports::print_verification_report(&report);
    Ok(())
}
