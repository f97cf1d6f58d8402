use crate::reports;
use clap::Args;
use poolforge::api;
use poolforge::assignment::BlockAssignment;
use poolforge::config::DeconvolveParams;
use poolforge::deconv::DeconvolutionMethod;
use poolforge::error::PfResult;
use poolforge::readout::{PlateReadout, PoolReadout};

#[derive(Args, Debug, Clone)]
pub struct DeconvolveArgs {
    /// Assignment CSV produced by `generate`.
    #[arg(short, long)]
    pub assignment: String,

    /// Readout CSV: pool_id,spot_count (or plate_id,well_id,spot_count
    /// with --plate-readout). Repeatable; later files win on overlap.
    #[arg(short, long, required = true)]
    pub readout: Vec<String>,

    /// Treat the readout as raw plate-reader rows and resolve wells
    /// through the assignment's plate map.
    #[arg(long, default_value_t = false)]
    pub plate_readout: bool,

    #[arg(short, long, default_value_t = DeconvolutionMethod::ConstrainedEm)]
    pub method: DeconvolutionMethod,

    /// Output path for the deconvolution CSV.
    #[arg(short, long, default_value = "deconvolved.csv")]
    pub output: String,

    #[command(flatten)]
    pub params: DeconvolveParams,
}

pub fn run(args: DeconvolveArgs) -> PfResult<()> {
    println!("📂 Loading assignment: {}", args.assignment);
    let assignment = BlockAssignment::read_csv(&args.assignment)?;

    for path in &args.readout {
        println!("📂 Loading readout: {path}");
    }
    let readout = if args.plate_readout {
        let plates = args
            .readout
            .iter()
            .map(PlateReadout::load_from_file)
            .collect::<PfResult<Vec<_>>>()?;
        PlateReadout::merge(&plates).to_pool_readout(&assignment)?
    } else {
        let readouts = args
            .readout
            .iter()
            .map(PoolReadout::load_from_file)
            .collect::<PfResult<Vec<_>>>()?;
        PoolReadout::merge(&readouts)
    };
    println!(
        "🔬 Deconvolving {} pools with the '{}' method",
        readout.len(),
        args.method
    );

    let result = api::deconvolve(
        &readout,
        &assignment,
        args.method,
        args.params.min_coverage,
        args.params.min_pool_spot_count,
        &args.params.statistical_config(),
    )?;

    reports::print_deconvolution_report(&result);

    result.write_csv(&args.output)?;
    println!("💾 Deconvolution results written to {}", args.output);
    Ok(())
}
