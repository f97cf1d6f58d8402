use clap::{Parser, Subcommand};
use std::process;

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(global = true, long, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a pooled assignment from a peptide roster.
    Generate(cmd::generate::GenerateArgs),
    /// Decode pool spot counts into per-peptide hit calls.
    Deconvolve(cmd::deconvolve::DeconvolveArgs),
    /// Check an existing assignment against its design constraints.
    Verify(cmd::verify::VerifyArgs),
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    println!("\n🧬 Initializing PoolForge...");

    let result = match cli.command {
        Commands::Generate(args) => cmd::generate::run(args),
        Commands::Deconvolve(args) => cmd::deconvolve::run(args),
        Commands::Verify(args) => cmd::verify::run(args),
    };

    if let Err(e) = result {
        eprintln!("❌ {e}");
        process::exit(1);
    }
}
