use crate::api::GenerateConfig;
use crate::deconv::StatisticalConfig;
use crate::error::{PfResult, PoolforgeError};
use crate::plate::PlateFormat;
use crate::solver::{exact, heuristic, InitStrategy, SolverStrategy};
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct DesignParams {
    #[arg(long, default_value_t = 5)]
    pub num_peptides_per_pool: usize,

    #[arg(long, default_value_t = 3)]
    pub num_coverage: usize,

    /// Pre-pool sequence-similar peptides (Levenshtein oracle).
    #[arg(long, default_value_t = false)]
    pub cluster_peptides: bool,

    #[arg(long, default_value_t = 3)]
    pub max_levenshtein_distance: usize,

    #[arg(long, default_value_t = 96)]
    pub num_plate_wells: usize,
}

#[derive(Args, Debug, Clone)]
pub struct SolverParams {
    #[arg(long, default_value_t = SolverStrategy::Heuristic)]
    pub mode: SolverStrategy,

    #[arg(long, default_value_t = 42)]
    pub random_seed: u64,

    // Heuristic knobs.
    #[arg(long, default_value_t = InitStrategy::Greedy)]
    pub init_strategy: InitStrategy,

    #[arg(long, default_value_t = heuristic::DEFAULT_MAX_ITERS)]
    pub max_iters: usize,

    #[arg(long, default_value_t = false)]
    pub allow_extra_pools: bool,

    // Exact knobs.
    #[arg(long, default_value_t = exact::DEFAULT_NUM_WORKERS)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 1_000)]
    pub shuffle_iters: usize,

    #[arg(long, default_value_t = 100)]
    pub max_peptides_per_block: usize,

    #[arg(long, default_value_t = 10)]
    pub max_peptides_per_pool: usize,
}

#[derive(Args, Debug, Clone)]
pub struct DeconvolveParams {
    /// Spot count at or above which a pool is a hit.
    #[arg(long, default_value_t = 300.0)]
    pub min_pool_spot_count: f64,

    /// Hit pools a peptide needs before it counts as a hit.
    #[arg(long, default_value_t = 3)]
    pub min_coverage: usize,

    #[arg(long, default_value_t = 1.0)]
    pub min_peptide_activity: f64,

    #[arg(long, default_value_t = 500)]
    pub statistical_max_iters: usize,

    #[arg(long, default_value_t = 1.0)]
    pub lasso_lambda: f64,
}

impl DeconvolveParams {
    pub fn statistical_config(&self) -> StatisticalConfig {
        StatisticalConfig {
            min_peptide_activity: self.min_peptide_activity,
            max_iters: self.statistical_max_iters,
            lasso_lambda: self.lasso_lambda,
        }
    }
}

/// Folds the flattened CLI params into the library's generate config.
pub fn build_generate_config(
    design: &DesignParams,
    solver: &SolverParams,
) -> PfResult<GenerateConfig> {
    if design.num_coverage < 1 {
        return Err(PoolforgeError::Config("Coverage must be at least 1.".into()));
    }
    Ok(GenerateConfig {
        num_peptides_per_pool: design.num_peptides_per_pool,
        num_coverage: design.num_coverage,
        strategy: solver.mode,
        cluster_peptides: design.cluster_peptides,
        max_levenshtein_distance: design.max_levenshtein_distance,
        init_strategy: solver.init_strategy,
        max_iters: solver.max_iters,
        allow_extra_pools: solver.allow_extra_pools,
        random_seed: solver.random_seed,
        num_workers: solver.num_workers,
        shuffle_iters: solver.shuffle_iters,
        max_peptides_per_block: solver.max_peptides_per_block,
        max_peptides_per_pool: solver.max_peptides_per_pool,
        plate_format: PlateFormat::from_num_wells(design.num_plate_wells)?,
    })
}
