//! Activity estimation over the pool-membership design matrix.
//!
//! Both methods model the observed pool counts as sums of the latent
//! per-peptide activities of their members. EM runs multiplicative
//! Richardson-Lucy updates, which keep activities non-negative and
//! redistribute each pool's count among its members in proportion to
//! their current estimates. LASSO runs coordinate descent on a
//! half-quadratic loss with an L1 penalty and a non-negativity clamp,
//! driving inactive peptides to exactly zero.

use crate::assignment::BlockAssignment;
use crate::deconv::{DeconvolutionLabel, DeconvolutionMethod, DeconvolvedPeptide, DeconvolvedPeptideSet};
use crate::error::{PfResult, PoolforgeError};
use crate::peptide::Peptide;
use crate::readout::PoolReadout;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct StatisticalConfig {
    /// Activity at or above which a peptide is flagged a confident hit.
    pub min_peptide_activity: f64,
    pub max_iters: usize,
    /// L1 penalty weight for the LASSO path.
    pub lasso_lambda: f64,
}

impl Default for StatisticalConfig {
    fn default() -> Self {
        Self {
            min_peptide_activity: 1.0,
            max_iters: 500,
            lasso_lambda: 1.0,
        }
    }
}

/// Pools-by-peptides membership matrix plus the observed counts.
struct DesignMatrix {
    peptide_ids: Vec<String>,
    /// members[pool_row] = peptide column indices.
    members: Vec<Vec<usize>>,
    observed: Vec<f64>,
}

fn build_design_matrix(readout: &PoolReadout, assignment: &BlockAssignment) -> DesignMatrix {
    let peptide_ids = assignment.peptide_ids();
    let index_of = |id: &str| peptide_ids.iter().position(|p| p == id);
    let pool_members = assignment.pool_members();

    let mut members = Vec::new();
    let mut observed = Vec::new();
    for (&pool_id, &count) in readout.spot_counts() {
        let Some(ids) = pool_members.get(&pool_id) else {
            continue;
        };
        members.push(ids.iter().filter_map(|id| index_of(id)).collect());
        observed.push(count);
    }
    DesignMatrix {
        peptide_ids,
        members,
        observed,
    }
}

/// Estimates per-peptide activities. Rejects methods that do not belong
/// to this generic path.
pub fn deconvolve(
    readout: &PoolReadout,
    assignment: &BlockAssignment,
    method: DeconvolutionMethod,
    config: &StatisticalConfig,
) -> PfResult<DeconvolvedPeptideSet> {
    let matrix = build_design_matrix(readout, assignment);
    let activities = match method {
        DeconvolutionMethod::Em => estimate_em(&matrix, config.max_iters),
        DeconvolutionMethod::Lasso => {
            estimate_lasso(&matrix, config.lasso_lambda, config.max_iters)
        }
        other => {
            return Err(PoolforgeError::Config(format!(
                "Method '{other}' is not a statistical deconvolution method."
            )))
        }
    };

    let num_hits = activities
        .iter()
        .filter(|&&a| a >= config.min_peptide_activity)
        .count();
    info!(method = %method, num_hits, "Finished statistical deconvolution.");

    let peptides = matrix
        .peptide_ids
        .iter()
        .zip(&activities)
        .map(|(id, &activity)| {
            let label = if activity >= config.min_peptide_activity {
                DeconvolutionLabel::ConfidentHit
            } else {
                DeconvolutionLabel::NotAHit
            };
            let sequence = assignment.peptide_sequence(id).unwrap_or_default();
            DeconvolvedPeptide {
                peptide: Peptide::new(id.clone(), sequence),
                estimated_spot_count: activity,
                label,
                hit_pool_ids: Vec::new(),
            }
        })
        .collect();

    Ok(DeconvolvedPeptideSet {
        method,
        min_pool_spot_count: 0.0,
        min_coverage: 0,
        min_peptide_activity: Some(config.min_peptide_activity),
        background_spot_count: None,
        peptides,
    })
}

fn estimate_em(matrix: &DesignMatrix, max_iters: usize) -> Vec<f64> {
    let num_peptides = matrix.peptide_ids.len();
    if num_peptides == 0 || matrix.members.is_empty() {
        return vec![0.0; num_peptides];
    }

    // How many pools each peptide appears in (its column sum).
    let mut appearances = vec![0.0f64; num_peptides];
    for pool in &matrix.members {
        for &j in pool {
            appearances[j] += 1.0;
        }
    }

    let mean_count = matrix.observed.iter().sum::<f64>() / matrix.observed.len() as f64;
    let mean_pool_size = matrix
        .members
        .iter()
        .map(|m| m.len())
        .sum::<usize>()
        .max(1) as f64
        / matrix.members.len() as f64;
    let mut activity = vec![(mean_count / mean_pool_size).max(1e-6); num_peptides];

    for iter in 0..max_iters {
        let predicted: Vec<f64> = matrix
            .members
            .iter()
            .map(|pool| pool.iter().map(|&j| activity[j]).sum::<f64>())
            .collect();

        let mut correction = vec![0.0f64; num_peptides];
        for (pool, (&y, &y_hat)) in matrix
            .members
            .iter()
            .zip(matrix.observed.iter().zip(&predicted))
        {
            if y_hat <= f64::EPSILON {
                continue;
            }
            let ratio = y / y_hat;
            for &j in pool {
                correction[j] += ratio;
            }
        }

        let mut delta = 0.0f64;
        for j in 0..num_peptides {
            if appearances[j] == 0.0 {
                activity[j] = 0.0;
                continue;
            }
            let updated = activity[j] * correction[j] / appearances[j];
            delta += (updated - activity[j]).abs();
            activity[j] = updated;
        }
        if delta < 1e-9 {
            debug!(iter, "EM converged.");
            break;
        }
    }
    activity
}

fn estimate_lasso(matrix: &DesignMatrix, lambda: f64, max_iters: usize) -> Vec<f64> {
    let num_peptides = matrix.peptide_ids.len();
    let num_pools = matrix.members.len();
    if num_peptides == 0 || num_pools == 0 {
        return vec![0.0; num_peptides];
    }

    // Column norms (1/m) * sum A_ij^2; membership is 0/1 so this is the
    // appearance count over m.
    let mut col_norm = vec![0.0f64; num_peptides];
    let mut pools_of: Vec<Vec<usize>> = vec![Vec::new(); num_peptides];
    for (i, pool) in matrix.members.iter().enumerate() {
        for &j in pool {
            col_norm[j] += 1.0 / num_pools as f64;
            pools_of[j].push(i);
        }
    }

    let mut activity = vec![0.0f64; num_peptides];
    let mut predicted = vec![0.0f64; num_pools];
    for _ in 0..max_iters {
        let mut delta = 0.0f64;
        for j in 0..num_peptides {
            if col_norm[j] == 0.0 {
                continue;
            }
            // Partial residual correlation with column j.
            let rho: f64 = pools_of[j]
                .iter()
                .map(|&i| {
                    (matrix.observed[i] - predicted[i] + activity[j]) / num_pools as f64
                })
                .sum();
            let updated = ((rho - lambda).max(0.0)) / col_norm[j];
            if updated != activity[j] {
                let diff = updated - activity[j];
                for &i in &pools_of[j] {
                    predicted[i] += diff;
                }
                delta += diff.abs();
                activity[j] = updated;
            }
        }
        if delta < 1e-9 {
            break;
        }
    }
    activity
}
