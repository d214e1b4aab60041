//! Recompute the lost capacity for a whole set of networks in one go.
//! Networks don't depend on each other, so they are processed in parallel.

use crate::analysis::compute_lost_capacity;
use crate::batch::lease::{LeaseGuard, LeaseStore};
use crate::common::config::EngineConfig;
use crate::common::error::Result;
use crate::common::network_data::SewerNetwork;
use crate::flooding::results::NetworkResults;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of a batch run. Networks which failed don't produce any results,
/// but don't stop the others either.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub results: Vec<NetworkResults>,
    pub failures: Vec<NetworkFailure>,
}

/// Compute lost capacity for every provided network, using Rayon to spread
/// the work. Only one run can be active at a time, if the lease is already
/// held nothing is computed at all.
pub fn recompute_all(
    networks: &[SewerNetwork],
    config: &EngineConfig,
    store: &dyn LeaseStore,
    holder: &str,
) -> Result<BatchReport> {
    let _guard = LeaseGuard::acquire(
        store,
        &config.lease_key,
        holder,
        config.lease_timeout,
    )?;

    let now = Instant::now();
    info!("Recomputing lost capacity for {} networks", networks.len());

    let bar = ProgressBar::new(networks.len() as u64);

    let outcomes: Vec<(&SewerNetwork, Result<NetworkResults>)> = networks
        .par_iter()
        .map(|network| {
            let outcome = compute_lost_capacity(network, config);
            bar.inc(1);
            (network, outcome)
        })
        .collect();

    bar.finish_and_clear();

    let mut results = Vec::<NetworkResults>::new();
    let mut failures = Vec::<NetworkFailure>::new();
    for (network, outcome) in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(err) => {
                warn!("Unable to process network {}: {}", network.name, err);
                failures.push(NetworkFailure {
                    name: network.name.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        "{} networks processed, {} failed, in {:.2?}",
        results.len(),
        failures.len(),
        now.elapsed()
    );

    Ok(BatchReport { results, failures })
}
