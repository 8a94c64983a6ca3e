use crate::attributes::{Category, Classifier};
use crate::error::{RankError, Result};
use crate::growth::{GrowthEngine, GrowthOutcome};
use crate::persistence::SnapshotArchive;
use crate::seed::{ClaimedLocationIndex, Query, SeedSelector};
use crate::topology::{AnchorGraph, AnchorId};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use xxhash_rust::xxh64::xxh64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    MaxEdge,
    RandomSample { sample_size: usize },
    ClaimedLocation,
}

impl SeedPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxEdge => "max-edge",
            Self::RandomSample { .. } => "random-sample",
            Self::ClaimedLocation => "claimed-location",
        }
    }
}

/// Per-query results of a batch. A failed query never affects the others.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: BTreeMap<String, GrowthOutcome>,
    pub failures: BTreeMap<String, RankError>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Successful runs that stopped short of the full graph.
    pub fn partial(&self) -> usize {
        self.outcomes.values().filter(|o| !o.is_complete()).count()
    }

    pub fn into_archive(self, diversity: Option<Category>) -> SnapshotArchive {
        let mut archive = SnapshotArchive::new(SeedPolicy::ClaimedLocation.name(), diversity);
        archive.runs = self
            .outcomes
            .into_iter()
            .map(|(key, outcome)| (key, outcome.series))
            .collect();
        archive
    }
}

/// Hash of the query key mixed into the batch seed, so a query's draws do
/// not depend on its position in the batch or on scheduling.
fn query_seed(base_seed: u64, key: &str) -> u64 {
    xxh64(key.as_bytes(), base_seed)
}

/// Orchestrates seed selection and growth for the three run shapes.
#[derive(Clone, Copy)]
pub struct RunDriver<'g> {
    engine: GrowthEngine<'g>,
    seeds: SeedSelector<'g>,
}

impl<'g> RunDriver<'g> {
    pub fn new(graph: &'g AnchorGraph) -> Self {
        Self {
            engine: GrowthEngine::new(graph),
            seeds: SeedSelector::new(graph),
        }
    }

    pub fn with_diversity(mut self, classifier: &'g dyn Classifier) -> Self {
        self.engine = self.engine.with_diversity(classifier);
        self
    }

    /// One run seeded from an endpoint of the heaviest edge.
    pub fn run_global<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<GrowthOutcome> {
        let seed = self.seeds.max_edge(rng)?;
        info!("global run from anchor {}", seed);
        let outcome = self.engine.grow(seed)?;
        info!("global run ranked {} anchors", outcome.series.ranking().len());
        Ok(outcome)
    }

    /// One run whose first `sample_size` ranks are a uniform sample of
    /// `universe`, in draw order.
    pub fn run_repeated_seed<R: Rng + ?Sized>(
        &self,
        universe: &[AnchorId],
        sample_size: usize,
        rng: &mut R,
    ) -> Result<GrowthOutcome> {
        let sample = self.seeds.random_sample(universe, sample_size, rng)?;
        info!("repeated-seed run with {} sampled anchors", sample.len());
        self.engine.grow_from(&sample)
    }

    /// One independent run per query, executed in parallel.
    pub fn run_per_query(
        &self,
        queries: &[Query],
        index: &ClaimedLocationIndex,
        base_seed: u64,
    ) -> BatchReport {
        let total = queries.len();
        let results: Vec<(String, Result<GrowthOutcome>)> = queries
            .par_iter()
            .map(|query| {
                let mut rng = Pcg64::seed_from_u64(query_seed(base_seed, &query.key));
                let result = self
                    .seeds
                    .claimed_location(query, index, &mut rng)
                    .and_then(|seed| {
                        debug!("query {} seeded from anchor {}", query.key, seed);
                        self.engine.grow(seed)
                    });
                (query.key.clone(), result)
            })
            .collect();

        let mut report = BatchReport::default();
        for (key, result) in results {
            if report.outcomes.contains_key(&key) || report.failures.contains_key(&key) {
                warn!("duplicate query {} ignored", key);
                continue;
            }
            match result {
                Ok(outcome) => {
                    report.outcomes.insert(key, outcome);
                }
                Err(e) => {
                    warn!("query {} failed: {}", key, e);
                    report.failures.insert(key, e);
                }
            }
        }

        info!(
            "per-query batch: {}/{} succeeded, {} failed, {} partial",
            report.succeeded(),
            total,
            report.failed(),
            report.partial()
        );
        report
    }
}
