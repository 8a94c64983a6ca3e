//! Graph construction from pairwise weights.
//!
//! Two sources feed the same [`WeightTable`]: great-circle distances between
//! anchor coordinates, and filtered minimum RTTs from the anchor mesh
//! measurements. The table keeps the most favorable (smallest) observation
//! per unordered pair, so the graph never has parallel edges.

use crate::topology::{AnchorGraph, AnchorId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Propagation speed bound in km per millisecond.
pub const SPEED_OF_LIGHT_KM_PER_MS: f64 = 299.792;

fn pair(a: AnchorId, b: AnchorId) -> (AnchorId, AnchorId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Unordered anchor pair -> weight. Loaded once, then shared read-only with
/// whatever needs distance lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "Vec<(AnchorId, AnchorId, f64)>",
    into = "Vec<(AnchorId, AnchorId, f64)>"
)]
pub struct WeightTable {
    weights: BTreeMap<(AnchorId, AnchorId), f64>,
}

impl WeightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observation, keeping the smaller weight for a known pair.
    /// Self-pairs and negative or non-finite weights are ignored.
    pub fn observe(&mut self, a: AnchorId, b: AnchorId, weight: f64) {
        if a == b || !weight.is_finite() || weight < 0.0 {
            return;
        }
        self.weights
            .entry(pair(a, b))
            .and_modify(|w| *w = w.min(weight))
            .or_insert(weight);
    }

    pub fn get(&self, a: AnchorId, b: AnchorId) -> Option<f64> {
        self.weights.get(&pair(a, b)).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AnchorId, AnchorId, f64)> + '_ {
        self.weights.iter().map(|(&(a, b), &w)| (a, b, w))
    }

    pub fn to_graph(&self) -> AnchorGraph {
        let mut graph = AnchorGraph::new();
        for (a, b, w) in self.iter() {
            graph.add_edge(a, b, w);
        }
        graph
    }
}

impl FromIterator<(AnchorId, AnchorId, f64)> for WeightTable {
    fn from_iter<I: IntoIterator<Item = (AnchorId, AnchorId, f64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (a, b, w) in iter {
            table.observe(a, b, w);
        }
        table
    }
}

impl From<Vec<(AnchorId, AnchorId, f64)>> for WeightTable {
    fn from(entries: Vec<(AnchorId, AnchorId, f64)>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<WeightTable> for Vec<(AnchorId, AnchorId, f64)> {
    fn from(table: WeightTable) -> Self {
        table.iter().collect()
    }
}

/// One ping result from the anchor mesh: `origin` pinged `target`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RttSample {
    pub target: AnchorId,
    pub msm_id: u64,
    pub origin: AnchorId,
    pub timestamp: i64,
    /// Minimum RTT of the ping burst, ms; non-positive means no reply.
    pub rtt: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RttFilterStats {
    /// Series with at least one surviving RTT
    pub kept: usize,
    /// Series left without any RTT
    pub removed: usize,
    /// Distinct RTT values faster than light over the pair's distance
    pub implausible: usize,
}

/// Builds the RTT graph, optionally dropping physically implausible RTTs
/// using a great-circle distance table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RttGraphBuilder<'d> {
    distances: Option<&'d WeightTable>,
}

impl<'d> RttGraphBuilder<'d> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distances(mut self, distances: &'d WeightTable) -> Self {
        self.distances = Some(distances);
        self
    }

    /// Smallest plausible RTT of one (target, measurement, origin) series.
    pub fn min_plausible_rtt<I>(
        &self,
        origin: AnchorId,
        target: AnchorId,
        rtts: I,
        stats: &mut RttFilterStats,
    ) -> Option<f64>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values: Vec<f64> = rtts.into_iter().filter(|&r| r > 0.0).collect();
        values.sort_by(f64::total_cmp);
        values.dedup();

        if let Some(distance) = self.distances.and_then(|t| t.get(origin, target)) {
            let before = values.len();
            // one-way time is half the RTT
            values.retain(|&rtt| distance / (rtt / 2.0) <= SPEED_OF_LIGHT_KM_PER_MS);
            let dropped = before - values.len();
            if dropped > 0 {
                debug!(
                    "dropped {} rtt(s) between {} and {} ({:.1} km)",
                    dropped, origin, target, distance
                );
                stats.implausible += dropped;
            }
        }

        let min = values.first().copied();
        if min.is_some() {
            stats.kept += 1;
        } else {
            stats.removed += 1;
        }
        min
    }

    /// Every anchor seen in `samples` becomes a node, even if none of its RTTs
    /// survive. Each pair keeps the minimum RTT across all its measurements.
    pub fn build(&self, samples: &[RttSample]) -> (AnchorGraph, RttFilterStats) {
        let mut series: BTreeMap<(AnchorId, u64, AnchorId), Vec<f64>> = BTreeMap::new();
        for s in samples {
            series
                .entry((s.target, s.msm_id, s.origin))
                .or_default()
                .push(s.rtt);
        }

        let mut graph = AnchorGraph::new();
        let mut table = WeightTable::new();
        let mut stats = RttFilterStats::default();

        for ((target, _, origin), rtts) in series {
            graph.add_node(target);
            graph.add_node(origin);
            if let Some(min) = self.min_plausible_rtt(origin, target, rtts, &mut stats) {
                table.observe(origin, target, min);
            }
        }

        for (a, b, w) in table.iter() {
            graph.add_edge(a, b, w);
        }

        info!(
            "rtt graph: {} anchors, {} edges (series kept {}, removed {}, implausible rtts {})",
            graph.num_nodes(),
            graph.num_edges(),
            stats.kept,
            stats.removed,
            stats.implausible
        );
        (graph, stats)
    }
}
