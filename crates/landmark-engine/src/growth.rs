//! Greedy incremental landmark selection.
//!
//! Growth is Prim-style maximum spanning growth where a fringe candidate's
//! score is the *sum* of its edge weights into the selected set, not its
//! single best edge. Every step records the selected prefix, so the output
//! ranks anchors for every subset size at once.
//!
//! Fringe ties are broken by the lowest anchor id, which makes a run a pure
//! function of the graph, the seeds and the classifier.

use crate::attributes::Classifier;
use crate::error::{RankError, Result};
use crate::topology::{AnchorGraph, AnchorId};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Selected prefix at every step count k (k >= 2), in selection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotSeries(BTreeMap<usize, Vec<AnchorId>>);

impl SnapshotSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, k: usize) -> Option<&[AnchorId]> {
        self.0.get(&k).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn max_k(&self) -> Option<usize> {
        self.0.keys().next_back().copied()
    }

    /// The longest recorded prefix, i.e. the full ranking of the run.
    pub fn ranking(&self) -> &[AnchorId] {
        self.0.values().next_back().map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[AnchorId])> + '_ {
        self.0.iter().map(|(&k, anchors)| (k, anchors.as_slice()))
    }

    fn record(&mut self, selected: &[AnchorId]) {
        if selected.len() >= 2 {
            self.0.insert(selected.len(), selected.to_vec());
        }
    }
}

/// Whether a run reached every node of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coverage {
    Complete,
    /// The fringe emptied first: the seeds' component is smaller than the graph.
    Partial { selected: usize, graph_nodes: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthOutcome {
    pub series: SnapshotSeries,
    pub coverage: Coverage,
}

impl GrowthOutcome {
    pub fn is_complete(&self) -> bool {
        self.coverage == Coverage::Complete
    }
}

/// Heavier first, then lower id.
fn rank_key(anchor: AnchorId, weight: f64) -> (OrderedFloat<f64>, Reverse<AnchorId>) {
    (OrderedFloat(weight), Reverse(anchor))
}

struct ClusterTracker<'c> {
    classifier: &'c dyn Classifier,
    seen: HashSet<&'c str>,
    /// Unselected anchors of the reachable universe.
    remaining: BTreeSet<AnchorId>,
    total: usize,
}

impl<'c> ClusterTracker<'c> {
    fn new(classifier: &'c dyn Classifier, universe: BTreeSet<AnchorId>) -> Self {
        let total = universe
            .iter()
            .filter_map(|&anchor| classifier.cluster_of(anchor))
            .collect::<HashSet<_>>()
            .len();
        Self {
            classifier,
            seen: HashSet::new(),
            remaining: universe,
            total,
        }
    }

    fn cluster(&self, anchor: AnchorId) -> Option<&'c str> {
        let classifier = self.classifier;
        classifier.cluster_of(anchor)
    }

    fn exhausted(&self) -> bool {
        self.seen.len() >= self.total
    }

    fn is_unseen(&self, anchor: AnchorId) -> bool {
        self.cluster(anchor)
            .is_some_and(|cluster| !self.seen.contains(cluster))
    }

    fn mark(&mut self, anchor: AnchorId) {
        self.remaining.remove(&anchor);
        if let Some(cluster) = self.cluster(anchor) {
            self.seen.insert(cluster);
        }
    }

    /// An unseen cluster still has unselected members somewhere in the component.
    fn unseen_pending(&self) -> bool {
        self.remaining.iter().any(|&anchor| self.is_unseen(anchor))
    }
}

struct SelectionState<'c> {
    selected: Vec<AnchorId>,
    members: HashSet<AnchorId>,
    /// Not-yet-selected anchor -> summed weight of its edges into `selected`.
    fringe: HashMap<AnchorId, f64>,
    clusters: Option<ClusterTracker<'c>>,
}

impl<'c> SelectionState<'c> {
    fn new(clusters: Option<ClusterTracker<'c>>) -> Self {
        Self {
            selected: Vec::new(),
            members: HashSet::new(),
            fringe: HashMap::new(),
            clusters,
        }
    }

    fn select(&mut self, graph: &AnchorGraph, anchor: AnchorId) {
        self.fringe.remove(&anchor);
        self.selected.push(anchor);
        self.members.insert(anchor);
        if let Some(clusters) = self.clusters.as_mut() {
            clusters.mark(anchor);
        }

        for (neighbor, weight) in graph.neighbors(anchor) {
            if !self.members.contains(&neighbor) {
                *self.fringe.entry(neighbor).or_insert(0.0) += weight;
            }
        }
    }

    fn heaviest(&self) -> Option<AnchorId> {
        self.fringe
            .iter()
            .max_by_key(|&(&anchor, &weight)| rank_key(anchor, weight))
            .map(|(&anchor, _)| anchor)
    }

    /// The next anchor to select, or `None` once the fringe is exhausted.
    fn next(&self) -> Result<Option<AnchorId>> {
        let Some(clusters) = self.clusters.as_ref().filter(|c| !c.exhausted()) else {
            return Ok(self.heaviest());
        };

        let mut candidates: Vec<(AnchorId, f64)> =
            self.fringe.iter().map(|(&a, &w)| (a, w)).collect();
        if candidates.is_empty() {
            return Ok(None);
        }
        candidates.sort_unstable_by_key(|&(anchor, weight)| Reverse(rank_key(anchor, weight)));

        if let Some(&(anchor, _)) = candidates.iter().find(|(a, _)| clusters.is_unseen(*a)) {
            return Ok(Some(anchor));
        }

        if clusters.unseen_pending() {
            // unseen clusters exist but none is adjacent to the selected set yet
            debug!(
                "no unseen cluster on the fringe ({} of {} seen), taking heaviest",
                clusters.seen.len(),
                clusters.total
            );
            return Ok(Some(candidates[0].0));
        }

        Err(RankError::InvariantViolation(format!(
            "{} of {} clusters seen but no unselected anchor carries an unseen cluster",
            clusters.seen.len(),
            clusters.total
        )))
    }
}

/// Grows a ranking over a static graph. One engine can serve any number of
/// runs; each run owns its own selection state.
#[derive(Clone, Copy)]
pub struct GrowthEngine<'g> {
    graph: &'g AnchorGraph,
    classifier: Option<&'g dyn Classifier>,
}

impl<'g> GrowthEngine<'g> {
    pub fn new(graph: &'g AnchorGraph) -> Self {
        Self {
            graph,
            classifier: None,
        }
    }

    /// Prefer anchors from clusters not yet represented until all are covered.
    pub fn with_diversity(mut self, classifier: &'g dyn Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn grow(&self, seed: AnchorId) -> Result<GrowthOutcome> {
        self.grow_from(&[seed])
    }

    /// Selects `seeds` in order, bypassing the selection rule, then grows
    /// greedily until the fringe is empty.
    ///
    /// Seeds absent from the graph still take their rank but add no fringe
    /// weight. Repeated seeds are skipped.
    pub fn grow_from(&self, seeds: &[AnchorId]) -> Result<GrowthOutcome> {
        if seeds.is_empty() {
            return Err(RankError::InvalidArgument(
                "growth needs at least one seed".to_string(),
            ));
        }

        let clusters = self.classifier.map(|classifier| {
            let mut universe = self.graph.reachable_from(seeds.iter().copied());
            universe.extend(seeds.iter().copied());
            let tracker = ClusterTracker::new(classifier, universe);
            if tracker.total == 0 {
                warn!(
                    "diversity requested but no anchor reachable from seed {} has a cluster",
                    seeds[0]
                );
            }
            tracker
        });

        let mut state = SelectionState::new(clusters);
        let mut series = SnapshotSeries::new();

        for &seed in seeds {
            if state.members.contains(&seed) {
                warn!("duplicate seed {} ignored", seed);
                continue;
            }
            state.select(self.graph, seed);
            series.record(&state.selected);
        }

        while let Some(anchor) = state.next()? {
            state.select(self.graph, anchor);
            series.record(&state.selected);
        }

        let graph_nodes = self.graph.num_nodes();
        let covered = state
            .selected
            .iter()
            .filter(|&&anchor| self.graph.contains(anchor))
            .count();

        let coverage = if covered == graph_nodes {
            Coverage::Complete
        } else {
            warn!(
                "graph is disconnected: selected {} of {} anchors from seed {}",
                covered, graph_nodes, seeds[0]
            );
            Coverage::Partial {
                selected: covered,
                graph_nodes,
            }
        };

        Ok(GrowthOutcome { series, coverage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const A: AnchorId = 1;
    const B: AnchorId = 2;
    const C: AnchorId = 3;
    const D: AnchorId = 4;

    fn graph(edges: &[(AnchorId, AnchorId, f64)]) -> AnchorGraph {
        let mut g = AnchorGraph::new();
        for &(a, b, w) in edges {
            g.add_edge(a, b, w);
        }
        g
    }

    fn clusters(entries: &[(AnchorId, &str)]) -> HashMap<AnchorId, String> {
        entries.iter().map(|&(a, c)| (a, c.to_string())).collect()
    }

    #[test]
    fn grows_reference_graph_in_weight_order() -> Result<()> {
        let g = graph(&[(A, B, 10.0), (B, C, 8.0), (A, C, 5.0), (C, D, 1.0)]);
        let outcome = GrowthEngine::new(&g).grow(A)?;

        assert_eq!(outcome.series.get(2), Some(&[A, B][..]));
        assert_eq!(outcome.series.get(3), Some(&[A, B, C][..]));
        assert_eq!(outcome.series.get(4), Some(&[A, B, C, D][..]));
        assert_eq!(outcome.series.len(), 3);
        assert!(outcome.is_complete());
        Ok(())
    }

    #[test]
    fn fringe_scores_accumulate_across_selected_anchors() -> Result<()> {
        // After 1 and 3 are selected, 2 scores 5 + 4 = 9 and beats 4 at 8.
        // A replace-on-update fringe would score 2 at 4 and pick 4 instead.
        let g = graph(&[(1, 3, 7.0), (1, 2, 5.0), (3, 2, 4.0), (3, 4, 8.0)]);
        let outcome = GrowthEngine::new(&g).grow(1)?;
        assert_eq!(outcome.series.ranking(), &[1, 3, 2, 4]);
        Ok(())
    }

    #[test]
    fn equal_weights_pick_lowest_anchor() -> Result<()> {
        let g = graph(&[(10, 30, 2.0), (10, 20, 2.0), (10, 40, 2.0)]);
        let outcome = GrowthEngine::new(&g).grow(10)?;
        assert_eq!(outcome.series.ranking(), &[10, 20, 30, 40]);
        Ok(())
    }

    #[test]
    fn disconnected_graph_yields_partial_coverage() -> Result<()> {
        let g = graph(&[(1, 2, 3.0), (2, 3, 4.0), (7, 8, 9.0)]);
        let outcome = GrowthEngine::new(&g).grow(1)?;

        assert_eq!(outcome.series.max_k(), Some(3));
        assert_eq!(
            outcome.coverage,
            Coverage::Partial {
                selected: 3,
                graph_nodes: 5
            }
        );
        assert!(!outcome.series.ranking().contains(&7));
        Ok(())
    }

    #[test]
    fn isolated_seed_records_nothing() -> Result<()> {
        let mut g = graph(&[(1, 2, 3.0)]);
        g.add_node(9);
        let outcome = GrowthEngine::new(&g).grow(9)?;
        assert!(outcome.series.is_empty());
        assert!(!outcome.is_complete());
        Ok(())
    }

    #[test]
    fn empty_seed_list_is_rejected() {
        let g = graph(&[(1, 2, 3.0)]);
        let err = GrowthEngine::new(&g).grow_from(&[]).unwrap_err();
        assert!(matches!(err, RankError::InvalidArgument(_)));
    }

    #[test]
    fn preseeded_prefix_keeps_sample_order() -> Result<()> {
        let g = graph(&[(1, 2, 1.0), (2, 3, 1.0), (3, 4, 50.0), (1, 5, 2.0)]);
        // 99 is not in the graph but still occupies its rank.
        let outcome = GrowthEngine::new(&g).grow_from(&[3, 99, 1, 3])?;

        assert_eq!(outcome.series.get(2), Some(&[3, 99][..]));
        assert_eq!(outcome.series.get(3), Some(&[3, 99, 1][..]));
        // 4 (50) beats 2 (1 + 1) and 5 (2); then 2 (2) ties 5 (2) -> lower id.
        assert_eq!(outcome.series.ranking(), &[3, 99, 1, 4, 2, 5]);
        assert!(outcome.is_complete());
        Ok(())
    }

    #[test]
    fn diversity_prefers_unseen_clusters() -> Result<()> {
        let g = graph(&[
            (1, 2, 100.0),
            (1, 3, 10.0),
            (1, 4, 5.0),
            (2, 3, 10.0),
            (2, 4, 5.0),
            (3, 4, 1.0),
        ]);
        let countries = clusters(&[(1, "FR"), (2, "FR"), (3, "DE"), (4, "US")]);

        let plain = GrowthEngine::new(&g).grow(1)?;
        assert_eq!(plain.series.get(2), Some(&[1, 2][..]));

        let diverse = GrowthEngine::new(&g).with_diversity(&countries).grow(1)?;
        assert_eq!(diverse.series.get(2), Some(&[1, 3][..]));
        assert_eq!(diverse.series.get(3), Some(&[1, 3, 4][..]));
        // all clusters covered: back to pure weight
        assert_eq!(diverse.series.ranking(), &[1, 3, 4, 2]);
        Ok(())
    }

    #[test]
    fn diversity_takes_heaviest_when_unseen_cluster_is_not_adjacent() -> Result<()> {
        let g = graph(&[(1, 2, 1.0), (2, 3, 1.0)]);
        let labels = clusters(&[(1, "A"), (2, "A"), (3, "B")]);
        let outcome = GrowthEngine::new(&g).with_diversity(&labels).grow(1)?;
        assert_eq!(outcome.series.ranking(), &[1, 2, 3]);
        Ok(())
    }

    #[test]
    fn unlabelled_anchors_never_count_as_unseen() -> Result<()> {
        let g = graph(&[(1, 2, 9.0), (1, 3, 1.0)]);
        let labels = clusters(&[(1, "A"), (3, "B")]);
        let outcome = GrowthEngine::new(&g).with_diversity(&labels).grow(1)?;
        assert_eq!(outcome.series.ranking(), &[1, 3, 2]);
        Ok(())
    }

    #[test]
    fn preseeded_clusters_count_as_seen() -> Result<()> {
        let g = graph(&[(1, 3, 50.0), (2, 3, 50.0), (1, 4, 20.0), (2, 5, 1.0)]);
        let countries = clusters(&[(1, "FR"), (2, "DE"), (3, "FR"), (4, "DE"), (5, "US")]);

        let outcome = GrowthEngine::new(&g)
            .with_diversity(&countries)
            .grow_from(&[1, 2])?;
        // FR and DE come with the seeds, so US is the only unseen cluster
        assert_eq!(outcome.series.ranking(), &[1, 2, 5, 3, 4]);
        Ok(())
    }

    #[test]
    fn no_clusters_falls_back_to_weight() -> Result<()> {
        let g = graph(&[(A, B, 10.0), (B, C, 8.0), (A, C, 5.0), (C, D, 1.0)]);
        let unlabelled: HashMap<AnchorId, String> = HashMap::new();
        let outcome = GrowthEngine::new(&g).with_diversity(&unlabelled).grow(A)?;
        assert_eq!(outcome.series.ranking(), &[A, B, C, D]);
        Ok(())
    }

    /// Labels 2 as "B" while the cluster universe is counted, then as "A".
    struct RelabellingClassifier {
        calls: AtomicUsize,
    }

    impl Classifier for RelabellingClassifier {
        fn cluster_of(&self, anchor: AnchorId) -> Option<&str> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match (anchor, call) {
                (2, 0..=1) => Some("B"),
                _ => Some("A"),
            }
        }
    }

    #[test]
    fn vanished_cluster_is_an_invariant_violation() {
        let g = graph(&[(1, 2, 1.0)]);
        let labels = RelabellingClassifier {
            calls: AtomicUsize::new(0),
        };
        let err = GrowthEngine::new(&g)
            .with_diversity(&labels)
            .grow(1)
            .unwrap_err();
        assert!(matches!(err, RankError::InvariantViolation(_)), "got {:?}", err);
    }
}
