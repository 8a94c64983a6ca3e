pub mod topology {
    use serde::{Deserialize, Serialize};
    use std::collections::{BTreeMap, BTreeSet, VecDeque};

    /// Opaque anchor identifier (a RIPE Atlas probe id).
    pub type AnchorId = u32;

    /// An undirected, simple, weighted graph over anchors.
    /// Adjacency map: AnchorId -> NeighborID -> weight, stored in both directions.
    /// Weights are kilometers or milliseconds and never negative.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct AnchorGraph {
        adj: BTreeMap<AnchorId, BTreeMap<AnchorId, f64>>,
    }

    impl AnchorGraph {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn num_nodes(&self) -> usize {
            self.adj.len()
        }

        pub fn num_edges(&self) -> usize {
            self.adj.values().map(|neighbors| neighbors.len()).sum::<usize>() / 2
        }

        pub fn contains(&self, id: AnchorId) -> bool {
            self.adj.contains_key(&id)
        }

        pub fn degree(&self, id: AnchorId) -> usize {
            self.adj.get(&id).map_or(0, |neighbors| neighbors.len())
        }

        pub fn nodes(&self) -> impl Iterator<Item = AnchorId> + '_ {
            self.adj.keys().copied()
        }

        pub fn neighbors(&self, id: AnchorId) -> impl Iterator<Item = (AnchorId, f64)> + '_ {
            self.adj
                .get(&id)
                .into_iter()
                .flatten()
                .map(|(&neighbor, &weight)| (neighbor, weight))
        }

        pub fn weight(&self, a: AnchorId, b: AnchorId) -> Option<f64> {
            self.adj.get(&a).and_then(|neighbors| neighbors.get(&b)).copied()
        }

        /// Every edge once, as `(low, high, weight)`.
        pub fn edges(&self) -> impl Iterator<Item = (AnchorId, AnchorId, f64)> + '_ {
            self.adj.iter().flat_map(|(&a, neighbors)| {
                neighbors
                    .iter()
                    .filter(move |&(&b, _)| a < b)
                    .map(move |(&b, &w)| (a, b, w))
            })
        }

        pub fn add_node(&mut self, id: AnchorId) {
            self.adj.entry(id).or_default();
        }

        /// Inserts the edge, replacing any previous weight for the pair.
        /// Self-loops and negative or non-finite weights are ignored.
        pub fn add_edge(&mut self, a: AnchorId, b: AnchorId, weight: f64) {
            if a == b || !weight.is_finite() || weight < 0.0 {
                return;
            }
            self.adj.entry(a).or_default().insert(b, weight);
            self.adj.entry(b).or_default().insert(a, weight);
        }

        /// Nodes reachable from any of `seeds` (seeds absent from the graph are ignored).
        pub fn reachable_from<I>(&self, seeds: I) -> BTreeSet<AnchorId>
        where
            I: IntoIterator<Item = AnchorId>,
        {
            let mut seen = BTreeSet::new();
            let mut queue: VecDeque<AnchorId> = seeds
                .into_iter()
                .filter(|seed| self.contains(*seed))
                .collect();

            while let Some(node) = queue.pop_front() {
                if !seen.insert(node) {
                    continue;
                }
                for (neighbor, _) in self.neighbors(node) {
                    if !seen.contains(&neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
            seen
        }

        /// Sum of edge weights in the subgraph induced by `nodes`.
        pub fn induced_weight(&self, nodes: &[AnchorId]) -> f64 {
            let members: BTreeSet<AnchorId> = nodes.iter().copied().collect();
            members
                .iter()
                .flat_map(|&a| self.neighbors(a).filter(move |&(b, _)| a < b))
                .filter(|(b, _)| members.contains(b))
                .map(|(_, w)| w)
                .sum()
        }
    }

}

pub mod attributes {
    use crate::topology::AnchorId;
    use serde::{Deserialize, Serialize};
    use std::collections::{BTreeMap, HashMap};
    use std::fmt;
    use std::str::FromStr;

    /// Categorical dimension used for diversity-constrained selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Category {
        City,
        Country,
        Asn,
        Continent,
    }

    impl FromStr for Category {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_lowercase().as_str() {
                "city" => Ok(Self::City),
                "country" | "cnt" => Ok(Self::Country),
                "asn" | "as" => Ok(Self::Asn),
                "continent" => Ok(Self::Continent),
                other => Err(format!("unknown category: {}", other)),
            }
        }
    }

    impl fmt::Display for Category {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let name = match self {
                Self::City => "city",
                Self::Country => "country",
                Self::Asn => "asn",
                Self::Continent => "continent",
            };
            f.write_str(name)
        }
    }

    /// Metadata known about a single anchor. Country is ISO 3166 alpha-2.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct AnchorMeta {
        pub city: Option<String>,
        pub country: Option<String>,
        pub asn: Option<String>,
        pub continent: Option<String>,
    }

    impl AnchorMeta {
        pub fn get(&self, category: Category) -> Option<&str> {
            let value = match category {
                Category::City => &self.city,
                Category::Country => &self.country,
                Category::Asn => &self.asn,
                Category::Continent => &self.continent,
            };
            value.as_deref().filter(|v| !v.is_empty())
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct AnchorAttributes {
        meta: HashMap<AnchorId, AnchorMeta>,
    }

    impl AnchorAttributes {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&mut self, anchor: AnchorId, meta: AnchorMeta) {
            self.meta.insert(anchor, meta);
        }

        pub fn get(&self, anchor: AnchorId) -> Option<&AnchorMeta> {
            self.meta.get(&anchor)
        }

        pub fn len(&self) -> usize {
            self.meta.len()
        }

        pub fn is_empty(&self) -> bool {
            self.meta.is_empty()
        }

        /// Groups anchors by their value for `category`; anchor lists are sorted.
        pub fn anchors_by(&self, category: Category) -> BTreeMap<String, Vec<AnchorId>> {
            let mut groups: BTreeMap<String, Vec<AnchorId>> = BTreeMap::new();
            for (&anchor, meta) in &self.meta {
                if let Some(value) = meta.get(category) {
                    groups.entry(value.to_string()).or_default().push(anchor);
                }
            }
            for anchors in groups.values_mut() {
                anchors.sort_unstable();
            }
            groups
        }

        pub fn classifier(&self, category: Category) -> CategoryView<'_> {
            CategoryView {
                attrs: self,
                category,
            }
        }
    }

    /// Maps an anchor to its cluster value. `None` means the anchor has no
    /// value for the dimension and never counts as an unseen cluster.
    pub trait Classifier: Send + Sync {
        fn cluster_of(&self, anchor: AnchorId) -> Option<&str>;
    }

    /// One categorical dimension of an [`AnchorAttributes`] table.
    #[derive(Debug, Clone, Copy)]
    pub struct CategoryView<'a> {
        attrs: &'a AnchorAttributes,
        category: Category,
    }

    impl Classifier for CategoryView<'_> {
        fn cluster_of(&self, anchor: AnchorId) -> Option<&str> {
            self.attrs.get(anchor).and_then(|meta| meta.get(self.category))
        }
    }

    impl Classifier for HashMap<AnchorId, String> {
        fn cluster_of(&self, anchor: AnchorId) -> Option<&str> {
            self.get(&anchor).map(String::as_str)
        }
    }
}

pub mod builder;
pub mod config;
pub mod driver;
pub mod error;
pub mod geo;
pub mod growth;
pub mod ingest;
pub mod persistence;
pub mod seed;

pub use attributes::{AnchorAttributes, AnchorMeta, Category, Classifier};
pub use error::{RankError, Result};
pub use growth::{Coverage, GrowthEngine, GrowthOutcome, SnapshotSeries};
pub use topology::{AnchorGraph, AnchorId};
