use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use landmark_core::builder::RttGraphBuilder;
use landmark_core::config::EngineConfig;
use landmark_core::driver::{RunDriver, SeedPolicy};
use landmark_core::persistence::{self, SnapshotArchive, SnapshotFormat};
use landmark_core::seed::ClaimedLocationIndex;
use landmark_core::{geo, ingest, AnchorGraph, AnchorId, Category, Classifier};
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "landmark",
    version,
    about = "Rank measurement anchors by greedy incremental landmark selection"
)]
struct Cli {
    /// Overrides LANDMARK_DATA_PATH
    #[arg(long, global = true, value_name = "DIR")]
    data_path: Option<PathBuf>,

    /// Fixed generator seed (overrides LANDMARK_RNG_SEED)
    #[arg(long, global = true)]
    rng_seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Great-circle distance between every pair of anchors
    Distances(DistancesCmd),
    /// Build the anchor graph from a weight table or from RTT samples
    BuildGraph(BuildGraphCmd),
    /// Grow rankings over a graph and persist the snapshots
    Rank(RankCmd),
}

#[derive(Args, Debug)]
struct DistancesCmd {
    #[arg(long, value_name = "CSV", help = "Landmark table (pid, latitude, longitude, ...)")]
    landmarks: PathBuf,

    /// Geolocation result table whose header lists the anchors
    #[arg(long, value_name = "CSV")]
    universe: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct BuildGraphCmd {
    #[arg(long, value_name = "FILE", conflicts_with = "rtt", required_unless_present = "rtt")]
    weights: Option<PathBuf>,

    #[arg(long, value_name = "CSV", help = "RTT samples (target, msm_id, origin, timestamp, rtt)")]
    rtt: Option<PathBuf>,

    /// Distance table used to drop implausible RTTs
    #[arg(long, value_name = "FILE", requires = "rtt")]
    distances: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct RankCmd {
    #[arg(long, value_name = "FILE")]
    graph: PathBuf,

    #[arg(long, value_enum, default_value_t = PolicyArg::MaxEdge)]
    policy: PolicyArg,

    /// Diversity dimension (city, country, asn, continent); overrides LANDMARK_DIVERSITY
    #[arg(long)]
    diversity: Option<Category>,

    #[arg(long, value_name = "CSV", help = "Landmark table, required for diversity")]
    landmarks: Option<PathBuf>,

    #[arg(long, value_name = "CSV", help = "Anchor universe for random-sample")]
    universe: Option<PathBuf>,

    /// Overrides LANDMARK_SAMPLE_SIZE
    #[arg(long)]
    sample_size: Option<usize>,

    #[arg(long, value_name = "CSV", help = "Queries (ip, claimed_country_iso3)")]
    queries: Option<PathBuf>,

    #[arg(long, value_name = "CSV", help = "ISO 3166 table (ISO_A3, ISO_A2)")]
    countries: Option<PathBuf>,

    #[arg(long, value_name = "CSV", help = "Per-country reference distances")]
    reference_distances: Option<PathBuf>,

    /// Defaults to <data-path>/selected_<policy>.<format>
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PolicyArg {
    MaxEdge,
    RandomSample,
    ClaimedLocation,
}

impl PolicyArg {
    fn into_policy(self, sample_size: usize) -> SeedPolicy {
        match self {
            Self::MaxEdge => SeedPolicy::MaxEdge,
            Self::RandomSample => SeedPolicy::RandomSample { sample_size },
            Self::ClaimedLocation => SeedPolicy::ClaimedLocation,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("landmark_core=info,landmark=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn required<'a>(value: &'a Option<PathBuf>, flag: &str, policy: &str) -> Result<&'a Path> {
    match value {
        Some(path) => Ok(path),
        None => bail!("--{} is required for {}", flag, policy),
    }
}

fn load_graph(path: &Path) -> Result<AnchorGraph> {
    let graph: AnchorGraph = persistence::load(path, SnapshotFormat::from_path(path))
        .with_context(|| format!("Failed to load graph: {:?}", path))?;
    info!(
        "graph {:?}: {} anchors, {} edges",
        path,
        graph.num_nodes(),
        graph.num_edges()
    );
    Ok(graph)
}

fn distances(cmd: DistancesCmd) -> Result<()> {
    let landmarks = ingest::load_landmarks(&cmd.landmarks)?;
    let anchors: Vec<AnchorId> = match &cmd.universe {
        Some(path) => ingest::load_anchor_universe(path)?,
        None => {
            let mut all: Vec<AnchorId> = landmarks.locations.keys().copied().collect();
            all.sort_unstable();
            all
        }
    };

    let (table, _missing) = geo::pairwise_distances(&anchors, &landmarks.locations);
    persistence::save(&cmd.out, &table, SnapshotFormat::from_path(&cmd.out))?;
    info!("💾 {} distances saved to {:?}", table.len(), cmd.out);
    Ok(())
}

fn build_graph(cmd: BuildGraphCmd) -> Result<()> {
    let graph = match (&cmd.weights, &cmd.rtt) {
        (Some(weights), _) => ingest::load_weight_table(weights)?.to_graph(),
        (None, Some(rtt)) => {
            let samples = ingest::load_rtt_samples(rtt)?;
            let distances = cmd
                .distances
                .as_deref()
                .map(ingest::load_weight_table)
                .transpose()?;
            let builder = match &distances {
                Some(table) => RttGraphBuilder::new().with_distances(table),
                None => RttGraphBuilder::new(),
            };
            builder.build(&samples).0
        }
        (None, None) => bail!("either --weights or --rtt is required"),
    };

    persistence::save(&cmd.out, &graph, SnapshotFormat::from_path(&cmd.out))?;
    info!(
        "💾 graph with {} anchors and {} edges saved to {:?}",
        graph.num_nodes(),
        graph.num_edges(),
        cmd.out
    );
    Ok(())
}

fn rank(cmd: RankCmd, mut config: EngineConfig) -> Result<()> {
    if let Some(category) = cmd.diversity {
        config.diversity = Some(category);
    }
    if let Some(size) = cmd.sample_size {
        config.sample_size = size;
    }

    let graph = load_graph(&cmd.graph)?;
    let landmarks = cmd
        .landmarks
        .as_deref()
        .map(ingest::load_landmarks)
        .transpose()?;

    let classifier = match (config.diversity, &landmarks) {
        (Some(category), Some(landmarks)) if landmarks.attributes.is_empty() => {
            bail!("landmark table is empty, cannot apply {} diversity", category)
        }
        (Some(category), Some(landmarks)) => Some(landmarks.attributes.classifier(category)),
        (Some(category), None) => bail!("--landmarks is required for {} diversity", category),
        (None, _) => None,
    };

    let mut driver = RunDriver::new(&graph);
    if let Some(classifier) = classifier.as_ref() {
        driver = driver.with_diversity(classifier as &dyn Classifier);
    }

    let mut rng = config.rng();
    let policy = cmd.policy.into_policy(config.sample_size);
    info!(
        "start... {}, diversity {:?}",
        policy.name(),
        config.diversity
    );

    let archive = match policy {
        SeedPolicy::MaxEdge => {
            let outcome = driver.run_global(&mut rng)?;
            SnapshotArchive::single(policy.name(), config.diversity, outcome.series)
        }
        SeedPolicy::RandomSample { sample_size } => {
            let path = required(&cmd.universe, "universe", policy.name())?;
            let universe = ingest::load_anchor_universe(path)?;
            let outcome = driver.run_repeated_seed(&universe, sample_size, &mut rng)?;
            SnapshotArchive::single(policy.name(), config.diversity, outcome.series)
        }
        SeedPolicy::ClaimedLocation => {
            let queries = ingest::load_queries(required(&cmd.queries, "queries", policy.name())?)?;
            let iso =
                ingest::load_country_codes(required(&cmd.countries, "countries", policy.name())?)?;
            let nearest = ingest::load_reference_distances(required(
                &cmd.reference_distances,
                "reference-distances",
                policy.name(),
            )?)?;
            let by_country = match &landmarks {
                Some(landmarks) => landmarks.attributes.anchors_by(Category::Country),
                None => bail!("--landmarks is required for {}", policy.name()),
            };

            let index = ClaimedLocationIndex::new(iso, by_country, nearest);
            let report = driver.run_per_query(&queries, &index, rng.random());
            if report.succeeded() == 0 && report.failed() > 0 {
                bail!("all {} queries failed", report.failed());
            }
            report.into_archive(config.diversity)
        }
    };

    let out = match cmd.out {
        Some(path) => path,
        None => {
            let ext = match config.format {
                SnapshotFormat::Json => "json",
                SnapshotFormat::Bincode => "bin",
            };
            config
                .data_path
                .join(format!("selected_{}.{}", policy.name().replace('-', "_"), ext))
        }
    };
    let format = match format_hint(&out) {
        Some(format) => format,
        None => config.format,
    };
    archive.save_to_file(&out, format)?;
    Ok(())
}

/// An explicit extension wins over the configured format.
fn format_hint(path: &Path) -> Option<SnapshotFormat> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.parse().ok())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    if let Some(path) = cli.data_path {
        config.data_path = path;
    }
    if cli.rng_seed.is_some() {
        config.rng_seed = cli.rng_seed;
    }

    let started = std::time::Instant::now();
    match cli.command {
        Command::Distances(cmd) => distances(cmd)?,
        Command::BuildGraph(cmd) => build_graph(cmd)?,
        Command::Rank(cmd) => rank(cmd, config)?,
    }
    info!("done in {:.1?}", started.elapsed());
    Ok(())
}
