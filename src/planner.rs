//! End-to-end route planning.
//!
//! [`Planner::plan`] runs the whole pipeline on the calling thread:
//! road network, distance matrix, tour, route geometry. [`Planner::spawn`]
//! runs the same work on the rayon pool and reports through a bounded
//! channel. Progress messages arrive in order with non-decreasing
//! percentages, and the [`PlanningEvent::Finished`] event is always last.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info, warn};

use crate::cache::{CacheKey, Freshness, ResultCache};
use crate::config::PlannerConfig;
use crate::coordinate::Coordinate;
use crate::error::PlanningError;
use crate::matrix::{DistanceMatrix, DistanceMatrixBuilder};
use crate::network::{NetworkProvider, NetworkSource, ResolvedNetwork, synthesize};
use crate::overpass::{HttpProbe, OverpassClient};
use crate::polyline::Polyline;
use crate::solver::{self, SolverChoice, SolverPolicy, Tour};
use crate::traits::{ConnectivityProbe, NetworkService};

/// Progress events buffered before the worker waits for the consumer.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub percent: u8,
    pub message: String,
}

#[derive(Debug)]
pub enum PlanningEvent<T> {
    Progress(Progress),
    Finished(Result<T, PlanningError>),
}

/// Receiving end of a spawned planning task.
#[derive(Debug)]
pub struct PlanningHandle<T> {
    events: Receiver<PlanningEvent<T>>,
}

impl<T> PlanningHandle<T> {
    /// Blocks for the next event. `None` once the task has finished and
    /// every event was received.
    pub fn recv(&self) -> Option<PlanningEvent<T>> {
        self.events.recv().ok()
    }

    pub fn events(&self) -> &Receiver<PlanningEvent<T>> {
        &self.events
    }

    /// Drains progress into `on_progress` and returns the final result.
    pub fn wait<F>(self, mut on_progress: F) -> Result<T, PlanningError>
    where
        F: FnMut(Progress),
    {
        for event in self.events.iter() {
            match event {
                PlanningEvent::Progress(progress) => on_progress(progress),
                PlanningEvent::Finished(result) => return result,
            }
        }
        Err(PlanningError::WorkerLost)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    pub network: Duration,
    pub matrix: Duration,
    pub solver: Duration,
    pub geometry: Duration,
    pub total: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanningResult {
    pub tour: Tour,
    pub route: Polyline,
    pub elapsed: Duration,
    pub timings: StageTimings,
    pub source: NetworkSource,
}

impl PlanningResult {
    /// Meters.
    pub fn total_distance(&self) -> f64 {
        self.tour.total_distance
    }

    pub fn algorithm_label(&self) -> &'static str {
        self.tour.algorithm.label()
    }
}

/// Exact and approximate runs over the same stops.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub exact: PlanningResult,
    pub approximate: PlanningResult,
}

impl Comparison {
    /// How much longer the approximate tour is, in meters.
    pub fn distance_gap_m(&self) -> f64 {
        self.approximate.total_distance() - self.exact.total_distance()
    }

    pub fn distance_gap_percent(&self) -> f64 {
        let exact = self.exact.total_distance();
        if exact > 0.0 {
            self.distance_gap_m() / exact * 100.0
        } else {
            0.0
        }
    }

    /// Exact solver time over approximate solver time. `None` when the
    /// approximate run was too fast to measure.
    pub fn speed_ratio(&self) -> Option<f64> {
        let approximate = self.approximate.timings.solver.as_secs_f64();
        (approximate > 0.0).then(|| self.exact.timings.solver.as_secs_f64() / approximate)
    }
}

/// Maps stage progress onto a slice of the overall bar and keeps it from
/// going backwards.
struct ProgressScale<'a> {
    sink: &'a mut dyn FnMut(Progress),
    start: u8,
    span: u8,
    prefix: &'static str,
    last: u8,
}

impl<'a> ProgressScale<'a> {
    fn new(sink: &'a mut dyn FnMut(Progress), start: u8, span: u8, prefix: &'static str) -> Self {
        Self {
            sink,
            start,
            span,
            prefix,
            last: start,
        }
    }

    fn report(&mut self, percent: u8, message: impl AsRef<str>) {
        let scaled = self.start as u16 + percent.min(100) as u16 * self.span as u16 / 100;
        let percent = (scaled.min(100) as u8).max(self.last);
        self.last = percent;
        (self.sink)(Progress {
            percent,
            message: format!("{}{}", self.prefix, message.as_ref()),
        });
    }
}

pub struct Planner {
    network: NetworkProvider,
    matrix_builder: DistanceMatrixBuilder,
    cache: ResultCache,
    policy: SolverPolicy,
    seed: Option<u64>,
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("network", &self.network)
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Planner {
    pub fn new(
        config: &PlannerConfig,
        service: Arc<dyn NetworkService>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let cache = ResultCache::new(
            config.cache_dir.clone(),
            config.cache_timeout(),
            config.cache_sweep_probability,
            Arc::clone(&probe),
        );
        Self {
            network: NetworkProvider::new(service, probe, config.network_options()),
            matrix_builder: DistanceMatrixBuilder::new(config.all_pairs_threshold),
            cache,
            policy: SolverPolicy::new(config.max_stops_exact),
            seed: None,
        }
    }

    /// Planner backed by the Overpass service and an HTTP connectivity probe.
    pub fn from_config(config: &PlannerConfig) -> Result<Self, reqwest::Error> {
        let service = OverpassClient::new(config.overpass_config())?;
        let probe = HttpProbe::new(config.probe_urls.clone(), config.probe_timeout())?;
        Ok(Self::new(config, Arc::new(service), Arc::new(probe)))
    }

    /// Fixes the seed used for node jitter and cache sweeps.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn policy(&self) -> &SolverPolicy {
        &self.policy
    }

    /// Plans a tour over `coords`, where `coords[0]` is the depot.
    pub fn plan(
        &self,
        coords: &[Coordinate],
        choice: SolverChoice,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<PlanningResult, PlanningError> {
        let mut scale = ProgressScale::new(progress, 0, 100, "");
        self.run(coords, choice, &mut scale)
    }

    /// Runs the exact solver, then the approximate one, over the same stops.
    /// The exact run reports 0-50% and the approximate run 50-100%.
    pub fn compare(
        &self,
        coords: &[Coordinate],
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Comparison, PlanningError> {
        let exact = {
            let mut scale = ProgressScale::new(progress, 0, 50, "Exact: ");
            self.run(coords, SolverChoice::Exact, &mut scale)?
        };
        let approximate = {
            let mut scale = ProgressScale::new(progress, 50, 50, "Approximate: ");
            self.run(coords, SolverChoice::Approximate, &mut scale)?
        };

        let comparison = Comparison { exact, approximate };
        info!(
            gap_m = comparison.distance_gap_m(),
            gap_percent = comparison.distance_gap_percent(),
            speed_ratio = ?comparison.speed_ratio(),
            "comparison finished"
        );
        Ok(comparison)
    }

    /// Runs [`plan`](Self::plan) on the rayon pool.
    pub fn spawn(self: &Arc<Self>, coords: Vec<Coordinate>, choice: SolverChoice) -> PlanningHandle<PlanningResult> {
        let planner = Arc::clone(self);
        spawn_task(move |progress| planner.plan(&coords, choice, progress))
    }

    /// Runs [`compare`](Self::compare) on the rayon pool.
    pub fn spawn_comparison(self: &Arc<Self>, coords: Vec<Coordinate>) -> PlanningHandle<Comparison> {
        let planner = Arc::clone(self);
        spawn_task(move |progress| planner.compare(&coords, progress))
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    fn run(
        &self,
        coords: &[Coordinate],
        choice: SolverChoice,
        progress: &mut ProgressScale<'_>,
    ) -> Result<PlanningResult, PlanningError> {
        if coords.is_empty() {
            return Err(PlanningError::NoCoordinates);
        }
        let started = Instant::now();
        let mut timings = StageTimings::default();
        let mut rng = self.rng();
        self.cache.maybe_sweep(&mut rng);

        progress.report(10, "Fetching road network");
        let stage = Instant::now();
        let resolved = self.resolve(coords, &mut rng);
        timings.network = stage.elapsed();
        progress.report(
            40,
            format!("Road network ready ({} nodes)", resolved.graph.node_count()),
        );

        let stage = Instant::now();
        let matrix = self.distance_matrix(&resolved)?;
        timings.matrix = stage.elapsed();
        progress.report(60, "Distance matrix ready");

        let algorithm = self.policy.select(choice, matrix.len());
        progress.report(70, format!("Running {}", algorithm.label()));
        let stage = Instant::now();
        let tour = solver::run(algorithm, &matrix)?;
        timings.solver = stage.elapsed();

        let stage = Instant::now();
        let route = reconstruct_route(&resolved, &tour, progress);
        timings.geometry = stage.elapsed();

        let elapsed = started.elapsed();
        timings.total = elapsed;
        progress.report(100, "Done");

        info!(
            stops = coords.len() - 1,
            algorithm = %tour.algorithm,
            distance_m = tour.total_distance,
            network_ms = timings.network.as_millis() as u64,
            matrix_ms = timings.matrix.as_millis() as u64,
            solver_ms = timings.solver.as_millis() as u64,
            geometry_ms = timings.geometry.as_millis() as u64,
            total_ms = timings.total.as_millis() as u64,
            "route planned"
        );

        Ok(PlanningResult {
            tour,
            route,
            elapsed,
            timings,
            source: resolved.source,
        })
    }

    fn resolve(&self, coords: &[Coordinate], rng: &mut StdRng) -> ResolvedNetwork {
        let options = self.network.options();
        let key = coords
            .iter()
            .fold(CacheKey::new("get_graph_and_nodes"), |key, coord| key.arg(coord))
            .kwarg("network_type", options.network_type)
            .kwarg("buffer", options.buffer_degrees);

        let resolved = self
            .cache
            .get_or_insert_with(&key, Freshness::OfflineTolerant, || {
                self.network.resolve(coords, rng)
            });

        if resolved.assignment.len() != coords.len() {
            warn!(
                assigned = resolved.assignment.len(),
                coords = coords.len(),
                "road network left stops unassigned, using straight-line graph"
            );
            return synthesize(coords);
        }
        resolved
    }

    fn distance_matrix(&self, resolved: &ResolvedNetwork) -> Result<DistanceMatrix, PlanningError> {
        let key = CacheKey::new("distance_matrix")
            .arg(format!("{:016x}", resolved.graph.fingerprint()))
            .arg(&resolved.assignment);

        let matrix = self.cache.get_or_compute(&key, Freshness::Strict, || {
            self.matrix_builder.build(&resolved.graph, &resolved.assignment)
        })?;
        Ok(matrix)
    }
}

/// Follows the road between consecutive tour stops. Legs without a road
/// path become straight segments.
fn reconstruct_route(resolved: &ResolvedNetwork, tour: &Tour, progress: &mut ProgressScale<'_>) -> Polyline {
    let graph = &resolved.graph;
    let assignment = &resolved.assignment;
    let legs = tour.legs();
    let mut route = Polyline::default();

    for (i, leg) in tour.order.windows(2).enumerate() {
        let (from, to) = (leg[0], leg[1]);
        let endpoints = (assignment.position(from, graph), assignment.position(to, graph));

        let (from_node, to_node) = (assignment.node(from), assignment.node(to));
        let path = if from_node == to_node {
            None
        } else {
            graph.shortest_path(from_node, to_node)
        };

        match (path, endpoints) {
            (Some((_, nodes)), _) => {
                route.push_segment(nodes.into_iter().filter_map(|node| graph.position(node)));
            }
            (None, (Some(a), Some(b))) => {
                if from_node != to_node {
                    warn!(from, to, "no road path for leg, drawing a straight segment");
                }
                route.push_segment([a, b]);
            }
            (None, _) => warn!(from, to, "leg endpoint missing from graph, skipped"),
        }

        let percent = 80 + 15 * (i + 1) / legs.max(1);
        progress.report(percent as u8, format!("Building route {}/{}", i + 1, legs));
    }
    route
}

fn spawn_task<T, F>(task: F) -> PlanningHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn FnMut(Progress)) -> Result<T, PlanningError> + Send + 'static,
{
    let (sender, events) = mpsc::sync_channel(PROGRESS_CHANNEL_CAPACITY);

    rayon::spawn(move || {
        let progress_sender = sender.clone();
        let mut on_progress = move |progress: Progress| {
            // A consumer that hung up no longer wants progress.
            let _ = progress_sender.send(PlanningEvent::Progress(progress));
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| task(&mut on_progress)))
            .unwrap_or_else(|payload| Err(PlanningError::Panicked(panic_message(payload.as_ref()))));
        if let Err(err) = &result {
            error!(error = %err, "planning failed");
        }
        let _ = sender.send(PlanningEvent::Finished(result));
    });

    PlanningHandle { events }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_scale_maps_and_clamps() {
        let mut seen = Vec::new();
        let mut sink = |progress: Progress| seen.push(progress);
        {
            let mut scale = ProgressScale::new(&mut sink, 50, 50, "Approximate: ");
            scale.report(0, "start");
            scale.report(40, "network");
            scale.report(20, "late");
            scale.report(100, "done");
        }
        let percents: Vec<u8> = seen.iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![50, 70, 70, 100]);
        assert_eq!(seen[1].message, "Approximate: network");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }

    #[test]
    fn test_spawned_panic_is_reported() {
        let handle: PlanningHandle<()> = spawn_task(|progress| {
            progress(Progress {
                percent: 10,
                message: "working".into(),
            });
            panic!("worker exploded");
        });

        let mut progress = Vec::new();
        let result = handle.wait(|p| progress.push(p.percent));
        assert_eq!(progress, vec![10]);
        match result {
            Err(PlanningError::Panicked(message)) => assert!(message.contains("worker exploded")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
