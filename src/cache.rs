//! Content-addressed, time-bounded result cache on disk.
//!
//! Every entry is one JSON file named by the hex digest of its [`CacheKey`].
//! An entry is fresh while its modification time is younger than the
//! timeout. Expired entries can still be served while offline when the caller
//! allows it. Read failures of any kind count as a miss, and write failures
//! are logged and ignored: the cache never changes what a caller gets back.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fxhash::FxHasher64;
use rand::Rng;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::graph_json::{self, GraphDocument};
use crate::matrix::DistanceMatrix;
use crate::network::{AssignedNode, NetworkSource, NodeAssignment, ResolvedNetwork};
use crate::traits::ConnectivityProbe;

const DIGEST_SEEDS: [u64; 2] = [0x243f_6a88_85a3_08d3, 0x1319_8a2e_0370_7344];

/// Hashes `bytes` as little-endian 64-bit words, so the result does not
/// depend on the host byte order or pointer width.
fn digest_lane(seed: u64, bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher64::default();
    hasher.write_u64(seed);
    hasher.write_u64(bytes.len() as u64);
    for chunk in bytes.chunks(8) {
        let mut word = [0u8; 8];
        word[..chunk.len()].copy_from_slice(chunk);
        hasher.write_u64(u64::from_le_bytes(word));
    }
    hasher.finish()
}

/// Identity of a cached call: function name plus stringified arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    function: String,
    args: Vec<String>,
    kwargs: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Keyword arguments are hashed in key order, whatever order they were
    /// added in.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.kwargs.insert(key.into(), value.to_string());
        self
    }

    /// 128-bit digest of the key's string form, identical on every platform.
    pub fn digest(&self) -> u128 {
        let text = self.to_string();
        let high = digest_lane(DIGEST_SEEDS[0], text.as_bytes());
        let low = digest_lane(DIGEST_SEEDS[1], text.as_bytes());
        (u128::from(high) << 64) | u128::from(low)
    }

    pub fn file_name(&self) -> String {
        format!("{:032x}.json", self.digest())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[{}]:{{", self.function, self.args.join(","))?;
        for (i, (key, value)) in self.kwargs.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

/// Declared on-disk shape of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `[serialized_graph, node_list]`.
    Graph,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachePayload {
    Graph {
        graph: GraphDocument,
        nodes: Vec<AssignedNode>,
    },
    Json(Value),
}

impl CachePayload {
    pub fn shape(&self) -> PayloadShape {
        match self {
            CachePayload::Graph { .. } => PayloadShape::Graph,
            CachePayload::Json(_) => PayloadShape::Json,
        }
    }

    pub fn into_json(self) -> Result<Value, CacheError> {
        match self {
            CachePayload::Graph { graph, nodes } => Ok(Value::Array(vec![
                serde_json::to_value(graph)?,
                serde_json::to_value(nodes)?,
            ])),
            CachePayload::Json(value) => Ok(value),
        }
    }

    pub fn from_json(shape: PayloadShape, value: Value) -> Result<Self, CacheError> {
        match shape {
            PayloadShape::Json => Ok(CachePayload::Json(value)),
            PayloadShape::Graph => {
                let Value::Array(items) = value else {
                    return Err(CacheError::Shape("graph entry is not an array".into()));
                };
                let [graph, nodes]: [Value; 2] = items.try_into().map_err(|items: Vec<Value>| {
                    CacheError::Shape(format!("graph entry has {} items, expected 2", items.len()))
                })?;
                Ok(CachePayload::Graph {
                    graph: serde_json::from_value(graph)?,
                    nodes: serde_json::from_value(nodes)?,
                })
            }
        }
    }
}

/// A value that can live in the [`ResultCache`].
pub trait Cached: Sized {
    const SHAPE: PayloadShape;

    fn to_payload(&self) -> Result<CachePayload, CacheError>;

    fn from_payload(payload: CachePayload) -> Result<Self, CacheError>;

    /// Whether a freshly computed value should be written.
    fn should_store(&self) -> bool {
        true
    }
}

impl Cached for ResolvedNetwork {
    const SHAPE: PayloadShape = PayloadShape::Graph;

    fn to_payload(&self) -> Result<CachePayload, CacheError> {
        Ok(CachePayload::Graph {
            graph: graph_json::to_document(&self.graph),
            nodes: self.assignment.nodes().to_vec(),
        })
    }

    fn from_payload(payload: CachePayload) -> Result<Self, CacheError> {
        let CachePayload::Graph { graph, nodes } = payload else {
            return Err(CacheError::Shape("expected a graph entry".into()));
        };
        let graph = graph_json::from_document(&graph)?;
        if let Some(missing) = nodes.iter().find(|a| graph.node(a.node).is_none()) {
            return Err(CacheError::Shape(format!(
                "assigned node {} is not in the graph",
                missing.node
            )));
        }
        Ok(ResolvedNetwork {
            graph,
            assignment: NodeAssignment::new(nodes),
            source: NetworkSource::Service,
        })
    }

    /// Synthetic graphs are not stored so that a later online run fetches
    /// real road data.
    fn should_store(&self) -> bool {
        self.source == NetworkSource::Service
    }
}

impl Cached for DistanceMatrix {
    const SHAPE: PayloadShape = PayloadShape::Json;

    fn to_payload(&self) -> Result<CachePayload, CacheError> {
        Ok(CachePayload::Json(serde_json::to_value(self)?))
    }

    fn from_payload(payload: CachePayload) -> Result<Self, CacheError> {
        match payload {
            CachePayload::Json(value) => Ok(serde_json::from_value(value)?),
            CachePayload::Graph { .. } => Err(CacheError::Shape("expected a matrix entry".into())),
        }
    }
}

/// How a lookup treats an expired entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Expired entries are misses.
    Strict,
    /// Expired entries are served when the connectivity probe reports offline.
    OfflineTolerant,
}

#[derive(Clone)]
pub struct ResultCache {
    dir: PathBuf,
    timeout: Duration,
    sweep_probability: f64,
    probe: Arc<dyn ConnectivityProbe>,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("dir", &self.dir)
            .field("timeout", &self.timeout)
            .field("sweep_probability", &self.sweep_probability)
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    pub fn new(
        dir: impl Into<PathBuf>,
        timeout: Duration,
        sweep_probability: f64,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            dir: dir.into(),
            timeout,
            sweep_probability,
            probe,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Returns the cached value for `key`, or runs `compute` and stores its
    /// result. Errors from `compute` are returned as-is and nothing is stored.
    pub fn get_or_compute<T, E, F>(&self, key: &CacheKey, freshness: Freshness, compute: F) -> Result<T, E>
    where
        T: Cached,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.lookup(key, freshness) {
            return Ok(value);
        }

        let value = compute()?;
        if !value.should_store() {
            debug!(%key, "result not cached");
        } else if let Err(err) = self.store(key, &value) {
            warn!(%key, error = %err, "failed to write cache entry");
        }
        Ok(value)
    }

    pub fn get_or_insert_with<T, F>(&self, key: &CacheKey, freshness: Freshness, compute: F) -> T
    where
        T: Cached,
        F: FnOnce() -> T,
    {
        match self.get_or_compute(key, freshness, || Ok::<T, Infallible>(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Reads a valid entry. Misses, expired entries and unreadable entries
    /// all come back as `None`.
    pub fn lookup<T: Cached>(&self, key: &CacheKey, freshness: Freshness) -> Option<T> {
        let path = self.path_for(key);
        let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(%key, "cache miss");
                return None;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot stat cache entry");
                return None;
            }
        };

        if self.is_expired(modified) {
            if freshness == Freshness::OfflineTolerant && !self.probe.is_online() {
                info!(%key, "offline, using expired cache entry");
            } else {
                debug!(%key, "cache entry expired");
                return None;
            }
        }

        match read_entry(&path) {
            Ok(value) => {
                debug!(%key, "cache hit");
                Some(value)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt cache entry, recomputing");
                None
            }
        }
    }

    /// Writes `value` under `key`, replacing any previous entry in one rename.
    pub fn store<T: Cached>(&self, key: &CacheKey, value: &T) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let json = value.to_payload()?.into_json()?;

        let mut file = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::with_capacity(64 * 1024, &mut file);
            serde_json::to_writer(&mut writer, &json)?;
            writer.flush()?;
        }
        file.persist(self.path_for(key))?;
        debug!(%key, "cache entry written");
        Ok(())
    }

    /// Deletes every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return 0,
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "cannot list cache directory");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let expired = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| self.is_expired(modified));
            if !expired {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => debug!(path = %path.display(), error = %err, "cannot remove cache entry"),
            }
        }

        if removed > 0 {
            info!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Runs [`sweep`](Self::sweep) with the configured probability.
    pub fn maybe_sweep<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        if rng.random::<f64>() < self.sweep_probability {
            self.sweep()
        } else {
            0
        }
    }

    fn is_expired(&self, modified: SystemTime) -> bool {
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        age >= self.timeout
    }
}

fn read_entry<T: Cached>(path: &Path) -> Result<T, CacheError> {
    let reader = BufReader::new(File::open(path)?);
    let value: Value = serde_json::from_reader(reader)?;
    T::from_payload(CachePayload::from_json(T::SHAPE, value)?)
}
