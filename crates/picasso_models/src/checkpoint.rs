//! Checkpoint discovery, restoration and writing.
//!
//! A model data directory holds either
//!
//! - a topology (`*.json`) next to a weights record (`*.mpk`), or
//! - a single bundle (`*.mpk`) embedding its topology.
//!
//! The most recently modified file of each kind is used; a labels file kept
//! in the same directory is passed as `ignore` so it is never taken for the
//! topology. Weights are stored with Burn's named MessagePack recorder at full
//! precision and must match the topology parameter by parameter.
//!
//! # Bundle layout
//!
//! ```text
//! b"PICASSO\0" | u32 LE header length | header JSON | weights record
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use picasso_models::checkpoint::{restore, save_checkpoint};
//! use picasso_models::network::ConvNetConfig;
//!
//! let config = ConvNetConfig::mnist();
//! let network = config.init::<NdArray>(&device);
//! save_checkpoint::<_, NdArray>("data-volume", "mnist", &config, &network)?;
//!
//! let restored = restore::<ConvNetConfig, NdArray>("data-volume".as_ref(), None, &device)?;
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use burn::module::{Module, ModuleVisitor, ParamId};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::network::Topology;

/// Leading bytes of a bundle.
pub const BUNDLE_MAGIC: &[u8; 8] = b"PICASSO\0";

/// Extension of weights records and bundles.
pub const CHECKPOINT_EXT: &str = "mpk";

/// Extension of topology documents.
pub const TOPOLOGY_EXT: &str = "json";

type BytesRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

/// Files selected from a model data directory.
#[derive(Debug, Clone)]
pub struct CheckpointFiles {
    /// Latest weights record or bundle.
    pub checkpoint: PathBuf,
    /// Latest topology document, if any.
    pub topology: Option<PathBuf>,
    /// Modification time of the checkpoint.
    pub modified: SystemTime,
}

impl CheckpointFiles {
    /// File name of the checkpoint.
    pub fn name(&self) -> String {
        self.checkpoint
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Checkpoint modification time as local `YYYY-MM-DD HH:MM:SS`.
    pub fn modified_string(&self) -> String {
        DateTime::<Local>::from(self.modified)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Network restored from a data directory.
#[derive(Debug)]
pub struct Restored<T: Topology, B: Backend> {
    /// Topology the network was built from.
    pub topology: T,
    /// Network carrying the checkpoint weights.
    pub network: T::Network<B>,
    /// Files that were read.
    pub files: CheckpointFiles,
}

#[derive(Serialize, Deserialize)]
struct BundleHeader<T> {
    arch: String,
    topology: T,
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Most recently modified file with extension `ext` directly under `dir`,
/// skipping `ignore`.
pub fn latest_file(
    dir: &Path,
    ext: &str,
    ignore: Option<&Path>,
) -> Result<Option<(PathBuf, SystemTime)>> {
    let mut latest: Option<(PathBuf, SystemTime)> = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        if ignore.is_some_and(|skip| same_file(&path, skip)) {
            tracing::debug!("Skipping {} while locating *.{}", path.display(), ext);
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        let newer = match &latest {
            Some((best_path, best_time)) => (modified, &path) > (*best_time, best_path),
            None => true,
        };
        if newer {
            latest = Some((path, modified));
        }
    }
    Ok(latest)
}

/// Select the latest checkpoint and topology in `data_dir`.
///
/// `ignore` names a file in `data_dir` that is not part of the checkpoint,
/// such as a labels document.
pub fn locate(data_dir: &Path, ignore: Option<&Path>) -> Result<CheckpointFiles> {
    if !data_dir.is_dir() {
        return Err(ModelError::load(data_dir, "not a directory"));
    }
    let (checkpoint, modified) = latest_file(data_dir, CHECKPOINT_EXT, ignore)?.ok_or_else(|| {
        ModelError::load(data_dir, format!("no *.{} checkpoint found", CHECKPOINT_EXT))
    })?;
    let topology = latest_file(data_dir, TOPOLOGY_EXT, ignore)?.map(|(path, _)| path);

    Ok(CheckpointFiles {
        checkpoint,
        topology,
        modified,
    })
}

/// Restore the latest network stored in `data_dir`.
///
/// Tries the separate topology + weights pair first and falls back to reading
/// the checkpoint as a bundle when that pair is missing or does not fit.
pub fn restore<T: Topology, B: Backend>(
    data_dir: &Path,
    ignore: Option<&Path>,
    device: &B::Device,
) -> Result<Restored<T, B>> {
    let files = locate(data_dir, ignore)?;
    let bytes = fs::read(&files.checkpoint)?;

    let separate = if bytes.starts_with(BUNDLE_MAGIC) {
        Err("checkpoint is a bundle".to_string())
    } else {
        match &files.topology {
            Some(path) => restore_separate::<T, B>(path, &bytes, device),
            None => Err(format!("no *.{} topology found", TOPOLOGY_EXT)),
        }
    };

    let (topology, network) = match separate {
        Ok(pair) => pair,
        Err(reason) => {
            if !bytes.starts_with(BUNDLE_MAGIC) {
                tracing::warn!(
                    "Topology and weights in {} do not form a model ({}), reading {} as a bundle",
                    data_dir.display(),
                    reason,
                    files.name()
                );
            }
            restore_bundle::<T, B>(&bytes, device)
                .map_err(|e| ModelError::load(data_dir, format!("{}; bundle: {}", reason, e)))?
        }
    };

    tracing::debug!(
        "Restored {} network from {} ({} parameters)",
        topology.arch(),
        files.name(),
        network.num_params()
    );

    Ok(Restored {
        topology,
        network,
        files,
    })
}

fn restore_separate<T: Topology, B: Backend>(
    topology_path: &Path,
    weights: &[u8],
    device: &B::Device,
) -> std::result::Result<(T, T::Network<B>), String> {
    let text = fs::read_to_string(topology_path).map_err(|e| e.to_string())?;
    let topology: T = serde_json::from_str(&text)
        .map_err(|e| format!("{}: {}", topology_path.display(), e))?;
    let network = load_weights::<T, B>(&topology, weights.to_vec(), device)?;
    Ok((topology, network))
}

fn restore_bundle<T: Topology, B: Backend>(
    bytes: &[u8],
    device: &B::Device,
) -> std::result::Result<(T, T::Network<B>), String> {
    let rest = bytes
        .strip_prefix(BUNDLE_MAGIC.as_slice())
        .ok_or_else(|| "missing bundle header".to_string())?;
    if rest.len() < 4 {
        return Err("truncated bundle".to_string());
    }
    let (len, rest) = rest.split_at(4);
    let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
    if rest.len() < len {
        return Err("truncated bundle header".to_string());
    }
    let (header, weights) = rest.split_at(len);

    let header: BundleHeader<T> = serde_json::from_slice(header).map_err(|e| e.to_string())?;
    if header.arch != header.topology.arch() {
        return Err(format!(
            "bundle holds a {} network, expected {}",
            header.arch,
            header.topology.arch()
        ));
    }
    let network = load_weights::<T, B>(&header.topology, weights.to_vec(), device)?;
    Ok((header.topology, network))
}

/// Shapes of every float parameter, in visiting order.
#[derive(Default)]
struct ParamShapes(Vec<Vec<usize>>);

impl<B: Backend> ModuleVisitor<B> for ParamShapes {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.0.push(tensor.dims().to_vec());
    }
}

fn param_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut shapes = ParamShapes::default();
    module.visit(&mut shapes);
    shapes.0
}

fn load_weights<T: Topology, B: Backend>(
    topology: &T,
    weights: Vec<u8>,
    device: &B::Device,
) -> std::result::Result<T::Network<B>, String> {
    let fresh = topology.init_network::<B>(device);
    let expected = param_shapes::<B, _>(&fresh);

    let recorder = BytesRecorder::new();
    let record = Recorder::<B>::load(&recorder, weights, device).map_err(|e| e.to_string())?;
    let network = fresh.load_record(record);

    let found = param_shapes::<B, _>(&network);
    if found.len() != expected.len() {
        return Err(format!(
            "weights hold {} tensors, topology needs {}",
            found.len(),
            expected.len()
        ));
    }
    if let Some((i, (got, want))) = found
        .iter()
        .zip(&expected)
        .enumerate()
        .find(|(_, (got, want))| got != want)
    {
        return Err(format!(
            "weight tensor {} has shape {:?}, topology needs {:?}",
            i, got, want
        ));
    }
    Ok(network)
}

fn record_bytes<B: Backend, M: Module<B>>(network: &M) -> Result<Vec<u8>> {
    let recorder = BytesRecorder::new();
    Recorder::<B>::record(&recorder, network.clone().into_record(), ())
        .map_err(|e| ModelError::Checkpoint(e.to_string()))
}

/// Write `{stem}.json` and `{stem}.mpk` into `dir`.
pub fn save_checkpoint<T: Topology, B: Backend>(
    dir: impl AsRef<Path>,
    stem: &str,
    topology: &T,
    network: &T::Network<B>,
) -> Result<CheckpointFiles> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let topology_path = dir.join(format!("{}.{}", stem, TOPOLOGY_EXT));
    let json =
        serde_json::to_string_pretty(topology).map_err(|e| ModelError::Checkpoint(e.to_string()))?;
    fs::write(&topology_path, json)?;

    let checkpoint = dir.join(format!("{}.{}", stem, CHECKPOINT_EXT));
    fs::write(&checkpoint, record_bytes::<B, _>(network)?)?;
    let modified = fs::metadata(&checkpoint)?.modified()?;

    tracing::info!("Saved {} checkpoint to {}", topology.arch(), checkpoint.display());
    Ok(CheckpointFiles {
        checkpoint,
        topology: Some(topology_path),
        modified,
    })
}

/// Write a self-contained bundle to `path`.
pub fn save_bundle<T: Topology, B: Backend>(
    path: impl AsRef<Path>,
    topology: &T,
    network: &T::Network<B>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let header = serde_json::to_vec(&BundleHeader {
        arch: topology.arch().to_string(),
        topology: topology.clone(),
    })
    .map_err(|e| ModelError::Checkpoint(e.to_string()))?;
    let len = u32::try_from(header.len())
        .map_err(|_| ModelError::Checkpoint("bundle header too large".to_string()))?;

    let mut bytes = Vec::with_capacity(BUNDLE_MAGIC.len() + 4 + header.len());
    bytes.extend_from_slice(BUNDLE_MAGIC);
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&record_bytes::<B, _>(network)?);
    fs::write(path, bytes)?;

    tracing::info!("Saved {} bundle to {}", topology.arch(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ConvNetConfig, FcnNetConfig};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tiny() -> ConvNetConfig {
        ConvNetConfig::new(1, 8, 8, 3).with_filters(vec![2]).with_hidden(4)
    }

    #[test]
    fn test_locate_empty_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate(dir.path(), None).unwrap_err();
        assert!(matches!(err, ModelError::ModelLoad { .. }));
    }

    #[test]
    fn test_locate_missing_dir_fails() {
        let err = locate(Path::new("/nonexistent/picasso/data"), None).unwrap_err();
        assert!(matches!(err, ModelError::ModelLoad { .. }));
    }

    #[test]
    fn test_save_and_restore_separate() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny();
        let network = config.init::<TestBackend>(&device);

        save_checkpoint::<_, TestBackend>(dir.path(), "tiny", &config, &network).unwrap();
        let restored = restore::<ConvNetConfig, TestBackend>(dir.path(), None, &device).unwrap();

        assert_eq!(restored.topology, config);
        assert_eq!(restored.files.name(), "tiny.mpk");
        assert_eq!(restored.network.num_params(), network.num_params());
    }

    #[test]
    fn test_restore_bundle_without_topology() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny();
        let network = config.init::<TestBackend>(&device);

        save_bundle::<_, TestBackend>(dir.path().join("model.mpk"), &config, &network).unwrap();
        let restored = restore::<ConvNetConfig, TestBackend>(dir.path(), None, &device).unwrap();
        assert_eq!(restored.topology, config);
        assert!(restored.files.topology.is_none());
    }

    #[test]
    fn test_mismatched_topology_falls_back_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny();
        let network = config.init::<TestBackend>(&device);
        save_checkpoint::<_, TestBackend>(dir.path(), "tiny", &config, &network).unwrap();

        // A topology of another architecture cannot be restored from these weights.
        let err = restore::<FcnNetConfig, TestBackend>(dir.path(), None, &device).unwrap_err();
        assert!(matches!(err, ModelError::ModelLoad { .. }));
    }

    #[test]
    fn test_same_sized_topology_with_other_shapes_fails() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny();
        let network = config.init::<TestBackend>(&device);
        save_checkpoint::<_, TestBackend>(dir.path(), "tiny", &config, &network).unwrap();

        // Same parameter count, different layer widths.
        let other = ConvNetConfig::new(1, 8, 8, 3).with_filters(vec![3]).with_hidden(2);
        assert_eq!(
            other.init::<TestBackend>(&device).num_params(),
            network.num_params()
        );
        fs::write(
            dir.path().join("tiny.json"),
            serde_json::to_string(&other).unwrap(),
        )
        .unwrap();

        let err = restore::<ConvNetConfig, TestBackend>(dir.path(), None, &device).unwrap_err();
        match err {
            ModelError::ModelLoad { reason, .. } => assert!(reason.contains("shape"), "{reason}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_labels_file_is_not_taken_for_topology() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny();
        let network = config.init::<TestBackend>(&device);
        save_checkpoint::<_, TestBackend>(dir.path(), "tiny", &config, &network).unwrap();

        let labels = dir.path().join("labels.json");
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&labels, r#"["zero", "one", "two"]"#).unwrap();

        let files = locate(dir.path(), Some(&labels)).unwrap();
        assert_eq!(files.topology, Some(dir.path().join("tiny.json")));

        let restored =
            restore::<ConvNetConfig, TestBackend>(dir.path(), Some(&labels), &device).unwrap();
        assert_eq!(restored.topology, config);
    }

    #[test]
    fn test_garbage_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.mpk"), b"not a record").unwrap();
        fs::write(dir.path().join("broken.json"), b"{}").unwrap();

        let device = Default::default();
        let err = restore::<ConvNetConfig, TestBackend>(dir.path(), None, &device).unwrap_err();
        assert!(matches!(err, ModelError::ModelLoad { .. }));
    }

    #[test]
    fn test_modified_string_format() {
        let files = CheckpointFiles {
            checkpoint: PathBuf::from("a.mpk"),
            topology: None,
            modified: SystemTime::now(),
        };
        let s = files.modified_string();
        assert_eq!(s.len(), "2024-01-01 00:00:00".len());
    }
}
