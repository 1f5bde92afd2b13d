use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::Deserialize;
use tracing::{debug, info};

use sn_tensor::{DType, Shape, Tensor};

use crate::error::{ModelError, Result};
use crate::variables::{VariableLoader, VariableStore};

/// One variable of a checkpoint manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    /// Raw little-endian payload, relative to the checkpoint directory.
    pub filename: String,
    pub shape: Vec<usize>,
    /// `float32` (default) or `float16`.
    #[serde(default)]
    pub dtype: Option<String>,
}

impl ManifestEntry {
    pub fn dtype(&self) -> Result<DType> {
        match &self.dtype {
            None => Ok(DType::F32),
            Some(name) => DType::from_manifest_name(name)
                .ok_or_else(|| ModelError::Other(format!("unsupported dtype {name:?}"))),
        }
    }
}

/// Checkpoint manifest: variable key to payload description.
pub type Manifest = BTreeMap<String, ManifestEntry>;

/// Loads a checkpoint directory holding a `manifest.json` and one raw
/// payload file per variable.
///
/// Payload files are memory-mapped and decoded to f32 host tensors.
#[derive(Debug, Clone)]
pub struct CheckpointLoader {
    dir: PathBuf,
}

impl CheckpointLoader {
    pub const MANIFEST_FILE: &'static str = "manifest.json";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CheckpointLoader { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads and parses the manifest.
    pub fn manifest(&self) -> Result<Manifest> {
        let file = File::open(self.dir.join(Self::MANIFEST_FILE))?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    fn load_variable(&self, key: &str, entry: &ManifestEntry) -> Result<Tensor> {
        let dtype = entry.dtype()?;
        let shape = Shape::from_slice(&entry.shape);
        let numel = shape.numel();

        let file = File::open(self.dir.join(&entry.filename))?;
        let len = file.metadata()?.len() as usize;
        let expected = numel * dtype.size_in_bytes();
        if len != expected {
            return Err(ModelError::Other(format!(
                "variable {key}: {} holds {len} bytes, shape {shape} in {dtype} needs {expected}",
                entry.filename
            )));
        }

        // Empty files cannot be mapped on every platform.
        let data = if len == 0 {
            Vec::new()
        } else {
            // SAFETY: the payload is only read while the map is alive.
            let mmap = unsafe { Mmap::map(&file)? };
            dtype.decode_le(&mmap, numel)?
        };
        debug!(key, %shape, %dtype, "loaded variable");
        Ok(Tensor::try_new(data, shape)?)
    }

    fn try_load_all(&self) -> Result<VariableStore> {
        let manifest = self.manifest()?;
        manifest
            .iter()
            .map(|(key, entry)| -> Result<(String, Tensor)> {
                Ok((key.clone(), self.load_variable(key, entry)?))
            })
            .collect()
    }
}

impl VariableLoader for CheckpointLoader {
    fn source_location(&self) -> String {
        self.dir.display().to_string()
    }

    fn load_all(&self) -> Result<VariableStore> {
        info!(dir = %self.dir.display(), "loading checkpoint");
        let store = self.try_load_all().map_err(|err| ModelError::LoadFailure {
            source_location: self.source_location(),
            reason: err.to_string(),
        })?;
        info!(variables = store.len(), "checkpoint loaded");
        Ok(store)
    }
}
