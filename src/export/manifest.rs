//! Pivot manifest
//!
//! Written next to the pivot once all three Parquet files are complete. A
//! session reuses a pivot only when the manifest's seed and profile match
//! and every recorded digest still matches the file on disk.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BenchResult;
use crate::model::{Profile, ProfileCounts};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub seed: u64,
    pub profile: String,
    pub counts: ProfileCounts,
    pub node_counts: BTreeMap<String, usize>,
    pub edge_counts: BTreeMap<String, usize>,
    pub sample_count: usize,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// File name → hex SHA-256
    pub files: BTreeMap<String, String>,
}

impl Manifest {
    pub fn load(path: &Path) -> BenchResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub fn save(&self, path: &Path) -> BenchResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn matches(&self, profile: &Profile, seed: u64) -> bool {
        self.seed == seed && self.profile == profile.to_string()
    }

    pub fn node_total(&self) -> usize {
        self.node_counts.values().sum()
    }

    pub fn edge_total(&self) -> usize {
        self.edge_counts.values().sum()
    }

    /// Recompute every recorded digest under `dir`.
    pub fn verify(&self, dir: &Path) -> BenchResult<bool> {
        for (name, digest) in &self.files {
            let path = dir.join(name);
            if !path.exists() || sha256_file(&path)? != *digest {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub fn sha256_file(path: &Path) -> BenchResult<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect())
}
