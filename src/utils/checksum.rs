use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "SHA256SUMS";

/// Why a file listed in the manifest no longer matches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    Modified { name: String },
    Missing { name: String },
}

pub struct ChecksumVerifier;

impl ChecksumVerifier {
    pub fn new() -> Self {
        Self
    }

    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    pub fn calculate_checksum(&self, file_path: &Path) -> Result<String> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

        let mut reader = BufReader::new(file);
        let mut buffer = vec![0; 8192];
        let mut hasher = Sha256::new();
        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .context("Failed to read file data")?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn verify_file(&self, file_path: &Path, expected: &str) -> Result<bool> {
        let calculated = self.calculate_checksum(file_path)?;
        debug!("{}: expected {}, calculated {}", file_path.display(), expected, calculated);
        Ok(calculated.eq_ignore_ascii_case(expected))
    }

    /// Write `<hex>  <name>` lines for `entries` into `dir/SHA256SUMS`.
    pub fn write_manifest(&self, dir: &Path, entries: &BTreeMap<String, String>) -> Result<PathBuf> {
        let content: String = entries
            .iter()
            .map(|(name, checksum)| format!("{}  {}\n", checksum, name))
            .collect();

        let manifest_path = dir.join(MANIFEST_FILE);
        std::fs::write(&manifest_path, content).with_context(|| {
            format!("Failed to write checksum file: {}", manifest_path.display())
        })?;

        info!("Generated checksum file: {}", manifest_path.display());
        Ok(manifest_path)
    }

    /// Delete `dir/SHA256SUMS`. An absent manifest is not an error.
    pub fn remove_manifest(&self, dir: &Path) -> Result<()> {
        let manifest_path = dir.join(MANIFEST_FILE);
        match std::fs::remove_file(&manifest_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove checksum file: {}", manifest_path.display())
            }),
        }
    }

    /// Manifest entries keyed by file name. An absent manifest is empty.
    pub fn read_manifest(&self, dir: &Path) -> Result<BTreeMap<String, String>> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&manifest_path).with_context(|| {
            format!("Failed to read checksum file: {}", manifest_path.display())
        })?;

        let mut entries = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (checksum, name) = line
                .split_once("  ")
                .ok_or_else(|| anyhow!("Invalid checksum file format in line: {}", line))?;
            if checksum.len() != 64 {
                return Err(anyhow!(
                    "Not a SHA-256 checksum in {}: {}",
                    manifest_path.display(),
                    checksum
                ));
            }
            entries.insert(name.to_string(), checksum.to_lowercase());
        }

        Ok(entries)
    }

    /// Compare every file named in the manifest against its recorded hash.
    pub fn verify_manifest(&self, dir: &Path) -> Result<Vec<Drift>> {
        info!("Verifying checksum file in {}", dir.display());

        let mut drift = Vec::new();
        for (name, expected) in self.read_manifest(dir)? {
            let path = dir.join(&name);
            if !path.exists() {
                drift.push(Drift::Missing { name });
            } else if !self.verify_file(&path, &expected)? {
                drift.push(Drift::Modified { name });
            }
        }

        Ok(drift)
    }
}

impl Default for ChecksumVerifier {
    fn default() -> Self {
        Self::new()
    }
}
