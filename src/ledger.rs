use crate::error::Result;
use std::fs;
use std::path::PathBuf;

/// Persisted mapping from package identity to the last successfully
/// processed version string.
///
/// Each identity is stored as one plain-text file containing exactly the
/// version string. An entry is written only after the identity's artifact has
/// actually been decompiled, so the ledger never claims a version whose
/// source tree was not produced.
#[derive(Debug, Clone)]
pub struct VersionLedger {
    dir: PathBuf,
}

impl VersionLedger {
    /// Creates a ledger over the given directory
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Reads the stored version for a package, if any
    pub fn get(&self, identity: &str) -> Option<String> {
        let path = self.path_for(identity);
        match fs::read_to_string(path) {
            Ok(content) => {
                let version = content.trim().to_string();
                if version.is_empty() {
                    None
                } else {
                    Some(version)
                }
            }
            Err(_) => None,
        }
    }

    /// Stores the current version for a package, overwriting any previous entry
    pub fn record(&self, identity: &str, version: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(identity), version)?;
        Ok(())
    }

    fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{}.version", identity))
    }
}
