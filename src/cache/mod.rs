use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Cache manager for mapping service responses so re-runs don't hit the public APIs again
pub struct Cache {
    cache_dir: PathBuf,
    max_age: Option<Duration>,
}

impl Cache {
    /// Create a new cache with the given directory.
    /// Entries older than `max_age` are treated as missing; `None` keeps them forever.
    pub fn new<P: AsRef<Path>>(cache_dir: P, max_age: Option<Duration>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();

        // Create the cache directory if it doesn't exist
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)
                .context("Failed to create cache directory")?;
        }

        Ok(Self { cache_dir, max_age })
    }

    /// Get the cached data for the given request key
    /// Returns None if the entry is missing or expired
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let file_path = self.get_cache_path(key);
        if !file_path.exists() {
            return None;
        }

        if let Some(max_age) = self.max_age {
            let modified: DateTime<Utc> = fs::metadata(&file_path)
                .and_then(|m| m.modified())
                .ok()?
                .into();
            if Utc::now() - modified > max_age {
                debug!("Cache entry {} is stale", file_path.display());
                return None;
            }
        }

        fs::read(&file_path).ok()
    }

    /// Save data to the cache
    pub fn save(&self, key: &str, data: &[u8]) -> Result<PathBuf> {
        let file_path = self.get_cache_path(key);

        // Write the data to the file
        let mut file = File::create(&file_path)
            .context("Failed to create cache file")?;
        file.write_all(data)
            .context("Failed to write data to cache file")?;

        Ok(file_path)
    }

    /// Get the cache path for a request key
    fn get_cache_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        self.cache_dir.join(format!("{}.json", hash))
    }

    /// Clear the cache
    pub fn clear(&self) -> Result<()> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)
                .context("Failed to remove cache directory")?;
            fs::create_dir_all(&self.cache_dir)
                .context("Failed to recreate cache directory")?;
        }

        Ok(())
    }
}
