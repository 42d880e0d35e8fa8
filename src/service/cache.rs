//! ImageCache - disk cache for text-to-image results.
//!
//! Generation runs with a fixed seed, so a prompt always maps to the same
//! image and the result can be reused.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Disk cache of generated images keyed by prompt hash.
pub struct ImageCache {
    cache_dir: PathBuf,
}

impl ImageCache {
    /// Create a cache rooted at `cache_dir`. The directory is created lazily.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Default location: ~/.cache/collage-studio/generated/
    pub fn with_default_dir() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("collage-studio")
            .join("generated");
        Self::new(cache_dir)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cached image for `prompt`, if present.
    pub fn get(&self, prompt: &str) -> Option<PathBuf> {
        let path = self.image_path(&Self::hash_prompt(prompt));
        path.is_file().then_some(path)
    }

    /// Store PNG bytes for `prompt`, along with the prompt text.
    pub fn store(&self, prompt: &str, png: &[u8]) -> Result<PathBuf, std::io::Error> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let hash = Self::hash_prompt(prompt);
        let path = self.image_path(&hash);
        std::fs::write(&path, png)?;
        std::fs::write(self.cache_dir.join(format!("{}.prompt", hash)), prompt.trim())?;
        Ok(path)
    }

    /// 32 hex chars of the SHA-256 of the trimmed prompt.
    pub fn hash_prompt(prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prompt.trim().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    /// All cached images, sorted by hash.
    pub fn list_entries(&self) -> Result<Vec<CacheEntry>, std::io::Error> {
        let mut entries = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(entries);
        }

        for entry in std::fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            let hash = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_string();
            let prompt =
                std::fs::read_to_string(self.cache_dir.join(format!("{}.prompt", hash))).ok();

            entries.push(CacheEntry {
                hash,
                prompt,
                size_bytes: metadata.len(),
                path,
            });
        }

        entries.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(entries)
    }

    /// Remove one entry. Returns false if it wasn't cached.
    pub fn remove(&self, hash: &str) -> Result<bool, std::io::Error> {
        let path = self.image_path(hash);
        let removed = path.exists();
        if removed {
            std::fs::remove_file(&path)?;
        }
        let _ = std::fs::remove_file(self.cache_dir.join(format!("{}.prompt", hash)));
        Ok(removed)
    }

    /// Remove everything. Returns the number of images removed.
    pub fn clear_all(&self) -> Result<usize, std::io::Error> {
        let mut count = 0;
        for entry in self.list_entries()? {
            if self.remove(&entry.hash)? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn image_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.png", hash))
    }
}

/// A cached generated image.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub hash: String,
    pub prompt: Option<String>,
    pub size_bytes: u64,
    pub path: PathBuf,
}
