//! On-disk semantic analysis cache
//!
//! One JSON entry per source file, named by the FNV-1a hash of the file path.
//! An entry is stale once the source mtime moves past the cached mtime, the
//! content hash differs, or the entry is older than the configured max age.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AnalysisResult, SemanticAnalyzer};
use crate::error::Result;
use crate::fs_utils::{fnv1a_hex, write_atomic};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    file_path: PathBuf,
    content_hash: String,
    /// Source modification time, milliseconds since the epoch
    source_mtime_ms: u128,
    cached_at: DateTime<Utc>,
    result: AnalysisResult,
}

async fn mtime_ms(path: &Path) -> Option<u128> {
    tokio::fs::metadata(path)
        .await
        .ok()?
        .modified()
        .ok()?
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis())
}

/// Analysis cache rooted at one directory
#[derive(Debug, Clone)]
pub struct AnalysisCache {
    dir: PathBuf,
    max_age: chrono::Duration,
}

impl AnalysisCache {
    pub fn new(dir: PathBuf, max_age: chrono::Duration) -> Self {
        Self { dir, max_age }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, source: &Path) -> PathBuf {
        self.dir
            .join(format!("{}.json", fnv1a_hex(source.to_string_lossy().as_bytes())))
    }

    async fn read_entry(&self, path: &Path) -> Option<CacheEntry> {
        let bytes = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn is_fresh(&self, entry: &CacheEntry) -> bool {
        if Utc::now() - entry.cached_at > self.max_age {
            return false;
        }
        match mtime_ms(&entry.file_path).await {
            Some(current) if current <= entry.source_mtime_ms => {}
            _ => return false,
        }
        match tokio::fs::read(&entry.file_path).await {
            Ok(content) => fnv1a_hex(&content) == entry.content_hash,
            Err(_) => false,
        }
    }

    /// Fresh cached result for `source`, if any
    pub async fn get(&self, source: &Path) -> Option<AnalysisResult> {
        let entry = self.read_entry(&self.entry_path(source)).await?;
        if entry.file_path != source {
            // FNV collision
            return None;
        }
        if self.is_fresh(&entry).await {
            Some(entry.result)
        } else {
            None
        }
    }

    /// Store a result keyed by its file path
    pub async fn put(&self, result: &AnalysisResult) -> Result<()> {
        let content = tokio::fs::read(&result.file_path).await?;
        let entry = CacheEntry {
            file_path: result.file_path.clone(),
            content_hash: fnv1a_hex(&content),
            source_mtime_ms: mtime_ms(&result.file_path).await.unwrap_or(0),
            cached_at: Utc::now(),
            result: result.clone(),
        };
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec(&entry)?;
        write_atomic(&self.entry_path(&result.file_path), &json, "cache").await?;
        Ok(())
    }

    /// Remove stale or unreadable entries, returning how many were removed
    pub async fn prune(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(dirent) = entries.next_entry().await? {
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let keep = match self.read_entry(&path).await {
                Some(entry) => self.is_fresh(&entry).await,
                None => false,
            };
            if !keep {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!("Pruned {} analysis cache entries", removed);
        }
        Ok(removed)
    }
}

/// Serves fresh results from the cache and analyzes the rest
pub struct CachedAnalyzer<A> {
    inner: A,
    cache: AnalysisCache,
}

impl<A: SemanticAnalyzer> CachedAnalyzer<A> {
    pub fn new(inner: A, cache: AnalysisCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }
}

#[async_trait]
impl<A: SemanticAnalyzer> SemanticAnalyzer for CachedAnalyzer<A> {
    async fn analyze(&self, files: &[PathBuf]) -> Result<Vec<AnalysisResult>> {
        let mut hits: HashMap<PathBuf, AnalysisResult> = HashMap::new();
        let mut misses = Vec::new();
        for file in files {
            match self.cache.get(file).await {
                Some(result) => {
                    hits.insert(file.clone(), result);
                }
                None => misses.push(file.clone()),
            }
        }
        tracing::debug!(
            "Analysis cache: {} hits, {} misses",
            hits.len(),
            misses.len()
        );

        if !misses.is_empty() {
            for result in self.inner.analyze(&misses).await? {
                if let Err(e) = self.cache.put(&result).await {
                    tracing::warn!("Failed to cache {}: {}", result.file_path.display(), e);
                }
                hits.insert(result.file_path.clone(), result);
            }
        }

        // Preserve input order
        Ok(files.iter().filter_map(|f| hits.remove(f)).collect())
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct CountingAnalyzer {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SemanticAnalyzer for CountingAnalyzer {
        async fn analyze(&self, files: &[PathBuf]) -> Result<Vec<AnalysisResult>> {
            self.calls.fetch_add(files.len(), Ordering::SeqCst);
            Ok(files
                .iter()
                .map(|f| AnalysisResult {
                    file_path: f.clone(),
                    domain_context: "Billing".to_string(),
                    business_concepts: vec!["Invoice".to_string()],
                    business_rules: Vec::new(),
                    language: "csharp".to_string(),
                    analysis_time_ms: 1.0,
                    key_interfaces: Vec::new(),
                    references: Vec::new(),
                    complexity: 0,
                })
                .collect())
        }
    }

    fn setup() -> (TempDir, PathBuf, CachedAnalyzer<CountingAnalyzer>, Arc<AtomicUsize>) {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Invoice.cs");
        fs::write(&file, "class Invoice {}").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = AnalysisCache::new(dir.path().join("cache"), chrono::Duration::hours(24));
        let analyzer = CachedAnalyzer::new(
            CountingAnalyzer {
                calls: calls.clone(),
            },
            cache,
        );
        (dir, file, analyzer, calls)
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let (_dir, file, analyzer, calls) = setup();

        let first = analyzer.analyze(&[file.clone()]).await.unwrap();
        let second = analyzer.analyze(&[file.clone()]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_content_change_invalidates_entry() {
        let (_dir, file, analyzer, calls) = setup();
        analyzer.analyze(&[file.clone()]).await.unwrap();

        fs::write(&file, "class Invoice { int total; }").unwrap();
        analyzer.analyze(&[file.clone()]).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_entries_are_pruned() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Invoice.cs");
        fs::write(&file, "class Invoice {}").unwrap();
        let cache = AnalysisCache::new(dir.path().join("cache"), chrono::Duration::zero());
        let result = CountingAnalyzer {
            calls: Arc::new(AtomicUsize::new(0)),
        }
        .analyze(&[file.clone()])
        .await
        .unwrap();
        cache.put(&result[0]).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(cache.get(&file).await.is_none());
        assert_eq!(cache.prune().await.unwrap(), 1);
        assert_eq!(cache.prune().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_on_missing_dir_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = AnalysisCache::new(dir.path().join("absent"), chrono::Duration::hours(1));
        assert_eq!(cache.prune().await.unwrap(), 0);
    }
}
