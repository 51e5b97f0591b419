//! Cached text-to-vector encoding.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use moka::sync::Cache;
use parking_lot::Mutex;
use rkyv::rancor::Error as RkyvError;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::backend::{BertEmbedder, EmbeddingBackend, HashingEmbedder};
use super::config::EmbeddingConfig;
use super::error::{EmbeddingError, EmbeddingResult};
use super::text::preprocess;
use crate::hashing::hash_text;
use crate::snapshot::{SnapshotError, read_snapshot, write_snapshot};

const CACHE_FILE_MAGIC: &[u8; 4] = b"FLE1";

/// On-disk form of the embedding cache. `vectors` is `keys.len() * dimension` floats.
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct CacheFile {
    dimension: u64,
    keys: Vec<String>,
    vectors: Vec<f32>,
}

/// Snapshot of the provider for stats endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingModelInfo {
    /// Backend name, `None` when unavailable.
    pub backend: Option<String>,
    pub dimension: usize,
    pub cached_entries: u64,
    pub cache_path: Option<PathBuf>,
}

/// Cosine similarity clamped to `[0, 1]`; `0` for zero-norm or mismatched inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Encodes text through a backend with a content-addressed cache in front.
///
/// Keys are BLAKE3 digests of the preprocessed text. The cache is optionally mirrored to an
/// `rkyv` file every `flush_every` new entries and on [`EmbeddingProvider::flush`].
pub struct EmbeddingProvider {
    backend: Option<Box<dyn EmbeddingBackend>>,
    config: EmbeddingConfig,
    cache: Cache<String, Arc<[f32]>>,
    unflushed: AtomicUsize,
    flush_lock: Mutex<()>,
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("backend", &self.backend_name())
            .field("dimension", &self.config.dimension)
            .field("cache_path", &self.config.cache_path)
            .finish()
    }
}

impl EmbeddingProvider {
    /// Loads the configured backend (BERT if `model_path` is set, hashing otherwise).
    pub fn load(config: EmbeddingConfig) -> EmbeddingResult<Self> {
        config.validate()?;

        let backend: Box<dyn EmbeddingBackend> = match &config.model_path {
            Some(path) => Box::new(BertEmbedder::load(path, config.max_seq_len)?),
            None => {
                info!(
                    dimension = config.dimension,
                    "No embedding model configured, using hashing embedder"
                );
                Box::new(HashingEmbedder::new(config.dimension))
            }
        };

        Self::with_backend(backend, config)
    }

    /// Like [`EmbeddingProvider::load`], but a backend that fails to load leaves the provider
    /// unavailable instead of failing.
    pub fn load_or_degrade(config: EmbeddingConfig) -> Self {
        match Self::load(config.clone()) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(error = %e, "Embedding backend failed to load, provider unavailable");
                Self::unavailable(config)
            }
        }
    }

    /// Wraps an explicit backend. Its dimension must match `config.dimension`.
    pub fn with_backend(
        backend: Box<dyn EmbeddingBackend>,
        config: EmbeddingConfig,
    ) -> EmbeddingResult<Self> {
        config.validate()?;
        if backend.dimension() != config.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: config.dimension,
                actual: backend.dimension(),
            });
        }

        let provider = Self::build(Some(backend), config);
        provider.load_cache_file();
        Ok(provider)
    }

    /// Provider with no backend: every encode reports [`EmbeddingError::Unavailable`].
    pub fn unavailable(config: EmbeddingConfig) -> Self {
        Self::build(None, config)
    }

    fn build(backend: Option<Box<dyn EmbeddingBackend>>, config: EmbeddingConfig) -> Self {
        Self {
            backend,
            cache: Cache::new(config.cache_capacity),
            config,
            unflushed: AtomicUsize::new(0),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    fn backend(&self) -> EmbeddingResult<&dyn EmbeddingBackend> {
        self.backend
            .as_deref()
            .ok_or_else(|| EmbeddingError::Unavailable {
                reason: "no embedding backend loaded".to_string(),
            })
    }

    fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.config.dimension]
    }

    fn check_dimension(&self, v: &[f32]) -> EmbeddingResult<()> {
        if v.len() != self.config.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.config.dimension,
                actual: v.len(),
            });
        }
        Ok(())
    }

    /// Encodes one text. Empty text yields the zero vector without touching the cache.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn encode(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let backend = self.backend()?;

        let text = preprocess(text, self.config.max_text_chars);
        if text.is_empty() {
            return Ok(self.zero_vector());
        }

        let key = hash_text(&text);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.to_vec());
        }

        let vector = backend
            .embed_batch(&[text.as_str()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InferenceFailed {
                reason: "backend returned no vector".to_string(),
            })?;
        self.check_dimension(&vector)?;

        self.cache.insert(key, Arc::from(vector.as_slice()));
        self.note_new_entries(1);
        Ok(vector)
    }

    /// Encodes many texts, computing only cache misses, in `batch_size` chunks.
    ///
    /// Output order matches input order. A chunk the backend fails on contributes zero
    /// vectors instead of an error.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub fn encode_batch<S: AsRef<str>>(&self, texts: &[S]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let backend = self.backend()?;

        let mut out: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut pending: Vec<(usize, String, String)> = Vec::new();

        for (i, raw) in texts.iter().enumerate() {
            let text = preprocess(raw.as_ref(), self.config.max_text_chars);
            if text.is_empty() {
                out.push(Some(self.zero_vector()));
                continue;
            }
            let key = hash_text(&text);
            match self.cache.get(&key) {
                Some(hit) => out.push(Some(hit.to_vec())),
                None => {
                    out.push(None);
                    pending.push((i, key, text));
                }
            }
        }

        if !pending.is_empty() {
            debug!(
                uncached = pending.len(),
                cached = texts.len() - pending.len(),
                "Encoding uncached texts"
            );
        }

        let mut added = 0;
        for chunk in pending.chunks(self.config.batch_size) {
            let inputs: Vec<&str> = chunk.iter().map(|(_, _, t)| t.as_str()).collect();
            let vectors = backend.embed_batch(&inputs).and_then(|vs| {
                if vs.len() != inputs.len() {
                    return Err(EmbeddingError::InferenceFailed {
                        reason: format!("got {} vectors for {} inputs", vs.len(), inputs.len()),
                    });
                }
                vs.iter().try_for_each(|v| self.check_dimension(v))?;
                Ok(vs)
            });

            match vectors {
                Ok(vectors) => {
                    for ((i, key, _), vector) in chunk.iter().zip(vectors) {
                        self.cache.insert(key.clone(), Arc::from(vector.as_slice()));
                        out[*i] = Some(vector);
                        added += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        chunk = chunk.len(),
                        "Batch chunk failed, using zero vectors"
                    );
                    for (i, _, _) in chunk {
                        out[*i] = Some(self.zero_vector());
                    }
                }
            }
        }

        self.note_new_entries(added);
        Ok(out
            .into_iter()
            .map(|v| v.unwrap_or_else(|| self.zero_vector()))
            .collect())
    }

    pub fn compute_similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }

    /// Ranks `candidates` by similarity to `query`, best first.
    pub fn find_similar(
        &self,
        query: &[f32],
        candidates: &[Vec<f32>],
        top_k: usize,
    ) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query, c)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        scored
    }

    pub fn cached_entries(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn model_info(&self) -> EmbeddingModelInfo {
        EmbeddingModelInfo {
            backend: self.backend_name().map(str::to_string),
            dimension: self.config.dimension,
            cached_entries: self.cached_entries(),
            cache_path: self.config.cache_path.clone(),
        }
    }

    /// Drops every cached vector (the cache file is left alone until the next flush).
    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    fn note_new_entries(&self, added: usize) {
        if added == 0 || self.config.cache_path.is_none() {
            return;
        }
        let total = self.unflushed.fetch_add(added, Ordering::AcqRel) + added;
        if total < self.config.flush_every {
            return;
        }
        // Another thread already flushing will pick these entries up.
        let Some(_guard) = self.flush_lock.try_lock() else {
            return;
        };
        if let Err(e) = self.write_cache_file() {
            warn!(error = %e, "Periodic embedding cache flush failed");
        }
    }

    /// New entries since the last cache-file write.
    pub fn unflushed_entries(&self) -> usize {
        self.unflushed.load(Ordering::Acquire)
    }

    /// Writes the cache file now. Returns how many entries were written (0 without a path).
    pub fn flush(&self) -> EmbeddingResult<usize> {
        let _guard = self.flush_lock.lock();
        self.write_cache_file()
    }

    fn write_cache_file(&self) -> EmbeddingResult<usize> {
        let Some(path) = self.config.cache_path.as_deref() else {
            return Ok(0);
        };
        // Entries added while writing stay counted for the next flush.
        let pending = self.unflushed.load(Ordering::Acquire);

        let mut file = CacheFile {
            dimension: self.config.dimension as u64,
            keys: Vec::new(),
            vectors: Vec::new(),
        };
        for (key, vector) in self.cache.iter() {
            if vector.len() == self.config.dimension {
                file.keys.push(key.as_ref().clone());
                file.vectors.extend_from_slice(&vector);
            }
        }

        let bytes =
            rkyv::to_bytes::<RkyvError>(&file).map_err(|e| cache_file_error(path, e))?;
        write_snapshot(path, CACHE_FILE_MAGIC, &bytes)
            .map_err(|e| cache_file_error(path, e))?;
        self.unflushed.fetch_sub(pending, Ordering::AcqRel);

        debug!(path = %path.display(), entries = file.keys.len(), "Embedding cache flushed");
        Ok(file.keys.len())
    }

    fn load_cache_file(&self) {
        let Some(path) = self.config.cache_path.as_deref() else {
            return;
        };
        if !path.exists() {
            return;
        }

        match self.read_cache_file(path) {
            Ok(loaded) => {
                info!(path = %path.display(), entries = loaded, "Loaded embedding cache");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable embedding cache");
            }
        }
    }

    fn read_cache_file(&self, path: &Path) -> EmbeddingResult<usize> {
        let bytes =
            read_snapshot(path, CACHE_FILE_MAGIC).map_err(|e| cache_file_error(path, e))?;
        let file = rkyv::from_bytes::<CacheFile, RkyvError>(&bytes).map_err(|e| {
            cache_file_error(
                path,
                SnapshotError::Codec {
                    reason: e.to_string(),
                },
            )
        })?;

        let dim = self.config.dimension;
        if file.dimension != dim as u64 {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dim,
                actual: file.dimension as usize,
            });
        }
        if file.vectors.len() != file.keys.len() * dim {
            return Err(EmbeddingError::CacheFile {
                reason: format!(
                    "{} keys but {} floats at dimension {}",
                    file.keys.len(),
                    file.vectors.len(),
                    dim
                ),
            });
        }

        let count = file.keys.len();
        for (key, vector) in file.keys.into_iter().zip(file.vectors.chunks_exact(dim)) {
            self.cache.insert(key, Arc::from(vector));
        }
        Ok(count)
    }
}

fn cache_file_error(path: &Path, err: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::CacheFile {
        reason: format!("{}: {err}", path.display()),
    }
}
