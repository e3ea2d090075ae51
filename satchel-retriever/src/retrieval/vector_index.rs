//! Append-only similarity index over fixed-dimension embeddings.
//!
//! The index is a flat structure: vectors live in dense slots, searched
//! exhaustively by squared L2 distance, with a bidirectional mapping
//! between chunk ids and slots. The first vector added fixes the
//! dimension for the index's lifetime; every later vector must match it.
//!
//! Entries are only ever added in batches. There is no point deletion:
//! removal is always expressed as [`VectorIndex::rebuild_from_source`]
//! with the currently-valid (id, vector) pairs, which keeps the slot
//! numbering dense and the mapping trivial to persist.
//!
//! On disk the index is a file pair — `vectors.bin` holding the vector
//! data behind a small header, and `id_mapping.json` holding the
//! slot-to-chunk-id mapping. The pair is only valid together; loading a
//! half-present or mutually inconsistent pair fails with
//! [`IndexError::Corrupt`], and the caller recovers by treating the
//! index as empty and rebuilding it from the metadata store.

use half::f16;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Chunk id used as the external key of index entries.
pub type ChunkKey = i64;

const VECTORS_FILE: &str = "vectors.bin";
const MAPPING_FILE: &str = "id_mapping.json";

const MAGIC: &[u8; 4] = b"SVIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;

/// Error type for vector index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A vector's length does not match the index's fixed dimension
    #[error("vector for chunk {key} has dimension {got}, index dimension is {expected}")]
    DimensionMismatch {
        key: ChunkKey,
        expected: usize,
        got: usize,
    },

    /// A query vector's length does not match the index's fixed dimension
    #[error("query vector has dimension {got}, index dimension is {expected}")]
    QueryDimensionMismatch { expected: usize, got: usize },

    /// Search against an index holding zero vectors
    #[error("the vector index holds no vectors")]
    EmptyIndex,

    /// The persisted file pair is missing a member or internally inconsistent
    #[error("persisted vector index is corrupt: {reason}")]
    Corrupt { reason: String },

    /// Reading or writing the index files failed
    #[error("vector index I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Snapshot of the index's size and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IndexStats {
    pub vector_count: usize,
    pub dimension: usize,
    pub initialized: bool,
}

/// Flat squared-L2 similarity index with a chunk-id ↔ slot mapping.
#[derive(Debug, Default)]
pub struct VectorIndex {
    dimension: Option<usize>,
    vectors: Vec<Vec<f16>>,
    slot_to_key: Vec<ChunkKey>,
    key_to_slot: HashMap<ChunkKey, usize>,
}

impl VectorIndex {
    /// Create an empty, uninitialized index. The dimension is fixed by
    /// the first batch added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch of (chunk id, vector) pairs.
    ///
    /// The whole batch is validated before any slot is written, so a
    /// dimension mismatch anywhere in it leaves the index untouched.
    /// Pairs whose key is already present are skipped, which makes
    /// re-adding a document's chunks idempotent. Returns the slot
    /// assigned to each newly added key.
    pub fn add_batch(
        &mut self,
        items: &[(ChunkKey, Vec<f16>)],
    ) -> Result<HashMap<ChunkKey, usize>, IndexError> {
        let mut assigned = HashMap::new();
        if items.is_empty() {
            return Ok(assigned);
        }

        let expected = self.dimension.unwrap_or(items[0].1.len());
        for (key, vector) in items {
            if vector.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    key: *key,
                    expected,
                    got: vector.len(),
                });
            }
        }
        self.dimension = Some(expected);

        for (key, vector) in items {
            if self.key_to_slot.contains_key(key) {
                tracing::debug!("Chunk {key} already present in vector index, skipping");
                continue;
            }
            let slot = self.vectors.len();
            self.vectors.push(vector.clone());
            self.slot_to_key.push(*key);
            self.key_to_slot.insert(*key, slot);
            assigned.insert(*key, slot);
        }

        Ok(assigned)
    }

    /// Nearest neighbors of `query`, as (chunk id, squared L2 distance)
    /// pairs in ascending distance order. Returns fewer than `k` results
    /// when the index holds fewer vectors; an index with zero vectors is
    /// an [`IndexError::EmptyIndex`] error that callers treat as "no
    /// results".
    pub fn search(&self, query: &[f16], k: usize) -> Result<Vec<(ChunkKey, f32)>, IndexError> {
        if self.vectors.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        let expected = self.dimension.unwrap_or(0);
        if query.len() != expected {
            return Err(IndexError::QueryDimensionMismatch {
                expected,
                got: query.len(),
            });
        }

        let mut scored: Vec<(ChunkKey, f32)> = self
            .vectors
            .iter()
            .zip(&self.slot_to_key)
            .map(|(vector, key)| (*key, squared_l2(query, vector)))
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Discard the current structure and repopulate from `source`.
    ///
    /// This is the only way entries leave the index; the dimension is
    /// re-fixed by the first pair of the new population.
    pub fn rebuild_from_source(
        &mut self,
        source: impl IntoIterator<Item = (ChunkKey, Vec<f16>)>,
    ) -> Result<(), IndexError> {
        self.reset();
        for (key, vector) in source {
            self.add_batch(std::slice::from_ref(&(key, vector)))?;
        }
        tracing::info!("Vector index rebuilt with {} vectors", self.vectors.len());
        Ok(())
    }

    /// Drop all entries and forget the dimension.
    pub fn reset(&mut self) {
        self.dimension = None;
        self.vectors.clear();
        self.slot_to_key.clear();
        self.key_to_slot.clear();
    }

    pub fn contains(&self, key: ChunkKey) -> bool {
        self.key_to_slot.contains_key(&key)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            vector_count: self.vectors.len(),
            dimension: self.dimension.unwrap_or(0),
            initialized: self.dimension.is_some(),
        }
    }

    /// Write the vector file and the mapping sidecar into `dir`.
    ///
    /// Both files are written on every persist so they stay a matched
    /// pair.
    pub async fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| IndexError::io(dir, e))?;

        let dimension = self.dimension.unwrap_or(0);
        let mut data =
            Vec::with_capacity(HEADER_LEN + self.vectors.len() * dimension * size_of::<f16>());
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        data.extend_from_slice(&(dimension as u64).to_le_bytes());
        data.extend_from_slice(&(self.vectors.len() as u64).to_le_bytes());
        for vector in &self.vectors {
            for value in vector {
                data.extend_from_slice(&value.to_le_bytes());
            }
        }

        let vectors_path = dir.join(VECTORS_FILE);
        tokio::fs::write(&vectors_path, data)
            .await
            .map_err(|e| IndexError::io(&vectors_path, e))?;

        let mapping_path = dir.join(MAPPING_FILE);
        let mapping = serde_json::to_vec(&self.slot_to_key)
            .map_err(|e| IndexError::corrupt(format!("mapping not serializable: {e}")))?;
        tokio::fs::write(&mapping_path, mapping)
            .await
            .map_err(|e| IndexError::io(&mapping_path, e))?;

        tracing::debug!(
            "Persisted vector index to {} ({} vectors, dimension {})",
            dir.display(),
            self.vectors.len(),
            dimension
        );
        Ok(())
    }

    /// Restore the index from `dir`.
    ///
    /// Returns `Ok(None)` when neither file exists (fresh install). A
    /// half-present pair, a bad header, or data that disagrees with the
    /// mapping is [`IndexError::Corrupt`].
    pub async fn load(dir: &Path) -> Result<Option<Self>, IndexError> {
        let vectors_path = dir.join(VECTORS_FILE);
        let mapping_path = dir.join(MAPPING_FILE);

        match (vectors_path.exists(), mapping_path.exists()) {
            (false, false) => return Ok(None),
            (true, false) => {
                return Err(IndexError::corrupt(format!(
                    "{VECTORS_FILE} present but {MAPPING_FILE} missing"
                )));
            }
            (false, true) => {
                return Err(IndexError::corrupt(format!(
                    "{MAPPING_FILE} present but {VECTORS_FILE} missing"
                )));
            }
            (true, true) => {}
        }

        let data = tokio::fs::read(&vectors_path)
            .await
            .map_err(|e| IndexError::io(&vectors_path, e))?;
        if data.len() < HEADER_LEN {
            return Err(IndexError::corrupt("vector file shorter than its header"));
        }
        if &data[0..4] != MAGIC {
            return Err(IndexError::corrupt("vector file has a foreign magic number"));
        }
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != FORMAT_VERSION {
            return Err(IndexError::corrupt(format!(
                "unsupported vector file version {version}"
            )));
        }
        let dimension = read_u64_le(&data[8..16]) as usize;
        let count = read_u64_le(&data[16..24]) as usize;

        let body = &data[HEADER_LEN..];
        let expected_len = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(size_of::<f16>()))
            .ok_or_else(|| IndexError::corrupt("vector file header overflows"))?;
        if body.len() != expected_len {
            return Err(IndexError::corrupt(format!(
                "vector data is {} bytes, header promises {expected_len}",
                body.len()
            )));
        }
        if count > 0 && dimension == 0 {
            return Err(IndexError::corrupt("vectors recorded with dimension zero"));
        }

        let mapping_bytes = tokio::fs::read(&mapping_path)
            .await
            .map_err(|e| IndexError::io(&mapping_path, e))?;
        let slot_to_key: Vec<ChunkKey> = serde_json::from_slice(&mapping_bytes)
            .map_err(|e| IndexError::corrupt(format!("mapping is not valid JSON: {e}")))?;
        if slot_to_key.len() != count {
            return Err(IndexError::corrupt(format!(
                "mapping lists {} slots, vector file holds {count}",
                slot_to_key.len()
            )));
        }

        let mut vectors = Vec::with_capacity(count);
        for slot in 0..count {
            let start = slot * dimension * size_of::<f16>();
            let vector: Vec<f16> = body[start..start + dimension * size_of::<f16>()]
                .chunks_exact(size_of::<f16>())
                .map(|pair| f16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            vectors.push(vector);
        }

        let mut key_to_slot = HashMap::with_capacity(count);
        for (slot, key) in slot_to_key.iter().enumerate() {
            if key_to_slot.insert(*key, slot).is_some() {
                return Err(IndexError::corrupt(format!(
                    "chunk {key} appears in more than one slot"
                )));
            }
        }

        tracing::info!(
            "Loaded vector index from {}: {} vectors, dimension {}",
            dir.display(),
            count,
            dimension
        );
        Ok(Some(Self {
            dimension: if dimension == 0 { None } else { Some(dimension) },
            vectors,
            slot_to_key,
            key_to_slot,
        }))
    }
}

fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

fn squared_l2(a: &[f16], b: &[f16]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x.to_f32() - y.to_f32();
            d * d
        })
        .sum()
}
