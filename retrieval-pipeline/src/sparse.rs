use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use common::{
    error::AppError,
    utils::config::{AppConfig, SparseModelKind},
};
use fastembed::{SparseInitOptions, SparseModel, SparseTextEmbedding};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::pool::ResourcePool;

/// Vocabulary size of the hashed fallback. Matches the SPLADE (BERT) vocabulary so both
/// backends produce indices in the same range.
const HASHED_DIMENSION: u32 = 30_522;

const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sparse query vector: parallel lists of term indices and weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product over shared indices.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let lookup: BTreeMap<u32, f32> = other
            .indices
            .iter()
            .copied()
            .zip(other.values.iter().copied())
            .collect();
        self.indices
            .iter()
            .zip(&self.values)
            .filter_map(|(idx, value)| lookup.get(idx).map(|other| value * other))
            .sum()
    }
}

/// One SPLADE engine, loaded the first time its slot is leased.
#[derive(Default)]
struct SpladeSlot {
    model: OnceCell<Mutex<SparseTextEmbedding>>,
}

enum SparseBackend {
    Splade { cache_dir: PathBuf },
    Hashed,
}

/// Local sparse query embedder.
///
/// Holds `concurrency` engine slots. A turn leases one slot for the whole inference, which
/// runs on the blocking pool, so concurrent inferences never exceed the number of engines.
pub struct SparseEmbedder {
    backend: SparseBackend,
    engines: ResourcePool<SpladeSlot>,
}

impl SparseEmbedder {
    pub fn from_config(config: &AppConfig) -> Self {
        let concurrency = config.sparse_concurrency();
        let checkout_timeout = Duration::from_secs(config.pool_checkout_timeout_secs);
        let backend = match config.sparse_model {
            SparseModelKind::Splade => SparseBackend::Splade {
                cache_dir: config
                    .fastembed_cache_dir
                    .as_ref()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| Path::new(&config.data_dir).join("fastembed").join("sparse")),
            },
            SparseModelKind::Hashed => SparseBackend::Hashed,
        };
        Self::with_backend(backend, concurrency, checkout_timeout)
    }

    pub fn splade(cache_dir: PathBuf, concurrency: usize) -> Self {
        Self::with_backend(
            SparseBackend::Splade { cache_dir },
            concurrency,
            DEFAULT_CHECKOUT_TIMEOUT,
        )
    }

    /// Token-hashing embedder with no model download. Suited to tests and local setups.
    pub fn hashed(concurrency: usize) -> Self {
        Self::with_backend(SparseBackend::Hashed, concurrency, DEFAULT_CHECKOUT_TIMEOUT)
    }

    fn with_backend(backend: SparseBackend, concurrency: usize, checkout_timeout: Duration) -> Self {
        Self {
            backend,
            engines: ResourcePool::filled("sparse-embedder", concurrency, checkout_timeout),
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.backend {
            SparseBackend::Splade { .. } => "splade",
            SparseBackend::Hashed => "hashed",
        }
    }

    /// Number of engine slots, which is also the inference concurrency limit.
    pub fn concurrency(&self) -> usize {
        self.engines.size()
    }

    /// Free inference slots.
    pub fn available_permits(&self) -> usize {
        self.engines.available()
    }

    pub async fn embed(&self, text: &str) -> Result<SparseVector, AppError> {
        let lease = self.engines.checkout().await?;

        match &self.backend {
            SparseBackend::Hashed => {
                let vector = hashed_sparse_embedding(text);
                drop(lease);
                Ok(vector)
            }
            SparseBackend::Splade { cache_dir } => {
                lease
                    .model
                    .get_or_try_init(|| load_splade(cache_dir.clone(), lease.slot()))
                    .await?;
                let text = text.to_owned();

                // The lease moves into the blocking task: the engine stays taken until
                // inference actually finishes, even if the caller stops waiting.
                tokio::task::spawn_blocking(move || -> Result<SparseVector, AppError> {
                    let model = lease
                        .model
                        .get()
                        .ok_or_else(|| AppError::Embedding("sparse model not loaded".into()))?;
                    let mut engine = model
                        .lock()
                        .map_err(|_| AppError::Embedding("sparse model lock poisoned".into()))?;
                    let embedding = engine
                        .embed(vec![text], None)
                        .map_err(|e| AppError::Embedding(e.to_string()))?
                        .into_iter()
                        .next()
                        .ok_or_else(|| {
                            AppError::Embedding("sparse model returned no embedding".into())
                        })?;
                    drop(engine);
                    drop(lease);

                    let mut vector = SparseVector::default();
                    for (index, value) in embedding.indices.into_iter().zip(embedding.values) {
                        let index = u32::try_from(index)
                            .map_err(|_| AppError::Embedding("sparse index overflow".into()))?;
                        vector.indices.push(index);
                        vector.values.push(value);
                    }
                    Ok(vector)
                })
                .await?
            }
        }
    }
}

async fn load_splade(cache_dir: PathBuf, slot: usize) -> Result<Mutex<SparseTextEmbedding>, AppError> {
    info!(cache_dir = %cache_dir.display(), slot, "loading SPLADE sparse model");
    let model = tokio::task::spawn_blocking(move || -> Result<SparseTextEmbedding, AppError> {
        std::fs::create_dir_all(&cache_dir)?;
        let options = SparseInitOptions::new(SparseModel::SPLADEPPV1)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);
        SparseTextEmbedding::try_new(options).map_err(|e| AppError::Embedding(e.to_string()))
    })
    .await??;
    debug!(slot, "SPLADE sparse model ready");
    Ok(Mutex::new(model))
}

/// Term-frequency vector over hashed tokens, L2-normalised, indices ascending.
pub fn hashed_sparse_embedding(text: &str) -> SparseVector {
    let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
    for token in tokens(text) {
        *counts.entry(bucket(&token)).or_insert(0.0) += 1.0;
    }

    let norm = counts.values().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return SparseVector::default();
    }

    let (indices, values) = counts.into_iter().map(|(idx, v)| (idx, v / norm)).unzip();
    SparseVector { indices, values }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// 64-bit FNV-1a. Fixed across builds, so stored vectors keep matching query vectors.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

fn bucket(token: &str) -> u32 {
    u32::try_from(fnv1a(token.as_bytes()) % u64::from(HASHED_DIMENSION)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_embedding_is_normalised_and_sorted() {
        let vector = hashed_sparse_embedding("De brug, de BRUG en het café");
        assert!(!vector.is_empty());
        assert!(vector.indices.windows(2).all(|w| w[0] < w[1]));
        let norm: f32 = vector.values.iter().map(|v| v * v).sum();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(vector.indices.iter().all(|idx| *idx < HASHED_DIMENSION));
    }

    #[test]
    fn shared_terms_score_higher() {
        let query = hashed_sparse_embedding("begroting brug");
        let related = hashed_sparse_embedding("de begroting voor de nieuwe brug");
        let unrelated = hashed_sparse_embedding("afvalinzameling in het voorjaar");
        assert!(query.dot(&related) > query.dot(&unrelated));
    }

    #[test]
    fn empty_text_gives_empty_vector() {
        assert!(hashed_sparse_embedding("  ,.;  ").is_empty());
    }

    #[tokio::test]
    async fn embed_returns_permit_after_use() {
        let embedder = SparseEmbedder::hashed(2);
        assert_eq!(embedder.available_permits(), 2);
        let vector = embedder.embed("woo-verzoek gemeente").await.expect("embed");
        assert_eq!(vector.indices.len(), vector.values.len());
        assert_eq!(embedder.available_permits(), 2);
        assert_eq!(embedder.backend_label(), "hashed");
    }

    #[tokio::test]
    async fn concurrency_matches_engine_slots() {
        let embedder = SparseEmbedder::hashed(3);
        assert_eq!(embedder.concurrency(), 3);
        assert_eq!(SparseEmbedder::hashed(0).concurrency(), 1);

        let (a, b, c) = tokio::join!(
            embedder.embed("brug"),
            embedder.embed("begroting"),
            embedder.embed("afval")
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(embedder.available_permits(), 3);
    }

    #[test]
    fn token_buckets_are_fixed() {
        // FNV-1a reference values
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(bucket("brug"), bucket("brug"));
        assert_eq!(
            hashed_sparse_embedding("De BRUG"),
            hashed_sparse_embedding("de brug")
        );
    }
}
