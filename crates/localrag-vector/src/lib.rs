use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use std::sync::Arc;
use tracing::{debug, info};

use localrag_core::config::{IndexBackend, IndexSettings};
use localrag_core::error::{Error, Result};
use localrag_core::traits::VectorIndex;
use localrag_core::types::{IndexEntry, SearchHit};

pub mod memory;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use memory::MemoryVectorIndex;

use schema::{build_chunk_schema, vector_dim, META_TABLE};
use table::{delete_meta, ensure_table, get_meta, index_err, open_db, set_meta, table_exists};

/// Results fetched per requested hit, so equal scores at the cut can be
/// ordered by insertion.
const OVERFETCH: usize = 4;

fn embedder_key(collection: &str) -> String { format!("embedder:{collection}") }
fn seq_key(collection: &str) -> String { format!("seq:{collection}") }

/// One LanceDB table per collection, cosine distance, upsert on chunk id.
pub struct LanceVectorIndex {
	db: Connection,
}

impl LanceVectorIndex {
	pub async fn open(uri: &str) -> Result<Self> {
		info!(uri, "opening LanceDB");
		Ok(Self { db: open_db(uri).await? })
	}

	/// Fails unless the collection was built by `embedder_id`.
	async fn check_identity(&self, collection: &str, embedder_id: &str) -> Result<bool> {
		match get_meta(&self.db, &embedder_key(collection)).await? {
			Some(stored) if stored != embedder_id => Err(Error::ModelMismatch {
				collection: collection.to_string(),
				expected: stored,
				actual: embedder_id.to_string(),
			}),
			Some(_) => Ok(true),
			None => Ok(false),
		}
	}

	async fn table_dim(&self, collection: &str) -> Result<Option<usize>> {
		if !table_exists(&self.db, collection).await? { return Ok(None); }
		let t = self.db.open_table(collection).execute().await.map_err(index_err)?;
		let schema = t.schema().await.map_err(index_err)?;
		Ok(vector_dim(&schema))
	}
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
	async fn upsert(&self, collection: &str, embedder_id: &str, entries: &[IndexEntry]) -> Result<usize> {
		if collection == META_TABLE {
			return Err(Error::InvalidConfig(format!("collection name '{META_TABLE}' is reserved")));
		}
		let Some(first) = entries.first() else { return Ok(0) };
		let dim = first.vector.len();
		if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
			return Err(Error::DimensionMismatch { expected: dim, actual: bad.vector.len() });
		}
		let known = self.check_identity(collection, embedder_id).await?;
		match self.table_dim(collection).await? {
			Some(existing) if existing != dim => return Err(Error::DimensionMismatch { expected: existing, actual: dim }),
			Some(_) => {}
			None => {
				let width = i32::try_from(dim).map_err(index_err)?;
				ensure_table(&self.db, collection, build_chunk_schema(width)).await?;
			}
		}
		if !known {
			set_meta(&self.db, &embedder_key(collection), embedder_id).await?;
		}

		let rows = writer::dedup_last(entries);
		let t = self.db.open_table(collection).execute().await.map_err(index_err)?;
		// re-ingested ids keep their original position in tie order
		let ids: Vec<&str> = rows.iter().map(|e| e.id.as_str()).collect();
		let known_seqs = writer::existing_seqs(&t, &ids).await?;
		let mut next_seq = get_meta(&self.db, &seq_key(collection)).await?.and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
		let seqs: Vec<i64> = rows
			.iter()
			.map(|e| {
				known_seqs.get(&e.id).copied().unwrap_or_else(|| {
					next_seq += 1;
					next_seq - 1
				})
			})
			.collect();
		let width = i32::try_from(dim).map_err(index_err)?;
		let batch = writer::entries_to_record_batch(&rows, width, &seqs)?;
		writer::merge_batch(&t, batch).await?;
		set_meta(&self.db, &seq_key(collection), &next_seq.to_string()).await?;
		debug!(collection, rows = rows.len(), "upserted");
		Ok(entries.len())
	}

	async fn search(&self, collection: &str, embedder_id: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		if !self.check_identity(collection, embedder_id).await? || !table_exists(&self.db, collection).await? {
			return Err(Error::CollectionNotFound(collection.to_string()));
		}
		if let Some(dim) = self.table_dim(collection).await? {
			if dim != query.len() {
				return Err(Error::DimensionMismatch { expected: dim, actual: query.len() });
			}
		}
		if k == 0 { return Ok(Vec::new()); }
		let t = self.db.open_table(collection).execute().await.map_err(index_err)?;
		let mut stream = t
			.vector_search(query.to_vec())
			.map_err(index_err)?
			.distance_type(DistanceType::Cosine)
			.limit(k.saturating_mul(OVERFETCH))
			.execute()
			.await
			.map_err(index_err)?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(index_err)? {
			hits.extend(search::decode_hits(&batch)?);
		}
		Ok(search::rank(hits, k))
	}

	async fn count(&self, collection: &str) -> Result<usize> {
		if !table_exists(&self.db, collection).await? {
			return Err(Error::CollectionNotFound(collection.to_string()));
		}
		let t = self.db.open_table(collection).execute().await.map_err(index_err)?;
		t.count_rows(None).await.map_err(index_err)
	}

	/// Removes every row and the recorded identity; the empty table stays.
	async fn drop_collection(&self, collection: &str) -> Result<()> {
		if table_exists(&self.db, collection).await? {
			let t = self.db.open_table(collection).execute().await.map_err(index_err)?;
			t.delete("true").await.map_err(index_err)?;
		}
		delete_meta(&self.db, &embedder_key(collection)).await?;
		delete_meta(&self.db, &seq_key(collection)).await
	}
}

pub async fn open_index(settings: &IndexSettings) -> Result<Arc<dyn VectorIndex>> {
	match settings.backend {
		IndexBackend::Memory => Ok(Arc::new(MemoryVectorIndex::new())),
		IndexBackend::Lance => Ok(Arc::new(LanceVectorIndex::open(&settings.uri).await?)),
	}
}
