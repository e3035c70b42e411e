//! Exact cosine search over an in-process map.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use localrag_core::error::{Error, Result};
use localrag_core::traits::VectorIndex;
use localrag_core::types::{IndexEntry, SearchHit};

use crate::search::rank;

struct MemCollection {
	embedder_id: String,
	dim: usize,
	/// Insertion order; an overwritten id keeps its slot.
	entries: Vec<IndexEntry>,
	positions: HashMap<String, usize>,
}

#[derive(Default)]
pub struct MemoryVectorIndex {
	collections: RwLock<HashMap<String, MemCollection>>,
}

impl MemoryVectorIndex {
	pub fn new() -> Self { Self::default() }
}

fn poisoned<T>(_: T) -> Error { Error::Index("memory index lock poisoned".to_string()) }

pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
	if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
	async fn upsert(&self, collection: &str, embedder_id: &str, entries: &[IndexEntry]) -> Result<usize> {
		let Some(first) = entries.first() else { return Ok(0) };
		let dim = first.vector.len();
		if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
			return Err(Error::DimensionMismatch { expected: dim, actual: bad.vector.len() });
		}
		let mut map = self.collections.write().map_err(poisoned)?;
		let col = map.entry(collection.to_string()).or_insert_with(|| MemCollection {
			embedder_id: embedder_id.to_string(),
			dim,
			entries: Vec::new(),
			positions: HashMap::new(),
		});
		if col.embedder_id != embedder_id {
			return Err(Error::ModelMismatch {
				collection: collection.to_string(),
				expected: col.embedder_id.clone(),
				actual: embedder_id.to_string(),
			});
		}
		if col.dim != dim {
			return Err(Error::DimensionMismatch { expected: col.dim, actual: dim });
		}
		for entry in entries {
			match col.positions.get(&entry.id) {
				Some(&pos) => col.entries[pos] = entry.clone(),
				None => {
					col.positions.insert(entry.id.clone(), col.entries.len());
					col.entries.push(entry.clone());
				}
			}
		}
		Ok(entries.len())
	}

	async fn search(&self, collection: &str, embedder_id: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		let map = self.collections.read().map_err(poisoned)?;
		let col = map.get(collection).ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
		if col.embedder_id != embedder_id {
			return Err(Error::ModelMismatch {
				collection: collection.to_string(),
				expected: col.embedder_id.clone(),
				actual: embedder_id.to_string(),
			});
		}
		if query.len() != col.dim {
			return Err(Error::DimensionMismatch { expected: col.dim, actual: query.len() });
		}
		if k == 0 { return Ok(Vec::new()); }
		let scored = col
			.entries
			.iter()
			.enumerate()
			.map(|(seq, e)| (SearchHit { chunk: e.chunk.clone(), score: cosine(query, &e.vector) }, seq as i64))
			.collect();
		Ok(rank(scored, k))
	}

	async fn count(&self, collection: &str) -> Result<usize> {
		let map = self.collections.read().map_err(poisoned)?;
		map.get(collection).map(|c| c.entries.len()).ok_or_else(|| Error::CollectionNotFound(collection.to_string()))
	}

	async fn drop_collection(&self, collection: &str) -> Result<()> {
		self.collections.write().map_err(poisoned)?.remove(collection);
		Ok(())
	}
}
