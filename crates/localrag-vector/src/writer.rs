use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::Table;
use std::collections::HashMap;
use std::sync::Arc;

use localrag_core::error::{Error, Result};
use localrag_core::types::IndexEntry;

use crate::schema::build_chunk_schema;
use crate::table::index_err;

/// Drops earlier duplicates of an id so a batch never matches a row twice.
pub(crate) fn dedup_last(entries: &[IndexEntry]) -> Vec<&IndexEntry> {
	let mut last: HashMap<&str, usize> = HashMap::new();
	for (i, e) in entries.iter().enumerate() { last.insert(e.id.as_str(), i); }
	entries.iter().enumerate().filter(|(i, e)| last.get(e.id.as_str()) == Some(i)).map(|(_, e)| e).collect()
}

/// `seq` of the rows already stored under `ids`.
pub async fn existing_seqs(table: &Table, ids: &[&str]) -> Result<HashMap<String, i64>> {
	let mut out = HashMap::new();
	for group in ids.chunks(256) {
		let list = group.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect::<Vec<_>>().join(", ");
		let mut stream = table
			.query()
			.only_if(format!("id IN ({list})"))
			.select(Select::columns(&["id", "seq"]))
			.execute()
			.await
			.map_err(index_err)?;
		while let Some(batch) = stream.try_next().await.map_err(index_err)? {
			let found = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>());
			let seqs = batch.column_by_name("seq").and_then(|c| c.as_any().downcast_ref::<Int64Array>());
			let (Some(found), Some(seqs)) = (found, seqs) else {
				return Err(Error::Index("id/seq columns missing".to_string()));
			};
			for i in 0..batch.num_rows() { out.insert(found.value(i).to_string(), seqs.value(i)); }
		}
	}
	Ok(out)
}

/// `seqs[i]` is the insertion sequence of `entries[i]`.
pub fn entries_to_record_batch(entries: &[&IndexEntry], dim: i32, seqs: &[i64]) -> Result<RecordBatch> {
	let schema = build_chunk_schema(dim);
	let mut ids = Vec::new(); let mut paths = Vec::new(); let mut pages = Vec::new(); let mut headers = Vec::new();
	let mut chunk_indices = Vec::new(); let mut contents = Vec::new(); let mut hashes = Vec::new();
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
	if seqs.len() != entries.len() {
		return Err(Error::Index(format!("{} sequence numbers for {} rows", seqs.len(), entries.len())));
	}
	for e in entries {
		ids.push(e.id.clone());
		paths.push(e.chunk.source_path.clone());
		pages.push(e.chunk.page_number.and_then(|p| i32::try_from(p).ok()));
		headers.push(serde_json::to_string(&e.chunk.header_path).map_err(index_err)?);
		chunk_indices.push(i32::try_from(e.chunk.chunk_index).map_err(index_err)?);
		contents.push(e.chunk.text.clone());
		hashes.push(e.chunk.content_hash());
		vectors.push(Some(e.vector.iter().map(|&x| Some(x)).collect()));
	}
	RecordBatch::try_new(schema, vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(paths)),
		Arc::new(Int32Array::from(pages)),
		Arc::new(StringArray::from(headers)),
		Arc::new(Int32Array::from(chunk_indices)),
		Arc::new(StringArray::from(contents)),
		Arc::new(StringArray::from(hashes)),
		Arc::new(Int64Array::from(seqs.to_vec())),
		Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim)),
	])
	.map_err(index_err)
}

/// Insert new ids, overwrite existing ones.
pub async fn merge_batch(table: &Table, batch: RecordBatch) -> Result<()> {
	let schema = batch.schema();
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
	let mut mi = table.merge_insert(&["id"]);
	mi.when_matched_update_all(None).when_not_matched_insert_all();
	let _ = mi.execute(reader).await.map_err(index_err)?;
	Ok(())
}
