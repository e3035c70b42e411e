use arrow_array::{Array, Float32Array, Int32Array, Int64Array, RecordBatch, StringArray};
use std::cmp::Ordering;

use localrag_core::error::{Error, Result};
use localrag_core::types::{Chunk, SearchHit};

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| Error::Index(format!("column '{name}' missing or mistyped")))
}

/// Decode one result batch into `(hit, seq)` pairs. Cosine distance becomes
/// similarity as `1 - _distance`.
pub fn decode_hits(batch: &RecordBatch) -> Result<Vec<(SearchHit, i64)>> {
	let paths = column::<StringArray>(batch, "source_path")?;
	let pages = column::<Int32Array>(batch, "page_number")?;
	let headers = column::<StringArray>(batch, "header_path")?;
	let chunk_indices = column::<Int32Array>(batch, "chunk_index")?;
	let contents = column::<StringArray>(batch, "content")?;
	let seqs = column::<Int64Array>(batch, "seq")?;
	let distances = column::<Float32Array>(batch, "_distance")?;

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let header_path: Vec<String> = serde_json::from_str(headers.value(i)).unwrap_or_default();
		let page_number = if pages.is_null(i) { None } else { u32::try_from(pages.value(i)).ok() };
		let chunk = Chunk::new(
			contents.value(i),
			paths.value(i),
			page_number,
			header_path,
			usize::try_from(chunk_indices.value(i)).unwrap_or_default(),
		)?;
		out.push((SearchHit { chunk, score: 1.0 - distances.value(i) }, seqs.value(i)));
	}
	Ok(out)
}

/// Highest score first; equal scores keep insertion order.
pub fn rank(mut hits: Vec<(SearchHit, i64)>, k: usize) -> Vec<SearchHit> {
	hits.sort_by(|a, b| b.0.score.partial_cmp(&a.0.score).unwrap_or(Ordering::Equal).then(a.1.cmp(&b.1)));
	hits.into_iter().take(k).map(|(hit, _)| hit).collect()
}
