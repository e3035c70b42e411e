//! LanceDB connection and housekeeping helpers.
//!
//! Provides database open functions, an ensure helper for tables, and a simple
//! key/value metadata table recording which embedder built each collection.
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use arrow_schema::SchemaRef;
use chrono::Utc;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::fmt::Display;
use std::sync::Arc;

use localrag_core::error::{Error, Result};

use crate::schema::{build_meta_schema, META_TABLE};

pub(crate) fn index_err(e: impl Display) -> Error { Error::Index(e.to_string()) }

pub async fn open_db(uri: &str) -> Result<Connection> {
	connect(uri).execute().await.map_err(index_err)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
	let names = conn.table_names().execute().await.map_err(index_err)?;
	Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: SchemaRef) -> Result<()> {
	if table_exists(conn, name).await? {
		return Ok(());
	}
	// create empty table with 0 rows
	let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
	conn.create_table(name, Box::new(iter)).execute().await.map_err(index_err)?;
	Ok(())
}

fn key_filter(key: &str) -> String { format!("key = '{}'", key.replace('\'', "''")) }

pub async fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
	ensure_table(conn, META_TABLE, build_meta_schema()).await?;
	let t = conn.open_table(META_TABLE).execute().await.map_err(index_err)?;
	let rb = RecordBatch::try_new(
		build_meta_schema(),
		vec![
			Arc::new(StringArray::from(vec![key.to_string()])),
			Arc::new(StringArray::from(vec![value.to_string()])),
			Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
		],
	)
	.map_err(index_err)?;
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
	// Upsert behavior via merge_insert: key is unique
	let mut mi = t.merge_insert(&["key"]);
	mi.when_matched_update_all(None).when_not_matched_insert_all();
	let _ = mi.execute(reader).await.map_err(index_err)?;
	Ok(())
}

pub async fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
	if !table_exists(conn, META_TABLE).await? { return Ok(None); }
	let t = conn.open_table(META_TABLE).execute().await.map_err(index_err)?;
	let mut stream = t.query().only_if(key_filter(key)).execute().await.map_err(index_err)?;
	while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(index_err)? {
		if batch.num_rows() == 0 { continue; }
		let val = batch
			.column_by_name("value")
			.and_then(|c| c.as_any().downcast_ref::<StringArray>())
			.ok_or_else(|| Error::Index("meta.value column missing".to_string()))?;
		return Ok(Some(val.value(0).to_string()));
	}
	Ok(None)
}

pub async fn delete_meta(conn: &Connection, key: &str) -> Result<()> {
	if !table_exists(conn, META_TABLE).await? { return Ok(()); }
	let t = conn.open_table(META_TABLE).execute().await.map_err(index_err)?;
	t.delete(&key_filter(key)).await.map_err(index_err)?;
	Ok(())
}
