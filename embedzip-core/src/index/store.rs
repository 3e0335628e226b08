//! Index persistence using Parquet format
//!
//! The vector artifact holds `position` and a fixed-size `embedding` list,
//! with index parameters in the schema metadata. The docstore artifact holds
//! the text and source of every position.

use super::{
    FlatIndex, IndexEntry, IndexError, Result, DOCSTORE_FILE, FORMAT_VERSION, INDEX_FILE, METRIC,
};
use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int32Array, Int64Array, StringArray,
    StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const META_DIMENSION: &str = "embedzip.dimension";
const META_METRIC: &str = "embedzip.metric";
const META_MODEL: &str = "embedzip.embedding_model";
const META_CREATED_AT: &str = "embedzip.created_at";
const META_FORMAT_VERSION: &str = "embedzip.format_version";

/// Persists an index as its two artifacts
#[cfg_attr(test, mockall::automock)]
pub trait IndexWriter: Send + Sync {
    /// Write both artifacts into `dir`, creating it if needed
    fn save(&self, index: &FlatIndex, dir: &Path) -> Result<()>;
}

/// Paths of the vector and docstore artifacts inside `dir`
pub fn artifact_paths(dir: &Path) -> [PathBuf; 2] {
    [dir.join(INDEX_FILE), dir.join(DOCSTORE_FILE)]
}

pub fn artifacts_exist(dir: &Path) -> bool {
    artifact_paths(dir).iter().all(|p| p.is_file())
}

/// Writes ZSTD-compressed Parquet artifacts
#[derive(Debug, Clone, Default)]
pub struct ParquetIndexWriter;

impl ParquetIndexWriter {
    pub fn new() -> Self {
        Self
    }

    fn write_batch(path: &Path, schema: Arc<Schema>, batch: &RecordBatch) -> Result<()> {
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(Default::default()))
            .build();

        let mut writer = ArrowWriter::try_new(file, schema, Some(props))
            .map_err(|e| IndexError::Parquet(e.to_string()))?;

        writer
            .write(batch)
            .map_err(|e| IndexError::Parquet(e.to_string()))?;

        writer
            .close()
            .map_err(|e| IndexError::Parquet(e.to_string()))?;

        Ok(())
    }
}

impl IndexWriter for ParquetIndexWriter {
    fn save(&self, index: &FlatIndex, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let [index_path, docstore_path] = artifact_paths(dir);

        let schema = vectors_schema(index);
        let batch = vectors_batch(index, &schema)?;
        Self::write_batch(&index_path, schema, &batch)?;

        let schema = docstore_schema();
        let batch = docstore_batch(index, &schema)?;
        Self::write_batch(&docstore_path, schema, &batch)?;

        tracing::info!(
            "Saved index with {} vectors (dim {}) to {:?}",
            index.len(),
            index.dimension(),
            dir
        );
        Ok(())
    }
}

fn embedding_item_field() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Float32, false))
}

fn vectors_schema(index: &FlatIndex) -> Arc<Schema> {
    let metadata = HashMap::from([
        (META_DIMENSION.to_string(), index.dimension().to_string()),
        (META_METRIC.to_string(), METRIC.to_string()),
        (META_MODEL.to_string(), index.model().to_string()),
        (META_CREATED_AT.to_string(), index.created_at().to_rfc3339()),
        (META_FORMAT_VERSION.to_string(), FORMAT_VERSION.to_string()),
    ]);

    Arc::new(Schema::new_with_metadata(
        vec![
            Field::new("position", DataType::Int64, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(embedding_item_field(), index.dimension() as i32),
                false,
            ),
        ],
        metadata,
    ))
}

fn vectors_batch(index: &FlatIndex, schema: &Arc<Schema>) -> Result<RecordBatch> {
    let positions: Vec<i64> = (0..index.len() as i64).collect();

    let values = Float32Array::from(index.vectors().to_vec());
    let embedding_array = FixedSizeListArray::try_new(
        embedding_item_field(),
        index.dimension() as i32,
        Arc::new(values),
        None,
    )?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(positions)),
        Arc::new(embedding_array),
    ];

    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

fn docstore_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("position", DataType::Int64, false),
        Field::new("docstore_id", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new("text", DataType::Utf8, false),
    ]))
}

fn docstore_batch(index: &FlatIndex, schema: &Arc<Schema>) -> Result<RecordBatch> {
    let num_rows = index.len();

    let mut positions: Vec<i64> = Vec::with_capacity(num_rows);
    let mut ids = StringBuilder::new();
    let mut sources = StringBuilder::new();
    let mut chunk_indices: Vec<i32> = Vec::with_capacity(num_rows);
    let mut texts = StringBuilder::new();

    for (position, entry) in index.entries().iter().enumerate() {
        positions.push(position as i64);
        ids.append_value(&entry.docstore_id);
        sources.append_value(&entry.source);
        chunk_indices.push(entry.chunk_index as i32);
        texts.append_value(&entry.text);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(positions)),
        Arc::new(ids.finish()),
        Arc::new(sources.finish()),
        Arc::new(Int32Array::from(chunk_indices)),
        Arc::new(texts.finish()),
    ];

    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Load an index previously written by [`ParquetIndexWriter`]
pub fn load_index(dir: &Path) -> Result<FlatIndex> {
    let [index_path, docstore_path] = artifact_paths(dir);

    let (metadata, batches) = read_batches(&index_path)?;
    let dimension: usize = required_meta(&metadata, META_DIMENSION)?
        .parse()
        .map_err(|e| IndexError::Corrupt(format!("bad dimension: {}", e)))?;
    let model = required_meta(&metadata, META_MODEL)?.to_string();
    let created_at = DateTime::parse_from_rfc3339(required_meta(&metadata, META_CREATED_AT)?)
        .map_err(|e| IndexError::Corrupt(format!("bad created_at: {}", e)))?
        .with_timezone(&Utc);

    let metric = required_meta(&metadata, META_METRIC)?;
    if metric != METRIC {
        return Err(IndexError::Corrupt(format!("unsupported metric '{}'", metric)));
    }

    let mut vectors = Vec::new();
    let mut expected_position = 0i64;
    for batch in &batches {
        let positions = int64_column(batch, "position")?;
        let embeddings = batch
            .column_by_name("embedding")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| missing_column("embedding"))?;

        for row in 0..batch.num_rows() {
            check_position(positions.value(row), &mut expected_position)?;
            let value = embeddings.value(row);
            let floats = value
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| missing_column("embedding.item"))?;
            vectors.extend_from_slice(floats.values());
        }
    }

    let (_, batches) = read_batches(&docstore_path)?;
    let mut entries = Vec::new();
    let mut expected_position = 0i64;
    for batch in &batches {
        let positions = int64_column(batch, "position")?;
        let ids = string_column(batch, "docstore_id")?;
        let sources = string_column(batch, "source")?;
        let texts = string_column(batch, "text")?;
        let chunk_indices = batch
            .column_by_name("chunk_index")
            .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
            .ok_or_else(|| missing_column("chunk_index"))?;

        for row in 0..batch.num_rows() {
            check_position(positions.value(row), &mut expected_position)?;
            entries.push(IndexEntry {
                docstore_id: ids.value(row).to_string(),
                source: sources.value(row).to_string(),
                chunk_index: chunk_indices.value(row) as usize,
                text: texts.value(row).to_string(),
            });
        }
    }

    tracing::debug!("Loaded {} entries from {:?}", entries.len(), dir);
    FlatIndex::from_parts(model, dimension, created_at, entries, vectors)
}

fn read_batches(path: &Path) -> Result<(HashMap<String, String>, Vec<RecordBatch>)> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| IndexError::Parquet(e.to_string()))?;
    let metadata = builder.schema().metadata().clone();
    let reader = builder
        .build()
        .map_err(|e| IndexError::Parquet(e.to_string()))?;

    let mut batches = Vec::new();
    for batch_result in reader {
        batches.push(batch_result?);
    }

    Ok((metadata, batches))
}

fn required_meta<'a>(metadata: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    metadata
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| IndexError::Corrupt(format!("missing metadata key '{}'", key)))
}

fn check_position(actual: i64, expected: &mut i64) -> Result<()> {
    if actual != *expected {
        return Err(IndexError::Corrupt(format!(
            "position {} found where {} expected",
            actual, expected
        )));
    }
    *expected += 1;
    Ok(())
}

fn missing_column(name: &str) -> IndexError {
    IndexError::Corrupt(format!("missing or mistyped column '{}'", name))
}

fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| missing_column(name))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| missing_column(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::Chunk;
    use tempfile::tempdir;

    fn create_test_index(dim: usize) -> FlatIndex {
        let chunks: Vec<Chunk> = ["First part", "Second part", "Third part"]
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                text: text.to_string(),
                source: "call.txt".to_string(),
                chunk_index: i,
            })
            .collect();
        let embeddings = (0..chunks.len())
            .map(|row| (0..dim).map(|i| (row * dim + i) as f32 / 100.0).collect())
            .collect();
        FlatIndex::build("test-model", dim, &chunks, embeddings).unwrap()
    }

    #[test]
    fn test_save_creates_both_artifacts() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("faiss_index");

        ParquetIndexWriter::new()
            .save(&create_test_index(4), &target)
            .unwrap();

        assert!(target.join(INDEX_FILE).is_file());
        assert!(target.join(DOCSTORE_FILE).is_file());
        assert!(artifacts_exist(&target));
        assert_eq!(fs::read_dir(&target).unwrap().count(), 2);
    }

    #[test]
    fn test_load_restores_index() {
        let dir = tempdir().unwrap();
        let index = create_test_index(8);
        ParquetIndexWriter::new().save(&index, dir.path()).unwrap();

        let loaded = load_index(dir.path()).unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dimension(), 8);
        assert_eq!(loaded.model(), "test-model");
        assert_eq!(loaded.entries(), index.entries());
        assert_eq!(loaded.vectors(), index.vectors());
        assert_eq!(
            loaded.created_at().timestamp(),
            index.created_at().timestamp()
        );
    }

    #[test]
    fn test_loaded_index_searches() {
        let dir = tempdir().unwrap();
        let index = create_test_index(4);
        ParquetIndexWriter::new().save(&index, dir.path()).unwrap();
        let loaded = load_index(dir.path()).unwrap();

        let query = index.vectors()[4..8].to_vec();
        let hits = loaded.search(&query, 1).unwrap();

        assert_eq!(hits[0].entry.text, "Second part");
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn test_schema_metadata() {
        let dir = tempdir().unwrap();
        ParquetIndexWriter::new()
            .save(&create_test_index(4), dir.path())
            .unwrap();

        let (metadata, _) = read_batches(&dir.path().join(INDEX_FILE)).unwrap();

        assert_eq!(metadata.get(META_DIMENSION).unwrap(), "4");
        assert_eq!(metadata.get(META_METRIC).unwrap(), "l2");
        assert_eq!(metadata.get(META_FORMAT_VERSION).unwrap(), "1");
    }

    #[test]
    fn test_load_missing_artifacts() {
        let dir = tempdir().unwrap();

        let result = load_index(dir.path());

        assert!(matches!(result, Err(IndexError::Io(_))));
        assert!(!artifacts_exist(dir.path()));
    }

    #[test]
    fn test_load_rejects_foreign_parquet() {
        let dir = tempdir().unwrap();
        ParquetIndexWriter::new()
            .save(&create_test_index(4), dir.path())
            .unwrap();
        // Docstore in place of the vector file has no index metadata
        fs::copy(dir.path().join(DOCSTORE_FILE), dir.path().join(INDEX_FILE)).unwrap();

        let result = load_index(dir.path());

        assert!(matches!(result, Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn test_mock_writer_can_skip_files() {
        let dir = tempdir().unwrap();
        let mut writer = MockIndexWriter::new();
        writer.expect_save().times(1).returning(|_, _| Ok(()));

        writer.save(&create_test_index(4), dir.path()).unwrap();

        assert!(!artifacts_exist(dir.path()));
    }
}
