//! Scan document ingest pipeline
//!
//! Consumes a scanner JSON document as a byte stream and loads it into a
//! record store without ever materializing the whole document. The `files`
//! array is parsed record-by-record on a blocking task; validated records
//! are batched and handed over a bounded channel to the async side, which
//! commits one transaction per batch in document order. A reader observing
//! the store mid-ingest sees a strict prefix of the document, never a
//! partial or out-of-order record.

use crate::config::IngestConfig;
use crate::db::models::{FileType, FindingSet, ScanRecord};
use crate::db::RecordStore;
use crate::events::{EventBus, SessionEvent};
use crate::{Error, Result};
use chrono::Utc;
use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Totals reported by a completed ingest
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub file_count: u64,
    pub directory_count: u64,
    /// Scalar metadata found next to the `files` array
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Streaming ingest of one scan document into one record store
pub struct IngestPipeline {
    config: IngestConfig,
    events: EventBus,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, events: EventBus) -> Self {
        Self { config, events }
    }

    /// Ingest a full document from `reader` into `store`
    ///
    /// On any error the store must be considered unusable for this attempt
    /// and discarded by the caller; committed batches are not unwound in
    /// place. Validation faults abort with `MissingFileInfo`; structural
    /// JSON faults abort with `MalformedDocument`.
    pub async fn run<R>(
        &self,
        reader: R,
        producer_version: &str,
        store: &RecordStore,
    ) -> Result<IngestSummary>
    where
        R: Read + Send + 'static,
    {
        self.config.validate()?;

        self.events.emit_lossy(SessionEvent::IngestStarted {
            producer_version: producer_version.to_string(),
            timestamp: Utc::now(),
        });

        let batch_size = self.config.batch_size;
        let (tx, mut rx) = mpsc::channel::<Vec<ScanRecord>>(self.config.channel_depth);

        let parse_task =
            tokio::task::spawn_blocking(move || parse_document(reader, batch_size, tx));

        // Each loop iteration is one suspension point: a batch flush
        let mut committed: u64 = 0;
        while let Some(batch) = rx.recv().await {
            let len = batch.len() as u64;
            if let Err(e) = store.insert_batch(&batch).await {
                // Dropping the receiver makes the parser's next send fail,
                // which stops it promptly; its result no longer matters
                drop(rx);
                let _ = parse_task.await;
                return Err(e);
            }
            committed += len;
            debug!(committed, "ingest progress");
        }

        let outcome = match parse_task.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                if let Error::MissingFileInfo { path } = &e {
                    self.events.emit_lossy(SessionEvent::RecordRejected {
                        path: path.clone(),
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
                return Err(e);
            }
            Err(join_err) => {
                return Err(Error::Internal(format!(
                    "ingest parser task failed: {}",
                    join_err
                )))
            }
        };

        store
            .save_headers(producer_version, &outcome.metadata)
            .await?;

        info!(
            files = outcome.file_count,
            directories = outcome.directory_count,
            "ingest complete"
        );
        self.events.emit_lossy(SessionEvent::IngestFinished {
            file_count: outcome.file_count,
            directory_count: outcome.directory_count,
            timestamp: Utc::now(),
        });

        Ok(IngestSummary {
            file_count: outcome.file_count,
            directory_count: outcome.directory_count,
            metadata: outcome.metadata,
        })
    }
}

/// One raw element of the `files` array, before validation
///
/// `path` and `type` are optional here so their absence maps to the typed
/// ingest faults instead of a generic serde error.
#[derive(Deserialize)]
struct RawScanRecord {
    path: Option<String>,
    #[serde(rename = "type")]
    file_type: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

/// Signal that parsing must stop; the cause lives in the sink's fault slot
/// (or, when the slot is empty, in the writer that dropped the channel)
struct SinkStop;

struct BatchSink {
    batch: Vec<ScanRecord>,
    batch_size: usize,
    tx: mpsc::Sender<Vec<ScanRecord>>,
    fault: Option<Error>,
    file_count: u64,
    directory_count: u64,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl BatchSink {
    fn new(batch_size: usize, tx: mpsc::Sender<Vec<ScanRecord>>) -> Self {
        Self {
            batch: Vec::with_capacity(batch_size),
            batch_size,
            tx,
            fault: None,
            file_count: 0,
            directory_count: 0,
            metadata: BTreeMap::new(),
        }
    }

    fn push(&mut self, raw: RawScanRecord) -> std::result::Result<(), SinkStop> {
        let record = match validate_record(raw) {
            Ok(record) => record,
            Err(e) => {
                self.fault = Some(e);
                return Err(SinkStop);
            }
        };

        match record.file_type {
            FileType::File => self.file_count += 1,
            FileType::Directory => self.directory_count += 1,
        }

        self.batch.push(record);
        if self.batch.len() >= self.batch_size {
            self.send_batch()?;
        }
        Ok(())
    }

    fn send_batch(&mut self) -> std::result::Result<(), SinkStop> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        // Blocks when the writer is behind; this is the ingest backpressure
        self.tx.blocking_send(batch).map_err(|_| SinkStop)
    }

    fn take_fault(&mut self) -> Option<Error> {
        self.fault.take()
    }
}

/// Validate and normalize one raw record
fn validate_record(raw: RawScanRecord) -> Result<ScanRecord> {
    let RawScanRecord {
        path,
        file_type,
        rest,
    } = raw;

    let type_str = match file_type {
        Some(t) => t,
        None => return Err(Error::MissingFileInfo { path }),
    };

    let path = match path {
        Some(p) => p,
        None => {
            return Err(Error::MalformedDocument {
                detail: "a file record is missing its 'path' field".to_string(),
            })
        }
    };

    let file_type = match type_str.as_str() {
        "file" => FileType::File,
        "directory" => FileType::Directory,
        other => {
            return Err(Error::MalformedDocument {
                detail: format!("record '{}' has unrecognized type '{}'", path, other),
            })
        }
    };

    Ok(ScanRecord {
        path: normalize_path(&path),
        file_type,
        findings: FindingSet::from_raw_fields(&rest),
    })
}

/// Normalize a scanner path to slash-separated relative form
///
/// Tree placement validation (absolute paths, `..` segments) happens at
/// build time; this only canonicalizes the separator and trims decoration.
fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }
    if let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    normalized
}

struct ParseOutcome {
    file_count: u64,
    directory_count: u64,
    metadata: BTreeMap<String, serde_json::Value>,
}

fn parse_document<R: Read>(
    reader: R,
    batch_size: usize,
    tx: mpsc::Sender<Vec<ScanRecord>>,
) -> Result<ParseOutcome> {
    let mut sink = BatchSink::new(batch_size, tx);
    let mut deserializer = serde_json::Deserializer::from_reader(reader);

    let parsed = DocumentSeed { sink: &mut sink }
        .deserialize(&mut deserializer)
        .and_then(|_| deserializer.end());

    match parsed {
        Ok(()) => {
            if sink.send_batch().is_err() {
                // Receiver gone: the writer failed first and its error wins
                return Err(Error::Internal(
                    "ingest writer stopped before parsing finished".to_string(),
                ));
            }
            Ok(ParseOutcome {
                file_count: sink.file_count,
                directory_count: sink.directory_count,
                metadata: sink.metadata,
            })
        }
        Err(parse_err) => match sink.take_fault() {
            // Typed faults tunnel through serde's error type; recover them
            Some(fault) => Err(fault),
            None => Err(Error::MalformedDocument {
                detail: parse_err.to_string(),
            }),
        },
    }
}

struct DocumentSeed<'a> {
    sink: &'a mut BatchSink,
}

impl<'de, 'a> DeserializeSeed<'de> for DocumentSeed<'a> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_map(DocumentVisitor { sink: self.sink })
    }
}

struct DocumentVisitor<'a> {
    sink: &'a mut BatchSink,
}

impl<'de, 'a> Visitor<'de> for DocumentVisitor<'a> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a scan document object with a \"files\" array")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        let mut saw_files = false;

        while let Some(key) = map.next_key::<String>()? {
            if key == "files" {
                saw_files = true;
                map.next_value_seed(FilesSeed {
                    sink: &mut *self.sink,
                })?;
            } else {
                // Header values are small; only the files array is streamed
                let value = map.next_value::<serde_json::Value>()?;
                if !value.is_array() && !value.is_object() {
                    self.sink.metadata.insert(key, value);
                }
            }
        }

        if !saw_files {
            return Err(de::Error::custom("document has no \"files\" array"));
        }
        Ok(())
    }
}

struct FilesSeed<'a> {
    sink: &'a mut BatchSink,
}

impl<'de, 'a> DeserializeSeed<'de> for FilesSeed<'a> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_seq(FilesVisitor { sink: self.sink })
    }
}

struct FilesVisitor<'a> {
    sink: &'a mut BatchSink,
}

impl<'de, 'a> Visitor<'de> for FilesVisitor<'a> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of file records")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        while let Some(raw) = seq.next_element::<RawScanRecord>()? {
            if self.sink.push(raw).is_err() {
                return Err(de::Error::custom("ingest aborted"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a\\b\\c.txt"), "a/b/c.txt");
        assert_eq!(normalize_path("a/b/"), "a/b");
        assert_eq!(normalize_path("./a/b"), "a/b");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_validate_record_missing_type() {
        let raw = RawScanRecord {
            path: Some("a/b.txt".to_string()),
            file_type: None,
            rest: serde_json::Map::new(),
        };
        match validate_record(raw) {
            Err(Error::MissingFileInfo { path }) => {
                assert_eq!(path.as_deref(), Some("a/b.txt"))
            }
            other => panic!("expected MissingFileInfo, got {:?}", other.map(|r| r.path)),
        }
    }

    #[test]
    fn test_validate_record_bad_type_value() {
        let raw = RawScanRecord {
            path: Some("a".to_string()),
            file_type: Some("symlink".to_string()),
            rest: serde_json::Map::new(),
        };
        assert!(matches!(
            validate_record(raw),
            Err(Error::MalformedDocument { .. })
        ));
    }
}
