//! Merged export of scan records and the component overlay
//!
//! Both export variants are pure reads: nothing in either store is mutated.
//! Bookkeeping (row guids, created/updated timestamps) is stripped by
//! construction — the exported structs never carry it — so a re-import of
//! the `files` payload reproduces the same records, findings in the same
//! order.

use crate::db::models::{Component, ScanRecord};
use crate::db::{ComponentStore, RecordStore};
use crate::Result;
use serde::Serialize;
use std::io::Write;

/// Serializable export payload
///
/// `files` is omitted entirely (not emitted as null) for the
/// components-only variant.
#[derive(Debug, Serialize)]
pub struct ExportDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ScanRecord>>,
    pub components: Vec<Component>,
}

/// Export every scan record plus every component
pub async fn export_all(
    records: &RecordStore,
    components: &ComponentStore,
) -> Result<ExportDocument> {
    let files = records.load_all().await?;
    let components = components.list_all().await?;

    Ok(ExportDocument {
        files: Some(files),
        components,
    })
}

/// Export only the user-authored components
pub async fn export_components_only(components: &ComponentStore) -> Result<ExportDocument> {
    let components = components.list_all().await?;

    Ok(ExportDocument {
        files: None,
        components,
    })
}

/// Serialize an export document to a writer
pub fn write_document<W: Write>(document: &ExportDocument, writer: W) -> Result<()> {
    serde_json::to_writer(writer, document)?;
    Ok(())
}
