//! Dataset sessions
//!
//! A session owns exactly one active (record store, overlay store) pair over
//! one SQLite file. Opening a different dataset, importing a scan, or saving
//! to a new path replaces the pair atomically; nothing hands out references
//! that survive the switch. All collaborator events flow through the
//! session's bus.

use crate::aggregate::{aggregate, component_index, Aggregates, StatusFilter};
use crate::config::IngestConfig;
use crate::db::models::Component;
use crate::db::{ComponentStore, RecordStore};
use crate::events::{EventBus, SessionEvent};
use crate::export::{self, ExportDocument};
use crate::ingest::{IngestPipeline, IngestSummary};
use crate::tree::FileTree;
use crate::{Error, Result};
use chrono::Utc;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// One loaded dataset: both stores share the backing database
struct Dataset {
    records: RecordStore,
    components: ComponentStore,
    path: Option<PathBuf>,
}

impl Dataset {
    async fn open(db_path: &Path) -> Result<Dataset> {
        let records = RecordStore::open(db_path).await?;
        let components =
            ComponentStore::from_pool(records.pool().clone(), Some(db_path.to_path_buf()));
        Ok(Dataset {
            records,
            components,
            path: Some(db_path.to_path_buf()),
        })
    }

    async fn open_in_memory() -> Result<Dataset> {
        let records = RecordStore::open_in_memory().await?;
        let components = ComponentStore::from_pool(records.pool().clone(), None);
        Ok(Dataset {
            records,
            components,
            path: None,
        })
    }
}

/// Owner of the active dataset and the event bus
pub struct Session {
    dataset: Dataset,
    events: EventBus,
    ingest_config: IngestConfig,
}

impl Session {
    /// Open (or create) a file-backed dataset
    pub async fn open(db_path: &Path) -> Result<Session> {
        Self::open_with(db_path, IngestConfig::default(), EventBus::default()).await
    }

    /// Open with explicit tuning and an externally shared event bus
    pub async fn open_with(
        db_path: &Path,
        ingest_config: IngestConfig,
        events: EventBus,
    ) -> Result<Session> {
        ingest_config.validate()?;
        Ok(Session {
            dataset: Dataset::open(db_path).await?,
            events,
            ingest_config,
        })
    }

    /// Open the default dataset inside the resolved data folder
    pub async fn open_default() -> Result<Session> {
        let folder = crate::config::resolve_data_folder(None)?;
        Self::open(&folder.join("scanlens.sqlite")).await
    }

    /// Open an in-memory scratch dataset
    pub async fn open_in_memory() -> Result<Session> {
        Ok(Session {
            dataset: Dataset::open_in_memory().await?,
            events: EventBus::default(),
            ingest_config: IngestConfig::default(),
        })
    }

    pub fn records(&self) -> &RecordStore {
        &self.dataset.records
    }

    pub fn components(&self) -> &ComponentStore {
        &self.dataset.components
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Backing file of the active dataset; `None` for in-memory sessions
    pub fn dataset_path(&self) -> Option<&Path> {
        self.dataset.path.as_deref()
    }

    /// Import a scan document into a fresh dataset at `db_path`
    ///
    /// The attempt owns a brand-new store: any existing file at `db_path` is
    /// overwritten first. On success the session switches to the new dataset
    /// and the previous one is discarded. On failure the partial database is
    /// removed and the session keeps its current dataset — readers never see
    /// a partially ingested store.
    pub async fn import_scan<R>(
        &mut self,
        reader: R,
        producer_version: &str,
        db_path: &Path,
    ) -> Result<IngestSummary>
    where
        R: Read + Send + 'static,
    {
        if db_path.exists() {
            std::fs::remove_file(db_path)?;
            info!("Overwriting dataset: {}", db_path.display());
        }

        let fresh = Dataset::open(db_path).await?;
        let pipeline = IngestPipeline::new(self.ingest_config.clone(), self.events.clone());

        match pipeline.run(reader, producer_version, &fresh.records).await {
            Ok(summary) => {
                self.dataset = fresh;
                Ok(summary)
            }
            Err(e) => {
                // Close the abandoned store before deleting its file
                fresh.records.pool().close().await;
                let _ = std::fs::remove_file(db_path);
                Err(e)
            }
        }
    }

    /// Save the active dataset to `new_path` and switch to it
    ///
    /// Save is a byte-level copy of the backing file followed by a reopen
    /// from the new path; the previously active store is dropped.
    pub async fn save_as(&mut self, new_path: &Path) -> Result<()> {
        let current = self.dataset.path.clone().ok_or_else(|| {
            Error::InvalidInput("an in-memory dataset has no backing file to save".to_string())
        })?;

        // Fold the WAL into the main file so the copy is complete
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(self.dataset.records.pool())
            .await?;

        std::fs::copy(&current, new_path)?;
        info!(
            "Saved dataset {} as {}",
            current.display(),
            new_path.display()
        );

        self.dataset = Dataset::open(new_path).await?;
        Ok(())
    }

    /// Switch the session to a different existing dataset file
    pub async fn switch_to(&mut self, db_path: &Path) -> Result<()> {
        self.dataset = Dataset::open(db_path).await?;
        Ok(())
    }

    /// Rebuild the path tree from the store's current path set
    pub async fn rebuild_tree(&self) -> Result<FileTree> {
        let paths = self.dataset.records.load_path_records().await?;
        let tree = FileTree::build(&paths)?;

        self.events.emit_lossy(SessionEvent::TreeRebuilt {
            node_count: tree.node_count(),
            timestamp: Utc::now(),
        });
        Ok(tree)
    }

    /// Recompute aggregates over `tree` under a reviewer-status filter
    ///
    /// A node is excluded when the consumer pruned it directly or when the
    /// filter prunes its overlay status.
    pub async fn compute_aggregates(
        &self,
        tree: &FileTree,
        filter: &StatusFilter,
    ) -> Result<Aggregates> {
        let records = self.dataset.records.load_all().await?;
        let overlay = component_index(self.dataset.components.list_all().await?);

        let by_status = filter.pruning_predicate(&overlay);
        let aggregates = aggregate(tree, &records, |node| node.pruned || by_status(node));

        self.events.emit_lossy(SessionEvent::AggregatesRecomputed {
            root_file_count: aggregates.stats(tree.root()).leaf_file_count,
            timestamp: Utc::now(),
        });
        Ok(aggregates)
    }

    /// Create or replace the component for a path
    pub async fn upsert_component(&self, component: &Component) -> Result<()> {
        self.dataset.components.upsert(component).await?;
        self.events.emit_lossy(SessionEvent::OverlayChanged {
            path: component.path.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Remove the component for a path, leaving its scan record alone
    pub async fn remove_component(&self, path: &str) -> Result<()> {
        self.dataset.components.remove(path).await?;
        self.events.emit_lossy(SessionEvent::OverlayChanged {
            path: path.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Export scan records merged with the overlay
    pub async fn export_all(&self) -> Result<ExportDocument> {
        export::export_all(&self.dataset.records, &self.dataset.components).await
    }

    /// Export only the overlay
    pub async fn export_components_only(&self) -> Result<ExportDocument> {
        export::export_components_only(&self.dataset.components).await
    }
}
