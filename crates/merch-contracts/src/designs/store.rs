use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use super::record::DesignRecord;
use crate::storage::{read_json_array, with_file_lock, write_json_atomic};
use crate::tools::ToolDescriptor;

/// Per-tool JSON array files (`{tool}_designs.json`) in the data directory.
///
/// Appends are chronological. Galleries show newest first by reversing the list
/// (see [`newest_first`]); the file order itself never changes.
#[derive(Debug, Clone)]
pub struct DesignStore {
    data_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishOutcome {
    pub changed: usize,
    pub published: usize,
}

impl DesignStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_for(&self, tool: &ToolDescriptor) -> PathBuf {
        self.data_dir.join(tool.store_file())
    }

    /// Appends under the store's lock so concurrent appends never drop a row.
    pub fn append(&self, tool: &ToolDescriptor, record: &DesignRecord) -> Result<()> {
        let path = self.path_for(tool);
        with_file_lock(&path, || {
            let mut records: Vec<DesignRecord> = read_json_array(&path)?;
            if records.iter().any(|existing| existing.id == record.id) {
                bail!("design id {} already exists in {}", record.id, path.display());
            }
            records.push(record.clone());
            write_json_atomic(&path, &records)
        })
    }

    /// Records in file (chronological) order.
    pub fn list(&self, tool: &ToolDescriptor) -> Result<Vec<DesignRecord>> {
        read_json_array(&self.path_for(tool))
    }

    pub fn find(&self, tool: &ToolDescriptor, id: &str) -> Result<Option<DesignRecord>> {
        Ok(self
            .list(tool)?
            .into_iter()
            .find(|record| record.id == id))
    }

    /// Sets `published` on every record: true exactly for ids in `published_ids`.
    /// The file is only rewritten when something changed.
    pub fn set_published(
        &self,
        tool: &ToolDescriptor,
        published_ids: &HashSet<String>,
    ) -> Result<PublishOutcome> {
        let path = self.path_for(tool);
        with_file_lock(&path, || {
            let mut records: Vec<DesignRecord> = read_json_array(&path)?;
            let mut outcome = PublishOutcome::default();
            for record in records.iter_mut() {
                let wanted = published_ids.contains(&record.id);
                if record.published != wanted {
                    record.published = wanted;
                    outcome.changed += 1;
                }
                if wanted {
                    outcome.published += 1;
                }
            }
            if outcome.changed > 0 {
                write_json_atomic(&path, &records)?;
            }
            Ok(outcome)
        })
    }
}

/// Display order for galleries: most recent first.
pub fn newest_first(mut records: Vec<DesignRecord>) -> Vec<DesignRecord> {
    records.reverse();
    records
}
