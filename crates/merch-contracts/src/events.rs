use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::Serialize;

use crate::designs::{now_utc_iso, DesignSource};

/// Everything the studio records in `events.jsonl`. Image bytes and API keys are
/// never part of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioEvent {
    StudioStarted {
        data_dir: String,
    },
    DesignGenerated {
        tool: String,
        design_id: String,
        source: DesignSource,
        file: Option<String>,
        aspect: Option<String>,
    },
    DesignFailed {
        tool: String,
        error_kind: &'static str,
        error: String,
    },
    DesignUploaded {
        tool: String,
        design_id: String,
        file: Option<String>,
    },
    DesignsPublished {
        tool: String,
        changed: usize,
        published: usize,
    },
    ProductAdded {
        product_id: String,
        price: f64,
    },
    ProductUpdated {
        product_id: String,
        price: f64,
    },
    ConfigUpdated {
        changed: Vec<String>,
    },
}

impl StudioEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StudioStarted { .. } => "studio_started",
            Self::DesignGenerated { .. } => "design_generated",
            Self::DesignFailed { .. } => "design_failed",
            Self::DesignUploaded { .. } => "design_uploaded",
            Self::DesignsPublished { .. } => "designs_published",
            Self::ProductAdded { .. } => "product_added",
            Self::ProductUpdated { .. } => "product_updated",
            Self::ConfigUpdated { .. } => "config_updated",
        }
    }
}

#[derive(Serialize)]
struct EventLine<'a> {
    #[serde(flatten)]
    event: &'a StudioEvent,
    session_id: &'a str,
    ts: String,
}

/// Append-only writer for the studio's `events.jsonl`: one compact object per
/// line, stamped with the session id and a UTC timestamp.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: &StudioEvent) -> anyhow::Result<()> {
        let line = serde_json::to_string(&EventLine {
            event,
            session_id: &self.inner.session_id,
            ts: now_utc_iso(),
        })?;
        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .with_context(|| format!("failed to open {}", self.inner.path.display()))?;
        file.write_all(format!("{line}\n").as_bytes())?;
        Ok(())
    }

    /// Request paths use this; a failed write only produces a log line.
    pub fn emit_quiet(&self, event: &StudioEvent) {
        if let Err(err) = self.emit(event) {
            tracing::warn!(event = event.name(), "event log write failed: {err:#}");
        }
    }
}
