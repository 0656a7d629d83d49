use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use merch_contracts::catalog::{
    OrderBook, OrderRecord, ProductAction, ProductCatalog, ProductRecord,
};
use merch_contracts::config::{ConfigStore, StudioConfig};
use merch_contracts::designs::{
    id_from_publish_field, newest_first, publish_field_name, DesignRecord, DesignSource,
    DesignStore, PublishOutcome,
};
use merch_contracts::errors::{StudioError, StudioResult};
use merch_contracts::events::{EventWriter, StudioEvent};
use merch_contracts::tools::{
    find_tool, DesignRequest, FormFields, ProviderKind, ReferenceImage, ToolDescriptor,
    REFERENCE_MIME_TYPES,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::assets::{effective_mime, AssetStore, ASSETS_DIR};
use crate::providers::{DefaultProviders, GenerateRequest, ProviderFactory};

pub const EVENTS_FILE: &str = "events.jsonl";
pub const ASSET_URL_PREFIX: &str = "/assets";

#[derive(Debug, Clone)]
pub struct StudioPaths {
    pub data_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub events_path: PathBuf,
}

impl StudioPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            assets_dir: data_dir.join(ASSETS_DIR),
            events_path: data_dir.join(EVENTS_FILE),
            data_dir,
        }
    }
}

/// A design as shown in a gallery: the stored record plus a servable URL, or
/// `None` when the image file has gone missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryItem {
    #[serde(flatten)]
    pub record: DesignRecord,
    pub image_url: Option<String>,
}

/// A design as listed on the publish admin page, with its checkbox name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminDesignRow {
    #[serde(flatten)]
    pub record: DesignRecord,
    pub publish_field: String,
}

/// Everything behind the studio's pages: design generation, uploads, galleries and
/// the admin mutations. All calls block; async callers must move them off the
/// runtime.
pub struct StudioEngine {
    paths: StudioPaths,
    config: ConfigStore,
    designs: DesignStore,
    assets: AssetStore,
    products: ProductCatalog,
    orders: OrderBook,
    events: EventWriter,
    providers: Box<dyn ProviderFactory>,
}

impl StudioEngine {
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_providers(data_dir, Box::new(DefaultProviders))
    }

    pub fn with_providers(
        data_dir: impl Into<PathBuf>,
        providers: Box<dyn ProviderFactory>,
    ) -> Result<Self> {
        let paths = StudioPaths::new(data_dir);
        fs::create_dir_all(&paths.assets_dir)
            .with_context(|| format!("failed to create {}", paths.assets_dir.display()))?;
        let session_id = format!("studio-{}", Uuid::new_v4().simple());
        let events = EventWriter::new(&paths.events_path, session_id);
        events.emit(&StudioEvent::StudioStarted {
            data_dir: paths.data_dir.to_string_lossy().into_owned(),
        })?;

        Ok(Self {
            config: ConfigStore::new(&paths.data_dir),
            designs: DesignStore::new(&paths.data_dir),
            assets: AssetStore::new(&paths.assets_dir),
            products: ProductCatalog::new(&paths.data_dir),
            orders: OrderBook::new(&paths.data_dir),
            events,
            providers,
            paths,
        })
    }

    pub fn paths(&self) -> &StudioPaths {
        &self.paths
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    /// Validates the creator form, calls the selected provider once, stores the
    /// image and appends the design record. Nothing is called or written when the
    /// form is invalid.
    pub fn generate_design(
        &self,
        tool_id: &str,
        form: &FormFields,
        reference: Option<ReferenceImage>,
    ) -> StudioResult<DesignRecord> {
        let outcome = lookup_tool(tool_id)
            .and_then(|tool| self.run_generation(tool, form, reference));
        match &outcome {
            Ok(record) => {
                tracing::info!(tool = tool_id, design_id = %record.id, "design generated");
                self.events.emit_quiet(&StudioEvent::DesignGenerated {
                    tool: tool_id.to_string(),
                    design_id: record.id.clone(),
                    source: record.source,
                    file: record.file.clone(),
                    aspect: record.aspect.clone(),
                });
            }
            Err(err) => {
                tracing::warn!(tool = tool_id, kind = err.kind(), "design generation failed: {err}");
                self.events.emit_quiet(&StudioEvent::DesignFailed {
                    tool: tool_id.to_string(),
                    error_kind: err.kind(),
                    error: err.message().to_string(),
                });
            }
        }
        outcome
    }

    fn run_generation(
        &self,
        tool: &'static ToolDescriptor,
        form: &FormFields,
        reference: Option<ReferenceImage>,
    ) -> StudioResult<DesignRecord> {
        let request = DesignRequest::from_form(tool, form, reference)?;
        let config = self.config.load()?;
        let kind = match request.provider {
            Some(kind) => kind,
            None => default_provider(&config)?,
        };
        let provider = self.providers.build(kind, &config)?;
        let prompt = request.prompt();

        tracing::debug!(tool = tool.id, provider = provider.name(), "calling image provider");
        let image = provider.generate(&GenerateRequest {
            prompt: prompt.clone(),
            aspect: request.aspect,
            background: request.background_mode(),
            reference: request.reference.clone(),
        })?;
        let file = self
            .assets
            .save(&image.bytes, &image.mime_type, tool.asset_prefix)?;

        let mut record = DesignRecord::new(tool.id, DesignSource::from(kind));
        for (name, value) in &request.fields {
            record
                .fields
                .insert(name.clone(), Value::String(value.clone()));
        }
        record.bg_color = if request.transparent {
            "transparent".to_string()
        } else {
            request.bg_color.clone().unwrap_or_default()
        };
        record.aspect = Some(request.aspect.as_str().to_string());
        record.prompt = Some(prompt);
        record.file = Some(file);

        self.store_record(tool, record)
    }

    /// Stores a hand-made design file in a tool's gallery (`upload` for the
    /// general upload page).
    pub fn upload_design(
        &self,
        tool_id: &str,
        name: Option<&str>,
        bytes: &[u8],
        declared_mime: &str,
    ) -> StudioResult<DesignRecord> {
        let tool = lookup_tool(tool_id)?;
        if bytes.is_empty() {
            return Err(StudioError::validation("Choose a design file to upload."));
        }
        let mime_type = effective_mime(bytes, declared_mime);
        if !REFERENCE_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(StudioError::validation(
                "Design file must be a PNG, JPEG or WebP image.",
            ));
        }
        let file = self.assets.save(bytes, &mime_type, tool.asset_prefix)?;

        let mut record = DesignRecord::new(tool.id, DesignSource::Upload);
        if let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) {
            record
                .fields
                .insert("name".to_string(), Value::String(name.to_string()));
        }
        record.file = Some(file);
        let record = self.store_record(tool, record)?;

        tracing::info!(design_id = %record.id, "design uploaded");
        self.events.emit_quiet(&StudioEvent::DesignUploaded {
            tool: tool.id.to_string(),
            design_id: record.id.clone(),
            file: record.file.clone(),
        });
        Ok(record)
    }

    fn store_record(
        &self,
        tool: &ToolDescriptor,
        record: DesignRecord,
    ) -> StudioResult<DesignRecord> {
        if let Err(err) = self.designs.append(tool, &record) {
            if let Some(file) = record.file.as_deref() {
                self.assets.remove(file);
            }
            return Err(StudioError::storage("Failed to save design", &err));
        }
        Ok(record)
    }

    /// Records in file order (oldest first).
    pub fn designs(&self, tool_id: &str) -> StudioResult<Vec<DesignRecord>> {
        let tool = lookup_tool(tool_id)?;
        self.designs
            .list(tool)
            .map_err(|err| StudioError::storage("Failed to read designs", &err))
    }

    /// Newest first. Records whose image file is gone stay listed without a URL.
    pub fn gallery(&self, tool_id: &str) -> StudioResult<Vec<GalleryItem>> {
        let records = newest_first(self.designs(tool_id)?);
        Ok(records
            .into_iter()
            .map(|record| self.gallery_item(record))
            .collect())
    }

    pub fn gallery_item(&self, record: DesignRecord) -> GalleryItem {
        let image_url = record
            .file
            .as_deref()
            .filter(|file| self.assets.exists(file))
            .map(|file| format!("{ASSET_URL_PREFIX}/{file}"));
        GalleryItem { record, image_url }
    }

    pub fn admin_designs(&self, tool_id: &str) -> StudioResult<Vec<AdminDesignRow>> {
        Ok(newest_first(self.designs(tool_id)?)
            .into_iter()
            .map(|record| AdminDesignRow {
                publish_field: publish_field_name(&record.id),
                record,
            })
            .collect())
    }

    /// Applies a submitted publish form: every record whose checkbox was sent is
    /// published, every other record is unpublished.
    pub fn publish<'a>(
        &self,
        tool_id: &str,
        submitted_fields: impl IntoIterator<Item = &'a str>,
    ) -> StudioResult<PublishOutcome> {
        let tool = lookup_tool(tool_id)?;
        let checked: HashSet<String> = submitted_fields
            .into_iter()
            .filter_map(id_from_publish_field)
            .collect();
        let outcome = self
            .designs
            .set_published(tool, &checked)
            .map_err(|err| StudioError::storage("Failed to update designs", &err))?;

        tracing::info!(tool = tool.id, changed = outcome.changed, "publish flags saved");
        self.events.emit_quiet(&StudioEvent::DesignsPublished {
            tool: tool.id.to_string(),
            changed: outcome.changed,
            published: outcome.published,
        });
        Ok(outcome)
    }

    pub fn products(&self) -> StudioResult<Vec<ProductRecord>> {
        self.products.list()
    }

    pub fn apply_product(&self, form: &HashMap<String, String>) -> StudioResult<ProductRecord> {
        let action = ProductAction::from_form(form)?;
        let added = matches!(action, ProductAction::Add(_));
        let product = self.products.apply(action)?;
        let (product_id, price) = (product.id.clone(), product.price);
        self.events.emit_quiet(&if added {
            StudioEvent::ProductAdded { product_id, price }
        } else {
            StudioEvent::ProductUpdated { product_id, price }
        });
        Ok(product)
    }

    pub fn orders(&self) -> StudioResult<Vec<OrderRecord>> {
        self.orders.list()
    }

    /// Settings with secrets masked.
    pub fn config(&self) -> StudioResult<StudioConfig> {
        Ok(self.config.load()?.masked())
    }

    pub fn update_config(&self, form: &HashMap<String, String>) -> StudioResult<Vec<String>> {
        let changed = self.config.update(form)?;
        if !changed.is_empty() {
            self.events.emit_quiet(&StudioEvent::ConfigUpdated {
                changed: changed.clone(),
            });
        }
        Ok(changed)
    }

    pub fn data_dir(&self) -> &Path {
        &self.paths.data_dir
    }
}

fn lookup_tool(tool_id: &str) -> StudioResult<&'static ToolDescriptor> {
    find_tool(tool_id).ok_or_else(|| StudioError::validation(format!("Unknown tool '{tool_id}'.")))
}

fn default_provider(config: &StudioConfig) -> StudioResult<ProviderKind> {
    ProviderKind::parse(&config.default_provider).ok_or_else(|| {
        StudioError::configuration(format!(
            "Unknown default provider '{}' in settings.",
            config.default_provider
        ))
    })
}
