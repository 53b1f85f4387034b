//! Directory-backed cache of parsed workflow templates.
//!
//! Each template id owns its own slot guarded by a mutex, so a re-parse of
//! one id is never observed half-done by a reader of that id while other
//! ids load in parallel. Every access compares the file's modification time
//! with the cached one and re-parses on mismatch.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use crate::error::CoreError;
use crate::workflow::{parse_workflow, ToolDefinition, WorkflowGraph, WorkflowTemplate};

const TEMPLATE_EXTENSION: &str = "json";

type Slot = Arc<Mutex<Option<Arc<WorkflowTemplate>>>>;

pub struct TemplateStore {
    dir: PathBuf,
    slots: RwLock<HashMap<String, Slot>>,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Deep, independently mutable copy of the template's graph.
    pub fn load(&self, id: &str) -> Result<WorkflowGraph, CoreError> {
        Ok(self.template(id)?.graph.clone())
    }

    /// Current tool definition for the template.
    pub fn definition(&self, id: &str) -> Result<ToolDefinition, CoreError> {
        Ok(self.template(id)?.definition.clone())
    }

    /// Fetch the cached template, re-parsing it first if the file changed.
    pub fn template(&self, id: &str) -> Result<Arc<WorkflowTemplate>, CoreError> {
        validate_id(id)?;
        let path = self.path_for(id);

        let modified = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta
                .modified()
                .map_err(|e| CoreError::Internal(format!("Cannot stat '{}': {e}", path.display())))?,
            Ok(_) => return Err(not_found(id)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.evict(id);
                return Err(not_found(id));
            }
            Err(e) => {
                return Err(CoreError::Internal(format!(
                    "Cannot stat '{}': {e}",
                    path.display()
                )))
            }
        };

        let slot = self.slot(id);
        let mut cached = slot.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(template) = cached.as_ref() {
            if template.modified == modified {
                return Ok(Arc::clone(template));
            }
            tracing::debug!(workflow_id = id, "Template changed on disk, reloading");
        }

        let template = Arc::new(read_template(id, &path, modified)?);
        *cached = Some(Arc::clone(&template));
        Ok(template)
    }

    /// Enumerate every template file in the directory, sorted by id.
    ///
    /// Files that fail to load are logged and skipped.
    pub fn scan(&self) -> Vec<ToolDefinition> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Cannot read workflow directory");
                return Vec::new();
            }
        };

        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXTENSION)
            })
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        ids.sort();

        let mut definitions = Vec::with_capacity(ids.len());
        for id in ids {
            match self.template(&id) {
                Ok(template) => definitions.push(template.definition.clone()),
                Err(e) => {
                    tracing::warn!(workflow_id = %id, error = %e, "Skipping unloadable workflow");
                }
            }
        }

        tracing::info!(count = definitions.len(), dir = %self.dir.display(), "Scanned workflows");
        definitions
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{TEMPLATE_EXTENSION}"))
    }

    fn slot(&self, id: &str) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(id.to_string()).or_default())
    }

    fn evict(&self, id: &str) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        if slots.remove(id).is_some() {
            tracing::debug!(workflow_id = id, "Evicted deleted template");
        }
    }
}

fn read_template(id: &str, path: &Path, modified: SystemTime) -> Result<WorkflowTemplate, CoreError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| CoreError::Internal(format!("Cannot read '{}': {e}", path.display())))?;
    let json: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| CoreError::Validation(format!("Workflow '{id}' is not valid JSON: {e}")))?;
    let graph = parse_workflow(&json)?;

    let template = WorkflowTemplate::new(id, graph, modified);
    tracing::debug!(
        workflow_id = id,
        parameters = template.definition.parameters.len(),
        output_kind = %template.definition.output_kind,
        "Parsed workflow template",
    );
    Ok(template)
}

fn validate_id(id: &str) -> Result<(), CoreError> {
    let invalid = id.trim().is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\'])
        || id.contains("..");
    if invalid {
        return Err(CoreError::Validation(format!("Invalid workflow id '{id}'")));
    }
    Ok(())
}

fn not_found(id: &str) -> CoreError {
    CoreError::NotFound {
        entity: "Workflow",
        id: id.to_string(),
    }
}
