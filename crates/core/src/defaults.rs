//! Per-namespace generation defaults.
//!
//! Resolution order for a key is: caller-provided value, runtime override
//! (set through the API), configured value (environment), built-in table.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::{json, Value};

use crate::types::JsonMap;
use crate::workflow::{MediaKind, MODEL_PARAMETER};

/// Built-in default for `key` in `namespace`.
pub fn builtin_default(namespace: MediaKind, key: &str) -> Option<Value> {
    let value = match (namespace, key) {
        (MediaKind::Image, "width") => json!(512),
        (MediaKind::Image, "height") => json!(512),
        (MediaKind::Image, "steps") => json!(20),
        (MediaKind::Image, "cfg") => json!(8.0),
        (MediaKind::Image, "sampler_name") => json!("euler"),
        (MediaKind::Image, "scheduler") => json!("normal"),
        (MediaKind::Image, "denoise") => json!(1.0),
        (MediaKind::Image, "negative_prompt") => json!(""),

        (MediaKind::Audio, "steps") => json!(50),
        (MediaKind::Audio, "cfg") => json!(5.0),
        (MediaKind::Audio, "seconds") => json!(60),
        (MediaKind::Audio, "lyrics_strength") => json!(0.99),

        (MediaKind::Video, "width") => json!(848),
        (MediaKind::Video, "height") => json!(480),
        (MediaKind::Video, "steps") => json!(20),
        (MediaKind::Video, "cfg") => json!(6.0),
        (MediaKind::Video, "frames") => json!(25),
        (MediaKind::Video, "fps") => json!(24),

        _ => return None,
    };
    Some(value)
}

/// Every built-in key for a namespace, in table order.
fn builtin_keys(namespace: MediaKind) -> &'static [&'static str] {
    match namespace {
        MediaKind::Image => &[
            "width",
            "height",
            "steps",
            "cfg",
            "sampler_name",
            "scheduler",
            "denoise",
            "negative_prompt",
        ],
        MediaKind::Audio => &["steps", "cfg", "seconds", "lyrics_strength"],
        MediaKind::Video => &["width", "height", "steps", "cfg", "frames", "fps"],
    }
}

/// Layered defaults shared by the render engine and the tool surface.
#[derive(Debug, Default)]
pub struct NamespaceDefaults {
    configured: HashMap<MediaKind, JsonMap>,
    runtime: RwLock<HashMap<MediaKind, JsonMap>>,
}

impl NamespaceDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the configured layer with per-namespace default models.
    pub fn with_configured_models(models: HashMap<MediaKind, String>) -> Self {
        let configured = models
            .into_iter()
            .filter(|(_, model)| !model.trim().is_empty())
            .map(|(ns, model)| {
                let mut map = JsonMap::new();
                map.insert(MODEL_PARAMETER.to_string(), Value::String(model));
                (ns, map)
            })
            .collect();
        Self {
            configured,
            runtime: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve `key` for `namespace`. A non-null `provided` value always wins.
    pub fn get(&self, namespace: MediaKind, key: &str, provided: Option<&Value>) -> Option<Value> {
        self.get_explicit(namespace, key, provided)
            .or_else(|| builtin_default(namespace, key))
    }

    /// Like [`get`](Self::get) but without the built-in table: only a
    /// provided value, a runtime override or a configured default count.
    pub fn get_explicit(
        &self,
        namespace: MediaKind,
        key: &str,
        provided: Option<&Value>,
    ) -> Option<Value> {
        if let Some(value) = provided.filter(|v| !v.is_null()) {
            return Some(value.clone());
        }

        let runtime = self.runtime.read().unwrap_or_else(|e| e.into_inner());
        runtime
            .get(&namespace)
            .and_then(|m| m.get(key))
            .or_else(|| self.configured.get(&namespace).and_then(|m| m.get(key)))
            .cloned()
    }

    /// Set a runtime default. A `null` value removes the override.
    pub fn set(&self, namespace: MediaKind, key: &str, value: Value) {
        let mut runtime = self.runtime.write().unwrap_or_else(|e| e.into_inner());
        let entry = runtime.entry(namespace).or_default();
        if value.is_null() {
            entry.remove(key);
        } else {
            entry.insert(key.to_string(), value);
        }
        tracing::info!(namespace = %namespace, key, "Runtime default updated");
    }

    /// Effective defaults for a namespace with every layer merged.
    pub fn effective(&self, namespace: MediaKind) -> JsonMap {
        let mut merged = JsonMap::new();
        for key in builtin_keys(namespace) {
            if let Some(value) = builtin_default(namespace, key) {
                merged.insert(key.to_string(), value);
            }
        }
        if let Some(configured) = self.configured.get(&namespace) {
            merged.extend(configured.clone());
        }
        let runtime = self.runtime.read().unwrap_or_else(|e| e.into_inner());
        if let Some(overrides) = runtime.get(&namespace) {
            merged.extend(overrides.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_values() {
        assert_eq!(builtin_default(MediaKind::Image, "steps"), Some(json!(20)));
        assert_eq!(builtin_default(MediaKind::Audio, "seconds"), Some(json!(60)));
        assert_eq!(builtin_default(MediaKind::Video, "fps"), Some(json!(24)));
        assert_eq!(builtin_default(MediaKind::Audio, "width"), None);
    }

    #[test]
    fn resolution_order() {
        let mut models = HashMap::new();
        models.insert(MediaKind::Image, "sdxl.safetensors".to_string());
        let defaults = NamespaceDefaults::with_configured_models(models);

        assert_eq!(
            defaults.get(MediaKind::Image, "model", None),
            Some(json!("sdxl.safetensors"))
        );

        defaults.set(MediaKind::Image, "model", json!("runtime.safetensors"));
        assert_eq!(
            defaults.get(MediaKind::Image, "model", None),
            Some(json!("runtime.safetensors"))
        );

        let provided = json!("explicit.safetensors");
        assert_eq!(
            defaults.get(MediaKind::Image, "model", Some(&provided)),
            Some(provided.clone())
        );

        // Null provided values fall through to the layers below.
        assert_eq!(
            defaults.get(MediaKind::Image, "model", Some(&Value::Null)),
            Some(json!("runtime.safetensors"))
        );
    }

    #[test]
    fn runtime_override_shadows_builtin_and_can_be_cleared() {
        let defaults = NamespaceDefaults::new();
        defaults.set(MediaKind::Audio, "steps", json!(80));
        assert_eq!(defaults.get(MediaKind::Audio, "steps", None), Some(json!(80)));

        defaults.set(MediaKind::Audio, "steps", Value::Null);
        assert_eq!(defaults.get(MediaKind::Audio, "steps", None), Some(json!(50)));
    }

    #[test]
    fn explicit_lookup_skips_builtin_table() {
        let defaults = NamespaceDefaults::new();
        assert_eq!(defaults.get_explicit(MediaKind::Image, "width", None), None);

        defaults.set(MediaKind::Image, "width", json!(1024));
        assert_eq!(
            defaults.get_explicit(MediaKind::Image, "width", None),
            Some(json!(1024))
        );
    }

    #[test]
    fn namespaces_are_isolated() {
        let defaults = NamespaceDefaults::new();
        defaults.set(MediaKind::Video, "model", json!("wan.safetensors"));
        assert_eq!(defaults.get(MediaKind::Image, "model", None), None);
    }

    #[test]
    fn effective_merges_all_layers() {
        let mut models = HashMap::new();
        models.insert(MediaKind::Video, "wan.safetensors".to_string());
        let defaults = NamespaceDefaults::with_configured_models(models);
        defaults.set(MediaKind::Video, "fps", json!(30));

        let effective = defaults.effective(MediaKind::Video);
        assert_eq!(effective["width"], 848);
        assert_eq!(effective["fps"], 30);
        assert_eq!(effective["model"], "wan.safetensors");
    }

    #[test]
    fn blank_configured_model_is_ignored() {
        let mut models = HashMap::new();
        models.insert(MediaKind::Audio, "  ".to_string());
        let defaults = NamespaceDefaults::with_configured_models(models);
        assert_eq!(defaults.get(MediaKind::Audio, "model", None), None);
    }
}
