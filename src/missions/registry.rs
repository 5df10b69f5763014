//! Lookup table of loaded mission templates.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use super::errors::Result;
use super::loader::load_templates_from_json;
use super::types::{MissionTemplate, TemplateId};

/// Templates keyed by id. Built once at startup and read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct TemplateRegistry {
    templates: BTreeMap<TemplateId, Arc<MissionTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates<I>(templates: I) -> Self
    where
        I: IntoIterator<Item = MissionTemplate>,
    {
        let mut registry = Self::new();
        for template in templates {
            registry.register(template);
        }
        registry
    }

    /// Load every template from a JSON file or a directory of JSON files.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let registry = Self::with_templates(load_templates_from_json(path)?);
        info!("Loaded {} mission templates from {}", registry.len(), path.display());
        Ok(registry)
    }

    /// Add a template. A template with the same id is replaced.
    pub fn register(&mut self, template: MissionTemplate) {
        if self.templates.contains_key(&template.id) {
            warn!("Mission template '{}' registered twice; keeping the last one", template.id);
        }
        self.templates.insert(template.id.clone(), Arc::new(template));
    }

    pub fn get_mission_templates(&self) -> Vec<Arc<MissionTemplate>> {
        self.templates.values().cloned().collect()
    }

    pub fn get_mission_template(&self, id: &TemplateId) -> Option<Arc<MissionTemplate>> {
        self.templates.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
