//! Migration scripts as registered plugins.
//!
//! Each migration directory pairs with a [`MigrationScript`]
//! implementation registered under the directory's full `NNN-name`.
//! Registration happens in the embedding binary at startup; the manager
//! refuses to run when the registry and the directory tree disagree.

use crate::context::MigrationContext;
use crate::model::ScriptMetadata;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// One migration's executable logic.
#[async_trait]
pub trait MigrationScript: Send + Sync {
    fn metadata(&self) -> ScriptMetadata;

    /// Performs the migration through `ctx`. Any error aborts the run;
    /// the orchestrator records it and resets the working copy.
    async fn run(&self, ctx: &MigrationContext) -> anyhow::Result<()>;
}

/// Registry mapping full migration names to their scripts.
#[derive(Default)]
pub struct ScriptRegistry {
    scripts: HashMap<String, Arc<dyn MigrationScript>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `script` under `full_name` (`003-load-parties`),
    /// replacing any previous registration for that name.
    pub fn register(&mut self, full_name: impl Into<String>, script: Arc<dyn MigrationScript>) {
        self.scripts.insert(full_name.into(), script);
    }

    pub fn get(&self, full_name: &str) -> Option<Arc<dyn MigrationScript>> {
        self.scripts.get(full_name).cloned()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.scripts.contains_key(full_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
