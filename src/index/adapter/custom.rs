//! Explicit registry of per-type custom indexers.
//!
//! Hosts register handlers for a type tag at startup, either one by one or
//! through [`CustomIndexerProvider`]s. The [`ObjectAdapter`](super::ObjectAdapter)
//! runs every handler registered for an object's type tag after the built-in
//! properties are indexed.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::Result;
use crate::index::adapter::object::HostObject;
use crate::index::indexer::Indexer;

/// What a custom indexer sees for one object.
pub struct CustomIndexContext<'a> {
    pub indexer: &'a Indexer,
    pub document_index: i32,
    pub object: &'a HostObject,
}

impl CustomIndexContext<'_> {
    /// Add a property at the indexer's base score.
    pub fn add_property(&self, name: &str, value: &str, exact: bool) {
        let score = self.indexer.settings().base_score;
        self.indexer
            .add_property_default(name, value, self.document_index, score, true, exact);
    }

    pub fn add_number(&self, name: &str, value: f64) {
        let score = self.indexer.settings().base_score;
        self.indexer
            .add_number(name, value, self.document_index, score);
    }

    pub fn add_words(&self, text: &str) {
        self.indexer.add_words(text, self.document_index);
    }
}

pub type CustomIndexer = Arc<dyn Fn(&CustomIndexContext<'_>) -> Result<()> + Send + Sync>;

/// A statically known source of custom indexers.
pub trait CustomIndexerProvider {
    fn register(&self, registry: &mut CustomIndexerRegistry);
}

/// Type tag to handler table.
#[derive(Clone, Default)]
pub struct CustomIndexerRegistry {
    handlers: AHashMap<String, Vec<CustomIndexer>>,
}

impl fmt::Debug for CustomIndexerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&String> = self.handlers.keys().collect();
        tags.sort();
        f.debug_struct("CustomIndexerRegistry")
            .field("type_tags", &tags)
            .finish()
    }
}

impl CustomIndexerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a fixed provider list.
    pub fn with_providers(providers: &[&dyn CustomIndexerProvider]) -> Self {
        let mut registry = Self::new();
        for provider in providers {
            provider.register(&mut registry);
        }
        registry
    }

    pub fn register<F>(&mut self, type_tag: &str, handler: F)
    where
        F: Fn(&CustomIndexContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .entry(type_tag.to_lowercase())
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn has_handlers(&self, type_tag: &str) -> bool {
        self.handlers.contains_key(&type_tag.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler registered for the object's type tag.
    pub fn run(&self, context: &CustomIndexContext<'_>) -> Result<()> {
        if let Some(handlers) = self.handlers.get(&context.object.type_tag.to_lowercase()) {
            for handler in handlers {
                handler(context)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::settings::IndexSettings;

    struct LightProvider;

    impl CustomIndexerProvider for LightProvider {
        fn register(&self, registry: &mut CustomIndexerRegistry) {
            registry.register("Light", |ctx| {
                ctx.add_property("lighttype", "spot", true);
                Ok(())
            });
        }
    }

    #[test]
    fn test_provider_registration_and_dispatch() {
        let registry = CustomIndexerRegistry::with_providers(&[&LightProvider]);
        assert!(registry.has_handlers("light"));
        assert_eq!(registry.len(), 1);

        let indexer = Indexer::new(IndexSettings::default()).unwrap();
        indexer.start(true);
        let doc = indexer.add_document("lamp", None, true);
        let lamp = HostObject::new("lamp", "Lamp", "Light");
        let camera = HostObject::new("cam", "Cam", "Camera");
        registry
            .run(&CustomIndexContext {
                indexer: &indexer,
                document_index: doc,
                object: &lamp,
            })
            .unwrap();
        registry
            .run(&CustomIndexContext {
                indexer: &indexer,
                document_index: doc,
                object: &camera,
            })
            .unwrap();
        indexer.finish(None, None).wait().unwrap();

        assert_eq!(indexer.search("lighttype=spot", i32::MAX, 10).len(), 1);
        assert!(indexer.keywords().contains(&"lighttype:spot".to_string()));
    }
}
