//! Adapter over a host object graph.
//!
//! The host exposes its objects through [`ObjectSource`]: stable ids, a
//! change fingerprint, and a typed attribute snapshot per object. Attribute
//! values are decomposed into indexable words, numbers and properties here.

use crate::error::{QuarryError, Result};
use crate::index::adapter::custom::{CustomIndexContext, CustomIndexerRegistry};
use crate::index::adapter::{DocumentAdapter, EntryFilter};
use crate::index::indexer::Indexer;
use crate::index::settings::IndexSettings;

/// A typed attribute value read from a host object.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Enum value, indexed by its name.
    Enum(String),
    /// 2 to 4 components, indexed as `.x`, `.y`, `.z`, `.w`.
    Vector(Vec<f64>),
    /// RGBA, indexed as `.r`, `.g`, `.b`, `.a`.
    Color([f64; 4]),
    /// Id of another object.
    Reference(String),
}

/// Attribute snapshot of one host object.
#[derive(Debug, Clone, PartialEq)]
pub struct HostObject {
    pub id: String,
    pub name: String,
    /// Host type name, e.g. `Light` or `Prefab`.
    pub type_tag: String,
    pub properties: Vec<(String, PropertyValue)>,
    /// Ids of objects this one refers to.
    pub references: Vec<String>,
}

impl HostObject {
    pub fn new(id: impl Into<String>, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        HostObject {
            id: id.into(),
            name: name.into(),
            type_tag: type_tag.into(),
            properties: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.push((name.into(), value));
        self
    }

    pub fn with_reference(mut self, id: impl Into<String>) -> Self {
        self.references.push(id.into());
        self
    }
}

/// Read access to the host object graph.
pub trait ObjectSource: Send {
    fn object_ids(&self) -> Vec<String>;

    /// Change fingerprint; `None` when the object no longer exists.
    fn object_hash(&self, id: &str) -> Option<String>;

    fn object(&self, id: &str) -> Option<HostObject>;
}

/// `m_Cast Shadows` → `castshadows`.
pub fn normalize_field_name(name: &str) -> String {
    let name = name.trim();
    let name = name
        .strip_prefix("m_")
        .or_else(|| name.strip_prefix("M_"))
        .unwrap_or(name);
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

const VECTOR_COMPONENTS: [&str; 4] = ["x", "y", "z", "w"];
const COLOR_COMPONENTS: [&str; 4] = ["r", "g", "b", "a"];

/// Indexes objects from an [`ObjectSource`].
pub struct ObjectAdapter<S: ObjectSource> {
    name: String,
    source: S,
    settings: IndexSettings,
    filter: EntryFilter,
    custom: CustomIndexerRegistry,
}

impl<S: ObjectSource> ObjectAdapter<S> {
    pub fn new(source: S, settings: IndexSettings) -> Result<Self> {
        let filter = EntryFilter::from_settings(&settings)?;
        Ok(ObjectAdapter {
            name: format!("objects:{}", settings.name),
            source,
            settings,
            filter,
            custom: CustomIndexerRegistry::new(),
        })
    }

    pub fn with_custom_indexers(mut self, registry: CustomIndexerRegistry) -> Self {
        self.custom = registry;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn index_value(&self, indexer: &Indexer, name: &str, value: &PropertyValue, doc: i32) {
        let settings = &self.settings;
        let score = settings.base_score;
        match value {
            PropertyValue::Bool(b) => {
                if settings.index_properties {
                    let text = if *b { "true" } else { "false" };
                    indexer.add_property_default(name, text, doc, score, true, true);
                }
            }
            PropertyValue::Int(i) => {
                if settings.index_numbers {
                    indexer.add_number(name, *i as f64, doc, score);
                }
            }
            PropertyValue::Float(f) => {
                if settings.index_numbers {
                    indexer.add_number(name, *f, doc, score);
                }
            }
            PropertyValue::Text(text) => {
                if settings.index_properties {
                    indexer.add_property_default(name, text, doc, score, false, true);
                }
            }
            PropertyValue::Enum(variant) => {
                if settings.index_properties {
                    indexer.add_property_default(name, variant, doc, score, true, true);
                }
            }
            PropertyValue::Vector(components) => {
                if settings.index_numbers {
                    for (value, suffix) in components.iter().zip(VECTOR_COMPONENTS) {
                        indexer.add_number(&format!("{name}.{suffix}"), *value, doc, score);
                    }
                }
            }
            PropertyValue::Color(rgba) => {
                if settings.index_numbers {
                    for (value, suffix) in rgba.iter().zip(COLOR_COMPONENTS) {
                        indexer.add_number(&format!("{name}.{suffix}"), *value, doc, score);
                    }
                }
            }
            PropertyValue::Reference(id) => {
                if settings.index_properties {
                    indexer.add_property_default(name, id, doc, score, false, true);
                }
            }
        }
    }
}

impl<S: ObjectSource> DocumentAdapter for ObjectAdapter<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn roots(&self) -> Vec<String> {
        self.settings.roots.clone()
    }

    fn dependencies(&mut self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .source
            .object_ids()
            .into_iter()
            .filter(|id| !self.skip_entry(id, true))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn document_hash(&self, id: &str) -> Option<String> {
        self.source.object_hash(id)
    }

    fn index_document(&mut self, id: &str, check_exists: bool, indexer: &Indexer) -> Result<()> {
        let object = self
            .source
            .object(id)
            .ok_or_else(|| QuarryError::not_found(format!("object '{id}'")))?;

        let doc = indexer.add_document(id, Some(object.name.clone()), check_exists);
        let score = self.settings.base_score;

        if self.settings.index_words {
            indexer.add_words(&object.name, doc);
        }
        // The type tag ranks just above ordinary properties
        indexer.add_property_default("t", &object.type_tag, doc, score - 1, true, true);

        for (field, value) in &object.properties {
            let name = normalize_field_name(field);
            if name.is_empty() {
                continue;
            }
            self.index_value(indexer, &name, value, doc);
        }

        if self.settings.index_properties {
            for reference in &object.references {
                indexer.add_property_default("ref", reference, doc, score, false, true);
            }
        }

        self.custom.run(&CustomIndexContext {
            indexer,
            document_index: doc,
            object: &object,
        })
    }

    fn skip_entry(&self, path: &str, check_roots: bool) -> bool {
        self.filter.skip(path, check_roots)
    }
}

#[cfg(test)]
mod tests {
    use ahash::AHashMap;

    use super::*;
    use crate::index::build::BuildTask;

    #[derive(Default)]
    struct Scene {
        objects: AHashMap<String, HostObject>,
    }

    impl Scene {
        fn add(&mut self, object: HostObject) {
            self.objects.insert(object.id.clone(), object);
        }
    }

    impl ObjectSource for Scene {
        fn object_ids(&self) -> Vec<String> {
            self.objects.keys().cloned().collect()
        }

        fn object_hash(&self, id: &str) -> Option<String> {
            self.objects
                .get(id)
                .map(|o| format!("{}:{}", o.properties.len(), o.references.len()))
        }

        fn object(&self, id: &str) -> Option<HostObject> {
            self.objects.get(id).cloned()
        }
    }

    fn scene() -> Scene {
        let mut scene = Scene::default();
        scene.add(
            HostObject::new("scene/1", "Main Camera", "Camera")
                .with_property("m_Field Of View", PropertyValue::Float(60.0))
                .with_property("m_Enabled", PropertyValue::Bool(true))
                .with_property("m_ClearFlags", PropertyValue::Enum("Skybox".into())),
        );
        scene.add(
            HostObject::new("scene/2", "Sun", "Light")
                .with_property("m_Color", PropertyValue::Color([1.0, 0.9, 0.8, 1.0]))
                .with_property("position", PropertyValue::Vector(vec![0.0, 10.0, -5.0]))
                .with_reference("scene/1"),
        );
        scene
    }

    #[test]
    fn test_normalize_field_name() {
        assert_eq!(normalize_field_name("m_Field Of View"), "fieldofview");
        assert_eq!(normalize_field_name("Intensity"), "intensity");
        assert_eq!(normalize_field_name("  m_Enabled "), "enabled");
    }

    #[test]
    fn test_object_properties_are_searchable() {
        let indexer = Indexer::new(IndexSettings::default()).unwrap();
        let mut adapter = ObjectAdapter::new(scene(), IndexSettings::default()).unwrap();
        BuildTask::full(&indexer, &mut adapter).unwrap().run().unwrap();

        let ids = |q: &str| {
            indexer
                .search(q, i32::MAX, 10)
                .into_iter()
                .map(|r| r.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(ids("cam"), vec!["scene/1"]);
        assert_eq!(ids("t=light"), vec!["scene/2"]);
        assert_eq!(ids("fieldofview>=45"), vec!["scene/1"]);
        assert_eq!(ids("enabled=true"), vec!["scene/1"]);
        assert_eq!(ids("clearflags:sky"), vec!["scene/1"]);
        assert_eq!(ids("color.g<1"), vec!["scene/2"]);
        assert_eq!(ids("position.z<0"), vec!["scene/2"]);
        assert_eq!(ids("ref=scene/1"), vec!["scene/2"]);
        assert_eq!(indexer.document(0).unwrap().metadata.as_deref(), Some("Main Camera"));
        assert!(indexer.keywords().contains(&"t:camera".to_string()));
    }

    #[test]
    fn test_missing_object_is_an_error() {
        let indexer = Indexer::new(IndexSettings::default()).unwrap();
        let mut adapter = ObjectAdapter::new(Scene::default(), IndexSettings::default()).unwrap();
        indexer.start(true);
        let err = adapter.index_document("ghost", true, &indexer).unwrap_err();
        assert!(matches!(err, QuarryError::NotFound(_)));
    }
}
