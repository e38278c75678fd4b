//! Type resolution: wire names to schemas, enums and property accessors.
//!
//! The registry is process-wide and concurrency-safe; registration and
//! lookup may interleave freely with codec passes on other threads.

mod accessor;

pub use accessor::{DynamicAccessor, PropertyAccessor, SchemaAccessor};
pub(crate) use accessor::serialized_form;

use dashmap::DashMap;
use std::sync::{Arc, OnceLock};

use crate::coerce::TypeDescriptor;

/// Declared shape of one registered record type
#[derive(Debug, Clone)]
pub struct TypeSchema {
    pub name: String,
    pub members: Vec<(String, TypeDescriptor)>,
    pub dynamic: bool,
}

impl TypeSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            dynamic: false,
        }
    }

    pub fn member(mut self, name: impl Into<String>, descriptor: TypeDescriptor) -> Self {
        self.members.push((name.into(), descriptor));
        self
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }
}

/// Declared variants of one registered enumeration
#[derive(Debug, Clone)]
pub struct EnumSchema {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumSchema {
    pub fn new(name: impl Into<String>, variants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Variant lookup is case-sensitive by symbolic name
    pub fn has_variant(&self, name: &str) -> bool {
        self.variants.iter().any(|v| v == name)
    }
}

/// Concurrent map from wire names to local type knowledge.
///
/// A single shared instance usually suffices; see [`TypeRegistry::global`].
/// Lookups resolve one level of aliasing first, so a remote class name can
/// point at a locally registered schema under a different name.
#[derive(Default)]
pub struct TypeRegistry {
    aliases: DashMap<String, String>,
    schemas: DashMap<String, Arc<TypeSchema>>,
    enums: DashMap<String, Arc<EnumSchema>>,
    accessors: DashMap<String, Arc<dyn PropertyAccessor>>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("aliases", &self.aliases.len())
            .field("schemas", &self.schemas.len())
            .field("enums", &self.enums.len())
            .field("accessors", &self.accessors.len())
            .finish()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static Arc<TypeRegistry> {
        static GLOBAL: OnceLock<Arc<TypeRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(TypeRegistry::new()))
    }

    /// Map a remote wire name onto a local type name. Resolution applies a
    /// single hop; aliases do not chain.
    pub fn register_alias(&self, wire_name: impl Into<String>, local_name: impl Into<String>) {
        self.aliases.insert(wire_name.into(), local_name.into());
    }

    pub fn resolve_alias(&self, name: &str) -> String {
        match self.aliases.get(name) {
            Some(local) => local.clone(),
            None => name.to_string(),
        }
    }

    pub fn register_schema(&self, schema: TypeSchema) {
        self.schemas.insert(schema.name.clone(), Arc::new(schema));
    }

    pub fn schema(&self, name: &str) -> Option<Arc<TypeSchema>> {
        let resolved = self.resolve_alias(name);
        self.schemas.get(&resolved).map(|s| Arc::clone(&s))
    }

    pub fn register_enum(&self, schema: EnumSchema) {
        self.enums.insert(schema.name.clone(), Arc::new(schema));
    }

    pub fn enum_schema(&self, name: &str) -> Option<Arc<EnumSchema>> {
        let resolved = self.resolve_alias(name);
        self.enums.get(&resolved).map(|s| Arc::clone(&s))
    }

    /// Install a hand-written accessor; it takes precedence over any schema
    /// registered under the same name
    pub fn register_accessor(&self, name: impl Into<String>, accessor: Arc<dyn PropertyAccessor>) {
        self.accessors.insert(name.into(), accessor);
    }

    /// Explicitly registered accessor only, no schema fallback
    pub fn custom_accessor(&self, name: &str) -> Option<Arc<dyn PropertyAccessor>> {
        let resolved = self.resolve_alias(name);
        self.accessors.get(&resolved).map(|a| Arc::clone(&a))
    }

    /// Accessor for a wire name: custom first, then schema-derived
    pub fn accessor_for(&self, name: &str) -> Option<Arc<dyn PropertyAccessor>> {
        if let Some(custom) = self.custom_accessor(name) {
            return Some(custom);
        }
        self.schema(name)
            .map(|schema| Arc::new(SchemaAccessor::new(schema)) as Arc<dyn PropertyAccessor>)
    }

    /// Whether anything at all is registered under this name
    pub fn knows(&self, name: &str) -> bool {
        let resolved = self.resolve_alias(name);
        self.accessors.contains_key(&resolved)
            || self.schemas.contains_key(&resolved)
            || self.enums.contains_key(&resolved)
    }
}
