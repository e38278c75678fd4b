//! Codec configuration and the per-exchange context

use std::sync::Arc;

use crate::registry::TypeRegistry;

/// Serialization settings consumed by the readers, writers and coercers.
///
/// These are supplied by whatever configuration layer fronts the codec; the
/// codec itself only reads them. Defaults match the wire-compatible behavior
/// expected by modern clients.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Maximum decoded string payload in bytes. Longer declared lengths fail
    /// with `StringTooLong` before any allocation. Default 25 MiB.
    pub max_string_bytes: usize,

    /// Write arbitrary-precision numbers as doubles (lossy) instead of
    /// strings, and coerce them back through doubles
    pub legacy_big_numbers: bool,

    /// Write string-keyed maps as ECMA/associative arrays instead of
    /// anonymous dynamic objects
    pub legacy_map: bool,

    /// Wrap dense arrays in the growable-collection record legacy clients
    /// expect instead of writing them as plain arrays. Legacy format only;
    /// readers always unwrap the shape regardless of this setting.
    pub legacy_collection: bool,

    /// Allow dates to be deduplicated through the object reference table in
    /// the modern format. The legacy format never tracks dates.
    pub support_dates_by_reference: bool,

    /// When a wire type name cannot be resolved, fall back to a generic
    /// dynamic record instead of failing with `UnresolvableType`
    pub create_dynamic_for_missing_type: bool,

    /// Resolve wire type names against the registry during envelope reads.
    /// When false, typed payloads stay as loose records.
    pub instantiate_types: bool,

    /// Swallow per-member assignment failures during record coercion rather
    /// than raising `PropertyAssignment`
    pub ignore_property_errors: bool,

    /// Log swallowed assignment failures at WARN
    pub log_property_errors: bool,

    /// Maximum object graph depth
    pub max_object_nest_level: usize,

    /// Maximum nested collection depth (matrix dimensionality)
    pub max_collection_nest_level: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_string_bytes: 26_214_400,
            legacy_big_numbers: false,
            legacy_map: false,
            legacy_collection: false,
            support_dates_by_reference: false,
            create_dynamic_for_missing_type: false,
            instantiate_types: true,
            ignore_property_errors: true,
            log_property_errors: false,
            max_object_nest_level: 512,
            max_collection_nest_level: 15,
        }
    }
}

/// Shared, read-only state for one side of an exchange: the configuration
/// plus the type registry to resolve wire names against.
///
/// Cheap to clone. The registry is process-wide and safe to share across
/// concurrent passes; the reference tables that are *not* shareable live in
/// the readers/writers themselves.
#[derive(Debug, Clone)]
pub struct CodecContext {
    pub config: Arc<CodecConfig>,
    pub registry: Arc<TypeRegistry>,
}

impl CodecContext {
    pub fn new(config: CodecConfig, registry: Arc<TypeRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
        }
    }

    /// Context with the given config and the process-wide registry
    pub fn with_config(config: CodecConfig) -> Self {
        Self::new(config, TypeRegistry::global().clone())
    }
}

impl Default for CodecContext {
    fn default() -> Self {
        Self::with_config(CodecConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CodecConfig::default();
        assert_eq!(cfg.max_string_bytes, 26_214_400);
        assert_eq!(cfg.max_object_nest_level, 512);
        assert!(cfg.ignore_property_errors);
        assert!(!cfg.legacy_big_numbers);
    }
}
