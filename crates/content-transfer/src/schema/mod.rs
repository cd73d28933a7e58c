//! Schema comparison between source and destination projects.
//!
//! The comparator is a pure function: given the two schema maps and a
//! [`SchemaMatching`] strategy it reports a structured diff list per entity
//! type. The engine treats any non-empty diff list as a hard integrity
//! failure.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema map keyed by entity-type uid (e.g. `api::article.article`).
pub type SchemaMap = BTreeMap<String, EntitySchema>;

/// Structural description of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Model category, e.g. `contentType` or `component`.
    #[serde(rename = "modelType")]
    pub model_type: String,

    /// Content-type kind (`collectionType` / `singleType`), absent for components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Attribute definitions keyed by attribute name.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,

    /// Auxiliary metadata (display info, plugin options) only compared under
    /// the `exact` strategy.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EntitySchema {
    /// Create a schema with the given model type and attributes.
    pub fn new(model_type: impl Into<String>, attributes: BTreeMap<String, Value>) -> Self {
        Self {
            model_type: model_type.into(),
            kind: None,
            attributes,
            extra: BTreeMap::new(),
        }
    }
}

/// How sensitive the schema comparison is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaMatching {
    /// Compare everything, auxiliary metadata included.
    Exact,
    /// Compare model type, kind and attributes.
    #[default]
    Strict,
    /// Never report diffs.
    Ignore,
}

impl fmt::Display for SchemaMatching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaMatching::Exact => "exact",
            SchemaMatching::Strict => "strict",
            SchemaMatching::Ignore => "ignore",
        };
        f.write_str(name)
    }
}

/// A single difference between two schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDiff {
    /// Dotted path of the differing element, e.g. `attributes.title`.
    pub path: String,
    pub kind: SchemaDiffKind,
}

/// Direction of a schema difference.
///
/// `Added` means the element exists in the source only; `Removed` means it
/// exists in the destination only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaDiffKind {
    Added,
    Removed,
    Modified { source: Value, destination: Value },
}

/// Compare two entity schemas under a matching strategy.
pub fn compare_schemas(
    source: &EntitySchema,
    destination: &EntitySchema,
    strategy: SchemaMatching,
) -> Vec<SchemaDiff> {
    if strategy == SchemaMatching::Ignore {
        return Vec::new();
    }

    let mut diffs = Vec::new();

    if source.model_type != destination.model_type {
        diffs.push(SchemaDiff {
            path: "modelType".to_string(),
            kind: SchemaDiffKind::Modified {
                source: Value::String(source.model_type.clone()),
                destination: Value::String(destination.model_type.clone()),
            },
        });
    }

    if source.kind != destination.kind {
        diffs.push(SchemaDiff {
            path: "kind".to_string(),
            kind: SchemaDiffKind::Modified {
                source: json_or_null(source.kind.as_deref()),
                destination: json_or_null(destination.kind.as_deref()),
            },
        });
    }

    diff_value_maps(
        "attributes",
        &source.attributes,
        &destination.attributes,
        &mut diffs,
    );

    if strategy == SchemaMatching::Exact {
        diff_value_maps("", &source.extra, &destination.extra, &mut diffs);
    }

    diffs
}

/// Compare two schema maps over the union of their keys.
///
/// A key missing on either side is itself a diff for that key. Returns only
/// the keys with non-empty diff lists; an empty result means the schemas
/// match under the given strategy.
pub fn diff_schema_maps(
    source: &SchemaMap,
    destination: &SchemaMap,
    strategy: SchemaMatching,
) -> BTreeMap<String, Vec<SchemaDiff>> {
    let mut result = BTreeMap::new();

    if strategy == SchemaMatching::Ignore {
        return result;
    }

    let keys: BTreeSet<&String> = source.keys().chain(destination.keys()).collect();

    for key in keys {
        let diffs = match (source.get(key), destination.get(key)) {
            (Some(s), Some(d)) => compare_schemas(s, d, strategy),
            (Some(_), None) => vec![SchemaDiff {
                path: key.clone(),
                kind: SchemaDiffKind::Added,
            }],
            (None, Some(_)) => vec![SchemaDiff {
                path: key.clone(),
                kind: SchemaDiffKind::Removed,
            }],
            (None, None) => unreachable!("key comes from the union of both maps"),
        };

        if !diffs.is_empty() {
            result.insert(key.clone(), diffs);
        }
    }

    result
}

fn diff_value_maps(
    prefix: &str,
    source: &BTreeMap<String, Value>,
    destination: &BTreeMap<String, Value>,
    diffs: &mut Vec<SchemaDiff>,
) {
    let keys: BTreeSet<&String> = source.keys().chain(destination.keys()).collect();

    for key in keys {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match (source.get(key), destination.get(key)) {
            (Some(s), Some(d)) if s != d => diffs.push(SchemaDiff {
                path,
                kind: SchemaDiffKind::Modified {
                    source: s.clone(),
                    destination: d.clone(),
                },
            }),
            (Some(_), Some(_)) => {}
            (Some(_), None) => diffs.push(SchemaDiff {
                path,
                kind: SchemaDiffKind::Added,
            }),
            (None, Some(_)) => diffs.push(SchemaDiff {
                path,
                kind: SchemaDiffKind::Removed,
            }),
            (None, None) => unreachable!("key comes from the union of both maps"),
        }
    }
}

fn json_or_null(value: Option<&str>) -> Value {
    value
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_with(attributes: &[(&str, Value)]) -> EntitySchema {
        EntitySchema::new(
            "contentType",
            attributes
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_identical_schemas_have_no_diffs() {
        let schema = schema_with(&[("title", json!({ "type": "string" }))]);
        assert!(compare_schemas(&schema, &schema, SchemaMatching::Strict).is_empty());
        assert!(compare_schemas(&schema, &schema, SchemaMatching::Exact).is_empty());
    }

    #[test]
    fn test_attribute_only_in_source_is_added() {
        let source = schema_with(&[
            ("title", json!({ "type": "string" })),
            ("body", json!({ "type": "richtext" })),
        ]);
        let destination = schema_with(&[("title", json!({ "type": "string" }))]);

        let diffs = compare_schemas(&source, &destination, SchemaMatching::Strict);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "attributes.body");
        assert_eq!(diffs[0].kind, SchemaDiffKind::Added);
    }

    #[test]
    fn test_attribute_only_in_destination_is_removed() {
        let source = schema_with(&[("title", json!({ "type": "string" }))]);
        let destination = schema_with(&[
            ("title", json!({ "type": "string" })),
            ("slug", json!({ "type": "uid" })),
        ]);

        let diffs = compare_schemas(&source, &destination, SchemaMatching::Strict);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "attributes.slug");
        assert_eq!(diffs[0].kind, SchemaDiffKind::Removed);
    }

    #[test]
    fn test_modified_attribute_carries_both_values() {
        let source = schema_with(&[("title", json!({ "type": "string" }))]);
        let destination = schema_with(&[("title", json!({ "type": "text" }))]);

        let diffs = compare_schemas(&source, &destination, SchemaMatching::Strict);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "attributes.title");
        assert_eq!(
            diffs[0].kind,
            SchemaDiffKind::Modified {
                source: json!({ "type": "string" }),
                destination: json!({ "type": "text" }),
            }
        );
    }

    #[test]
    fn test_kind_difference_is_reported() {
        let mut source = schema_with(&[]);
        source.kind = Some("collectionType".to_string());
        let mut destination = schema_with(&[]);
        destination.kind = Some("singleType".to_string());

        let diffs = compare_schemas(&source, &destination, SchemaMatching::Strict);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "kind");
    }

    #[test]
    fn test_extra_metadata_only_compared_under_exact() {
        let mut source = schema_with(&[]);
        source
            .extra
            .insert("pluginOptions".to_string(), json!({ "i18n": true }));
        let destination = schema_with(&[]);

        assert!(compare_schemas(&source, &destination, SchemaMatching::Strict).is_empty());

        let diffs = compare_schemas(&source, &destination, SchemaMatching::Exact);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "pluginOptions");
        assert_eq!(diffs[0].kind, SchemaDiffKind::Added);
    }

    #[test]
    fn test_ignore_strategy_reports_nothing() {
        let source = schema_with(&[("title", json!({ "type": "string" }))]);
        let destination = schema_with(&[]);
        assert!(compare_schemas(&source, &destination, SchemaMatching::Ignore).is_empty());
    }

    #[test]
    fn test_map_diff_over_key_union() {
        let mut source = SchemaMap::new();
        source.insert(
            "api::article.article".to_string(),
            schema_with(&[("title", json!({ "type": "string" }))]),
        );
        source.insert("api::page.page".to_string(), schema_with(&[]));

        let mut destination = SchemaMap::new();
        destination.insert(
            "api::article.article".to_string(),
            schema_with(&[("title", json!({ "type": "text" }))]),
        );
        destination.insert("api::tag.tag".to_string(), schema_with(&[]));

        let diffs = diff_schema_maps(&source, &destination, SchemaMatching::Strict);
        assert_eq!(diffs.len(), 3);
        assert_eq!(
            diffs["api::article.article"][0].path,
            "attributes.title"
        );
        assert_eq!(diffs["api::page.page"][0].kind, SchemaDiffKind::Added);
        assert_eq!(diffs["api::tag.tag"][0].kind, SchemaDiffKind::Removed);
    }

    #[test]
    fn test_matching_maps_produce_empty_result() {
        let mut source = SchemaMap::new();
        source.insert(
            "api::article.article".to_string(),
            schema_with(&[("title", json!({ "type": "string" }))]),
        );
        let destination = source.clone();

        assert!(diff_schema_maps(&source, &destination, SchemaMatching::Strict).is_empty());
    }

    #[test]
    fn test_schema_deserializes_with_flattened_extra() {
        let schema: EntitySchema = serde_json::from_value(json!({
            "modelType": "contentType",
            "kind": "collectionType",
            "attributes": { "title": { "type": "string" } },
            "info": { "displayName": "Article" }
        }))
        .unwrap();

        assert_eq!(schema.model_type, "contentType");
        assert_eq!(schema.kind.as_deref(), Some("collectionType"));
        assert!(schema.attributes.contains_key("title"));
        assert!(schema.extra.contains_key("info"));
    }
}
