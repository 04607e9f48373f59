//! `$ref` analysis performed before compilation
//!
//! The validation engine resolves references lazily, on first use. To
//! report unresolved references as compile errors (and to fetch remote
//! schemas once, up front) every `$ref` reachable from the primary schema
//! is resolved here into a [`RefTable`] that the engine later reads from.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::RefsPolicy;
use crate::remote::SchemaFetcher;

/// Base URI used by the engine for schemas without `$id`
pub const DEFAULT_BASE: &str = "json-schema:///";

/// Keys whose values are instance data, never subschemas
const DATA_KEYWORDS: [&str; 4] = ["enum", "const", "default", "examples"];

/// Keys allowed beside `$ref` because they carry no validation
const ANNOTATION_KEYWORDS: [&str; 12] = [
    "$ref",
    "$comment",
    "$id",
    "id",
    "$schema",
    "title",
    "description",
    "definitions",
    "$defs",
    "examples",
    "default",
    "deprecated",
];

#[derive(Error, Debug)]
pub enum RefError {
    #[error("can't resolve reference {reference} from id {base}")]
    Unresolved { reference: String, base: String },

    #[error("{uri}: {reason}")]
    Remote { uri: String, reason: String },

    #[error("$ref with sibling keywords {keywords:?} at {location}")]
    Extended { location: String, keywords: Vec<String> },
}

/// Apply the `extendRefs` policy to a schema document in place.
///
/// - `Ignore`: sibling keywords are dropped
/// - `Fail`: the first `$ref` with siblings is an error
/// - `Strict`: `{"$ref": r, k...}` becomes `{"allOf": [{"$ref": r}], k...}`
pub fn apply_extend_refs(schema: &mut Value, policy: RefsPolicy) -> Result<(), RefError> {
    extend_refs_at(schema, policy, "#")
}

fn extend_refs_at(value: &mut Value, policy: RefsPolicy, location: &str) -> Result<(), RefError> {
    match value {
        Value::Object(obj) => {
            if obj.get("$ref").map(Value::is_string).unwrap_or(false) {
                let siblings: Vec<String> = obj
                    .keys()
                    .filter(|k| !ANNOTATION_KEYWORDS.contains(&k.as_str()))
                    .cloned()
                    .collect();
                if !siblings.is_empty() {
                    match policy {
                        RefsPolicy::Fail => {
                            return Err(RefError::Extended {
                                location: location.to_string(),
                                keywords: siblings,
                            })
                        }
                        RefsPolicy::Ignore => {
                            warn!(location, keywords = ?siblings, "keywords beside $ref ignored");
                            for key in &siblings {
                                obj.remove(key);
                            }
                        }
                        RefsPolicy::Strict => {
                            if let Some(reference) = obj.remove("$ref") {
                                let mut wrapped = Map::new();
                                wrapped.insert("$ref".to_string(), reference);
                                let all_of = obj
                                    .entry("allOf")
                                    .or_insert_with(|| Value::Array(Vec::new()));
                                if let Value::Array(items) = all_of {
                                    items.insert(0, Value::Object(wrapped));
                                }
                            }
                        }
                    }
                }
            }

            for (key, child) in obj.iter_mut() {
                if DATA_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                let child_location = format!("{}/{}", location, escape_pointer(key));
                extend_refs_at(child, policy, &child_location)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for (i, child) in items.iter_mut().enumerate() {
                extend_refs_at(child, policy, &format!("{}/{}", location, i))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Every `$ref` string in a document, in document order
pub fn collect_refs(schema: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    collect_refs_into(schema, &mut refs);
    refs
}

fn collect_refs_into(value: &Value, refs: &mut Vec<String>) {
    match value {
        Value::Object(obj) => {
            if let Some(Value::String(reference)) = obj.get("$ref") {
                refs.push(reference.clone());
            }
            for (key, child) in obj {
                if !DATA_KEYWORDS.contains(&key.as_str()) {
                    collect_refs_into(child, refs);
                }
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_refs_into(child, refs);
            }
        }
        _ => {}
    }
}

/// Base URI of a document: its `$id`/`id`, else the location it was
/// reached through.
pub fn document_base(document: &Value, fallback: &Url) -> Url {
    document
        .get("$id")
        .or_else(|| document.get("id"))
        .and_then(|v| v.as_str())
        .and_then(|id| fallback.join(id).ok())
        .unwrap_or_else(|| fallback.clone())
}

fn without_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

fn last_segment(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|s| !s.is_empty())
}

fn escape_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_pointer(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Meta-schemas ship with the engine
fn is_meta_schema(url: &Url) -> bool {
    url.host_str() == Some("json-schema.org")
}

/// Schema documents addressable by URI or by file name.
///
/// Later registrations shadow earlier ones, which gives external schemas
/// precedence over common ones and common over local.
#[derive(Debug, Clone, Default)]
pub struct RefTable {
    by_uri: HashMap<String, Arc<Value>>,
    by_name: HashMap<String, Arc<Value>>,
    /// Placeholders for unresolved plain-name anchors, keyed by full URI
    anchors: BTreeMap<String, Value>,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under its `$id` and its file name
    pub fn register(&mut self, document: Arc<Value>, id: Option<&str>, file_name: &str) {
        if let Some(id) = id {
            match Url::parse(id) {
                Ok(url) => {
                    self.by_uri
                        .insert(without_fragment(&url).to_string(), Arc::clone(&document));
                    if let Some(name) = last_segment(&url) {
                        self.by_name.insert(name, Arc::clone(&document));
                    }
                }
                Err(_) => {
                    self.by_name
                        .insert(id.trim_end_matches('#').to_string(), Arc::clone(&document));
                }
            }
        }
        self.by_uri
            .insert(format!("{}{}", DEFAULT_BASE, file_name), Arc::clone(&document));
        self.by_name.insert(file_name.to_string(), document);
    }

    /// Register a document reached through a URI (fetched or stubbed)
    pub fn insert_uri(&mut self, url: &Url, document: Arc<Value>) {
        self.by_uri.insert(without_fragment(url).to_string(), document);
    }

    /// Find the document behind a URI: exact match first, then by file name
    pub fn lookup(&self, url: &Url) -> Option<Arc<Value>> {
        let key = without_fragment(url).to_string();
        if let Some(document) = self.by_uri.get(&key) {
            return Some(Arc::clone(document));
        }
        last_segment(url).and_then(|name| self.by_name.get(&name).cloned())
    }

    /// Embed the anchor placeholders into the primary schema's
    /// `definitions`. The engine looks plain-name anchors up only inside
    /// the schema being compiled, under their absolute identifier.
    pub fn embed_anchors(&self, schema: &mut Value) {
        if self.anchors.is_empty() {
            return;
        }
        let Value::Object(root) = schema else { return };
        let draft4 = root
            .get("$schema")
            .and_then(Value::as_str)
            .map(|s| s.contains("draft-04"))
            .unwrap_or(false);
        let id_key = if draft4 { "id" } else { "$id" };

        let definitions = root
            .entry("definitions")
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(definitions) = definitions else { return };
        for (i, (uri, leaf)) in self.anchors.iter().enumerate() {
            let mut placeholder = leaf.clone();
            if let Value::Object(obj) = &mut placeholder {
                obj.insert(id_key.to_string(), Value::String(uri.clone()));
            }
            definitions.insert(format!("unresolved-anchor-{}", i), placeholder);
        }
    }

    pub fn len(&self) -> usize {
        self.by_uri.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uri.is_empty()
    }
}

/// Walks the references reachable from a primary schema and completes the
/// table: known documents are followed, unknown ones are fetched when a
/// fetcher is available and otherwise handled by the `missingRefs` policy.
pub struct RefResolver<'a> {
    table: RefTable,
    fetcher: Option<&'a dyn SchemaFetcher>,
    missing_refs: RefsPolicy,
    stubs: HashMap<String, Value>,
}

impl<'a> RefResolver<'a> {
    pub fn new(table: RefTable, fetcher: Option<&'a dyn SchemaFetcher>, missing_refs: RefsPolicy) -> Self {
        Self {
            table,
            fetcher,
            missing_refs,
            stubs: HashMap::new(),
        }
    }

    /// Resolve everything reachable from `primary` (whose base is `base`)
    pub fn resolve(mut self, primary: &Value, base: &Url) -> Result<RefTable, RefError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(Arc<Value>, Url)> = VecDeque::new();

        let root_base = document_base(primary, base);
        visited.insert(without_fragment(&root_base).to_string());
        queue.push_back((Arc::new(primary.clone()), root_base));

        while let Some((document, base)) = queue.pop_front() {
            for reference in collect_refs(&document) {
                if reference.starts_with('#') {
                    continue;
                }
                let target = base.join(&reference).map_err(|_| RefError::Unresolved {
                    reference: reference.clone(),
                    base: base.to_string(),
                })?;
                if is_meta_schema(&target) {
                    continue;
                }
                let key = without_fragment(&target).to_string();
                if self.stubs.contains_key(&key) {
                    self.stub(&target, &reference, &base)?;
                    continue;
                }
                if visited.contains(&key) {
                    continue;
                }

                let found = match self.table.lookup(&target) {
                    Some(found) => found,
                    None => match self.fetch(&target)? {
                        Some(fetched) => fetched,
                        None => {
                            self.stub(&target, &reference, &base)?;
                            continue;
                        }
                    },
                };

                visited.insert(key);
                let next_base = document_base(&found, &without_fragment(&target));
                debug!(reference = %reference, resolved = %next_base, "reference resolved");
                queue.push_back((found, next_base));
            }
        }

        for (key, stub) in self.stubs {
            if let Ok(url) = Url::parse(&key) {
                self.table.insert_uri(&url, Arc::new(stub));
            }
        }
        Ok(self.table)
    }

    fn fetch(&mut self, target: &Url) -> Result<Option<Arc<Value>>, RefError> {
        let Some(fetcher) = self.fetcher else {
            return Ok(None);
        };
        let url = without_fragment(target);
        let bytes = fetcher.fetch(&url).map_err(|e| RefError::Remote {
            uri: url.to_string(),
            reason: e.to_string(),
        })?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| RefError::Remote {
            uri: url.to_string(),
            reason: format!("invalid JSON: {}", e),
        })?;
        let value = Arc::new(value);
        self.table.insert_uri(&url, Arc::clone(&value));
        debug!(uri = %url, "remote schema loaded");
        Ok(Some(value))
    }

    /// Record a placeholder for an unresolvable reference, shaped so that
    /// the reference's fragment exists in it.
    fn stub(&mut self, target: &Url, reference: &str, base: &Url) -> Result<(), RefError> {
        let leaf = match self.missing_refs {
            RefsPolicy::Strict => {
                return Err(RefError::Unresolved {
                    reference: reference.to_string(),
                    base: base.to_string(),
                })
            }
            RefsPolicy::Ignore => serde_json::json!({}),
            RefsPolicy::Fail => serde_json::json!({ "not": {} }),
        };
        warn!(reference, policy = ?self.missing_refs, "unresolved reference replaced");

        let key = without_fragment(target).to_string();
        let stub = self
            .stubs
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()));
        let fragment = percent_decode_str(target.fragment().unwrap_or("")).decode_utf8_lossy();
        if fragment.is_empty() || fragment.starts_with('/') {
            place_at_pointer(stub, &fragment, leaf);
        } else {
            self.table.anchors.insert(target.to_string(), leaf);
        }
        Ok(())
    }
}

/// Place `leaf` at a JSON pointer inside `root`, creating objects on the way
fn place_at_pointer(root: &mut Value, pointer: &str, leaf: Value) {
    let tokens: Vec<String> = pointer
        .split('/')
        .skip(1)
        .map(unescape_pointer)
        .collect();
    if tokens.is_empty() {
        // whole-document reference: the stub itself is the leaf schema
        if let (Value::Object(target), Value::Object(source)) = (&mut *root, leaf) {
            for (k, v) in source {
                target.insert(k, v);
            }
        }
        return;
    }

    let mut current = root;
    for (i, token) in tokens.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(obj) = current else { return };
        if i == tokens.len() - 1 {
            obj.insert(token.clone(), leaf);
            return;
        }
        current = obj
            .entry(token.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::StaticFetcher;
    use serde_json::json;

    fn base() -> Url {
        Url::parse(DEFAULT_BASE).unwrap()
    }

    #[test]
    fn test_collect_refs_skips_data() {
        let schema = json!({
            "properties": {
                "a": { "$ref": "common-schema.json#/definitions/id" },
                "b": { "enum": [{ "$ref": "not-a-ref" }] }
            },
            "allOf": [{ "$ref": "#/definitions/local" }]
        });
        let refs = collect_refs(&schema);
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&"common-schema.json#/definitions/id".to_string()));
        assert!(refs.contains(&"#/definitions/local".to_string()));
    }

    #[test]
    fn test_extend_refs_fail() {
        let mut schema = json!({
            "properties": { "a": { "$ref": "#/definitions/x", "type": "string" } }
        });
        let err = apply_extend_refs(&mut schema, RefsPolicy::Fail).unwrap_err();
        match err {
            RefError::Extended { location, keywords } => {
                assert_eq!(location, "#/properties/a");
                assert_eq!(keywords, vec!["type".to_string()]);
            }
            other => panic!("Expected Extended, got {:?}", other),
        }
    }

    #[test]
    fn test_extend_refs_allows_annotations() {
        let mut schema = json!({ "$ref": "#/definitions/x", "description": "doc" });
        assert!(apply_extend_refs(&mut schema, RefsPolicy::Fail).is_ok());
    }

    #[test]
    fn test_extend_refs_ignore_and_strict() {
        let mut ignored = json!({ "$ref": "#/definitions/x", "minLength": 2 });
        apply_extend_refs(&mut ignored, RefsPolicy::Ignore).unwrap();
        assert_eq!(ignored, json!({ "$ref": "#/definitions/x" }));

        let mut strict = json!({ "$ref": "#/definitions/x", "minLength": 2 });
        apply_extend_refs(&mut strict, RefsPolicy::Strict).unwrap();
        assert_eq!(
            strict,
            json!({ "allOf": [{ "$ref": "#/definitions/x" }], "minLength": 2 })
        );
    }

    #[test]
    fn test_table_lookup_by_id_and_name() {
        let mut table = RefTable::new();
        let doc = Arc::new(json!({ "$id": "https://example.org/common-schema.json#" }));
        table.register(Arc::clone(&doc), Some("https://example.org/common-schema.json#"), "common-schema.json");

        let by_id = Url::parse("https://example.org/common-schema.json#/definitions/x").unwrap();
        let by_name = base().join("common-schema.json").unwrap();
        let elsewhere = Url::parse("https://mirror.example.com/schemas/common-schema.json").unwrap();
        assert!(table.lookup(&by_id).is_some());
        assert!(table.lookup(&by_name).is_some());
        assert!(table.lookup(&elsewhere).is_some());
        assert!(table.lookup(&base().join("other.json").unwrap()).is_none());
    }

    #[test]
    fn test_missing_ref_strict_is_error() {
        let primary = json!({ "properties": { "a": { "$ref": "https://example.org/unknown.json" } } });
        let resolver = RefResolver::new(RefTable::new(), None, RefsPolicy::Strict);
        let err = resolver.resolve(&primary, &base()).unwrap_err();
        assert!(matches!(err, RefError::Unresolved { .. }));
    }

    #[test]
    fn test_missing_ref_ignore_builds_stub() {
        let primary = json!({ "properties": { "a": { "$ref": "https://example.org/unknown.json#/definitions/x" } } });
        let resolver = RefResolver::new(RefTable::new(), None, RefsPolicy::Ignore);
        let table = resolver.resolve(&primary, &base()).unwrap();

        let stub = table
            .lookup(&Url::parse("https://example.org/unknown.json").unwrap())
            .unwrap();
        assert_eq!(*stub, json!({ "definitions": { "x": {} } }));
    }

    #[test]
    fn test_missing_ref_stub_decodes_pointer() {
        let primary = json!({ "$ref": "https://example.org/types.json#/definitions/A%20B~1C" });
        let resolver = RefResolver::new(RefTable::new(), None, RefsPolicy::Ignore);
        let table = resolver.resolve(&primary, &base()).unwrap();

        let stub = table
            .lookup(&Url::parse("https://example.org/types.json").unwrap())
            .unwrap();
        assert_eq!(*stub, json!({ "definitions": { "A B/C": {} } }));
    }

    #[test]
    fn test_missing_anchor_is_embedded_by_identifier() {
        let primary = json!({ "properties": { "a": { "$ref": "https://x.org/s.json#Foo" } } });
        let resolver = RefResolver::new(RefTable::new(), None, RefsPolicy::Fail);
        let table = resolver.resolve(&primary, &base()).unwrap();

        let mut schema = primary.clone();
        table.embed_anchors(&mut schema);
        assert_eq!(
            schema["definitions"]["unresolved-anchor-0"],
            json!({ "$id": "https://x.org/s.json#Foo", "not": {} })
        );

        let mut draft4 = json!({ "$schema": "http://json-schema.org/draft-04/schema#" });
        table.embed_anchors(&mut draft4);
        assert_eq!(draft4["definitions"]["unresolved-anchor-0"]["id"], "https://x.org/s.json#Foo");
    }

    #[test]
    fn test_missing_ref_fail_builds_rejecting_stub() {
        let primary = json!({ "$ref": "https://example.org/unknown.json" });
        let resolver = RefResolver::new(RefTable::new(), None, RefsPolicy::Fail);
        let table = resolver.resolve(&primary, &base()).unwrap();
        let stub = table
            .lookup(&Url::parse("https://example.org/unknown.json").unwrap())
            .unwrap();
        assert_eq!(*stub, json!({ "not": {} }));
    }

    #[test]
    fn test_transitive_refs_follow_dependencies() {
        let mut table = RefTable::new();
        let common = Arc::new(json!({
            "$id": "https://example.org/common-schema.json",
            "definitions": { "loc": { "$ref": "geometry-schema.json#/definitions/point" } }
        }));
        table.register(common, Some("https://example.org/common-schema.json"), "common-schema.json");

        let primary = json!({ "$ref": "https://example.org/common-schema.json#/definitions/loc" });
        let resolver = RefResolver::new(table, None, RefsPolicy::Strict);
        let err = resolver.resolve(&primary, &base()).unwrap_err();
        match err {
            RefError::Unresolved { reference, .. } => {
                assert_eq!(reference, "geometry-schema.json#/definitions/point");
            }
            other => panic!("Expected Unresolved, got {:?}", other),
        }
    }

    #[test]
    fn test_remote_fetch_fills_table() {
        let fetcher = StaticFetcher::new().with("https://example.org/remote.json", r#"{"type": "integer"}"#);
        let primary = json!({ "$ref": "https://example.org/remote.json" });
        let resolver = RefResolver::new(RefTable::new(), Some(&fetcher), RefsPolicy::Strict);
        let table = resolver.resolve(&primary, &base()).unwrap();
        let fetched = table
            .lookup(&Url::parse("https://example.org/remote.json").unwrap())
            .unwrap();
        assert_eq!(fetched["type"], "integer");
    }

    #[test]
    fn test_remote_fetch_failures() {
        let fetcher = StaticFetcher::new().with("https://example.org/broken.json", "<html>");
        let missing = json!({ "$ref": "https://example.org/missing.json" });
        let broken = json!({ "$ref": "https://example.org/broken.json" });

        let err = RefResolver::new(RefTable::new(), Some(&fetcher), RefsPolicy::Strict)
            .resolve(&missing, &base())
            .unwrap_err();
        assert!(matches!(err, RefError::Remote { .. }));

        let err = RefResolver::new(RefTable::new(), Some(&fetcher), RefsPolicy::Strict)
            .resolve(&broken, &base())
            .unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_meta_schema_refs_are_skipped() {
        let primary = json!({ "$ref": "http://json-schema.org/draft-07/schema#" });
        let resolver = RefResolver::new(RefTable::new(), None, RefsPolicy::Strict);
        assert!(resolver.resolve(&primary, &base()).is_ok());
    }
}
