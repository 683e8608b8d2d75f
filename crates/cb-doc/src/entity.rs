//! Full entity document
//!
//! Holds every field group of a stored entity and converts it to the wire
//! entity returned by the OData layer.

use serde_json::{json, Value};

use crate::handler::{
    keys, millis_or_null, opt_map, opt_millis, opt_str, str_or_null, DocHandler, FieldMap,
};
use crate::Result;

/// Property carrying the user-visible entity key
pub const KEY_PROPERTY: &str = "__id";
pub const PUBLISHED_PROPERTY: &str = "__published";
pub const UPDATED_PROPERTY: &str = "__updated";

const OWNER_FIELD: &str = "Owner";
const ANONYMOUS_OWNER: &str = "anon";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDocHandler {
    id: String,
    doc_type: String,
    cell_id: Option<String>,
    box_id: Option<String>,
    node_id: Option<String>,
    entity_type_id: Option<String>,
    version: Option<i64>,
    published: Option<i64>,
    updated: Option<i64>,
    static_fields: FieldMap,
    dynamic_fields: FieldMap,
    hidden_fields: FieldMap,
    acl_fields: FieldMap,
    many_to_one_links: FieldMap,
    unit_user_name: Option<String>,
}

/// Entity as handed to the response writer
#[derive(Debug, Clone, PartialEq)]
pub struct WireEntity {
    pub id: String,
    pub entity_type: String,
    pub properties: FieldMap,
    pub hidden: FieldMap,
    pub many_to_one_links: FieldMap,
    pub etag: String,
}

impl EntityDocHandler {
    pub fn new(doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            ..Default::default()
        }
    }

    /// Rebuild a handler from a stored document
    pub fn from_source(
        doc_type: impl Into<String>,
        id: impl Into<String>,
        version: Option<i64>,
        source: &FieldMap,
    ) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            doc_type: doc_type.into(),
            cell_id: opt_str(source, keys::CELL_ID)?,
            box_id: opt_str(source, keys::BOX_ID)?,
            node_id: opt_str(source, keys::NODE_ID)?,
            entity_type_id: opt_str(source, keys::ENTITY_TYPE_ID)?,
            version,
            published: opt_millis(source, keys::PUBLISHED)?,
            updated: opt_millis(source, keys::UPDATED)?,
            static_fields: opt_map(source, keys::STATIC_FIELDS)?.unwrap_or_default(),
            dynamic_fields: opt_map(source, keys::DYNAMIC_FIELDS)?.unwrap_or_default(),
            hidden_fields: opt_map(source, keys::HIDDEN_FIELDS)?.unwrap_or_default(),
            acl_fields: opt_map(source, keys::ACL_FIELDS)?.unwrap_or_default(),
            many_to_one_links: opt_map(source, keys::LINK)?.unwrap_or_default(),
            unit_user_name: None,
        })
    }

    pub fn with_owner(
        mut self,
        cell_id: Option<&str>,
        box_id: Option<&str>,
        node_id: Option<&str>,
    ) -> Self {
        self.cell_id = cell_id.map(str::to_string);
        self.box_id = box_id.map(str::to_string);
        self.node_id = node_id.map(str::to_string);
        self
    }

    pub fn set_entity_type_id(&mut self, entity_type_id: impl Into<String>) {
        self.entity_type_id = Some(entity_type_id.into());
    }

    /// Content fingerprint: `{version}-{updated}`
    pub fn etag(&self) -> String {
        format!("{}-{}", fmt_opt(self.version), fmt_opt(self.updated))
    }

    /// Weak validator form used in the `ETag` response header
    pub fn etag_header(&self) -> String {
        format!("W/\"{}\"", self.etag())
    }

    /// Derive the unit-user name used to address this document's data store.
    ///
    /// The owner comes from the hidden `Owner` field; documents without one
    /// belong to the anonymous unit user.
    pub fn resolve_unit_user_name(&mut self, unit_prefix: &str) {
        let owner = self.hidden_fields.get(OWNER_FIELD).and_then(Value::as_str);
        let suffix = match owner {
            Some(owner) => encode_index_name(owner),
            None => ANONYMOUS_OWNER.to_string(),
        };
        self.unit_user_name = Some(format!("{}_{}", unit_prefix, suffix));
    }

    /// Convert to the wire entity, optionally restricted to `select`.
    ///
    /// The key property and the reserved timestamps are always emitted.
    pub fn to_entity(&self, select: Option<&[&str]>) -> WireEntity {
        let wanted = |name: &str| match select {
            None => true,
            Some(names) if names.is_empty() => true,
            Some(names) => name == KEY_PROPERTY || names.iter().any(|n| *n == name),
        };

        let mut properties = FieldMap::new();
        for (name, value) in self.static_fields.iter().chain(self.dynamic_fields.iter()) {
            if wanted(name) && !properties.contains_key(name) {
                properties.insert(name.clone(), value.clone());
            }
        }
        if let Some(published) = self.published {
            properties.insert(PUBLISHED_PROPERTY.to_string(), Value::String(odata_date(published)));
        }
        if let Some(updated) = self.updated {
            properties.insert(UPDATED_PROPERTY.to_string(), Value::String(odata_date(updated)));
        }

        WireEntity {
            id: self.id.clone(),
            entity_type: self.doc_type.clone(),
            properties,
            hidden: self.hidden_fields.clone(),
            many_to_one_links: self.many_to_one_links.clone(),
            etag: self.etag(),
        }
    }
}

impl WireEntity {
    pub fn etag_header(&self) -> String {
        format!("W/\"{}\"", self.etag)
    }

    /// User-visible key, falling back to the internal id
    pub fn key(&self) -> &str {
        self.properties
            .get(KEY_PROPERTY)
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }

    pub fn to_json(&self, entity_set_uri: &str) -> Value {
        let mut body = FieldMap::new();
        body.insert(
            "__metadata".to_string(),
            json!({
                "uri": format!("{}('{}')", entity_set_uri, self.key()),
                "etag": self.etag_header(),
                "type": self.entity_type,
            }),
        );
        for (name, value) in &self.properties {
            body.insert(name.clone(), value.clone());
        }
        Value::Object(body)
    }
}

impl DocHandler for EntityDocHandler {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc_type(&self) -> &str {
        &self.doc_type
    }

    fn source(&self) -> FieldMap {
        let mut source = FieldMap::new();
        source.insert(keys::STATIC_FIELDS.to_string(), Value::Object(self.static_fields.clone()));
        source.insert(keys::DYNAMIC_FIELDS.to_string(), Value::Object(self.dynamic_fields.clone()));
        source.insert(keys::HIDDEN_FIELDS.to_string(), Value::Object(self.hidden_fields.clone()));
        source.insert(keys::ACL_FIELDS.to_string(), Value::Object(self.acl_fields.clone()));
        source.insert(keys::PUBLISHED.to_string(), millis_or_null(self.published));
        source.insert(keys::UPDATED.to_string(), millis_or_null(self.updated));
        source.insert(keys::CELL_ID.to_string(), str_or_null(self.cell_id.as_deref()));
        source.insert(keys::BOX_ID.to_string(), str_or_null(self.box_id.as_deref()));
        source.insert(keys::NODE_ID.to_string(), str_or_null(self.node_id.as_deref()));
        source.insert(
            keys::ENTITY_TYPE_ID.to_string(),
            str_or_null(self.entity_type_id.as_deref()),
        );
        source.insert(keys::LINK.to_string(), Value::Object(self.many_to_one_links.clone()));
        source
    }

    fn cell_id(&self) -> Option<&str> {
        self.cell_id.as_deref()
    }

    fn box_id(&self) -> Option<&str> {
        self.box_id.as_deref()
    }

    fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    fn entity_type_id(&self) -> Option<&str> {
        self.entity_type_id.as_deref()
    }

    fn version(&self) -> Option<i64> {
        self.version
    }

    fn published(&self) -> Option<i64> {
        self.published
    }

    fn updated(&self) -> Option<i64> {
        self.updated
    }

    fn static_fields(&self) -> Option<&FieldMap> {
        Some(&self.static_fields)
    }

    fn dynamic_fields(&self) -> Option<&FieldMap> {
        Some(&self.dynamic_fields)
    }

    fn hidden_fields(&self) -> Option<&FieldMap> {
        Some(&self.hidden_fields)
    }

    fn acl_fields(&self) -> Option<&FieldMap> {
        Some(&self.acl_fields)
    }

    fn many_to_one_links(&self) -> Option<&FieldMap> {
        Some(&self.many_to_one_links)
    }

    fn unit_user_name(&self) -> Option<&str> {
        self.unit_user_name.as_deref()
    }

    fn set_version(&mut self, version: i64) {
        self.version = Some(version);
    }

    fn set_published(&mut self, published: i64) {
        self.published = Some(published);
    }

    fn set_updated(&mut self, updated: i64) {
        self.updated = Some(updated);
    }

    fn set_static_fields(&mut self, fields: FieldMap) {
        self.static_fields = fields;
    }

    fn set_dynamic_fields(&mut self, fields: FieldMap) {
        self.dynamic_fields = fields;
    }

    fn set_hidden_fields(&mut self, fields: FieldMap) {
        self.hidden_fields = fields;
    }

    fn set_acl_fields(&mut self, fields: FieldMap) {
        self.acl_fields = fields;
    }

    fn set_many_to_one_links(&mut self, links: FieldMap) {
        self.many_to_one_links = links;
    }
}

fn fmt_opt(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string())
}

/// OData v2 JSON date literal
fn odata_date(millis: i64) -> String {
    format!("/Date({})/", millis)
}

/// Index names only allow lowercase alphanumerics; everything else is hex-escaped
fn encode_index_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_lowercase() || b.is_ascii_digit() {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{:02x}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_source() -> FieldMap {
        json!({
            "s": { "__id": "user-1", "name": "Alice", "age": 30 },
            "d": { "nickname": "al" },
            "h": { "Owner": "https://cell.example/#admin" },
            "a": { "role:reader": { "privilege": ["read"] } },
            "p": 1700000000000i64,
            "u": "1700000005000",
            "c": "cell-1",
            "b": "box-1",
            "n": "node-1",
            "t": "et-1",
            "l": { "Team": "team-9" }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_from_source_reads_every_group() {
        let handler = EntityDocHandler::from_source("UserData", "doc-1", Some(3), &stored_source())
            .unwrap();

        assert_eq!(handler.id(), "doc-1");
        assert_eq!(handler.doc_type(), "UserData");
        assert_eq!(handler.cell_id(), Some("cell-1"));
        assert_eq!(handler.box_id(), Some("box-1"));
        assert_eq!(handler.node_id(), Some("node-1"));
        assert_eq!(handler.entity_type_id(), Some("et-1"));
        assert_eq!(handler.published(), Some(1700000000000));
        assert_eq!(handler.updated(), Some(1700000005000));
        assert_eq!(handler.static_fields().unwrap()["name"], "Alice");
        assert_eq!(handler.dynamic_fields().unwrap()["nickname"], "al");
        assert!(handler.acl_fields().unwrap().contains_key("role:reader"));
        assert_eq!(handler.many_to_one_links().unwrap()["Team"], "team-9");
    }

    #[test]
    fn test_source_round_trips_through_from_source() {
        let handler = EntityDocHandler::from_source("UserData", "doc-1", Some(3), &stored_source())
            .unwrap();
        let rebuilt = EntityDocHandler::from_source("UserData", "doc-1", Some(3), &handler.source())
            .unwrap();
        assert_eq!(handler, rebuilt);
    }

    #[test]
    fn test_invalid_field_type_is_rejected() {
        let mut source = stored_source();
        source.insert("s".to_string(), json!("not-an-object"));
        let err = EntityDocHandler::from_source("UserData", "doc-1", None, &source).unwrap_err();
        assert!(matches!(err, crate::DocError::InvalidField { .. }));
    }

    #[test]
    fn test_etag_uses_version_and_updated() {
        let mut handler = EntityDocHandler::new("UserData", "doc-1");
        handler.set_version(4);
        handler.set_updated(1700000005000);
        assert_eq!(handler.etag(), "4-1700000005000");
        assert_eq!(handler.etag_header(), "W/\"4-1700000005000\"");
    }

    #[test]
    fn test_to_entity_with_select_keeps_key_and_timestamps() {
        let handler = EntityDocHandler::from_source("UserData", "doc-1", Some(1), &stored_source())
            .unwrap();
        let entity = handler.to_entity(Some(&["name"]));

        assert!(entity.properties.contains_key("name"));
        assert!(entity.properties.contains_key(KEY_PROPERTY));
        assert!(entity.properties.contains_key(PUBLISHED_PROPERTY));
        assert!(entity.properties.contains_key(UPDATED_PROPERTY));
        assert!(!entity.properties.contains_key("age"));
        assert!(!entity.properties.contains_key("nickname"));
        assert_eq!(entity.hidden["Owner"], "https://cell.example/#admin");
        assert_eq!(entity.etag, "1-1700000005000");
    }

    #[test]
    fn test_to_entity_without_select_includes_dynamic_fields() {
        let handler = EntityDocHandler::from_source("UserData", "doc-1", Some(1), &stored_source())
            .unwrap();
        let entity = handler.to_entity(None);
        assert_eq!(entity.properties["nickname"], "al");
        assert_eq!(entity.properties["age"], 30);

        let body = entity.to_json("https://cell.example/box/col/Person");
        assert_eq!(body["__metadata"]["uri"], "https://cell.example/box/col/Person('user-1')");
        assert_eq!(body["__metadata"]["etag"], "W/\"1-1700000005000\"");
        assert_eq!(body["__published"], "/Date(1700000000000)/");
    }

    #[test]
    fn test_resolve_unit_user_name() {
        let mut handler = EntityDocHandler::new("Cell", "cell-1");
        handler.resolve_unit_user_name("u0");
        assert_eq!(handler.unit_user_name(), Some("u0_anon"));

        let mut hidden = FieldMap::new();
        hidden.insert("Owner".to_string(), json!("Bob"));
        handler.set_hidden_fields(hidden);
        handler.resolve_unit_user_name("u0");
        assert_eq!(handler.unit_user_name(), Some("u0__42ob"));
    }
}
