use serde_json::{Map, Value};

use crate::error::DocError;

/// Field name → value mapping used for every field group and for the stored source
pub type FieldMap = Map<String, Value>;

/// Keys of the stored source document
pub mod keys {
    pub const STATIC_FIELDS: &str = "s";
    pub const DYNAMIC_FIELDS: &str = "d";
    pub const HIDDEN_FIELDS: &str = "h";
    pub const ACL_FIELDS: &str = "a";
    pub const PUBLISHED: &str = "p";
    pub const UPDATED: &str = "u";
    pub const CELL_ID: &str = "c";
    pub const BOX_ID: &str = "b";
    pub const NODE_ID: &str = "n";
    pub const ENTITY_TYPE_ID: &str = "t";
    pub const LINK: &str = "l";
    pub const ENT1_TYPE: &str = "t1";
    pub const ENT1_KEY: &str = "k1";
    pub const ENT2_TYPE: &str = "t2";
    pub const ENT2_KEY: &str = "k2";
}

/// Capability contract for a persisted entity document.
///
/// `id`, `doc_type` and `source` are answered by every variant. The remaining
/// accessors default to the absent value and the mutators default to no-ops,
/// so a narrow variant only declares what it actually carries.
pub trait DocHandler: Send + Sync {
    fn id(&self) -> &str;

    fn doc_type(&self) -> &str;

    /// Stored representation of the document
    fn source(&self) -> FieldMap;

    fn cell_id(&self) -> Option<&str> {
        None
    }

    fn box_id(&self) -> Option<&str> {
        None
    }

    fn node_id(&self) -> Option<&str> {
        None
    }

    fn entity_type_id(&self) -> Option<&str> {
        None
    }

    fn version(&self) -> Option<i64> {
        None
    }

    fn published(&self) -> Option<i64> {
        None
    }

    fn updated(&self) -> Option<i64> {
        None
    }

    fn static_fields(&self) -> Option<&FieldMap> {
        None
    }

    fn dynamic_fields(&self) -> Option<&FieldMap> {
        None
    }

    fn hidden_fields(&self) -> Option<&FieldMap> {
        None
    }

    /// Principal → access-control fragment
    fn acl_fields(&self) -> Option<&FieldMap> {
        None
    }

    fn many_to_one_links(&self) -> Option<&FieldMap> {
        None
    }

    fn unit_user_name(&self) -> Option<&str> {
        None
    }

    fn set_version(&mut self, _version: i64) {}

    fn set_published(&mut self, _published: i64) {}

    fn set_updated(&mut self, _updated: i64) {}

    fn set_static_fields(&mut self, _fields: FieldMap) {}

    fn set_dynamic_fields(&mut self, _fields: FieldMap) {}

    fn set_hidden_fields(&mut self, _fields: FieldMap) {}

    fn set_acl_fields(&mut self, _fields: FieldMap) {}

    fn set_many_to_one_links(&mut self, _links: FieldMap) {}
}

// ============================================================================
// Source decoding helpers
// ============================================================================

pub(crate) fn opt_str(source: &FieldMap, key: &str) -> Result<Option<String>, DocError> {
    match source.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DocError::invalid(key, "string")),
    }
}

pub(crate) fn req_str(source: &FieldMap, key: &str) -> Result<String, DocError> {
    opt_str(source, key)?.ok_or_else(|| DocError::missing(key))
}

/// Timestamps are stored as epoch millis; older documents hold them as strings
pub(crate) fn opt_millis(source: &FieldMap, key: &str) -> Result<Option<i64>, DocError> {
    match source.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            n.as_i64().map(Some).ok_or_else(|| DocError::invalid(key, "integer"))
        }
        Some(Value::String(s)) => {
            s.parse().map(Some).map_err(|_| DocError::invalid(key, "integer"))
        }
        Some(_) => Err(DocError::invalid(key, "integer")),
    }
}

pub(crate) fn opt_map(source: &FieldMap, key: &str) -> Result<Option<FieldMap>, DocError> {
    match source.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(m)) => Ok(Some(m.clone())),
        Some(_) => Err(DocError::invalid(key, "object")),
    }
}

pub(crate) fn str_or_null(value: Option<&str>) -> Value {
    value.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null)
}

pub(crate) fn millis_or_null(value: Option<i64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}
