use cb_common::now_millis;
use serde_json::Value;

use crate::bulk::LINK_TYPE;
use crate::handler::{
    keys, millis_or_null, opt_millis, opt_str, req_str, str_or_null, DocHandler, FieldMap,
};
use crate::{DocError, Result};

/// N:N link between two entities.
///
/// The two ends are stored in type-name order so the same pair always maps to
/// the same document regardless of which side created the link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDocHandler {
    id: String,
    cell_id: Option<String>,
    box_id: Option<String>,
    node_id: Option<String>,
    ent1_type: String,
    ent1_key: String,
    ent2_type: String,
    ent2_key: String,
    published: i64,
    updated: i64,
}

impl LinkDocHandler {
    /// Link two handlers; ownership is taken from `src`
    pub fn between(src: &dyn DocHandler, tgt: &dyn DocHandler) -> Self {
        let a = (src.doc_type().to_string(), src.id().to_string());
        let b = (tgt.doc_type().to_string(), tgt.id().to_string());
        let ((ent1_type, ent1_key), (ent2_type, ent2_key)) = if a <= b { (a, b) } else { (b, a) };
        let now = now_millis();

        Self {
            id: format!("{}-{}", ent1_key, ent2_key),
            cell_id: src.cell_id().map(str::to_string),
            box_id: src.box_id().map(str::to_string),
            node_id: src.node_id().map(str::to_string),
            ent1_type,
            ent1_key,
            ent2_type,
            ent2_key,
            published: now,
            updated: now,
        }
    }

    pub fn from_source(id: impl Into<String>, source: &FieldMap) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            cell_id: Some(req_str(source, keys::CELL_ID)?),
            box_id: opt_str(source, keys::BOX_ID)?,
            node_id: opt_str(source, keys::NODE_ID)?,
            ent1_type: req_str(source, keys::ENT1_TYPE)?,
            ent1_key: req_str(source, keys::ENT1_KEY)?,
            ent2_type: req_str(source, keys::ENT2_TYPE)?,
            ent2_key: req_str(source, keys::ENT2_KEY)?,
            published: opt_millis(source, keys::PUBLISHED)?
                .ok_or_else(|| DocError::missing(keys::PUBLISHED))?,
            updated: opt_millis(source, keys::UPDATED)?
                .ok_or_else(|| DocError::missing(keys::UPDATED))?,
        })
    }

    /// Key of the end with the given entity type, if either end has it
    pub fn key_for(&self, entity_type: &str) -> Option<&str> {
        if self.ent1_type == entity_type {
            Some(&self.ent1_key)
        } else if self.ent2_type == entity_type {
            Some(&self.ent2_key)
        } else {
            None
        }
    }

    pub fn ends(&self) -> ((&str, &str), (&str, &str)) {
        (
            (&self.ent1_type, &self.ent1_key),
            (&self.ent2_type, &self.ent2_key),
        )
    }
}

impl DocHandler for LinkDocHandler {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc_type(&self) -> &str {
        LINK_TYPE
    }

    fn source(&self) -> FieldMap {
        let mut source = FieldMap::new();
        if let Some(cell_id) = &self.cell_id {
            source.insert(keys::CELL_ID.to_string(), Value::String(cell_id.clone()));
        }
        source.insert(keys::BOX_ID.to_string(), str_or_null(self.box_id.as_deref()));
        source.insert(keys::NODE_ID.to_string(), str_or_null(self.node_id.as_deref()));
        source.insert(keys::ENT1_TYPE.to_string(), Value::String(self.ent1_type.clone()));
        source.insert(keys::ENT1_KEY.to_string(), Value::String(self.ent1_key.clone()));
        source.insert(keys::ENT2_TYPE.to_string(), Value::String(self.ent2_type.clone()));
        source.insert(keys::ENT2_KEY.to_string(), Value::String(self.ent2_key.clone()));
        source.insert(keys::PUBLISHED.to_string(), millis_or_null(Some(self.published)));
        source.insert(keys::UPDATED.to_string(), millis_or_null(Some(self.updated)));
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

    fn published(&self) -> Option<i64> {
        Some(self.published)
    }

    fn updated(&self) -> Option<i64> {
        Some(self.updated)
    }

    fn set_updated(&mut self, updated: i64) {
        self.updated = updated;
    }
}
