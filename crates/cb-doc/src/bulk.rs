//! Narrow view of a document used by batch writes.
//!
//! Batch submission only needs identity, type and raw source. The projection
//! copies those out of the richer handler once and answers every other
//! accessor with the trait's absent defaults.

use crate::handler::{DocHandler, FieldMap};

/// Document type of every bulk/link projection
pub const LINK_TYPE: &str = "link";

#[derive(Debug, Clone, PartialEq)]
pub struct BulkLinkProjection {
    id: String,
    source: FieldMap,
}

impl BulkLinkProjection {
    pub fn from_handler(handler: &dyn DocHandler) -> Self {
        Self {
            id: handler.id().to_string(),
            source: handler.source(),
        }
    }
}

impl DocHandler for BulkLinkProjection {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc_type(&self) -> &str {
        LINK_TYPE
    }

    fn source(&self) -> FieldMap {
        self.source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityDocHandler, LinkDocHandler};
    use serde_json::json;

    fn populated() -> EntityDocHandler {
        let mut handler = EntityDocHandler::new("Person", "doc-1").with_owner(
            Some("cell-1"),
            Some("box-1"),
            Some("node-1"),
        );
        handler.set_version(2);
        handler.set_published(1000);
        handler.set_updated(2000);
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), json!("Alice"));
        handler.set_static_fields(fields);
        handler
    }

    #[test]
    fn test_projection_copies_identity_and_source() {
        let handler = populated();
        let projection = BulkLinkProjection::from_handler(&handler);

        assert_eq!(projection.id(), handler.id());
        assert_eq!(projection.doc_type(), "link");
        assert_eq!(projection.source(), handler.source());
    }

    #[test]
    fn test_projection_accessors_are_absent() {
        let projection = BulkLinkProjection::from_handler(&populated());

        assert!(projection.cell_id().is_none());
        assert!(projection.box_id().is_none());
        assert!(projection.node_id().is_none());
        assert!(projection.entity_type_id().is_none());
        assert!(projection.version().is_none());
        assert!(projection.published().is_none());
        assert!(projection.updated().is_none());
        assert!(projection.static_fields().is_none());
        assert!(projection.dynamic_fields().is_none());
        assert!(projection.hidden_fields().is_none());
        assert!(projection.acl_fields().is_none());
        assert!(projection.many_to_one_links().is_none());
        assert!(projection.unit_user_name().is_none());
    }

    #[test]
    fn test_projection_mutators_are_noops() {
        let mut projection = BulkLinkProjection::from_handler(&populated());
        let before = projection.clone();

        projection.set_version(9);
        projection.set_updated(9);
        projection.set_dynamic_fields(FieldMap::new());
        projection.set_acl_fields(FieldMap::new());

        assert_eq!(projection, before);
    }

    #[test]
    fn test_projection_is_detached_from_origin() {
        let mut handler = populated();
        let projection = BulkLinkProjection::from_handler(&handler);
        let snapshot = projection.source();

        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), json!("Bob"));
        handler.set_static_fields(fields);
        handler.set_updated(9999);

        assert_eq!(projection.source(), snapshot);
        assert_ne!(projection.source(), handler.source());
    }

    #[test]
    fn test_projection_of_link_document() {
        let a = EntityDocHandler::new("A", "a1").with_owner(Some("cell-1"), None, None);
        let b = EntityDocHandler::new("B", "b1");
        let link = LinkDocHandler::between(&a, &b);

        let projection = BulkLinkProjection::from_handler(&link);
        assert_eq!(projection.id(), "a1-b1");
        assert_eq!(projection.source()["t1"], "A");
        assert_eq!(projection.source()["c"], "cell-1");
    }
}
