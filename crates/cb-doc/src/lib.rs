//! CellBase Document Handlers
//!
//! In-memory representations of persisted entity documents:
//! - `DocHandler`: capability trait shared by every document variant
//! - `EntityDocHandler`: full entity document with field groups and wire conversion
//! - `LinkDocHandler`: N:N link document between two entities
//! - `BulkLinkProjection`: detached id/type/source view used by batch writes

pub mod bulk;
pub mod entity;
pub mod error;
pub mod handler;
pub mod link;

pub use bulk::{BulkLinkProjection, LINK_TYPE};
pub use entity::{EntityDocHandler, WireEntity};
pub use error::DocError;
pub use handler::{keys, DocHandler, FieldMap};
pub use link::LinkDocHandler;

pub type Result<T> = std::result::Result<T, DocError>;
