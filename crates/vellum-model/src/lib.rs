//! vellum-model — the document data layer of the vellum editing engine.
//!
//! Provides the schema and its compiled content automata, the persistent
//! document tree (nodes, fragments, marks), integer position resolution,
//! open-ended slices, and the low-level replace algorithm.

pub mod content;
pub mod fragment;
pub mod mark;
pub mod node;
pub mod replace;
pub mod resolved_pos;
pub mod schema;
pub mod slice;

pub use content::ContentMatch;
pub use fragment::Fragment;
pub use mark::Mark;
pub use node::Node;
pub use replace::ReplaceError;
pub use resolved_pos::{NodeRange, PositionOutOfRange, ResolvedPos};
pub use schema::{
    AttrSpec, Attrs, ContentError, MarkSpec, MarkType, NodeSpec, NodeType, Schema, SchemaError,
    SchemaSpec,
};
pub use slice::Slice;
