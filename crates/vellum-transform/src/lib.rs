//! vellum-transform — the edit layer of the vellum editing engine.
//!
//! Encodes document edits as invertible [`Step`] values, describes their
//! position deltas with [`StepMap`]s composed into [`Mapping`]s (the
//! primitive a collaborative rebasing protocol builds on), and exposes the
//! whole mutation surface through [`Transform`].

pub mod attr_step;
pub mod fit;
pub mod map;
pub mod mark;
pub mod mark_step;
pub mod replace_step;
pub mod step;
pub mod structure;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_util;

pub use attr_step::{AttrStep, DocAttrStep};
pub use fit::replace_step;
pub use map::{MapRange, MapResult, Mappable, Mapping, Recover, StepMap};
pub use mark::MarkFilter;
pub use mark_step::{AddMarkStep, AddNodeMarkStep, RemoveMarkStep, RemoveNodeMarkStep};
pub use replace_step::{ReplaceAroundStep, ReplaceStep};
pub use step::{Step, StepError, StepJsonError, StepRegistry};
pub use structure::{
    can_join, can_split, find_wrapping, insert_point, join_point, lift_target, TypeWithAttrs,
};
pub use transform::{Transform, TransformError};
