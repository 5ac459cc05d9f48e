//! [`Mark`] — a piece of styling or other annotation attached to inline
//! content, plus the mark-set algebra.
//!
//! A mark set is a plain `Vec<Mark>` kept deduplicated and sorted by the
//! mark type's declaration rank. [`Mark::add_to_set`] maintains that
//! ordering and drops marks excluded by the one being added.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::schema::{Attrs, ContentError, MarkType, Schema};

// ── Mark ──────────────────────────────────────────────────────────────────

/// A mark: a [`MarkType`] plus an attribute map.
///
/// Marks are cheap to clone (the attribute map is shared).
#[derive(Clone)]
pub struct Mark {
    typ: MarkType,
    attrs: Rc<Attrs>,
}

impl Mark {
    pub(crate) fn new(typ: MarkType, attrs: Rc<Attrs>) -> Self {
        Mark { typ, attrs }
    }

    pub fn mark_type(&self) -> &MarkType {
        &self.typ
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Add this mark to `set`, returning the resulting set.
    ///
    /// Keeps the set sorted by mark rank, drops any mark this one excludes,
    /// and returns the set unchanged when it already contains an equal mark
    /// or a mark that excludes this one.
    pub fn add_to_set(&self, set: &[Mark]) -> Vec<Mark> {
        let mut copy: Option<Vec<Mark>> = None;
        let mut placed = false;
        for (i, other) in set.iter().enumerate() {
            if self == other {
                return set.to_vec();
            }
            if self.typ.excludes(&other.typ) {
                if copy.is_none() {
                    copy = Some(set[..i].to_vec());
                }
            } else if other.typ.excludes(&self.typ) {
                return set.to_vec();
            } else {
                if !placed && other.typ.rank() > self.typ.rank() {
                    let target = copy.get_or_insert_with(|| set[..i].to_vec());
                    target.push(self.clone());
                    placed = true;
                }
                if let Some(target) = copy.as_mut() {
                    target.push(other.clone());
                }
            }
        }
        let mut result = copy.unwrap_or_else(|| set.to_vec());
        if !placed {
            result.push(self.clone());
        }
        result
    }

    /// Remove any mark equal to this one from `set`.
    pub fn remove_from_set(&self, set: &[Mark]) -> Vec<Mark> {
        set.iter().filter(|m| *m != self).cloned().collect()
    }

    /// Whether an equal mark is a member of `set`.
    pub fn is_in_set(&self, set: &[Mark]) -> bool {
        set.iter().any(|m| m == self)
    }

    /// Whether two mark sets are element-wise equal.
    pub fn same_set(a: &[Mark], b: &[Mark]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
    }

    /// Build a canonical set (rank-sorted, exclusion-respecting) from an
    /// arbitrary collection of marks.
    pub fn set_from(marks: &[Mark]) -> Vec<Mark> {
        let mut set = Vec::new();
        for mark in marks {
            set = mark.add_to_set(&set);
        }
        set
    }

    // ── JSON codec ────────────────────────────────────────────────────────

    /// `{"type": name}`, with `"attrs"` added when non-empty.
    pub fn to_json(&self) -> Value {
        let mut m = serde_json::Map::new();
        m.insert("type".into(), Value::String(self.typ.name().to_string()));
        if !self.attrs.is_empty() {
            m.insert("attrs".into(), Value::Object((*self.attrs).clone()));
        }
        Value::Object(m)
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Mark, ContentError> {
        let name = json
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ContentError::InvalidJson("mark missing type".into()))?;
        let typ = schema
            .mark_type(name)
            .ok_or_else(|| ContentError::UnknownMarkType(name.to_string()))?;
        let attrs = json.get("attrs").and_then(Value::as_object);
        typ.create(attrs.cloned())
    }
}

impl PartialEq for Mark {
    fn eq(&self, other: &Self) -> bool {
        self.typ == other.typ
            && (Rc::ptr_eq(&self.attrs, &other.attrs) || *self.attrs == *other.attrs)
    }
}

impl Eq for Mark {}

impl fmt::Debug for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attrs.is_empty() {
            write!(f, "{}", self.typ.name())
        } else {
            write!(f, "{}({})", self.typ.name(), Value::Object((*self.attrs).clone()))
        }
    }
}
