//! Schema: the registry of node and mark types.
//!
//! A [`Schema`] is built once from a [`SchemaSpec`] (ordered maps of
//! declarative [`NodeSpec`]/[`MarkSpec`] values), compiling every distinct
//! content expression into the shared match arena, and is immutable
//! afterwards. [`NodeType`] and [`MarkType`] are cheap handles (schema +
//! interned id); all hot-path dispatch goes through those ids, never
//! through string comparison.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::content::{self, ContentMatch, MatchArena, MatchId, MatchState, TypeInfo};
use crate::fragment::Fragment;
use crate::mark::Mark;
use crate::node::Node;

/// Attribute maps are ordered JSON object maps.
pub type Attrs = serde_json::Map<String, Value>;

/// Interned node type identifier (index into the schema's node table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(pub(crate) u16);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Interned mark type identifier (index into the schema's mark table; the
/// index doubles as the mark's rank).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MarkId(pub(crate) u16);

impl MarkId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Errors ────────────────────────────────────────────────────────────────

/// Configuration failures raised while building a schema. Fatal; a schema
/// that failed to build cannot be used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("schema is missing its top node type '{0}'")]
    MissingTopNode(String),
    #[error("every schema needs a 'text' type")]
    NoTextType,
    #[error("the text node type should not have attributes")]
    TextWithAttrs,
    #[error("'{0}' can not be both a node and a mark")]
    DuplicateName(String),
    #[error("in content expression '{expr}': {message}")]
    ContentExpression { expr: String, message: String },
    #[error("in content expression '{expr}': only non-generatable types ({types}) in a required position")]
    DeadEnd { expr: String, types: String },
    #[error("unknown mark name '{0}'")]
    UnknownMarkName(String),
    #[error("too many node or mark types")]
    TooManyTypes,
}

/// Content or attribute violations raised by strict construction and
/// validation paths.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContentError {
    #[error("invalid content for node type {0}")]
    InvalidContent(String),
    #[error("no value supplied for attribute {attr} of {owner}")]
    MissingAttr { owner: String, attr: String },
    #[error("unsupported attribute {attr} for {owner}")]
    UnsupportedAttr { owner: String, attr: String },
    #[error("invalid value for attribute {attr} of {owner}")]
    InvalidAttr { owner: String, attr: String },
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),
    #[error("unknown mark type '{0}'")]
    UnknownMarkType(String),
    #[error("mark {mark} is not allowed in node {node}")]
    DisallowedMark { node: String, mark: String },
    #[error("invalid mark set on node {0}")]
    InvalidMarkSet(String),
    #[error("text nodes are created through Schema::text, not NodeType::create")]
    TextViaCreate,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

// ── Specs ─────────────────────────────────────────────────────────────────

/// Declaration of one attribute: an optional default (attributes without a
/// default are required) and an optional validator run by strict checks.
#[derive(Debug, Clone, Default)]
pub struct AttrSpec {
    pub default: Option<Value>,
    pub validate: Option<fn(&Value) -> bool>,
}

/// Declarative description of a node type.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    /// Content expression for this node's children (empty = leaf).
    pub content: Option<String>,
    /// Allowed marks: space-separated names/groups, `"_"` for all, `""` for
    /// none. Defaults to all for nodes with inline content, none otherwise.
    pub marks: Option<String>,
    /// Space-separated group names this type belongs to.
    pub group: Option<String>,
    pub inline: bool,
    /// Treat the node as a single unit even though it has content.
    pub atom: bool,
    /// Disables edits (lift, split, replace spilling) across this node's
    /// boundary.
    pub isolating: bool,
    pub attrs: IndexMap<String, AttrSpec>,
}

/// Declarative description of a mark type.
#[derive(Debug, Clone)]
pub struct MarkSpec {
    pub attrs: IndexMap<String, AttrSpec>,
    /// Whether the mark extends over inserted content at its boundary.
    pub inclusive: bool,
    /// Marks this one may not coexist with: space-separated names/groups,
    /// `"_"` for all. Defaults to only the mark itself.
    pub excludes: Option<String>,
    pub group: Option<String>,
}

impl Default for MarkSpec {
    fn default() -> Self {
        MarkSpec { attrs: IndexMap::new(), inclusive: true, excludes: None, group: None }
    }
}

/// Everything needed to build a [`Schema`]. Declaration order is
/// significant: it defines mark rank and default-fill preference.
#[derive(Debug, Clone, Default)]
pub struct SchemaSpec {
    pub nodes: IndexMap<String, NodeSpec>,
    pub marks: IndexMap<String, MarkSpec>,
    /// Name of the top-level node type; `"doc"` when absent.
    pub top_node: Option<String>,
}

// ── Internal type data ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct AttrDecl {
    pub(crate) name: String,
    pub(crate) default: Option<Value>,
    pub(crate) validate: Option<fn(&Value) -> bool>,
}

pub(crate) struct NodeTypeData {
    pub(crate) name: String,
    pub(crate) groups: Vec<String>,
    pub(crate) attrs: Vec<AttrDecl>,
    /// Precomputed attrs for a creation call without attrs; `None` when
    /// some attribute is required.
    pub(crate) default_attrs: Option<Rc<Attrs>>,
    pub(crate) content: MatchId,
    pub(crate) inline: bool,
    pub(crate) is_text: bool,
    pub(crate) leaf: bool,
    pub(crate) atom: bool,
    pub(crate) isolating: bool,
    pub(crate) inline_content: bool,
    /// Allowed mark types; `None` means all.
    pub(crate) mark_set: Option<Vec<MarkId>>,
}

pub(crate) struct MarkTypeData {
    pub(crate) name: String,
    pub(crate) attrs: Vec<AttrDecl>,
    pub(crate) default_attrs: Option<Rc<Attrs>>,
    pub(crate) inclusive: bool,
    pub(crate) excluded: Vec<MarkId>,
}

pub(crate) struct SchemaInner {
    nodes: Vec<NodeTypeData>,
    marks: Vec<MarkTypeData>,
    states: Vec<MatchState>,
    wrap_cache: RefCell<HashMap<(MatchId, NodeId), Option<Vec<NodeId>>>>,
    node_names: HashMap<String, NodeId>,
    mark_names: HashMap<String, MarkId>,
    top: NodeId,
    text: NodeId,
}

// ── Schema ────────────────────────────────────────────────────────────────

/// A document schema. Cheap to clone; all clones share the same compiled
/// type registry.
#[derive(Clone)]
pub struct Schema {
    inner: Rc<SchemaInner>,
}

impl Schema {
    pub fn new(spec: SchemaSpec) -> Result<Schema, SchemaError> {
        if spec.nodes.len() > u16::MAX as usize || spec.marks.len() > u16::MAX as usize {
            return Err(SchemaError::TooManyTypes);
        }
        for name in spec.nodes.keys() {
            if spec.marks.contains_key(name) {
                return Err(SchemaError::DuplicateName(name.clone()));
            }
        }
        let top_name = spec.top_node.clone().unwrap_or_else(|| "doc".to_string());
        let top = NodeId(
            spec.nodes
                .get_index_of(&top_name)
                .ok_or(SchemaError::MissingTopNode(top_name))? as u16,
        );
        let text = NodeId(spec.nodes.get_index_of("text").ok_or(SchemaError::NoTextType)? as u16);
        if !spec.nodes["text"].attrs.is_empty() {
            return Err(SchemaError::TextWithAttrs);
        }

        // Compile every distinct content expression once.
        let infos: Vec<TypeInfo> = spec
            .nodes
            .iter()
            .map(|(name, ns)| TypeInfo {
                name: name.clone(),
                groups: split_words(ns.group.as_deref()),
                generatable: name != "text" && ns.attrs.values().all(|a| a.default.is_some()),
            })
            .collect();
        let mut arena = MatchArena::default();
        let mut expr_cache: HashMap<String, MatchId> = HashMap::new();
        let mut content_ids = Vec::with_capacity(spec.nodes.len());
        for ns in spec.nodes.values() {
            let expr = ns.content.clone().unwrap_or_default();
            let cached = expr_cache.get(&expr).copied();
            let id = match cached {
                Some(id) => id,
                None => {
                    let id = content::compile(&expr, &infos, &mut arena)?;
                    expr_cache.insert(expr, id);
                    id
                }
            };
            content_ids.push(id);
        }

        // Mark types: ranks are declaration order; excludes resolved once
        // all names are known.
        let mark_names: HashMap<String, MarkId> = spec
            .marks
            .keys()
            .enumerate()
            .map(|(i, name)| (name.clone(), MarkId(i as u16)))
            .collect();
        let mut marks = Vec::with_capacity(spec.marks.len());
        for (i, (name, ms)) in spec.marks.iter().enumerate() {
            let attrs = attr_decls(&ms.attrs);
            let excluded = match ms.excludes.as_deref() {
                None => vec![MarkId(i as u16)],
                Some("") => Vec::new(),
                Some(s) => gather_marks(s, &spec.marks)?,
            };
            marks.push(MarkTypeData {
                name: name.clone(),
                default_attrs: default_attrs_of(&attrs),
                attrs,
                inclusive: ms.inclusive,
                excluded,
            });
        }

        // Node types.
        let inline_flags: Vec<bool> = spec
            .nodes
            .iter()
            .map(|(name, ns)| ns.inline || name == "text")
            .collect();
        let mut nodes = Vec::with_capacity(spec.nodes.len());
        for (i, (name, ns)) in spec.nodes.iter().enumerate() {
            let attrs = attr_decls(&ns.attrs);
            let state = &arena.states[content_ids[i].index()];
            let leaf = state.edges.is_empty();
            let inline_content = state
                .edges
                .first()
                .map(|&(t, _)| inline_flags[t.index()])
                .unwrap_or(false);
            let mark_set = match ns.marks.as_deref() {
                Some("_") => None,
                Some("") => Some(Vec::new()),
                Some(s) => Some(gather_marks(s, &spec.marks)?),
                None => {
                    if inline_content {
                        None
                    } else {
                        Some(Vec::new())
                    }
                }
            };
            nodes.push(NodeTypeData {
                name: name.clone(),
                groups: split_words(ns.group.as_deref()),
                default_attrs: default_attrs_of(&attrs),
                attrs,
                content: content_ids[i],
                inline: inline_flags[i],
                is_text: name == "text",
                leaf,
                atom: ns.atom,
                isolating: ns.isolating,
                inline_content,
                mark_set,
            });
        }

        let node_names = spec
            .nodes
            .keys()
            .enumerate()
            .map(|(i, name)| (name.clone(), NodeId(i as u16)))
            .collect();
        Ok(Schema {
            inner: Rc::new(SchemaInner {
                nodes,
                marks,
                states: arena.states,
                wrap_cache: RefCell::new(HashMap::new()),
                node_names,
                mark_names,
                top,
                text,
            }),
        })
    }

    pub fn node_type(&self, name: &str) -> Option<NodeType> {
        self.inner
            .node_names
            .get(name)
            .map(|&id| NodeType { schema: self.clone(), id })
    }

    pub fn mark_type(&self, name: &str) -> Option<MarkType> {
        self.inner
            .mark_names
            .get(name)
            .map(|&id| MarkType { schema: self.clone(), id })
    }

    /// The schema's top-level node type.
    pub fn top_node_type(&self) -> NodeType {
        NodeType { schema: self.clone(), id: self.inner.top }
    }

    pub fn text_type(&self) -> NodeType {
        NodeType { schema: self.clone(), id: self.inner.text }
    }

    /// Create a node of the named type.
    pub fn node(
        &self,
        name: &str,
        attrs: Option<Attrs>,
        content: impl Into<Fragment>,
        marks: Vec<Mark>,
    ) -> Result<Node, ContentError> {
        let typ = self
            .node_type(name)
            .ok_or_else(|| ContentError::UnknownNodeType(name.to_string()))?;
        typ.create_with_marks(attrs, content, marks)
    }

    /// Create a text node. Panics when `text` is empty.
    pub fn text(&self, text: &str) -> Node {
        self.text_with_marks(text, Vec::new())
    }

    /// Create a text node with marks. Panics when `text` is empty.
    pub fn text_with_marks(&self, text: &str, marks: Vec<Mark>) -> Node {
        assert!(!text.is_empty(), "empty text nodes are not allowed");
        Node::new_text(
            self.text_type(),
            Rc::new(Attrs::new()),
            text.to_string(),
            Mark::set_from(&marks),
        )
    }

    /// Create a mark of the named type.
    pub fn mark(&self, name: &str, attrs: Option<Attrs>) -> Result<Mark, ContentError> {
        let typ = self
            .mark_type(name)
            .ok_or_else(|| ContentError::UnknownMarkType(name.to_string()))?;
        typ.create(attrs)
    }

    // ── Crate-internal accessors ──────────────────────────────────────────

    pub(crate) fn state(&self, id: MatchId) -> &MatchState {
        &self.inner.states[id.index()]
    }

    pub(crate) fn node_data(&self, id: NodeId) -> &NodeTypeData {
        &self.inner.nodes[id.index()]
    }

    pub(crate) fn mark_data(&self, id: MarkId) -> &MarkTypeData {
        &self.inner.marks[id.index()]
    }

    pub(crate) fn node_type_by_id(&self, id: NodeId) -> NodeType {
        NodeType { schema: self.clone(), id }
    }

    pub(crate) fn wrap_cache_get(&self, key: &(MatchId, NodeId)) -> Option<Option<Vec<NodeId>>> {
        self.inner.wrap_cache.borrow().get(key).cloned()
    }

    pub(crate) fn wrap_cache_put(&self, key: (MatchId, NodeId), value: Option<Vec<NodeId>>) {
        self.inner.wrap_cache.borrow_mut().insert(key, value);
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Schema {}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes: Vec<&str> = self.inner.nodes.iter().map(|n| n.name.as_str()).collect();
        let marks: Vec<&str> = self.inner.marks.iter().map(|m| m.name.as_str()).collect();
        write!(f, "Schema(nodes: [{}], marks: [{}])", nodes.join(", "), marks.join(", "))
    }
}

// ── NodeType ──────────────────────────────────────────────────────────────

/// Handle on one node type of a schema.
#[derive(Clone)]
pub struct NodeType {
    schema: Schema,
    id: NodeId,
}

impl NodeType {
    fn data(&self) -> &NodeTypeData {
        self.schema.node_data(self.id)
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        // Tie the lifetime to self, not to a temporary.
        &self.schema.node_data(self.id).name
    }

    pub fn is_text(&self) -> bool {
        self.data().is_text
    }

    pub fn is_inline(&self) -> bool {
        self.data().inline
    }

    pub fn is_block(&self) -> bool {
        !self.data().inline
    }

    /// A block type whose content is inline (a paragraph-like type).
    pub fn is_textblock(&self) -> bool {
        !self.data().inline && self.data().inline_content
    }

    pub fn inline_content(&self) -> bool {
        self.data().inline_content
    }

    pub fn is_leaf(&self) -> bool {
        self.data().leaf
    }

    pub fn is_atom(&self) -> bool {
        self.data().leaf || self.data().atom
    }

    pub fn isolating(&self) -> bool {
        self.data().isolating
    }

    pub fn is_in_group(&self, group: &str) -> bool {
        self.data().groups.iter().any(|g| g == group)
    }

    pub fn has_required_attrs(&self) -> bool {
        self.data().default_attrs.is_none()
    }

    pub(crate) fn default_attrs(&self) -> Option<&Rc<Attrs>> {
        self.schema.node_data(self.id).default_attrs.as_ref()
    }

    /// The start state of this type's content automaton.
    pub fn content_match(&self) -> ContentMatch {
        ContentMatch { schema: self.schema.clone(), state: self.data().content }
    }

    /// Whether this type's content could appear directly after `other`'s —
    /// i.e. the two automata share a continuation.
    pub fn compatible_content(&self, other: &NodeType) -> bool {
        self == other || self.content_match().compatible(&other.content_match())
    }

    // ── Attributes ────────────────────────────────────────────────────────

    /// Fill in defaults, erroring on missing required attributes. Unknown
    /// given attributes are dropped.
    pub fn compute_attrs(&self, given: Option<&Attrs>) -> Result<Rc<Attrs>, ContentError> {
        compute_attrs(&self.data().attrs, self.data().default_attrs.as_ref(), given, self.name())
    }

    /// Strict attribute validation: unknown names are rejected and
    /// validators run.
    pub fn check_attrs(&self, values: &Attrs) -> Result<(), ContentError> {
        check_attrs(&self.data().attrs, values, self.name())
    }

    // ── Node creation ─────────────────────────────────────────────────────

    /// Create a node of this type without validating content.
    pub fn create(
        &self,
        attrs: Option<Attrs>,
        content: impl Into<Fragment>,
    ) -> Result<Node, ContentError> {
        self.create_with_marks(attrs, content, Vec::new())
    }

    pub fn create_with_marks(
        &self,
        attrs: Option<Attrs>,
        content: impl Into<Fragment>,
        marks: Vec<Mark>,
    ) -> Result<Node, ContentError> {
        if self.is_text() {
            return Err(ContentError::TextViaCreate);
        }
        let attrs = self.compute_attrs(attrs.as_ref())?;
        Ok(Node::new(self.clone(), attrs, content.into(), Mark::set_from(&marks)))
    }

    /// Create a node, erroring when the content does not match this type.
    pub fn create_checked(
        &self,
        attrs: Option<Attrs>,
        content: impl Into<Fragment>,
        marks: Vec<Mark>,
    ) -> Result<Node, ContentError> {
        let content = content.into();
        self.check_content(&content)?;
        self.create_with_marks(attrs, content, marks)
    }

    /// Create a node, auto-filling required content before and after the
    /// given fragment. Returns `None` when no valid fill exists.
    pub fn create_and_fill(
        &self,
        attrs: Option<Attrs>,
        content: impl Into<Fragment>,
        marks: Vec<Mark>,
    ) -> Option<Node> {
        if self.is_text() {
            return None;
        }
        let attrs = self.compute_attrs(attrs.as_ref()).ok()?;
        let mut content = content.into();
        if content.size() > 0 {
            let before = self.content_match().fill_before(&content, false, 0)?;
            content = before.append(&content);
        }
        let matched = self.content_match().match_fragment(&content)?;
        let after = matched.fill_before(&Fragment::empty(), true, 0)?;
        let content = content.append(&after);
        Some(Node::new(self.clone(), attrs, content, Mark::set_from(&marks)))
    }

    // ── Content validation ────────────────────────────────────────────────

    pub fn valid_content(&self, content: &Fragment) -> bool {
        match self.content_match().match_fragment(content) {
            Some(end) if end.valid_end() => {}
            _ => return false,
        }
        content.children().iter().all(|c| self.allows_marks(c.marks()))
    }

    pub fn check_content(&self, content: &Fragment) -> Result<(), ContentError> {
        if self.valid_content(content) {
            Ok(())
        } else {
            Err(ContentError::InvalidContent(self.name().to_string()))
        }
    }

    // ── Marks ─────────────────────────────────────────────────────────────

    pub fn allows_mark_type(&self, mark_type: &MarkType) -> bool {
        match &self.data().mark_set {
            None => true,
            Some(set) => set.contains(&mark_type.id),
        }
    }

    pub fn allows_marks(&self, marks: &[Mark]) -> bool {
        self.data().mark_set.is_none()
            || marks.iter().all(|m| self.allows_mark_type(m.mark_type()))
    }

    /// Remove the marks this type disallows from a set.
    pub fn allowed_marks(&self, marks: &[Mark]) -> Vec<Mark> {
        if self.data().mark_set.is_none() {
            return marks.to_vec();
        }
        let mut copy: Option<Vec<Mark>> = None;
        for (i, mark) in marks.iter().enumerate() {
            if !self.allows_mark_type(mark.mark_type()) {
                if copy.is_none() {
                    copy = Some(marks[..i].to_vec());
                }
            } else if let Some(c) = copy.as_mut() {
                c.push(mark.clone());
            }
        }
        copy.unwrap_or_else(|| marks.to_vec())
    }
}

impl PartialEq for NodeType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.schema == other.schema
    }
}

impl Eq for NodeType {}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeType({})", self.name())
    }
}

// ── MarkType ──────────────────────────────────────────────────────────────

/// Handle on one mark type of a schema.
#[derive(Clone)]
pub struct MarkType {
    schema: Schema,
    id: MarkId,
}

impl MarkType {
    fn data(&self) -> &MarkTypeData {
        self.schema.mark_data(self.id)
    }

    pub fn name(&self) -> &str {
        &self.schema.mark_data(self.id).name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Declaration rank; mark sets are kept sorted by it.
    pub fn rank(&self) -> u16 {
        self.id.0
    }

    /// Whether the mark extends over content inserted at its boundary.
    pub fn inclusive(&self) -> bool {
        self.data().inclusive
    }

    /// Whether adding this mark removes marks of `other`'s type.
    pub fn excludes(&self, other: &MarkType) -> bool {
        self.data().excluded.contains(&other.id)
    }

    pub fn create(&self, attrs: Option<Attrs>) -> Result<Mark, ContentError> {
        let attrs = compute_attrs(
            &self.data().attrs,
            self.data().default_attrs.as_ref(),
            attrs.as_ref(),
            self.name(),
        )?;
        Ok(Mark::new(self.clone(), attrs))
    }

    /// The first mark of this type in a set, if any.
    pub fn is_in_set<'a>(&self, set: &'a [Mark]) -> Option<&'a Mark> {
        set.iter().find(|m| m.mark_type() == self)
    }

    /// Remove all marks of this type from a set.
    pub fn remove_from_set(&self, set: &[Mark]) -> Vec<Mark> {
        set.iter().filter(|m| m.mark_type() != self).cloned().collect()
    }
}

impl PartialEq for MarkType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.schema == other.schema
    }
}

impl Eq for MarkType {}

impl fmt::Debug for MarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MarkType({})", self.name())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn split_words(s: Option<&str>) -> Vec<String> {
    s.map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn attr_decls(specs: &IndexMap<String, AttrSpec>) -> Vec<AttrDecl> {
    specs
        .iter()
        .map(|(name, a)| AttrDecl {
            name: name.clone(),
            default: a.default.clone(),
            validate: a.validate,
        })
        .collect()
}

fn default_attrs_of(decls: &[AttrDecl]) -> Option<Rc<Attrs>> {
    let mut attrs = Attrs::new();
    for decl in decls {
        attrs.insert(decl.name.clone(), decl.default.clone()?);
    }
    Some(Rc::new(attrs))
}

fn compute_attrs(
    decls: &[AttrDecl],
    default_attrs: Option<&Rc<Attrs>>,
    given: Option<&Attrs>,
    owner: &str,
) -> Result<Rc<Attrs>, ContentError> {
    if given.is_none() {
        if let Some(defaults) = default_attrs {
            return Ok(Rc::clone(defaults));
        }
    }
    let mut built = Attrs::new();
    for decl in decls {
        let value = given
            .and_then(|g| g.get(&decl.name))
            .cloned()
            .or_else(|| decl.default.clone())
            .ok_or_else(|| ContentError::MissingAttr {
                owner: owner.to_string(),
                attr: decl.name.clone(),
            })?;
        built.insert(decl.name.clone(), value);
    }
    Ok(Rc::new(built))
}

fn check_attrs(decls: &[AttrDecl], values: &Attrs, owner: &str) -> Result<(), ContentError> {
    for name in values.keys() {
        if !decls.iter().any(|d| &d.name == name) {
            return Err(ContentError::UnsupportedAttr {
                owner: owner.to_string(),
                attr: name.clone(),
            });
        }
    }
    for decl in decls {
        let value = values.get(&decl.name).ok_or_else(|| ContentError::MissingAttr {
            owner: owner.to_string(),
            attr: decl.name.clone(),
        })?;
        if let Some(validate) = decl.validate {
            if !validate(value) {
                return Err(ContentError::InvalidAttr {
                    owner: owner.to_string(),
                    attr: decl.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Expand a space-separated list of mark names and groups (`"_"` = all).
fn gather_marks(
    s: &str,
    marks: &IndexMap<String, MarkSpec>,
) -> Result<Vec<MarkId>, SchemaError> {
    let mut found = Vec::new();
    for word in s.split_whitespace() {
        if word == "_" {
            for i in 0..marks.len() {
                let id = MarkId(i as u16);
                if !found.contains(&id) {
                    found.push(id);
                }
            }
            continue;
        }
        if let Some(i) = marks.get_index_of(word) {
            let id = MarkId(i as u16);
            if !found.contains(&id) {
                found.push(id);
            }
            continue;
        }
        let mut any = false;
        for (i, ms) in marks.values().enumerate() {
            if split_words(ms.group.as_deref()).iter().any(|g| g == word) {
                let id = MarkId(i as u16);
                if !found.contains(&id) {
                    found.push(id);
                }
                any = true;
            }
        }
        if !any {
            return Err(SchemaError::UnknownMarkName(word.to_string()));
        }
    }
    Ok(found)
}

#[cfg(test)]
pub mod tests {
    use serde_json::json;

    use super::*;

    /// A small rich-text schema shared by the crate's tests.
    pub fn basic_schema() -> Schema {
        let mut nodes = IndexMap::new();
        nodes.insert(
            "doc".to_string(),
            NodeSpec { content: Some("block+".into()), ..Default::default() },
        );
        nodes.insert(
            "paragraph".to_string(),
            NodeSpec {
                content: Some("inline*".into()),
                group: Some("block".into()),
                ..Default::default()
            },
        );
        nodes.insert(
            "blockquote".to_string(),
            NodeSpec {
                content: Some("block+".into()),
                group: Some("block".into()),
                ..Default::default()
            },
        );
        nodes.insert(
            "heading".to_string(),
            NodeSpec {
                content: Some("inline*".into()),
                group: Some("block".into()),
                attrs: IndexMap::from_iter([(
                    "level".to_string(),
                    AttrSpec { default: Some(json!(1)), validate: None },
                )]),
                ..Default::default()
            },
        );
        nodes.insert(
            "horizontal_rule".to_string(),
            NodeSpec { group: Some("block".into()), ..Default::default() },
        );
        nodes.insert(
            "bullet_list".to_string(),
            NodeSpec {
                content: Some("list_item+".into()),
                group: Some("block".into()),
                ..Default::default()
            },
        );
        nodes.insert(
            "list_item".to_string(),
            NodeSpec { content: Some("paragraph+".into()), ..Default::default() },
        );
        nodes.insert(
            "text".to_string(),
            NodeSpec { inline: true, group: Some("inline".into()), ..Default::default() },
        );
        let mut marks = IndexMap::new();
        marks.insert("em".to_string(), MarkSpec::default());
        marks.insert("strong".to_string(), MarkSpec::default());
        marks.insert(
            "link".to_string(),
            MarkSpec {
                attrs: IndexMap::from_iter([(
                    "href".to_string(),
                    AttrSpec { default: None, validate: None },
                )]),
                inclusive: false,
                ..Default::default()
            },
        );
        marks.insert(
            "code".to_string(),
            MarkSpec { excludes: Some("_".into()), ..Default::default() },
        );
        Schema::new(SchemaSpec { nodes, marks, top_node: None }).expect("basic schema builds")
    }

    /// A doc of paragraphs, one per entry; an empty string makes an empty
    /// paragraph.
    pub fn doc_of(schema: &Schema, paragraphs: &[&str]) -> Node {
        let paras: Vec<Node> = paragraphs
            .iter()
            .map(|t| {
                let content: Vec<Node> =
                    if t.is_empty() { Vec::new() } else { vec![schema.text(t)] };
                schema.node("paragraph", None, content, Vec::new()).expect("valid paragraph")
            })
            .collect();
        schema.node("doc", None, paras, Vec::new()).expect("valid doc")
    }

    #[test]
    fn missing_top_node_fails() {
        let mut nodes = IndexMap::new();
        nodes.insert("text".to_string(), NodeSpec { inline: true, ..Default::default() });
        let err = Schema::new(SchemaSpec { nodes, marks: IndexMap::new(), top_node: None })
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingTopNode(_)));
    }

    #[test]
    fn missing_text_type_fails() {
        let mut nodes = IndexMap::new();
        nodes.insert("doc".to_string(), NodeSpec::default());
        let err = Schema::new(SchemaSpec { nodes, marks: IndexMap::new(), top_node: None })
            .unwrap_err();
        assert!(matches!(err, SchemaError::NoTextType));
    }

    #[test]
    fn text_with_attrs_fails() {
        let mut nodes = IndexMap::new();
        nodes.insert("doc".to_string(), NodeSpec { content: Some("text*".into()), ..Default::default() });
        nodes.insert(
            "text".to_string(),
            NodeSpec {
                inline: true,
                attrs: IndexMap::from_iter([("x".to_string(), AttrSpec::default())]),
                ..Default::default()
            },
        );
        let err = Schema::new(SchemaSpec { nodes, marks: IndexMap::new(), top_node: None })
            .unwrap_err();
        assert!(matches!(err, SchemaError::TextWithAttrs));
    }

    #[test]
    fn node_mark_name_collision_fails() {
        let mut nodes = IndexMap::new();
        nodes.insert("doc".to_string(), NodeSpec { content: Some("text*".into()), ..Default::default() });
        nodes.insert("text".to_string(), NodeSpec { inline: true, ..Default::default() });
        let mut marks = IndexMap::new();
        marks.insert("text".to_string(), MarkSpec::default());
        let err = Schema::new(SchemaSpec { nodes, marks, top_node: None }).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateName(_)));
    }

    #[test]
    fn required_attr_in_required_position_is_dead_end() {
        let mut nodes = IndexMap::new();
        nodes.insert("doc".to_string(), NodeSpec { content: Some("figure+".into()), ..Default::default() });
        nodes.insert(
            "figure".to_string(),
            NodeSpec {
                attrs: IndexMap::from_iter([("src".to_string(), AttrSpec::default())]),
                ..Default::default()
            },
        );
        nodes.insert("text".to_string(), NodeSpec { inline: true, ..Default::default() });
        let err = Schema::new(SchemaSpec { nodes, marks: IndexMap::new(), top_node: None })
            .unwrap_err();
        assert!(matches!(err, SchemaError::DeadEnd { .. }));
    }

    #[test]
    fn missing_required_attr_is_an_error() {
        let schema = basic_schema();
        let err = schema.mark("link", None).unwrap_err();
        assert!(matches!(err, ContentError::MissingAttr { .. }));
        let attrs = Attrs::from_iter([("href".to_string(), json!("https://example.com"))]);
        assert!(schema.mark("link", Some(attrs)).is_ok());
    }

    #[test]
    fn default_attrs_are_filled() {
        let schema = basic_schema();
        let heading = schema.node("heading", None, Vec::<Node>::new(), Vec::new()).unwrap();
        assert_eq!(heading.attr("level"), Some(&json!(1)));
    }

    #[test]
    fn mark_exclusion() {
        let schema = basic_schema();
        let em = schema.mark("em", None).unwrap();
        let code = schema.mark("code", None).unwrap();
        // code excludes everything: adding it wipes em; adding em over
        // code is refused.
        let set = code.add_to_set(&em.add_to_set(&[]));
        assert_eq!(set, vec![code.clone()]);
        let set = em.add_to_set(&set);
        assert_eq!(set, vec![code]);
    }

    #[test]
    fn marks_default_by_content_kind() {
        let schema = basic_schema();
        let para = schema.node_type("paragraph").unwrap();
        let doc = schema.node_type("doc").unwrap();
        let em_type = schema.mark_type("em").unwrap();
        // Inline-content nodes allow all marks by default, others none.
        assert!(para.allows_mark_type(&em_type));
        assert!(!doc.allows_mark_type(&em_type));
    }

    #[test]
    fn create_and_fill_completes_content() {
        let schema = basic_schema();
        let li = schema.node_type("list_item").unwrap();
        let filled = li.create_and_fill(None, Fragment::empty(), Vec::new()).unwrap();
        assert_eq!(filled.child_count(), 1);
        assert_eq!(filled.child(0).node_type().name(), "paragraph");
        assert!(filled.check().is_ok());
    }

    #[test]
    fn create_checked_rejects_bad_content() {
        let schema = basic_schema();
        let doc_type = schema.node_type("doc").unwrap();
        let err = doc_type
            .create_checked(None, vec![schema.text("oops")], Vec::new())
            .unwrap_err();
        assert!(matches!(err, ContentError::InvalidContent(_)));
    }

    #[test]
    fn shared_content_expressions_compile_once() {
        let schema = basic_schema();
        // "block+" is used by both doc and blockquote; they share a start
        // state.
        let doc_type = schema.node_type("doc").unwrap();
        let quote = schema.node_type("blockquote").unwrap();
        assert_eq!(doc_type.content_match(), quote.content_match());
    }
}
