//! Content expressions and the [`ContentMatch`] automaton.
//!
//! A node type's content expression (`"paragraph+"`, `"heading (block |
//! list)*"`, `"text{2,4}"`, …) is compiled at schema-build time: a hand
//! lexer feeds a recursive-descent parser, the AST is lowered to a Thompson
//! NFA, and subset construction over the epsilon closure produces a DFA.
//! Every DFA state is a `ContentMatch` value: a `valid_end` flag plus an
//! ordered list of `(node type, next state)` edges.
//!
//! All states of all expressions of one schema live in a single arena owned
//! by the schema; a `ContentMatch` handle is just the schema plus a state
//! index, so distinct expressions compile once and are shared by every node
//! type using them.

use std::collections::HashMap;
use std::fmt;

use crate::fragment::Fragment;
use crate::node::Node;
use crate::schema::{NodeId, NodeType, Schema, SchemaError};

// ── Arena ─────────────────────────────────────────────────────────────────

/// Index of a DFA state in the schema's match arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MatchId(pub(crate) u32);

impl MatchId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub(crate) struct MatchState {
    pub(crate) valid_end: bool,
    pub(crate) edges: Vec<(NodeId, MatchId)>,
}

#[derive(Debug, Default)]
pub(crate) struct MatchArena {
    pub(crate) states: Vec<MatchState>,
}

/// The subset of type information the compiler needs, in declaration order.
pub(crate) struct TypeInfo {
    pub(crate) name: String,
    pub(crate) groups: Vec<String>,
    /// Whether fill/wrap search may create this type out of thin air
    /// (false for text types and types with required attributes).
    pub(crate) generatable: bool,
}

// ── Compilation pipeline ──────────────────────────────────────────────────

/// Compile one content expression, appending its DFA states to `arena` and
/// returning the start state. An empty expression compiles to a single
/// valid-end state with no edges.
pub(crate) fn compile(
    expr: &str,
    types: &[TypeInfo],
    arena: &mut MatchArena,
) -> Result<MatchId, SchemaError> {
    let mut stream = TokenStream::new(expr, types)?;
    if stream.tokens.is_empty() {
        let id = MatchId(arena.states.len() as u32);
        arena.states.push(MatchState { valid_end: true, edges: Vec::new() });
        return Ok(id);
    }
    let ast = stream.parse_expr()?;
    if stream.pos < stream.tokens.len() {
        return Err(stream.err("unexpected trailing tokens"));
    }
    let nfa = build_nfa(&ast);
    let root = build_dfa(&nfa, arena);
    check_dead_ends(expr, root, arena, types)?;
    Ok(root)
}

/// Reject automata containing a state whose only continuations require
/// types that cannot be generated (text or required-attr types): such a
/// state could never be auto-filled to a valid end.
fn check_dead_ends(
    expr: &str,
    root: MatchId,
    arena: &MatchArena,
    types: &[TypeInfo],
) -> Result<(), SchemaError> {
    let mut work = vec![root];
    let mut i = 0;
    while i < work.len() {
        let state = &arena.states[work[i].index()];
        let mut dead = !state.valid_end;
        let mut names = Vec::new();
        for &(term, next) in &state.edges {
            names.push(types[term.index()].name.clone());
            if dead && types[term.index()].generatable {
                dead = false;
            }
            if !work.contains(&next) {
                work.push(next);
            }
        }
        if dead {
            return Err(SchemaError::DeadEnd {
                expr: expr.to_string(),
                types: names.join(", "),
            });
        }
        i += 1;
    }
    Ok(())
}

// ── Lexer & parser ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Num(usize),
    Pipe,
    Star,
    Plus,
    Question,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
}

#[derive(Debug)]
enum Expr {
    Choice(Vec<Expr>),
    Seq(Vec<Expr>),
    Plus(Box<Expr>),
    Star(Box<Expr>),
    Opt(Box<Expr>),
    Range { min: usize, max: Option<usize>, expr: Box<Expr> },
    Name(NodeId),
}

struct TokenStream<'a> {
    expr: &'a str,
    types: &'a [TypeInfo],
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> TokenStream<'a> {
    fn new(expr: &'a str, types: &'a [TypeInfo]) -> Result<Self, SchemaError> {
        let mut tokens = Vec::new();
        let mut chars = expr.chars().peekable();
        while let Some(&c) = chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    chars.next();
                }
                '|' => {
                    chars.next();
                    tokens.push(Token::Pipe);
                }
                '*' => {
                    chars.next();
                    tokens.push(Token::Star);
                }
                '+' => {
                    chars.next();
                    tokens.push(Token::Plus);
                }
                '?' => {
                    chars.next();
                    tokens.push(Token::Question);
                }
                '(' => {
                    chars.next();
                    tokens.push(Token::LParen);
                }
                ')' => {
                    chars.next();
                    tokens.push(Token::RParen);
                }
                '{' => {
                    chars.next();
                    tokens.push(Token::LBrace);
                }
                '}' => {
                    chars.next();
                    tokens.push(Token::RBrace);
                }
                ',' => {
                    chars.next();
                    tokens.push(Token::Comma);
                }
                c if c.is_alphanumeric() || c == '_' => {
                    let mut word = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            word.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if word.chars().all(|c| c.is_ascii_digit()) {
                        let n = word.parse().map_err(|_| SchemaError::ContentExpression {
                            expr: expr.to_string(),
                            message: format!("invalid number '{word}'"),
                        })?;
                        tokens.push(Token::Num(n));
                    } else {
                        tokens.push(Token::Name(word));
                    }
                }
                c => {
                    return Err(SchemaError::ContentExpression {
                        expr: expr.to_string(),
                        message: format!("unexpected character '{c}'"),
                    })
                }
            }
        }
        Ok(TokenStream { expr, types, tokens, pos: 0 })
    }

    fn err(&self, message: impl Into<String>) -> SchemaError {
        SchemaError::ContentExpression { expr: self.expr.to_string(), message: message.into() }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, SchemaError> {
        let mut exprs = vec![self.parse_expr_seq()?];
        while self.eat(&Token::Pipe) {
            exprs.push(self.parse_expr_seq()?);
        }
        Ok(if exprs.len() == 1 { exprs.remove(0) } else { Expr::Choice(exprs) })
    }

    fn parse_expr_seq(&mut self) -> Result<Expr, SchemaError> {
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.parse_expr_subscript()?);
            match self.peek() {
                None | Some(Token::RParen) | Some(Token::Pipe) => break,
                _ => {}
            }
        }
        Ok(if exprs.len() == 1 { exprs.remove(0) } else { Expr::Seq(exprs) })
    }

    fn parse_expr_subscript(&mut self) -> Result<Expr, SchemaError> {
        let mut expr = self.parse_expr_atom()?;
        loop {
            if self.eat(&Token::Star) {
                expr = Expr::Star(Box::new(expr));
            } else if self.eat(&Token::Plus) {
                expr = Expr::Plus(Box::new(expr));
            } else if self.eat(&Token::Question) {
                expr = Expr::Opt(Box::new(expr));
            } else if self.peek() == Some(&Token::LBrace) {
                expr = self.parse_expr_range(expr)?;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_expr_range(&mut self, expr: Expr) -> Result<Expr, SchemaError> {
        self.pos += 1; // consume '{'
        let min = match self.peek().cloned() {
            Some(Token::Num(n)) => {
                self.pos += 1;
                n
            }
            _ => return Err(self.err("expected number in repeat range")),
        };
        let max = if self.eat(&Token::Comma) {
            match self.peek().cloned() {
                Some(Token::Num(n)) => {
                    self.pos += 1;
                    Some(n)
                }
                _ => None,
            }
        } else {
            Some(min)
        };
        if !self.eat(&Token::RBrace) {
            return Err(self.err("unclosed repeat range"));
        }
        Ok(Expr::Range { min, max, expr: Box::new(expr) })
    }

    fn parse_expr_atom(&mut self) -> Result<Expr, SchemaError> {
        match self.peek().cloned() {
            Some(Token::LParen) => {
                self.pos += 1;
                let expr = self.parse_expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(self.err("missing closing paren"));
                }
                Ok(expr)
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                self.resolve_name(&name)
            }
            _ => Err(self.err("unexpected token")),
        }
    }

    /// A name atom refers either to a node type or to a group; a group
    /// expands into a choice between its member types.
    fn resolve_name(&self, name: &str) -> Result<Expr, SchemaError> {
        if let Some(i) = self.types.iter().position(|t| t.name == name) {
            return Ok(Expr::Name(NodeId(i as u16)));
        }
        let mut members: Vec<Expr> = self
            .types
            .iter()
            .enumerate()
            .filter(|(_, t)| t.groups.iter().any(|g| g == name))
            .map(|(i, _)| Expr::Name(NodeId(i as u16)))
            .collect();
        match members.len() {
            0 => Err(self.err(format!("no node type or group '{name}' found"))),
            1 => Ok(members.remove(0)),
            _ => Ok(Expr::Choice(members)),
        }
    }
}

// ── NFA construction ──────────────────────────────────────────────────────

const DANGLING: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct NfaEdge {
    term: Option<NodeId>,
    to: usize,
}

type Nfa = Vec<Vec<NfaEdge>>;

fn new_node(nfa: &mut Nfa) -> usize {
    nfa.push(Vec::new());
    nfa.len() - 1
}

fn add_edge(nfa: &mut Nfa, from: usize, term: Option<NodeId>, to: Option<usize>) -> (usize, usize) {
    nfa[from].push(NfaEdge { term, to: to.unwrap_or(DANGLING) });
    (from, nfa[from].len() - 1)
}

fn connect(nfa: &mut Nfa, edges: &[(usize, usize)], to: usize) {
    for &(state, edge) in edges {
        nfa[state][edge].to = to;
    }
}

fn build_nfa(expr: &Expr) -> Nfa {
    let mut nfa: Nfa = vec![Vec::new()];
    let out = compile_nfa(expr, 0, &mut nfa);
    let accept = new_node(&mut nfa);
    connect(&mut nfa, &out, accept);
    nfa
}

/// Compile `expr` starting at NFA node `from`; returns the dangling edges
/// that the caller must connect to the expression's exit node.
fn compile_nfa(expr: &Expr, from: usize, nfa: &mut Nfa) -> Vec<(usize, usize)> {
    match expr {
        Expr::Choice(exprs) => {
            let mut out = Vec::new();
            for e in exprs {
                out.extend(compile_nfa(e, from, nfa));
            }
            out
        }
        Expr::Seq(exprs) => {
            let mut cur = from;
            for (i, e) in exprs.iter().enumerate() {
                let next = compile_nfa(e, cur, nfa);
                if i == exprs.len() - 1 {
                    return next;
                }
                let node = new_node(nfa);
                connect(nfa, &next, node);
                cur = node;
            }
            Vec::new()
        }
        Expr::Star(e) => {
            let loop_node = new_node(nfa);
            add_edge(nfa, from, None, Some(loop_node));
            let inner = compile_nfa(e, loop_node, nfa);
            connect(nfa, &inner, loop_node);
            vec![add_edge(nfa, loop_node, None, None)]
        }
        Expr::Plus(e) => {
            let loop_node = new_node(nfa);
            let first = compile_nfa(e, from, nfa);
            connect(nfa, &first, loop_node);
            let again = compile_nfa(e, loop_node, nfa);
            connect(nfa, &again, loop_node);
            vec![add_edge(nfa, loop_node, None, None)]
        }
        Expr::Opt(e) => {
            let mut out = vec![add_edge(nfa, from, None, None)];
            out.extend(compile_nfa(e, from, nfa));
            out
        }
        Expr::Range { min, max, expr } => {
            let mut cur = from;
            for _ in 0..*min {
                let next = new_node(nfa);
                let inner = compile_nfa(expr, cur, nfa);
                connect(nfa, &inner, next);
                cur = next;
            }
            match max {
                None => {
                    let inner = compile_nfa(expr, cur, nfa);
                    connect(nfa, &inner, cur);
                }
                Some(max) => {
                    for _ in *min..*max {
                        let next = new_node(nfa);
                        add_edge(nfa, cur, None, Some(next));
                        let inner = compile_nfa(expr, cur, nfa);
                        connect(nfa, &inner, next);
                        cur = next;
                    }
                }
            }
            vec![add_edge(nfa, cur, None, None)]
        }
        Expr::Name(id) => vec![add_edge(nfa, from, Some(*id), None)],
    }
}

/// Epsilon closure of an NFA node, sorted descending so closures can be
/// compared as state-set keys.
fn null_from(nfa: &Nfa, from: usize) -> Vec<usize> {
    let mut result = Vec::new();
    scan(nfa, from, &mut result);
    result.sort_unstable_by(|a, b| b.cmp(a));
    result
}

fn scan(nfa: &Nfa, node: usize, result: &mut Vec<usize>) {
    let edges = &nfa[node];
    // Skip over single-epsilon chain nodes.
    if edges.len() == 1 && edges[0].term.is_none() {
        return scan(nfa, edges[0].to, result);
    }
    result.push(node);
    for edge in edges {
        if edge.term.is_none() && !result.contains(&edge.to) {
            scan(nfa, edge.to, result);
        }
    }
}

/// Subset construction: turn the NFA into DFA states in the arena,
/// returning the start state.
fn build_dfa(nfa: &Nfa, arena: &mut MatchArena) -> MatchId {
    let mut labeled: HashMap<Vec<usize>, MatchId> = HashMap::new();
    explore(nfa, null_from(nfa, 0), &mut labeled, arena)
}

fn explore(
    nfa: &Nfa,
    states: Vec<usize>,
    labeled: &mut HashMap<Vec<usize>, MatchId>,
    arena: &mut MatchArena,
) -> MatchId {
    let mut out: Vec<(NodeId, Vec<usize>)> = Vec::new();
    for &node in &states {
        for edge in &nfa[node] {
            let Some(term) = edge.term else { continue };
            let idx = match out.iter().position(|(t, _)| *t == term) {
                Some(i) => i,
                None => {
                    out.push((term, Vec::new()));
                    out.len() - 1
                }
            };
            for n in null_from(nfa, edge.to) {
                if !out[idx].1.contains(&n) {
                    out[idx].1.push(n);
                }
            }
        }
    }
    let accept = nfa.len() - 1;
    let id = MatchId(arena.states.len() as u32);
    arena.states.push(MatchState { valid_end: states.contains(&accept), edges: Vec::new() });
    labeled.insert(states, id);
    for (term, mut set) in out {
        set.sort_unstable_by(|a, b| b.cmp(a));
        let existing = labeled.get(&set).copied();
        let next = match existing {
            Some(existing) => existing,
            None => explore(nfa, set, labeled, arena),
        };
        arena.states[id.index()].edges.push((term, next));
    }
    id
}

// ── ContentMatch handle ───────────────────────────────────────────────────

/// One state of a compiled content automaton.
#[derive(Clone)]
pub struct ContentMatch {
    pub(crate) schema: Schema,
    pub(crate) state: MatchId,
}

impl ContentMatch {
    /// Whether stopping here leaves the node with valid content.
    pub fn valid_end(&self) -> bool {
        self.schema.state(self.state).valid_end
    }

    pub fn edge_count(&self) -> usize {
        self.schema.state(self.state).edges.len()
    }

    /// The `i`-th outgoing edge. Panics when out of range.
    pub fn edge(&self, i: usize) -> (NodeType, ContentMatch) {
        let (term, next) = self.schema.state(self.state).edges[i];
        (self.schema.node_type_by_id(term), ContentMatch { schema: self.schema.clone(), state: next })
    }

    /// Match a single node type, returning the successor state.
    pub fn match_type(&self, typ: &NodeType) -> Option<ContentMatch> {
        self.schema
            .state(self.state)
            .edges
            .iter()
            .find(|(term, _)| *term == typ.id())
            .map(|&(_, next)| ContentMatch { schema: self.schema.clone(), state: next })
    }

    /// Match all children of a fragment in order.
    pub fn match_fragment(&self, frag: &Fragment) -> Option<ContentMatch> {
        self.match_fragment_range(frag, 0, frag.child_count())
    }

    /// Match the children `start..end` of a fragment in order,
    /// short-circuiting on the first failure.
    pub fn match_fragment_range(
        &self,
        frag: &Fragment,
        start: usize,
        end: usize,
    ) -> Option<ContentMatch> {
        let mut cur = self.clone();
        for i in start..end {
            cur = cur.match_type(frag.child(i).node_type())?;
        }
        Some(cur)
    }

    /// The first generatable type this state can continue with.
    pub fn default_type(&self) -> Option<NodeType> {
        for (term, _) in &self.schema.state(self.state).edges {
            let typ = self.schema.node_type_by_id(*term);
            if !(typ.is_text() || typ.has_required_attrs()) {
                return Some(typ);
            }
        }
        None
    }

    /// Whether the two states share any edge type.
    pub fn compatible(&self, other: &ContentMatch) -> bool {
        self.schema
            .state(self.state)
            .edges
            .iter()
            .any(|(t1, _)| other.schema.state(other.state).edges.iter().any(|(t2, _)| t1 == t2))
    }

    /// Depth-first search for a sequence of generatable nodes that, placed
    /// here, lets `after` (from `start_index`) match — reaching a valid end
    /// when `to_end` is set. Returns the fill, or `None` when impossible.
    pub fn fill_before(&self, after: &Fragment, to_end: bool, start_index: usize) -> Option<Fragment> {
        let mut seen = vec![self.state];
        self.search_fill(after, to_end, start_index, &mut seen, &mut Vec::new())
    }

    fn search_fill(
        &self,
        after: &Fragment,
        to_end: bool,
        start_index: usize,
        seen: &mut Vec<MatchId>,
        types: &mut Vec<NodeType>,
    ) -> Option<Fragment> {
        if let Some(finished) = self.match_fragment_range(after, start_index, after.child_count()) {
            if !to_end || finished.valid_end() {
                let mut nodes: Vec<Node> = Vec::with_capacity(types.len());
                for typ in types.iter() {
                    nodes.push(typ.create_and_fill(None, Fragment::empty(), Vec::new())?);
                }
                return Some(Fragment::from_children(nodes));
            }
        }
        for i in 0..self.edge_count() {
            let (typ, next) = self.edge(i);
            if !(typ.is_text() || typ.has_required_attrs()) && !seen.contains(&next.state) {
                seen.push(next.state);
                types.push(typ);
                let found = next.search_fill(after, to_end, start_index, seen, types);
                if found.is_some() {
                    return found;
                }
                types.pop();
            }
        }
        None
    }

    /// Breadth-first search for the minimal list of wrapper types through
    /// which `target` becomes matchable here. Memoized per (state, target)
    /// in the schema. `Some(vec![])` means the target matches directly.
    pub fn find_wrapping(&self, target: &NodeType) -> Option<Vec<NodeType>> {
        let key = (self.state, target.id());
        if let Some(cached) = self.schema.wrap_cache_get(&key) {
            return cached.map(|ids| ids.iter().map(|&id| self.schema.node_type_by_id(id)).collect());
        }
        let computed = self.compute_wrapping(target);
        self.schema.wrap_cache_put(key, computed.clone());
        computed.map(|ids| ids.into_iter().map(|id| self.schema.node_type_by_id(id)).collect())
    }

    fn compute_wrapping(&self, target: &NodeType) -> Option<Vec<NodeId>> {
        // (state to search from, wrapper type that got us here, parent entry)
        let mut entries: Vec<(MatchId, Option<NodeId>, Option<usize>)> =
            vec![(self.state, None, None)];
        let mut seen: Vec<NodeId> = Vec::new();
        let mut head = 0;
        while head < entries.len() {
            let (state, _, _) = entries[head];
            let current = head;
            head += 1;
            let matches_here = self
                .schema
                .state(state)
                .edges
                .iter()
                .any(|(term, _)| *term == target.id());
            if matches_here {
                let mut result = Vec::new();
                let mut cursor = Some(current);
                while let Some(i) = cursor {
                    if let Some(typ) = entries[i].1 {
                        result.push(typ);
                    }
                    cursor = entries[i].2;
                }
                result.reverse();
                return Some(result);
            }
            let via_type = entries[current].1;
            for &(term, next) in &self.schema.state(state).edges {
                let data = self.schema.node_data(term);
                if !data.leaf
                    && data.default_attrs.is_some()
                    && !seen.contains(&term)
                    && (via_type.is_none() || self.schema.state(next).valid_end)
                {
                    entries.push((self.schema.node_data(term).content, Some(term), Some(current)));
                    seen.push(term);
                }
            }
        }
        None
    }
}

impl PartialEq for ContentMatch {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.schema == other.schema
    }
}

impl fmt::Debug for ContentMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.schema.state(self.state);
        let edges: Vec<&str> = state
            .edges
            .iter()
            .map(|(t, _)| self.schema.node_data(*t).name.as_str())
            .collect();
        write!(f, "ContentMatch(valid_end: {}, edges: [{}])", state.valid_end, edges.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use crate::schema::tests::basic_schema;
    use crate::schema::{NodeSpec, Schema, SchemaSpec};
    use super::*;

    #[test]
    fn match_type_walks_edges() {
        let schema = basic_schema();
        let doc_type = schema.node_type("doc").unwrap();
        let para = schema.node_type("paragraph").unwrap();
        let m = doc_type.content_match().match_type(&para).unwrap();
        // "block+": after one paragraph the state is a valid end and still
        // accepts more blocks.
        assert!(m.valid_end());
        assert!(m.match_type(&para).is_some());
        assert!(!doc_type.content_match().valid_end());
    }

    #[test]
    fn range_repetition() {
        let mut nodes = IndexMap::new();
        nodes.insert("doc".to_string(), NodeSpec { content: Some("paragraph{2,3}".into()), ..Default::default() });
        nodes.insert("paragraph".to_string(), NodeSpec { content: Some("text*".into()), ..Default::default() });
        nodes.insert("text".to_string(), NodeSpec { inline: true, ..Default::default() });
        let schema = Schema::new(SchemaSpec { nodes, marks: IndexMap::new(), top_node: None }).unwrap();
        let para = schema.node_type("paragraph").unwrap();
        let mut m = schema.node_type("doc").unwrap().content_match();
        assert!(!m.valid_end());
        m = m.match_type(&para).unwrap();
        assert!(!m.valid_end());
        m = m.match_type(&para).unwrap();
        assert!(m.valid_end());
        m = m.match_type(&para).unwrap();
        assert!(m.valid_end());
        assert!(m.match_type(&para).is_none());
    }

    #[test]
    fn fill_before_inserts_generatable_nodes() {
        let schema = basic_schema();
        let doc_type = schema.node_type("doc").unwrap();
        // An empty doc needs at least one block; the fill should invent a
        // paragraph (the first generatable block).
        let fill = doc_type
            .content_match()
            .fill_before(&Fragment::empty(), true, 0)
            .unwrap();
        assert_eq!(fill.child_count(), 1);
        assert_eq!(fill.child(0).node_type().name(), "paragraph");
    }

    #[test]
    fn find_wrapping_reports_path() {
        let schema = basic_schema();
        let doc_type = schema.node_type("doc").unwrap();
        let li = schema.node_type("list_item").unwrap();
        let wrap = doc_type.content_match().find_wrapping(&li).unwrap();
        let names: Vec<&str> = wrap.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["bullet_list"]);
        // Direct matches need no wrapping.
        let para = schema.node_type("paragraph").unwrap();
        assert_eq!(doc_type.content_match().find_wrapping(&para).unwrap().len(), 0);
    }

    #[test]
    fn dead_end_expressions_are_rejected() {
        let mut nodes = IndexMap::new();
        nodes.insert("doc".to_string(), NodeSpec { content: Some("text+".into()), ..Default::default() });
        nodes.insert("text".to_string(), NodeSpec { inline: true, ..Default::default() });
        let err = Schema::new(SchemaSpec { nodes, marks: IndexMap::new(), top_node: None }).unwrap_err();
        assert!(matches!(err, SchemaError::DeadEnd { .. }));
    }

    #[test]
    fn non_empty_generatable_states_pass_dead_end_check() {
        // "paragraph+" requires a generatable paragraph: fine.
        assert!(basic_schema().node_type("doc").is_some());
    }

    #[test]
    fn unknown_name_is_an_error() {
        let mut nodes = IndexMap::new();
        nodes.insert("doc".to_string(), NodeSpec { content: Some("mystery+".into()), ..Default::default() });
        nodes.insert("text".to_string(), NodeSpec { inline: true, ..Default::default() });
        let err = Schema::new(SchemaSpec { nodes, marks: IndexMap::new(), top_node: None }).unwrap_err();
        assert!(matches!(err, SchemaError::ContentExpression { .. }));
    }
}
