//! Depth-tolerant replacement: [`replace_step`] computes the step (if
//! any) that inserts a slice into a range, fitting open content into the
//! surrounding structure.
//!
//! The fitter keeps a *frontier* — the stack of open nodes at the
//! insertion point, each with its current content-match state — and
//! repeatedly places the leading chunk of the unplaced slice somewhere on
//! that frontier: by direct match, by injecting auto-generatable fill, or
//! by wrapping. When nothing fits it first opens the slice one level
//! deeper and then, as a last resort, drops the unplaceable leading node.
//! Every iteration strictly shrinks the unplaced content or deepens into
//! it, so the loop terminates. Finally the frontier is closed against the
//! range's end position; failure to close is a no-fit error.

use vellum_model::{Attrs, ContentMatch, Fragment, Node, NodeType, ResolvedPos, Slice};

use crate::replace_step::{ReplaceAroundStep, ReplaceStep};
use crate::step::Step;
use crate::transform::TransformError;

/// Compute a step replacing `from..to` with `slice`. `Ok(None)` means the
/// replacement is a no-op; a slice that cannot be fitted at all is a
/// [`TransformError::NoFit`].
pub fn replace_step(
    doc: &Node,
    from: usize,
    to: usize,
    slice: &Slice,
) -> Result<Option<Step>, TransformError> {
    if from == to && slice.size() == 0 {
        return Ok(None);
    }
    let rfrom = doc.resolve(from)?;
    let rto = doc.resolve(to)?;
    if fits_trivially(&rfrom, &rto, slice) {
        return Ok(Some(Step::Replace(ReplaceStep::new(from, to, slice.clone()))));
    }
    Fitter::new(&rfrom, &rto, slice.clone()).fit()
}

fn fits_trivially(rfrom: &ResolvedPos, rto: &ResolvedPos, slice: &Slice) -> bool {
    slice.open_start() == 0
        && slice.open_end() == 0
        && rfrom.start(rfrom.depth()) == rto.start(rto.depth())
        && rfrom
            .parent()
            .can_replace(rfrom.index(rfrom.depth()), rto.index(rto.depth()), slice.content())
}

// ── Fitter ────────────────────────────────────────────────────────────────

struct FrontierLevel {
    typ: NodeType,
    matched: ContentMatch,
}

struct Fittable {
    slice_depth: usize,
    frontier_depth: usize,
    parent: Option<Node>,
    inject: Option<Fragment>,
    wrap: Option<Vec<NodeType>>,
}

struct CloseLevel {
    depth: usize,
    fit: Fragment,
    move_to: ResolvedPos,
}

struct Fitter<'a> {
    rfrom: &'a ResolvedPos,
    rto: &'a ResolvedPos,
    unplaced: Slice,
    frontier: Vec<FrontierLevel>,
    placed: Fragment,
}

impl<'a> Fitter<'a> {
    fn new(rfrom: &'a ResolvedPos, rto: &'a ResolvedPos, unplaced: Slice) -> Fitter<'a> {
        let mut frontier = Vec::with_capacity(rfrom.depth() + 1);
        for i in 0..=rfrom.depth() {
            let node = rfrom.node(i);
            frontier.push(FrontierLevel {
                typ: node.node_type().clone(),
                matched: node.content_match_at(rfrom.index_after(i)),
            });
        }
        let mut placed = Fragment::empty();
        for i in (1..=rfrom.depth()).rev() {
            placed = Fragment::from(rfrom.node(i).copy(placed));
        }
        Fitter { rfrom, rto, unplaced, frontier, placed }
    }

    fn depth(&self) -> usize {
        self.frontier.len() - 1
    }

    fn fit(mut self) -> Result<Option<Step>, TransformError> {
        while self.unplaced.size() > 0 {
            match self.find_fittable() {
                Some(fittable) => {
                    if self.place_nodes(fittable).is_none() {
                        return Err(TransformError::NoFit);
                    }
                }
                None => {
                    if !self.open_more() {
                        self.drop_node();
                    }
                }
            }
        }
        let move_inline = self.must_move_inline();
        let placed_size =
            self.placed.size() as isize - self.depth() as isize - self.rfrom.depth() as isize;
        let target = match move_inline {
            Some(pos) => self
                .rfrom
                .doc()
                .resolve(pos)
                .map_err(|_| TransformError::NoFit)?,
            None => self.rto.clone(),
        };
        let rto_closed = self.close(target).ok_or(TransformError::NoFit)?;

        let mut content = self.placed;
        let mut open_start = self.rfrom.depth();
        let mut open_end = rto_closed.depth();
        while open_start > 0 && open_end > 0 && content.child_count() == 1 {
            let inner = content.child(0).content().clone();
            content = inner;
            open_start -= 1;
            open_end -= 1;
        }
        let slice = Slice::new(content, open_start, open_end);
        if let Some(move_pos) = move_inline {
            return Ok(Some(Step::ReplaceAround(ReplaceAroundStep {
                from: self.rfrom.pos(),
                to: move_pos,
                gap_from: self.rto.pos(),
                gap_to: self.rto.end(self.rto.depth()),
                slice,
                insert: placed_size.max(0) as usize,
                structure: true,
            })));
        }
        if slice.size() > 0 || self.rfrom.pos() != self.rto.pos() {
            return Ok(Some(Step::Replace(ReplaceStep::new(
                self.rfrom.pos(),
                rto_closed.pos(),
                slice,
            ))));
        }
        Ok(None)
    }

    /// Search for a placement of the leading unplaced content: two passes
    /// over (slice depth × frontier depth), the first for direct or
    /// fill-assisted matches, the second allowing wrapping.
    fn find_fittable(&self) -> Option<Fittable> {
        // Only descend the open-start spine up to the first isolating
        // node that is not itself open at the end.
        let mut start_depth = self.unplaced.open_start();
        {
            let mut cur = self.unplaced.content().clone();
            let mut open_end = self.unplaced.open_end();
            let mut d = 0;
            while d < start_depth {
                let Some(node) = cur.first_child().cloned() else { break };
                if cur.child_count() > 1 {
                    open_end = 0;
                }
                if node.node_type().isolating() && open_end <= d {
                    start_depth = d;
                    break;
                }
                cur = node.content().clone();
                d += 1;
            }
        }
        for pass in 1..=2 {
            let top_depth = if pass == 1 { start_depth } else { self.unplaced.open_start() };
            for slice_depth in (0..=top_depth).rev() {
                let (fragment, parent): (Fragment, Option<Node>) = if slice_depth > 0 {
                    let parent =
                        content_at(self.unplaced.content(), slice_depth - 1).first_child()?.clone();
                    (parent.content().clone(), Some(parent))
                } else {
                    (self.unplaced.content().clone(), None)
                };
                let first = fragment.first_child().cloned();
                for frontier_depth in (0..=self.depth()).rev() {
                    let level = &self.frontier[frontier_depth];
                    let mut inject = None;
                    if pass == 1 {
                        let found = match &first {
                            Some(first) => {
                                if level.matched.match_type(first.node_type()).is_some() {
                                    true
                                } else {
                                    inject = level.matched.fill_before(
                                        &Fragment::from(first.clone()),
                                        false,
                                        0,
                                    );
                                    inject.is_some()
                                }
                            }
                            None => parent
                                .as_ref()
                                .is_some_and(|p| level.typ.compatible_content(p.node_type())),
                        };
                        if found {
                            return Some(Fittable {
                                slice_depth,
                                frontier_depth,
                                parent,
                                inject,
                                wrap: None,
                            });
                        }
                    } else if let Some(first) = &first {
                        if let Some(wrap) = level.matched.find_wrapping(first.node_type()) {
                            return Some(Fittable {
                                slice_depth,
                                frontier_depth,
                                parent,
                                inject: None,
                                wrap: Some(wrap),
                            });
                        }
                    }
                    // Once the parent node itself would fit here there is
                    // no point in looking further up the frontier.
                    if let Some(p) = &parent {
                        if level.matched.match_type(p.node_type()).is_some() {
                            break;
                        }
                    }
                }
            }
        }
        None
    }

    /// Open the unplaced slice one level deeper at the start.
    fn open_more(&mut self) -> bool {
        let content = self.unplaced.content().clone();
        let open_start = self.unplaced.open_start();
        let open_end = self.unplaced.open_end();
        let inner = content_at(&content, open_start);
        let Some(first) = inner.first_child() else { return false };
        if first.is_leaf() || first.is_text() {
            return false;
        }
        let grown_end = if inner.size() + open_start >= content.size() - open_end {
            open_start + 1
        } else {
            0
        };
        self.unplaced = Slice::new(content, open_start + 1, open_end.max(grown_end));
        true
    }

    /// Discard the first unplaceable node of the unplaced slice.
    fn drop_node(&mut self) {
        let content = self.unplaced.content().clone();
        let open_start = self.unplaced.open_start();
        let open_end = self.unplaced.open_end();
        let inner = content_at(&content, open_start);
        if inner.child_count() <= 1 && open_start > 0 {
            let open_at_end = content.size() - open_start <= open_start + inner.size();
            self.unplaced = Slice::new(
                drop_from_fragment(&content, open_start - 1, 1),
                open_start - 1,
                if open_at_end { open_start - 1 } else { open_end },
            );
        } else {
            self.unplaced =
                Slice::new(drop_from_fragment(&content, open_start, 1), open_start, open_end);
        }
    }

    /// Place the nodes of the found fittable chunk onto the frontier.
    fn place_nodes(&mut self, fittable: Fittable) -> Option<()> {
        let Fittable { slice_depth, frontier_depth, parent, inject, wrap } = fittable;
        while self.depth() > frontier_depth {
            self.close_frontier_node()?;
        }
        if let Some(wrap) = wrap {
            for typ in wrap {
                self.open_frontier_node(typ, None, None)?;
            }
        }

        let slice = self.unplaced.clone();
        let fragment = match &parent {
            Some(p) => p.content().clone(),
            None => slice.content().clone(),
        };
        let open_start = slice.open_start() - slice_depth;
        let mut taken = 0;
        let mut add: Vec<Node> = Vec::new();
        // The placement level is the current frontier top (which includes
        // any wrappers just opened).
        let level_depth = self.depth();
        let FrontierLevel { typ, matched } = &self.frontier[level_depth];
        let typ = typ.clone();
        let mut matched = matched.clone();
        if let Some(inject) = &inject {
            for i in 0..inject.child_count() {
                add.push(inject.child(i).clone());
            }
            matched = matched.match_fragment(inject)?;
        }
        // How many levels are open at the end of this fragment. 0 means
        // the parent is open but nothing deeper; negative means closed.
        let mut open_end_count = (fragment.size() + slice_depth) as isize
            - (slice.content().size() - slice.open_end()) as isize;
        while taken < fragment.child_count() {
            let next = fragment.child(taken).clone();
            let Some(next_match) = matched.match_type(next.node_type()) else { break };
            taken += 1;
            // Drop empty open leading nodes.
            if taken > 1 || open_start == 0 || next.content().size() > 0 {
                matched = next_match;
                let node = next.mark(typ.allowed_marks(next.marks()));
                add.push(close_node_start(
                    &node,
                    if taken == 1 { open_start } else { 0 },
                    if taken == fragment.child_count() { open_end_count } else { -1 },
                ));
            }
        }
        let to_end = taken == fragment.child_count();
        if !to_end {
            open_end_count = -1;
        }

        self.placed = add_to_fragment(&self.placed, level_depth, &Fragment::from_array(add));
        self.frontier[level_depth].matched = matched;

        // When a whole closed node was consumed and its type matches the
        // innermost frontier node, close that frontier level right away.
        if to_end
            && open_end_count < 0
            && parent
                .as_ref()
                .is_some_and(|p| p.node_type() == &self.frontier[self.depth()].typ)
            && self.frontier.len() > 1
        {
            self.close_frontier_node()?;
        }

        // Newly opened nodes at the fragment's end become frontier levels.
        let mut cur = fragment;
        for _ in 0..open_end_count.max(0) {
            let node = cur.last_child()?.clone();
            self.frontier.push(FrontierLevel {
                typ: node.node_type().clone(),
                matched: node.content_match_at(node.child_count()),
            });
            cur = node.content().clone();
        }

        // Shrink the unplaced slice.
        self.unplaced = if !to_end {
            Slice::new(
                drop_from_fragment(slice.content(), slice_depth, taken),
                slice.open_start(),
                slice.open_end(),
            )
        } else if slice_depth == 0 {
            Slice::empty()
        } else {
            Slice::new(
                drop_from_fragment(slice.content(), slice_depth - 1, 1),
                slice_depth - 1,
                if open_end_count < 0 { slice.open_end() } else { slice_depth - 1 },
            )
        };
        Some(())
    }

    /// When the end position sits in a text block whose remaining inline
    /// content must move into the just-placed text block, find the
    /// position after which the untouched structure resumes.
    fn must_move_inline(&mut self) -> Option<usize> {
        if !self.rto.parent().is_textblock() {
            return None;
        }
        let top = self.frontier.last()?;
        if !top.typ.is_textblock() {
            return None;
        }
        content_after_fits(self.rto, self.rto.depth(), &top.typ, &top.matched, false)?;
        if self.rto.depth() == self.depth() {
            if let Some(level) = self.find_close_level(self.rto) {
                if level.depth == self.depth() {
                    return None;
                }
            }
        }
        let mut depth = self.rto.depth();
        let mut after = self.rto.after(depth);
        while depth > 1 && after == self.rto.end(depth - 1) {
            depth -= 1;
            after += 1;
        }
        Some(after)
    }

    fn find_close_level(&self, rto: &ResolvedPos) -> Option<CloseLevel> {
        'scan: for i in (0..=self.depth().min(rto.depth())).rev() {
            let level = &self.frontier[i];
            let drop_inner = i < rto.depth()
                && rto.end(i + 1) == rto.pos() + (rto.depth() - (i + 1));
            let Some(fit) = content_after_fits(rto, i, &level.typ, &level.matched, drop_inner)
            else {
                continue;
            };
            for d in (0..i).rev() {
                let outer = &self.frontier[d];
                match content_after_fits(rto, d, &outer.typ, &outer.matched, true) {
                    Some(fill) if fill.child_count() == 0 => {}
                    _ => continue 'scan,
                }
            }
            let move_to = if drop_inner {
                rto.doc().resolve(rto.after(i + 1)).ok()?
            } else {
                rto.clone()
            };
            return Some(CloseLevel { depth: i, fit, move_to });
        }
        None
    }

    /// Close the frontier against the end position, filling required
    /// content and reopening the levels the end position sits inside.
    fn close(&mut self, rto: ResolvedPos) -> Option<ResolvedPos> {
        let close_level = self.find_close_level(&rto)?;
        while self.depth() > close_level.depth {
            self.close_frontier_node()?;
        }
        if close_level.fit.child_count() > 0 {
            self.placed = add_to_fragment(&self.placed, close_level.depth, &close_level.fit);
        }
        let rto = close_level.move_to;
        for d in close_level.depth + 1..=rto.depth() {
            let node = rto.node(d);
            let add = node
                .node_type()
                .content_match()
                .fill_before(node.content(), true, rto.index(d))?;
            self.open_frontier_node(node.node_type().clone(), Some(node.attrs().clone()), Some(add))?;
        }
        Some(rto)
    }

    fn open_frontier_node(
        &mut self,
        typ: NodeType,
        attrs: Option<Attrs>,
        content: Option<Fragment>,
    ) -> Option<()> {
        let depth = self.depth();
        let top = &mut self.frontier[depth];
        top.matched = top.matched.match_type(&typ)?;
        let node = typ.create(attrs, content.unwrap_or_else(Fragment::empty)).ok()?;
        self.placed = add_to_fragment(&self.placed, depth, &Fragment::from(node));
        let matched = typ.content_match();
        self.frontier.push(FrontierLevel { typ, matched });
        Some(())
    }

    fn close_frontier_node(&mut self) -> Option<()> {
        let open = self.frontier.pop()?;
        let add = open.matched.fill_before(&Fragment::empty(), true, 0)?;
        if add.child_count() > 0 {
            self.placed = add_to_fragment(&self.placed, self.frontier.len(), &add);
        }
        Some(())
    }
}

// ── Fragment helpers ──────────────────────────────────────────────────────

fn content_at(fragment: &Fragment, depth: usize) -> Fragment {
    let mut cur = fragment.clone();
    for _ in 0..depth {
        match cur.first_child() {
            Some(child) => cur = child.content().clone(),
            None => return Fragment::empty(),
        }
    }
    cur
}

fn drop_from_fragment(fragment: &Fragment, depth: usize, count: usize) -> Fragment {
    if depth == 0 {
        return fragment.cut_by_index(count, fragment.child_count());
    }
    match fragment.first_child() {
        Some(first) => fragment.replace_child(
            0,
            first.copy(drop_from_fragment(first.content(), depth - 1, count)),
        ),
        None => fragment.clone(),
    }
}

fn add_to_fragment(fragment: &Fragment, depth: usize, content: &Fragment) -> Fragment {
    if depth == 0 {
        return fragment.append(content);
    }
    match fragment.last_child() {
        Some(last) => fragment.replace_child(
            fragment.child_count() - 1,
            last.copy(add_to_fragment(last.content(), depth - 1, content)),
        ),
        None => fragment.append(content),
    }
}

/// Close the open start of a node: fill in whatever leading content its
/// type requires (and, when `open_end` says the node is fully closed,
/// trailing content too).
fn close_node_start(node: &Node, open_start: usize, open_end: isize) -> Node {
    if open_start == 0 {
        return node.clone();
    }
    let mut frag = node.content().clone();
    if open_start > 1 {
        if let Some(first) = frag.first_child() {
            let inner_end = if frag.child_count() == 1 { open_end - 1 } else { 0 };
            let closed = close_node_start(first, open_start - 1, inner_end);
            frag = frag.replace_child(0, closed);
        }
    }
    let matcher = node.node_type().content_match();
    if let Some(fill) = matcher.fill_before(&frag, false, 0) {
        frag = fill.append(&frag);
    }
    if open_end <= 0 {
        if let Some(matched) = matcher.match_fragment(&frag) {
            if let Some(fill) = matched.fill_before(&Fragment::empty(), true, 0) {
                frag = frag.append(&fill);
            }
        }
    }
    node.copy(frag)
}

fn content_after_fits(
    rto: &ResolvedPos,
    depth: usize,
    typ: &NodeType,
    matched: &ContentMatch,
    open: bool,
) -> Option<Fragment> {
    let node = rto.node(depth);
    let index = if open { rto.index_after(depth) } else { rto.index(depth) };
    if depth == rto.depth() && !typ.compatible_content(node.node_type()) {
        return None;
    }
    let fit = matched.fill_before(node.content(), true, index)?;
    if invalid_marks(typ, node.content(), index) {
        return None;
    }
    Some(fit)
}

fn invalid_marks(typ: &NodeType, fragment: &Fragment, start: usize) -> bool {
    (start..fragment.child_count()).any(|i| !typ.allows_marks(fragment.child(i).marks()))
}
