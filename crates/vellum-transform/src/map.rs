//! Position mapping: [`StepMap`] (one edit's delta) and [`Mapping`]
//! (a composed sequence with mirror pairs).
//!
//! A step map is a list of `(start, old_size, new_size)` ranges sorted by
//! start. Mapping a position walks the ranges, shifting by the accumulated
//! size difference; positions inside a replaced range stick to one side,
//! chosen by the `assoc` bias. [`MapResult`] additionally reports deletion
//! flags and a [`Recover`] token that a mirrored inverse map can use to
//! reconstruct the exact original position — the machinery that keeps
//! undo/redo from drifting when interleaved with other edits.

use std::fmt;

// Deletion flags, combined into `MapResult::del_info`.
const DEL_BEFORE: u8 = 1;
const DEL_AFTER: u8 = 2;
const DEL_ACROSS: u8 = 4;
const DEL_SIDE: u8 = 8;

/// Common interface of [`StepMap`] and [`Mapping`].
pub trait Mappable {
    /// Map a position through this object. `assoc` determines which side
    /// the position sticks to when content is inserted or deleted around
    /// it (-1 before, 1 after).
    fn map(&self, pos: usize, assoc: i8) -> usize;
    fn map_result(&self, pos: usize, assoc: i8) -> MapResult;
}

// ── MapResult ─────────────────────────────────────────────────────────────

/// Token encoding the exact location of a position inside a replaced
/// range: the range's index plus the offset into its old content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recover {
    pub index: usize,
    pub offset: usize,
}

/// A mapped position plus information about what happened around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapResult {
    pub pos: usize,
    del_info: u8,
    pub recover: Option<Recover>,
}

impl MapResult {
    /// Whether the content on the side the position was biased toward was
    /// deleted.
    pub fn deleted(&self) -> bool {
        self.del_info & DEL_SIDE > 0
    }

    pub fn deleted_before(&self) -> bool {
        self.del_info & (DEL_BEFORE | DEL_ACROSS) > 0
    }

    pub fn deleted_after(&self) -> bool {
        self.del_info & (DEL_AFTER | DEL_ACROSS) > 0
    }

    /// Whether the position was inside content that was fully replaced.
    pub fn deleted_across(&self) -> bool {
        self.del_info & DEL_ACROSS > 0
    }
}

// ── StepMap ───────────────────────────────────────────────────────────────

/// One changed range: `old_size` tokens starting at `start` became
/// `new_size` tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRange {
    pub start: usize,
    pub old_size: usize,
    pub new_size: usize,
}

/// The position delta of a single step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepMap {
    ranges: Vec<MapRange>,
    inverted: bool,
}

impl StepMap {
    pub fn new(ranges: Vec<MapRange>) -> StepMap {
        StepMap { ranges, inverted: false }
    }

    pub fn empty() -> StepMap {
        StepMap::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[MapRange] {
        &self.ranges
    }

    /// A map representing the reverse delta, sharing this map's ranges.
    pub fn invert(&self) -> StepMap {
        StepMap { ranges: self.ranges.clone(), inverted: !self.inverted }
    }

    /// Reconstruct the position a [`Recover`] token was created at.
    pub fn recover(&self, recover: Recover) -> usize {
        let mut diff = 0isize;
        if !self.inverted {
            for range in &self.ranges[..recover.index] {
                diff += range.new_size as isize - range.old_size as isize;
            }
        }
        (self.ranges[recover.index].start as isize + diff + recover.offset as isize) as usize
    }

    fn map_inner(&self, pos: usize, assoc: i8) -> MapResult {
        let pos = pos as isize;
        let mut diff = 0isize;
        for (i, range) in self.ranges.iter().enumerate() {
            let start = range.start as isize - if self.inverted { diff } else { 0 };
            if start > pos {
                break;
            }
            let (old_size, new_size) = if self.inverted {
                (range.new_size as isize, range.old_size as isize)
            } else {
                (range.old_size as isize, range.new_size as isize)
            };
            let end = start + old_size;
            if pos <= end {
                let side = if old_size == 0 {
                    assoc
                } else if pos == start {
                    -1
                } else if pos == end {
                    1
                } else {
                    assoc
                };
                let result = start + diff + if side < 0 { 0 } else { new_size };
                let recover_at = if assoc < 0 { start } else { end };
                let recover = if pos == recover_at {
                    None
                } else {
                    Some(Recover { index: i, offset: (pos - start) as usize })
                };
                let mut del = if pos == start {
                    DEL_AFTER
                } else if pos == end {
                    DEL_BEFORE
                } else {
                    DEL_ACROSS
                };
                let outside_kept_side = if assoc < 0 { pos != start } else { pos != end };
                if outside_kept_side {
                    del |= DEL_SIDE;
                }
                return MapResult { pos: result as usize, del_info: del, recover };
            }
            diff += new_size - old_size;
        }
        MapResult { pos: (pos + diff) as usize, del_info: 0, recover: None }
    }
}

impl Mappable for StepMap {
    fn map(&self, pos: usize, assoc: i8) -> usize {
        self.map_inner(pos, assoc).pos
    }

    fn map_result(&self, pos: usize, assoc: i8) -> MapResult {
        self.map_inner(pos, assoc)
    }
}

impl fmt::Display for StepMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|r| format!("[{}, {}, {}]", r.start, r.old_size, r.new_size))
            .collect();
        write!(f, "{}{}", if self.inverted { "-" } else { "" }, parts.join(", "))
    }
}

// ── Mapping ───────────────────────────────────────────────────────────────

/// An ordered pipeline of step maps, optionally annotated with mirror
/// pairs (a map and its exact inverse elsewhere in the list).
///
/// When a fold hits a replaced range whose map has a mirror further along,
/// the fold jumps straight to the mirror and recovers the exact position
/// there instead of mapping through everything in between.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    maps: Vec<StepMap>,
    mirror: Vec<(usize, usize)>,
    from: usize,
    to: usize,
}

impl Mapping {
    pub fn new() -> Mapping {
        Mapping::default()
    }

    pub fn from_maps(maps: Vec<StepMap>) -> Mapping {
        let to = maps.len();
        Mapping { maps, mirror: Vec::new(), from: 0, to }
    }

    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// A mapping through a sub-range of this mapping's maps.
    pub fn slice(&self, from: usize, to: usize) -> Mapping {
        Mapping { maps: self.maps.clone(), mirror: self.mirror.clone(), from, to }
    }

    /// A mapping over the maps from `from` to the end.
    pub fn slice_from(&self, from: usize) -> Mapping {
        self.slice(from, self.maps.len())
    }

    pub fn append_map(&mut self, map: StepMap) {
        self.maps.push(map);
        self.to = self.maps.len();
    }

    /// Append a map recorded as the mirror image of the map at `mirrors`.
    pub fn append_mirrored_map(&mut self, map: StepMap, mirrors: usize) {
        self.append_map(map);
        self.set_mirror(self.maps.len() - 1, mirrors);
    }

    /// Append all maps (and mirror links) of another mapping.
    pub fn append_mapping(&mut self, other: &Mapping) {
        let start_size = self.maps.len();
        for i in 0..other.maps.len() {
            let mirror = other.get_mirror(i);
            match mirror {
                Some(m) if m < i => self.append_mirrored_map(other.maps[i].clone(), start_size + m),
                _ => self.append_map(other.maps[i].clone()),
            }
        }
    }

    /// Append the inverse of another mapping, mirror-linking each inverted
    /// map to its original when that original is also in this mapping.
    pub fn append_mapping_inverted(&mut self, other: &Mapping) {
        let total_size = self.maps.len() + other.maps.len();
        for i in (0..other.maps.len()).rev() {
            let mirror = other.get_mirror(i);
            match mirror {
                Some(m) if m > i => {
                    self.append_mirrored_map(other.maps[i].invert(), total_size - m - 1)
                }
                _ => self.append_map(other.maps[i].invert()),
            }
        }
    }

    /// The inverse of this mapping.
    pub fn invert(&self) -> Mapping {
        let mut inverse = Mapping::new();
        inverse.append_mapping_inverted(self);
        inverse
    }

    pub fn get_mirror(&self, n: usize) -> Option<usize> {
        for &(a, b) in &self.mirror {
            if a == n {
                return Some(b);
            }
            if b == n {
                return Some(a);
            }
        }
        None
    }

    pub fn set_mirror(&mut self, n: usize, m: usize) {
        self.mirror.push((n, m));
    }

    fn fold(&self, pos: usize, assoc: i8) -> MapResult {
        let mut pos = pos;
        let mut del_info = 0u8;
        let mut i = self.from;
        while i < self.to {
            let map = &self.maps[i];
            let result = map.map_result(pos, assoc);
            if let Some(recover) = result.recover {
                if let Some(corr) = self.get_mirror(i) {
                    if corr > i && corr < self.to {
                        pos = self.maps[corr].recover(recover);
                        i = corr + 1;
                        continue;
                    }
                }
            }
            del_info |= result.del_info;
            pos = result.pos;
            i += 1;
        }
        MapResult { pos, del_info, recover: None }
    }
}

impl Mappable for Mapping {
    fn map(&self, pos: usize, assoc: i8) -> usize {
        if self.mirror.is_empty() {
            let mut pos = pos;
            for map in &self.maps[self.from..self.to] {
                pos = map.map(pos, assoc);
            }
            pos
        } else {
            self.fold(pos, assoc).pos
        }
    }

    fn map_result(&self, pos: usize, assoc: i8) -> MapResult {
        self.fold(pos, assoc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(ranges: &[(usize, usize, usize)]) -> StepMap {
        StepMap::new(
            ranges
                .iter()
                .map(|&(start, old_size, new_size)| MapRange { start, old_size, new_size })
                .collect(),
        )
    }

    #[test]
    fn positions_around_a_change() {
        // Three tokens at offset 5 replaced by one.
        let map = map_of(&[(5, 3, 1)]);
        assert_eq!(map.map(4, 1), 4);
        assert_eq!(map.map(9, 1), 7);
        let inside = map.map_result(6, 1);
        assert_eq!(inside.pos, 6);
        assert!(inside.deleted());
        assert!(inside.deleted_across());
    }

    #[test]
    fn assoc_picks_a_side_at_an_insertion() {
        let map = map_of(&[(5, 0, 4)]);
        assert_eq!(map.map(5, -1), 5);
        assert_eq!(map.map(5, 1), 9);
    }

    #[test]
    fn boundary_positions_report_partial_deletion() {
        let map = map_of(&[(5, 3, 1)]);
        let at_start = map.map_result(5, -1);
        assert!(!at_start.deleted());
        assert!(at_start.deleted_after());
        let at_end = map.map_result(8, 1);
        assert!(!at_end.deleted());
        assert!(at_end.deleted_before());
    }

    #[test]
    fn invert_round_trips_outside_positions() {
        let map = map_of(&[(3, 2, 6)]);
        let inverse = map.invert();
        for pos in [0, 1, 2, 3] {
            assert_eq!(inverse.map(map.map(pos, -1), -1), pos);
        }
        assert_eq!(inverse.map(map.map(10, 1), 1), 10);
    }

    #[test]
    fn mapping_composition_equals_sequential_maps() {
        let m1 = map_of(&[(2, 0, 3)]);
        let m2 = map_of(&[(7, 2, 0)]);
        let mapping = Mapping::from_maps(vec![m1.clone(), m2.clone()]);
        for pos in 0..12 {
            assert_eq!(mapping.map(pos, 1), m2.map(m1.map(pos, 1), 1));
        }
    }

    #[test]
    fn mirror_recovers_exact_positions() {
        // A deletion followed by its exact inverse: positions inside the
        // deleted range survive the round trip thanks to the mirror link.
        let del = map_of(&[(2, 4, 0)]);
        let mut mapping = Mapping::new();
        mapping.append_map(del.clone());
        mapping.append_mirrored_map(del.invert(), 0);
        for pos in 0..10 {
            assert_eq!(mapping.map(pos, 1), pos, "position {pos}");
        }
    }

    #[test]
    fn inverted_mapping_restores_untouched_positions() {
        let mut mapping = Mapping::new();
        mapping.append_map(map_of(&[(1, 2, 5)]));
        mapping.append_map(map_of(&[(8, 1, 0)]));
        let inverse = mapping.invert();
        for pos in [0usize, 4, 7] {
            assert_eq!(inverse.map(mapping.map(pos, 1), 1), pos, "position {pos}");
        }
    }

    #[test]
    fn mirrored_round_trip_survives_interleaved_edits() {
        // A deletion, an unrelated insertion at 0, then the undo of the
        // deletion (rebased over the insertion, so its range sits at 4).
        let del = map_of(&[(2, 4, 0)]);
        let ins = map_of(&[(0, 0, 2)]);
        let undo = map_of(&[(4, 0, 4)]);
        let mut mapping = Mapping::new();
        mapping.append_map(del);
        mapping.append_map(ins);
        mapping.append_mirrored_map(undo, 0);
        // Interior position: naive folding would drift to 8; the mirror
        // jump restores the exact spot, shifted only by the insertion.
        assert_eq!(mapping.map(4, 1), 6);
        // Positions outside the deleted range map normally.
        assert_eq!(mapping.map(1, 1), 3);
        assert_eq!(mapping.map(8, 1), 10);
    }
}
