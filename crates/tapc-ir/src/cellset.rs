//! The dataflow fact attached to every IR node: which cells a node
//! references or updates, split into a certain and a possible part.

use std::collections::BTreeSet;

use crate::expr::Expr;

/// A pair of offset sets `(sure, unsure)` with `sure` a subset of
/// `unsure`. Each side carries an extra "bottom" flag standing for "and
/// possibly other cells" — a cell we cannot name, typically because an
/// offset is not a compile-time constant or because the pointer position is
/// unknown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellSet {
    sure: BTreeSet<i64>,
    unsure: BTreeSet<i64>,
    sure_bottom: bool,
    unsure_bottom: bool,
}

impl CellSet {
    pub fn new() -> CellSet {
        CellSet::default()
    }

    /// Builds the certain side from reference expressions: constant offsets
    /// are recorded by value, anything else degrades to bottom on the
    /// unsure side.
    pub fn from_refs<'a>(refs: impl IntoIterator<Item = &'a Expr>) -> CellSet {
        let mut set = CellSet::new();
        set.extend_sure_refs(refs);
        set
    }

    pub fn extend_sure_refs<'a>(&mut self, refs: impl IntoIterator<Item = &'a Expr>) {
        for r in refs {
            match r.as_const() {
                Some(k) => self.add_sure(k),
                None => self.unsure_bottom = true,
            }
        }
    }

    pub fn add_sure(&mut self, offset: i64) {
        self.sure.insert(offset);
        self.unsure.insert(offset);
    }

    pub fn add_unsure(&mut self, offset: i64) {
        self.unsure.insert(offset);
    }

    /// Marks "possibly other cells" on both sides.
    pub fn add_sure_bottom(&mut self) {
        self.sure_bottom = true;
        self.unsure_bottom = true;
    }

    /// Marks "possibly other cells" on the unsure side only.
    pub fn add_unsure_bottom(&mut self) {
        self.unsure_bottom = true;
    }

    pub fn sure_has_bottom(&self) -> bool {
        self.sure_bottom
    }

    pub fn unsure_has_bottom(&self) -> bool {
        self.unsure_bottom
    }

    pub fn sure_contains(&self, offset: i64) -> bool {
        self.sure.contains(&offset)
    }

    pub fn unsure_contains(&self, offset: i64) -> bool {
        self.unsure.contains(&offset)
    }

    /// Concrete certainly-touched offsets; bottom is not enumerated.
    pub fn iter_sure(&self) -> impl Iterator<Item = i64> + '_ {
        self.sure.iter().copied()
    }

    /// Concrete possibly-touched offsets; bottom is not enumerated.
    pub fn iter_unsure(&self) -> impl Iterator<Item = i64> + '_ {
        self.unsure.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.unsure.is_empty() && !self.unsure_bottom
    }

    pub fn union_with(&mut self, other: &CellSet) {
        self.sure.extend(&other.sure);
        self.unsure.extend(&other.unsure);
        self.sure_bottom |= other.sure_bottom;
        self.unsure_bottom |= other.unsure_bottom;
    }

    pub fn intersection(&self, other: &CellSet) -> CellSet {
        CellSet {
            sure: self.sure.intersection(&other.sure).copied().collect(),
            unsure: self.unsure.intersection(&other.unsure).copied().collect(),
            sure_bottom: self.sure_bottom && other.sure_bottom,
            unsure_bottom: self.unsure_bottom && other.unsure_bottom,
        }
    }

    pub fn difference(&self, other: &CellSet) -> CellSet {
        CellSet {
            sure: self.sure.difference(&other.sure).copied().collect(),
            unsure: self.unsure.difference(&other.unsure).copied().collect(),
            sure_bottom: self.sure_bottom && !other.sure_bottom,
            unsure_bottom: self.unsure_bottom && !other.unsure_bottom,
        }
    }

    /// Promotes another set's possible side into this one's possible side.
    pub fn absorb_unsure(&mut self, other: &CellSet) {
        for k in other.iter_unsure() {
            self.add_unsure(k);
        }
        if other.unsure_has_bottom() {
            self.add_unsure_bottom();
        }
    }

    /// Shifts every concrete offset; bottom is preserved.
    pub fn movepointer(&self, delta: i64) -> CellSet {
        if delta == 0 {
            return self.clone();
        }
        CellSet {
            sure: self.sure.iter().map(|k| k + delta).collect(),
            unsure: self.unsure.iter().map(|k| k + delta).collect(),
            sure_bottom: self.sure_bottom,
            unsure_bottom: self.unsure_bottom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sure_implies_unsure() {
        let mut set = CellSet::new();
        set.add_sure(3);
        set.add_unsure(5);
        assert!(set.sure_contains(3) && set.unsure_contains(3));
        assert!(!set.sure_contains(5) && set.unsure_contains(5));
    }

    #[test]
    fn movepointer_shifts_and_keeps_bottom() {
        let mut set = CellSet::new();
        set.add_sure(0);
        set.add_unsure(2);
        set.add_unsure_bottom();
        let moved = set.movepointer(10);
        assert!(moved.sure_contains(10));
        assert!(moved.unsure_contains(12));
        assert!(moved.unsure_has_bottom());
        assert!(!moved.sure_has_bottom());
    }

    #[test]
    fn union_and_difference() {
        let mut a = CellSet::new();
        a.add_sure(1);
        a.add_sure(2);
        let mut b = CellSet::new();
        b.add_sure(2);
        b.add_sure_bottom();
        a.union_with(&b);
        assert!(a.sure_contains(1) && a.sure_contains(2));
        assert!(a.sure_has_bottom());

        let mut c = CellSet::new();
        c.add_sure(2);
        let d = a.difference(&c);
        assert!(d.sure_contains(1) && !d.sure_contains(2));
    }

    #[test]
    fn from_refs_collapses_unknown_offsets() {
        let nested = Expr::cell(Expr::cell(Expr::Const(7)));
        let set = CellSet::from_refs(nested.references().iter());
        assert!(set.sure_contains(7));
        assert!(set.unsure_has_bottom());
        assert!(!set.sure_has_bottom());
    }

    #[test]
    fn iteration_skips_bottom() {
        let mut set = CellSet::new();
        set.add_sure(4);
        set.add_sure_bottom();
        assert_eq!(set.iter_sure().collect::<Vec<_>>(), vec![4]);
    }
}
