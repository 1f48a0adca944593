//! Canonical boolean predicates over tape cells.
//!
//! Conditions are layered on the expression algebra: every constructor
//! folds constants, absorbs additive terms into the right-hand side and
//! collapses degenerate interval sets, so structurally equal predicates are
//! semantically equal and usable as hash keys.

use std::collections::BTreeSet;
use std::fmt;

use crate::expr::{floor_div, CellMap, Expr, IrError, Linear};

/// An inclusive interval with optionally unbounded ends (`None` stands for
/// the infinity on that side).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    pub lo: Option<i64>,
    pub hi: Option<i64>,
}

impl Interval {
    pub fn new(lo: impl Into<Option<i64>>, hi: impl Into<Option<i64>>) -> Interval {
        Interval {
            lo: lo.into(),
            hi: hi.into(),
        }
    }

    pub fn point(v: i64) -> Interval {
        Interval::new(v, v)
    }

    fn is_empty(&self) -> bool {
        matches!((self.lo, self.hi), (Some(lo), Some(hi)) if lo > hi)
    }

    fn is_full(&self) -> bool {
        self.lo.is_none() && self.hi.is_none()
    }

    fn contains(&self, v: i64) -> bool {
        self.lo.map_or(true, |lo| lo <= v) && self.hi.map_or(true, |hi| v <= hi)
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    -floor_div(-a, b)
}

fn max_hi(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

/// Sorts, merges touching and overlapping intervals and drops empty ones.
fn normalize(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|iv| !iv.is_empty());
    intervals.sort();
    let mut out: Vec<Interval> = Vec::with_capacity(intervals.len());
    for iv in intervals {
        match out.last_mut() {
            Some(last) => {
                let touches = match (last.hi, iv.lo) {
                    (None, _) | (_, None) => true,
                    (Some(hi), Some(lo)) => lo <= hi.saturating_add(1),
                };
                if touches {
                    last.hi = max_hi(last.hi, iv.hi);
                } else {
                    out.push(iv);
                }
            }
            None => out.push(iv),
        }
    }
    out
}

/// Complement of a normalized interval union.
fn complement(intervals: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    let mut lo: Option<i64> = None;
    let mut open = true;
    for iv in intervals {
        if let Some(start) = iv.lo {
            let gap = Interval::new(lo, Some(start.saturating_sub(1)));
            if !gap.is_empty() {
                out.push(gap);
            }
        }
        match iv.hi {
            Some(end) => lo = Some(end.saturating_add(1)),
            None => {
                open = false;
                break;
            }
        }
    }
    if open {
        out.push(Interval::new(lo, None));
    }
    out
}

fn intersect(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    for ia in a {
        for ib in b {
            let lo = match (ia.lo, ib.lo) {
                (Some(x), Some(y)) => Some(x.max(y)),
                (Some(x), None) | (None, Some(x)) => Some(x),
                (None, None) => None,
            };
            let hi = match (ia.hi, ib.hi) {
                (Some(x), Some(y)) => Some(x.min(y)),
                (Some(x), None) | (None, Some(x)) => Some(x),
                (None, None) => None,
            };
            let iv = Interval::new(lo, hi);
            if !iv.is_empty() {
                out.push(iv);
            }
        }
    }
    normalize(out)
}

fn union(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = a.to_vec();
    out.extend_from_slice(b);
    normalize(out)
}

fn shift(intervals: &[Interval], d: i64) -> Vec<Interval> {
    intervals
        .iter()
        .map(|iv| {
            Interval::new(
                iv.lo.map(|v| v.saturating_add(d)),
                iv.hi.map(|v| v.saturating_add(d)),
            )
        })
        .collect()
}

/// Solution set for `a * t` inside each interval: bounds divide by `a`
/// rounding inward, the interval flips when `a` is negative.
fn divide(intervals: &[Interval], a: i64) -> Vec<Interval> {
    intervals
        .iter()
        .map(|iv| {
            if a > 0 {
                Interval::new(iv.lo.map(|v| ceil_div(v, a)), iv.hi.map(|v| floor_div(v, a)))
            } else {
                Interval::new(iv.hi.map(|v| ceil_div(v, a)), iv.lo.map(|v| floor_div(v, a)))
            }
        })
        .collect()
}

/// Preimage of an interval set under exact division by `c`.
fn scale(intervals: &[Interval], c: i64) -> Vec<Interval> {
    intervals
        .iter()
        .map(|iv| {
            if c > 0 {
                Interval::new(iv.lo.map(|v| v.saturating_mul(c)), iv.hi.map(|v| v.saturating_mul(c)))
            } else {
                Interval::new(iv.hi.map(|v| v.saturating_mul(c)), iv.lo.map(|v| v.saturating_mul(c)))
            }
        })
        .collect()
}

/// Preimage of an interval set under floor division by positive `c`:
/// `x / c` in `[m, M]` exactly when `x` is in `[m*c, (M+1)*c - 1]`.
fn widen(intervals: &[Interval], c: i64) -> Vec<Interval> {
    intervals
        .iter()
        .map(|iv| {
            Interval::new(
                iv.lo.map(|v| v.saturating_mul(c)),
                iv.hi
                    .map(|v| v.saturating_add(1).saturating_mul(c).saturating_sub(1)),
            )
        })
        .collect()
}

/// A canonical predicate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cond {
    Always,
    Never,
    /// `expr == value`, where the expression does not reduce further.
    Equal { expr: Expr, value: i64 },
    /// `expr != value`.
    NotEqual { expr: Expr, value: i64 },
    /// `{offset} == value`, the cell specialization.
    CellEqual { offset: i64, value: i64 },
    /// `{offset} != value`.
    CellNotEqual { offset: i64, value: i64 },
    /// `expr` lies in a sorted disjoint union of inclusive intervals.
    Range { expr: Expr, intervals: Vec<Interval> },
    /// Conjunction.
    All(Vec<Cond>),
    /// Disjunction.
    Any(Vec<Cond>),
}

enum Reduced {
    Decided(bool),
    Test(Expr, i64),
    Within(Expr, Vec<Interval>),
}

/// Absorbs additive constants into the right-hand side, divides constant
/// factors out (deciding the predicate when the target is not a multiple)
/// and folds division right-hand sides away.
fn reduce_equality(expr: Expr, value: i64) -> Reduced {
    match expr {
        Expr::Const(c) => Reduced::Decided(c == value),
        Expr::Linear(l) => {
            let rhs = value.wrapping_sub(l.base);
            if l.terms.len() == 1 {
                let (coeff, term) = l.terms[0].clone();
                if rhs % coeff == 0 {
                    reduce_equality(term, rhs / coeff)
                } else {
                    Reduced::Decided(false)
                }
            } else {
                Reduced::Test(Expr::Linear(Linear { base: 0, terms: l.terms }), rhs)
            }
        }
        Expr::Exact(a, b) => match b.as_const() {
            Some(c) => reduce_equality(*a, value.wrapping_mul(c)),
            None => Reduced::Test(Expr::Exact(a, b), value),
        },
        Expr::Div(a, b) => match b.as_const() {
            Some(c) if c > 0 => Reduced::Within(
                *a,
                vec![Interval::new(
                    value.saturating_mul(c),
                    value.saturating_mul(c).saturating_add(c - 1),
                )],
            ),
            _ => Reduced::Test(Expr::Div(a, b), value),
        },
        other => Reduced::Test(other, value),
    }
}

fn make_test(expr: Expr, value: i64, equal: bool) -> Cond {
    if let Expr::Cell(offset) = &expr {
        if let Some(k) = offset.as_const() {
            return if equal {
                Cond::CellEqual { offset: k, value }
            } else {
                Cond::CellNotEqual { offset: k, value }
            };
        }
    }
    if equal {
        Cond::Equal { expr, value }
    } else {
        Cond::NotEqual { expr, value }
    }
}

impl Cond {
    pub fn equal(expr: Expr, value: i64) -> Cond {
        match reduce_equality(expr, value) {
            Reduced::Decided(true) => Cond::Always,
            Reduced::Decided(false) => Cond::Never,
            Reduced::Test(e, v) => make_test(e, v, true),
            Reduced::Within(e, ivs) => Cond::range(e, ivs),
        }
    }

    pub fn not_equal(expr: Expr, value: i64) -> Cond {
        match reduce_equality(expr, value) {
            Reduced::Decided(true) => Cond::Never,
            Reduced::Decided(false) => Cond::Always,
            Reduced::Test(e, v) => make_test(e, v, false),
            Reduced::Within(e, ivs) => Cond::range(e, ivs).negate(),
        }
    }

    pub fn cell_equal(offset: i64, value: i64) -> Cond {
        Cond::CellEqual { offset, value }
    }

    pub fn cell_not_equal(offset: i64, value: i64) -> Cond {
        Cond::CellNotEqual { offset, value }
    }

    /// `expr` constrained to an interval union. Affine transforms of the
    /// subject fold into the endpoints and degenerate unions collapse.
    pub fn range(expr: Expr, intervals: Vec<Interval>) -> Cond {
        let ivs = normalize(intervals);
        match expr {
            Expr::Const(c) => {
                if ivs.iter().any(|iv| iv.contains(c)) {
                    Cond::Always
                } else {
                    Cond::Never
                }
            }
            Expr::Linear(l) => {
                let shifted = shift(&ivs, -l.base);
                if l.terms.len() == 1 {
                    let (coeff, term) = l.terms[0].clone();
                    Cond::range(term, divide(&shifted, coeff))
                } else {
                    finish_range(
                        Expr::Linear(Linear { base: 0, terms: l.terms }),
                        normalize(shifted),
                    )
                }
            }
            Expr::Exact(a, b) => match b.as_const() {
                Some(c) if c != 0 => Cond::range(*a, scale(&ivs, c)),
                _ => finish_range(Expr::Exact(a, b), ivs),
            },
            Expr::Div(a, b) => match b.as_const() {
                Some(c) if c > 0 => Cond::range(*a, widen(&ivs, c)),
                _ => finish_range(Expr::Div(a, b), ivs),
            },
            other => finish_range(other, ivs),
        }
    }

    /// Conjunction: flattens, absorbs constants, deduplicates and
    /// intersects interval families that share a subject expression.
    pub fn all(conds: Vec<Cond>) -> Cond {
        let mut flat = Vec::new();
        for cond in conds {
            match cond {
                Cond::Always => {}
                Cond::Never => return Cond::Never,
                Cond::All(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Cond::combine(flat, true)
    }

    /// Disjunction: the dual of [`Cond::all`].
    pub fn any(conds: Vec<Cond>) -> Cond {
        let mut flat = Vec::new();
        for cond in conds {
            match cond {
                Cond::Never => {}
                Cond::Always => return Cond::Always,
                Cond::Any(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Cond::combine(flat, false)
    }

    fn combine(conds: Vec<Cond>, conjunctive: bool) -> Cond {
        let mut families: Vec<(Expr, Vec<Interval>)> = Vec::new();
        let mut rest: Vec<Cond> = Vec::new();
        for cond in conds {
            match cond.as_intervals() {
                Some((subject, ivs)) => {
                    if let Some(entry) = families.iter_mut().find(|(e, _)| *e == subject) {
                        entry.1 = if conjunctive {
                            intersect(&entry.1, &ivs)
                        } else {
                            union(&entry.1, &ivs)
                        };
                    } else {
                        families.push((subject, ivs));
                    }
                }
                None => {
                    if !rest.contains(&cond) {
                        rest.push(cond);
                    }
                }
            }
        }

        let mut out = Vec::new();
        for (subject, ivs) in families {
            match Cond::range(subject, ivs) {
                Cond::Always if conjunctive => {}
                Cond::Never if !conjunctive => {}
                Cond::Always => return Cond::Always,
                Cond::Never => return Cond::Never,
                cond => out.push(cond),
            }
        }
        out.extend(rest);
        match out.len() {
            0 => {
                if conjunctive {
                    Cond::Always
                } else {
                    Cond::Never
                }
            }
            1 => out.remove(0),
            _ => {
                if conjunctive {
                    Cond::All(out)
                } else {
                    Cond::Any(out)
                }
            }
        }
    }

    /// The subject expression and interval set of a single comparison.
    fn as_intervals(&self) -> Option<(Expr, Vec<Interval>)> {
        match self {
            Cond::Equal { expr, value } => Some((expr.clone(), vec![Interval::point(*value)])),
            Cond::NotEqual { expr, value } => {
                Some((expr.clone(), complement(&[Interval::point(*value)])))
            }
            Cond::CellEqual { offset, value } => {
                Some((Expr::cell(*offset), vec![Interval::point(*value)]))
            }
            Cond::CellNotEqual { offset, value } => {
                Some((Expr::cell(*offset), complement(&[Interval::point(*value)])))
            }
            Cond::Range { expr, intervals } => Some((expr.clone(), intervals.clone())),
            _ => None,
        }
    }

    /// Logical negation. An involution on canonical conditions.
    pub fn negate(self) -> Cond {
        match self {
            Cond::Always => Cond::Never,
            Cond::Never => Cond::Always,
            Cond::Equal { expr, value } => Cond::NotEqual { expr, value },
            Cond::NotEqual { expr, value } => Cond::Equal { expr, value },
            Cond::CellEqual { offset, value } => Cond::CellNotEqual { offset, value },
            Cond::CellNotEqual { offset, value } => Cond::CellEqual { offset, value },
            Cond::Range { expr, intervals } => finish_range(expr, complement(&intervals)),
            Cond::All(conds) => Cond::any(conds.into_iter().map(Cond::negate).collect()),
            Cond::Any(conds) => Cond::all(conds.into_iter().map(Cond::negate).collect()),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Cond::Always)
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Cond::Never)
    }

    /// Offsets of the cells the predicate reads.
    pub fn references(&self) -> BTreeSet<Expr> {
        match self {
            Cond::Always | Cond::Never => BTreeSet::new(),
            Cond::Equal { expr, .. } | Cond::NotEqual { expr, .. } | Cond::Range { expr, .. } => {
                expr.references()
            }
            Cond::CellEqual { offset, .. } | Cond::CellNotEqual { offset, .. } => {
                let mut refs = BTreeSet::new();
                refs.insert(Expr::Const(*offset));
                refs
            }
            Cond::All(conds) | Cond::Any(conds) => {
                let mut refs = BTreeSet::new();
                for cond in conds {
                    refs.extend(cond.references());
                }
                refs
            }
        }
    }

    /// The same predicate after the pointer moved by `delta`.
    pub fn movepointer(&self, delta: i64) -> Cond {
        if delta == 0 {
            return self.clone();
        }
        match self {
            Cond::Always => Cond::Always,
            Cond::Never => Cond::Never,
            Cond::Equal { expr, value } => Cond::equal(expr.movepointer(delta), *value),
            Cond::NotEqual { expr, value } => Cond::not_equal(expr.movepointer(delta), *value),
            Cond::CellEqual { offset, value } => Cond::cell_equal(offset + delta, *value),
            Cond::CellNotEqual { offset, value } => Cond::cell_not_equal(offset + delta, *value),
            Cond::Range { expr, intervals } => {
                Cond::range(expr.movepointer(delta), intervals.clone())
            }
            Cond::All(conds) => Cond::all(conds.iter().map(|c| c.movepointer(delta)).collect()),
            Cond::Any(conds) => Cond::any(conds.iter().map(|c| c.movepointer(delta)).collect()),
        }
    }

    /// Substitutes known cell values into the predicate.
    pub fn withmemory(&self, map: &CellMap) -> Result<Cond, IrError> {
        Ok(match self {
            Cond::Always => Cond::Always,
            Cond::Never => Cond::Never,
            Cond::Equal { expr, value } => Cond::equal(expr.withmemory(map)?, *value),
            Cond::NotEqual { expr, value } => Cond::not_equal(expr.withmemory(map)?, *value),
            Cond::CellEqual { offset, value } => match map.get(offset) {
                Some(known) => Cond::equal(known.clone(), *value),
                None => self.clone(),
            },
            Cond::CellNotEqual { offset, value } => match map.get(offset) {
                Some(known) => Cond::not_equal(known.clone(), *value),
                None => self.clone(),
            },
            Cond::Range { expr, intervals } => {
                Cond::range(expr.withmemory(map)?, intervals.clone())
            }
            Cond::All(conds) => {
                let mut inner = Vec::with_capacity(conds.len());
                for cond in conds {
                    inner.push(cond.withmemory(map)?);
                }
                Cond::all(inner)
            }
            Cond::Any(conds) => {
                let mut inner = Vec::with_capacity(conds.len());
                for cond in conds {
                    inner.push(cond.withmemory(map)?);
                }
                Cond::any(inner)
            }
        })
    }
}

/// Final collapse for an interval predicate whose subject will not fold any
/// further.
fn finish_range(expr: Expr, intervals: Vec<Interval>) -> Cond {
    if intervals.is_empty() {
        return Cond::Never;
    }
    if intervals.len() == 1 {
        let iv = intervals[0];
        if iv.is_full() {
            return Cond::Always;
        }
        if let (Some(lo), Some(hi)) = (iv.lo, iv.hi) {
            if lo == hi {
                return make_test(expr, lo, true);
            }
        }
    }
    if intervals.len() == 2 {
        if let (None, Some(hi), Some(lo), None) =
            (intervals[0].lo, intervals[0].hi, intervals[1].lo, intervals[1].hi)
        {
            if lo == hi.saturating_add(2) {
                return make_test(expr, hi + 1, false);
            }
        }
    }
    Cond::Range { expr, intervals }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cond::Always => write!(f, "True"),
            Cond::Never => write!(f, "False"),
            Cond::Equal { expr, value } => write!(f, "{}=={}", expr, value),
            Cond::NotEqual { expr, value } => write!(f, "{}!={}", expr, value),
            Cond::CellEqual { offset, value } => write!(f, "{{{}}}=={}", offset, value),
            Cond::CellNotEqual { offset, value } => {
                if *value == 0 {
                    write!(f, "{{{}}}", offset)
                } else {
                    write!(f, "{{{}}}!={}", offset, value)
                }
            }
            Cond::Range { expr, intervals } => {
                write!(f, "{} in ", expr)?;
                for (i, iv) in intervals.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    match iv.lo {
                        Some(lo) => write!(f, "{}..", lo)?,
                        None => write!(f, "..")?,
                    }
                    if let Some(hi) = iv.hi {
                        write!(f, "{}", hi)?;
                    }
                }
                Ok(())
            }
            Cond::All(conds) => {
                write!(f, "(")?;
                for (i, cond) in conds.iter().enumerate() {
                    if i > 0 {
                        write!(f, " && ")?;
                    }
                    write!(f, "{}", cond)?;
                }
                write!(f, ")")
            }
            Cond::Any(conds) => {
                write!(f, "(")?;
                for (i, cond) in conds.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    write!(f, "{}", cond)?;
                }
                write!(f, ")")
            }
        }
    }
}
