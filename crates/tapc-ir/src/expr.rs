//! Canonical arithmetic terms over integer constants and tape cells.
//!
//! An expression is a pure r-value: it may read memory but never writes it
//! and never performs I/O. Every constructor returns an already-canonical
//! term, so two expressions are equal exactly when their shapes are equal
//! and they can be used as hash keys in cell-value maps.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors produced while building or rewriting IR terms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    /// An exact division was constructed over incompatible constants.
    ///
    /// Exact division carries divisibility as a precondition; hitting this
    /// means an optimization combined values it had no right to combine.
    #[error("exact division of {lhs} by {rhs} leaves remainder {rem}")]
    DivisibilityViolation { lhs: i64, rhs: i64, rem: i64 },
}

/// Known cell values, keyed by relative offset.
pub type CellMap = FxHashMap<i64, Expr>;

/// Floored quotient (rounds toward negative infinity, like the quotient the
/// emitted loops are derived from).
pub fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a % b != 0 && (a < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

/// Floored remainder; the result takes the divisor's sign.
pub fn floor_mod(a: i64, b: i64) -> i64 {
    a.wrapping_sub(b.wrapping_mul(floor_div(a, b)))
}

/// A canonical arithmetic term.
///
/// Invariants maintained by the smart constructors:
/// - constant folding is total: no variant ever holds two constant operands
///   it could have folded;
/// - `Linear` never nests a `Linear` and never holds a constant term; its
///   coefficients are non-zero; a lone coefficient-1 term with base 0
///   collapses to the term itself;
/// - `Product` never nests a `Product`, holds at least two factors, and
///   holds no integer factor (those are lifted into an enclosing `Linear`);
/// - a divisor of `1` or `-1` never survives construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    /// Integer constant.
    Const(i64),
    /// Value of the tape cell at the given relative offset. The offset is
    /// itself an expression; it is a constant in all but indirect cases.
    Cell(Box<Expr>),
    /// `base + sum(coeff * term)`.
    Linear(Linear),
    /// Product of two or more non-constant factors, sorted.
    Product(Vec<Expr>),
    /// Floor division.
    Div(Box<Expr>, Box<Expr>),
    /// Exact division: the left side is known to be a multiple of the right.
    Exact(Box<Expr>, Box<Expr>),
    /// Floored remainder.
    Mod(Box<Expr>, Box<Expr>),
}

/// The payload of [`Expr::Linear`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Linear {
    pub base: i64,
    /// Sorted by term; never empty.
    pub terms: Vec<(i64, Expr)>,
}

impl From<i64> for Expr {
    fn from(v: i64) -> Expr {
        Expr::Const(v)
    }
}

impl Expr {
    /// Reference to the cell at `offset`.
    pub fn cell(offset: impl Into<Expr>) -> Expr {
        Expr::Cell(Box::new(offset.into()))
    }

    /// The constant value, if this term reduces to one.
    pub fn as_const(&self) -> Option<i64> {
        match self {
            Expr::Const(c) => Some(*c),
            _ => None,
        }
    }

    /// True exactly when the term is a single integer.
    pub fn simple(&self) -> bool {
        matches!(self, Expr::Const(_))
    }

    fn into_linear_parts(self) -> (i64, Vec<(i64, Expr)>) {
        match self {
            Expr::Const(c) => (c, Vec::new()),
            Expr::Linear(l) => (l.base, l.terms),
            other => (0, vec![(1, other)]),
        }
    }

    /// Rebuilds a canonical linear combination: merges equal terms, drops
    /// zero coefficients and applies the collapse rules.
    fn make_linear(base: i64, mut terms: Vec<(i64, Expr)>) -> Expr {
        terms.sort_by(|a, b| a.1.cmp(&b.1));
        let mut merged: Vec<(i64, Expr)> = Vec::with_capacity(terms.len());
        for (coeff, term) in terms {
            match merged.last_mut() {
                Some(last) if last.1 == term => last.0 = last.0.wrapping_add(coeff),
                _ => merged.push((coeff, term)),
            }
        }
        merged.retain(|(coeff, _)| *coeff != 0);

        if merged.is_empty() {
            return Expr::Const(base);
        }
        if base == 0 && merged.len() == 1 && merged[0].0 == 1 {
            return merged.remove(0).1;
        }
        Expr::Linear(Linear {
            base,
            terms: merged,
        })
    }

    /// Multiplication by an integer.
    fn scaled(self, k: i64) -> Expr {
        match k {
            0 => Expr::Const(0),
            1 => self,
            _ => match self {
                Expr::Const(c) => Expr::Const(c.wrapping_mul(k)),
                Expr::Linear(l) => Expr::make_linear(
                    l.base.wrapping_mul(k),
                    l.terms
                        .into_iter()
                        .map(|(c, t)| (c.wrapping_mul(k), t))
                        .collect(),
                ),
                other => Expr::make_linear(0, vec![(k, other)]),
            },
        }
    }

    /// Splits a non-constant term into an integer coefficient and a flat
    /// factor list for product construction.
    fn into_factors(self) -> (i64, Vec<Expr>) {
        if let Expr::Linear(l) = &self {
            if l.base == 0 && l.terms.len() == 1 {
                let (coeff, term) = l.terms[0].clone();
                return match term {
                    Expr::Product(fs) => (coeff, fs),
                    other => (coeff, vec![other]),
                };
            }
        }
        match self {
            Expr::Product(fs) => (1, fs),
            other => (1, vec![other]),
        }
    }

    /// Floor division; `x/1`, `x/-1`, `0/x` and constant operands fold.
    pub fn floor_div(self, rhs: Expr) -> Expr {
        if let (Some(a), Some(b)) = (self.as_const(), rhs.as_const()) {
            if b != 0 {
                return Expr::Const(floor_div(a, b));
            }
        }
        match rhs.as_const() {
            Some(1) => return self,
            Some(-1) => return -self,
            _ => {}
        }
        if self.as_const() == Some(0) {
            return Expr::Const(0);
        }
        Expr::Div(Box::new(self), Box::new(rhs))
    }

    /// Exact division. Dividing incompatible constants is a hard failure;
    /// every other shape succeeds.
    pub fn exact_div(self, rhs: Expr) -> Result<Expr, IrError> {
        if let (Some(a), Some(b)) = (self.as_const(), rhs.as_const()) {
            if b != 0 {
                let rem = floor_mod(a, b);
                if rem != 0 {
                    return Err(IrError::DivisibilityViolation { lhs: a, rhs: b, rem });
                }
                return Ok(Expr::Const(floor_div(a, b)));
            }
        }
        match rhs.as_const() {
            Some(1) => return Ok(self),
            Some(-1) => return Ok(-self),
            _ => {}
        }
        if self.as_const() == Some(0) {
            return Ok(Expr::Const(0));
        }
        Ok(Expr::Exact(Box::new(self), Box::new(rhs)))
    }

    /// Floored remainder; constant operands fold, `x % ±1` is zero.
    pub fn modulo(self, rhs: Expr) -> Expr {
        if let (Some(a), Some(b)) = (self.as_const(), rhs.as_const()) {
            if b != 0 {
                return Expr::Const(floor_mod(a, b));
            }
        }
        if matches!(rhs.as_const(), Some(1) | Some(-1)) {
            return Expr::Const(0);
        }
        if self.as_const() == Some(0) {
            return Expr::Const(0);
        }
        Expr::Mod(Box::new(self), Box::new(rhs))
    }

    /// Offsets of every cell this term reads, transitively through nested
    /// references: `{{7}}` depends on cell `7` and on the cell `{7}` names.
    pub fn references(&self) -> BTreeSet<Expr> {
        let mut refs = BTreeSet::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, out: &mut BTreeSet<Expr>) {
        match self {
            Expr::Const(_) => {}
            Expr::Cell(offset) => {
                offset.collect_references(out);
                out.insert((**offset).clone());
            }
            Expr::Linear(l) => {
                for (_, term) in &l.terms {
                    term.collect_references(out);
                }
            }
            Expr::Product(factors) => {
                for f in factors {
                    f.collect_references(out);
                }
            }
            Expr::Div(a, b) | Expr::Exact(a, b) | Expr::Mod(a, b) => {
                a.collect_references(out);
                b.collect_references(out);
            }
        }
    }

    /// Whether the term reads the cell at constant offset `cell`.
    pub fn mentions(&self, cell: i64) -> bool {
        match self {
            Expr::Const(_) => false,
            Expr::Cell(offset) => offset.as_const() == Some(cell) || offset.mentions(cell),
            Expr::Linear(l) => l.terms.iter().any(|(_, t)| t.mentions(cell)),
            Expr::Product(factors) => factors.iter().any(|f| f.mentions(cell)),
            Expr::Div(a, b) | Expr::Exact(a, b) | Expr::Mod(a, b) => {
                a.mentions(cell) || b.mentions(cell)
            }
        }
    }

    /// The same term after the pointer moved by `delta`: every reference
    /// `{o}` becomes `{o.movepointer(delta) + delta}`.
    pub fn movepointer(&self, delta: i64) -> Expr {
        if delta == 0 {
            return self.clone();
        }
        match self {
            Expr::Const(c) => Expr::Const(*c),
            Expr::Cell(offset) => Expr::cell(offset.movepointer(delta) + Expr::Const(delta)),
            Expr::Linear(l) => l
                .terms
                .iter()
                .fold(Expr::Const(l.base), |acc, (coeff, term)| {
                    acc + term.movepointer(delta).scaled(*coeff)
                }),
            Expr::Product(factors) => factors
                .iter()
                .fold(Expr::Const(1), |acc, f| acc * f.movepointer(delta)),
            // Constness of both operands is preserved, so the canonical
            // shape survives a direct rebuild.
            Expr::Div(a, b) => {
                Expr::Div(Box::new(a.movepointer(delta)), Box::new(b.movepointer(delta)))
            }
            Expr::Exact(a, b) => {
                Expr::Exact(Box::new(a.movepointer(delta)), Box::new(b.movepointer(delta)))
            }
            Expr::Mod(a, b) => {
                Expr::Mod(Box::new(a.movepointer(delta)), Box::new(b.movepointer(delta)))
            }
        }
    }

    /// Substitutes known cell values and re-canonicalizes. Substitution can
    /// surface an exact division of incompatible constants, which is
    /// propagated as a hard failure.
    pub fn withmemory(&self, map: &CellMap) -> Result<Expr, IrError> {
        match self {
            Expr::Const(c) => Ok(Expr::Const(*c)),
            Expr::Cell(offset) => {
                let offset = offset.withmemory(map)?;
                if let Some(k) = offset.as_const() {
                    if let Some(value) = map.get(&k) {
                        return Ok(value.clone());
                    }
                }
                Ok(Expr::cell(offset))
            }
            Expr::Linear(l) => {
                let mut acc = Expr::Const(l.base);
                for (coeff, term) in &l.terms {
                    acc = acc + term.withmemory(map)?.scaled(*coeff);
                }
                Ok(acc)
            }
            Expr::Product(factors) => {
                let mut acc = Expr::Const(1);
                for f in factors {
                    acc = acc * f.withmemory(map)?;
                }
                Ok(acc)
            }
            Expr::Div(a, b) => Ok(a.withmemory(map)?.floor_div(b.withmemory(map)?)),
            Expr::Exact(a, b) => a.withmemory(map)?.exact_div(b.withmemory(map)?),
            Expr::Mod(a, b) => Ok(a.withmemory(map)?.modulo(b.withmemory(map)?)),
        }
    }

    /// For a self-referential update `cell <- f(cell)`, the inverse map
    /// from the new value back to the old one, if `f` is an invertible
    /// chain of linear and multiplicative steps in that cell.
    pub fn inverse(&self, cell: i64) -> Option<Expr> {
        self.invert(cell, Expr::cell(Expr::Const(cell)))
    }

    fn invert(&self, cell: i64, value: Expr) -> Option<Expr> {
        match self {
            Expr::Cell(offset) if offset.as_const() == Some(cell) => Some(value),
            Expr::Linear(l) => {
                let mut carrier: Option<&(i64, Expr)> = None;
                for entry in &l.terms {
                    if entry.1.mentions(cell) {
                        if carrier.is_some() {
                            return None;
                        }
                        carrier = Some(entry);
                    }
                }
                let (coeff, inner) = carrier?;
                let mut rest = value - Expr::Const(l.base);
                for (c, term) in &l.terms {
                    if !term.mentions(cell) {
                        rest = rest - term.clone().scaled(*c);
                    }
                }
                inner.invert(cell, rest.exact_div(Expr::Const(*coeff)).ok()?)
            }
            Expr::Product(factors) => {
                let mut carrier: Option<&Expr> = None;
                for f in factors {
                    if f.mentions(cell) {
                        if carrier.is_some() {
                            return None;
                        }
                        carrier = Some(f);
                    }
                }
                let inner = carrier?;
                let mut rest = value;
                for f in factors {
                    if !f.mentions(cell) {
                        rest = rest.exact_div(f.clone()).ok()?;
                    }
                }
                inner.invert(cell, rest)
            }
            Expr::Div(a, b) | Expr::Exact(a, b) => {
                if a.mentions(cell) && !b.mentions(cell) {
                    a.invert(cell, value * (**b).clone())
                } else if b.mentions(cell) && !a.mentions(cell) {
                    b.invert(cell, (**a).clone().exact_div(value).ok()?)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        let (base1, mut terms) = self.into_linear_parts();
        let (base2, terms2) = rhs.into_linear_parts();
        terms.extend(terms2);
        Expr::make_linear(base1.wrapping_add(base2), terms)
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self + (-rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        self.scaled(-1)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        if let Some(c) = self.as_const() {
            return rhs.scaled(c);
        }
        if let Some(c) = rhs.as_const() {
            return self.scaled(c);
        }
        let (coeff1, mut factors) = self.into_factors();
        let (coeff2, factors2) = rhs.into_factors();
        factors.extend(factors2);
        factors.sort();
        let product = if factors.len() == 1 {
            factors.remove(0)
        } else {
            Expr::Product(factors)
        };
        product.scaled(coeff1.wrapping_mul(coeff2))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Cell(offset) => write!(f, "{{{}}}", offset),
            Expr::Linear(l) => {
                for (i, (coeff, term)) in l.terms.iter().enumerate() {
                    match (*coeff, i) {
                        (1, 0) => write!(f, "{}", term)?,
                        (1, _) => write!(f, "+{}", term)?,
                        (-1, _) => write!(f, "-{}", term)?,
                        (c, 0) => write!(f, "{}*{}", c, term)?,
                        (c, _) if c > 0 => write!(f, "+{}*{}", c, term)?,
                        (c, _) => write!(f, "{}*{}", c, term)?,
                    }
                }
                match l.base {
                    0 => Ok(()),
                    b if b > 0 => write!(f, "+{}", b),
                    b => write!(f, "{}", b),
                }
            }
            Expr::Product(factors) => {
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    if matches!(factor, Expr::Linear(_)) {
                        write!(f, "({})", factor)?;
                    } else {
                        write!(f, "{}", factor)?;
                    }
                }
                Ok(())
            }
            Expr::Div(a, b) | Expr::Exact(a, b) => {
                write_operand(f, a)?;
                write!(f, "/")?;
                write_operand(f, b)
            }
            Expr::Mod(a, b) => {
                write_operand(f, a)?;
                write!(f, "%")?;
                write_operand(f, b)
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    if matches!(e, Expr::Const(_) | Expr::Cell(_)) {
        write!(f, "{}", e)
    } else {
        write!(f, "({})", e)
    }
}
