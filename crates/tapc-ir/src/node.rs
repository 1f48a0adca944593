//! The IR statement tree and its dataflow contract.
//!
//! Nodes own their children by value; passes mutate the tree in place
//! through the cursor. Expressions and conditions inside nodes are
//! immutable values that are replaced wholesale.

use std::fmt;

use crate::cellset::CellSet;
use crate::cond::Cond;
use crate::expr::{CellMap, Expr, IrError};

/// One statement of the IR.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Placeholder left behind by passes; cleanup removes it.
    Nop,
    /// Writes `value` into the cell at `offset`.
    Set { offset: i64, value: Expr },
    /// Adds `delta` to the cell at `offset`. Kept separate from `Set`
    /// because `({k}+d) - {k}` does not fold in general.
    Adjust { offset: i64, delta: Expr },
    /// Relocates the pointer.
    MovePointer(i64),
    /// Reads one byte of input into the cell at `offset`.
    Input { offset: i64 },
    /// Writes the expression, reduced to the cell modulus, to output.
    Output(Expr),
    /// Writes a literal byte string to output.
    OutputStr(Vec<u8>),
    /// Advances the pointer by multiples of `stride` from `target` until
    /// the referenced cell differs from `value`.
    Seek { target: i64, stride: i64, value: i64 },
    If { cond: Cond, body: Vec<Node> },
    Repeat { count: Expr, body: Vec<Node> },
    While { cond: Cond, body: Vec<Node> },
}

/// The root of an IR tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    pub body: Vec<Node>,
}

impl Program {
    pub fn new(body: Vec<Node>) -> Program {
        Program { body }
    }
}

/// Net pointer change of a child sequence per execution; `None` when any
/// child relocates the pointer unpredictably.
pub fn stride(children: &[Node]) -> Option<i64> {
    let mut total = 0i64;
    for child in children {
        total += child.offsets()?;
    }
    Some(total)
}

/// Forward-accumulated references of a body, relative to the pointer before
/// the first child. Gains bottom and stops at the first child with unknown
/// offsets.
pub fn body_prereferences(children: &[Node]) -> CellSet {
    let mut offsets = 0i64;
    let mut refs = CellSet::new();
    for child in children {
        refs.union_with(&child.prereferences().movepointer(offsets));
        match child.offsets() {
            Some(d) => offsets += d,
            None => {
                refs.add_sure_bottom();
                break;
            }
        }
    }
    refs
}

pub fn body_preupdates(children: &[Node]) -> CellSet {
    let mut offsets = 0i64;
    let mut updates = CellSet::new();
    for child in children {
        updates.union_with(&child.preupdates().movepointer(offsets));
        match child.offsets() {
            Some(d) => offsets += d,
            None => {
                updates.add_sure_bottom();
                break;
            }
        }
    }
    updates
}

/// The mirror image of [`body_prereferences`]: walks backwards, offsets
/// relative to the pointer after the last child.
pub fn body_postreferences(children: &[Node]) -> CellSet {
    let mut offsets = 0i64;
    let mut refs = CellSet::new();
    for child in children.iter().rev() {
        match child.offsets() {
            Some(d) => {
                offsets -= d;
                refs.union_with(&child.postreferences().movepointer(offsets));
            }
            None => {
                refs.add_sure_bottom();
                break;
            }
        }
    }
    refs
}

pub fn body_postupdates(children: &[Node]) -> CellSet {
    let mut offsets = 0i64;
    let mut updates = CellSet::new();
    for child in children.iter().rev() {
        match child.offsets() {
            Some(d) => {
                offsets -= d;
                updates.union_with(&child.postupdates().movepointer(offsets));
            }
            None => {
                updates.add_sure_bottom();
                break;
            }
        }
    }
    updates
}

fn shifted_sure_refs(set: &mut CellSet, refs: impl IntoIterator<Item = Expr>, delta: i64) {
    for r in refs {
        match r.as_const() {
            Some(k) => set.add_sure(k + delta),
            None => set.add_unsure_bottom(),
        }
    }
}

impl Node {
    /// True for nodes with no effect at all; cleanup deletes them.
    pub fn is_noop(&self) -> bool {
        match self {
            Node::Nop => true,
            Node::Adjust { delta, .. } => delta.as_const() == Some(0),
            Node::MovePointer(d) => *d == 0,
            Node::OutputStr(bytes) => bytes.is_empty(),
            Node::If { cond, body } => cond.is_never() || body.is_empty(),
            Node::Repeat { count, body } => count.as_const() == Some(0) || body.is_empty(),
            // an empty loop body still spins if the condition holds
            Node::While { cond, .. } => cond.is_never(),
            _ => false,
        }
    }

    /// False when the node or any child performs I/O.
    pub fn pure(&self) -> bool {
        match self {
            Node::Input { .. } | Node::Output(_) | Node::OutputStr(_) => false,
            Node::If { body, .. } | Node::Repeat { body, .. } | Node::While { body, .. } => {
                body.iter().all(Node::pure)
            }
            _ => true,
        }
    }

    /// False when the node is an infinite loop.
    pub fn returns(&self) -> bool {
        match self {
            Node::While { cond, .. } => !cond.is_always(),
            _ => true,
        }
    }

    /// Net pointer change caused by the node; `None` when unknown.
    pub fn offsets(&self) -> Option<i64> {
        match self {
            Node::MovePointer(d) => Some(*d),
            Node::Seek { .. } => None,
            Node::If { body, .. } | Node::Repeat { body, .. } | Node::While { body, .. } => {
                if stride(body) == Some(0) {
                    Some(0)
                } else {
                    None
                }
            }
            _ => Some(0),
        }
    }

    /// Shifts every inner cell reference by `delta`.
    pub fn movepointer(&mut self, delta: i64) {
        if delta == 0 {
            return;
        }
        match self {
            Node::Nop | Node::OutputStr(_) | Node::MovePointer(_) => {}
            Node::Set { offset, value } => {
                *offset += delta;
                *value = value.movepointer(delta);
            }
            Node::Adjust { offset, delta: amount } => {
                *offset += delta;
                *amount = amount.movepointer(delta);
            }
            Node::Input { offset } => *offset += delta,
            Node::Output(expr) => *expr = expr.movepointer(delta),
            Node::Seek { target, .. } => *target += delta,
            Node::If { cond, body } | Node::While { cond, body } => {
                *cond = cond.movepointer(delta);
                for child in body {
                    child.movepointer(delta);
                }
            }
            Node::Repeat { count, body } => {
                *count = count.movepointer(delta);
                for child in body {
                    child.movepointer(delta);
                }
            }
        }
    }

    /// Propagates known cell values into inner expressions. A While's
    /// condition is only replaced when it collapses to Never (the known
    /// values hold before the loop, not on re-entry).
    pub fn withmemory(&mut self, map: &CellMap) -> Result<(), IrError> {
        match self {
            Node::Set { value, .. } => *value = value.withmemory(map)?,
            Node::Adjust { delta, .. } => *delta = delta.withmemory(map)?,
            Node::Output(expr) => *expr = expr.withmemory(map)?,
            Node::If { cond, .. } => *cond = cond.withmemory(map)?,
            Node::While { cond, .. } => {
                let collapsed = cond.withmemory(map)?;
                if collapsed.is_never() {
                    *cond = collapsed;
                }
            }
            Node::Repeat { count, .. } => *count = count.withmemory(map)?,
            _ => {}
        }
        Ok(())
    }

    /// Cells possibly referenced, relative to the pointer before execution.
    pub fn prereferences(&self) -> CellSet {
        match self {
            Node::Set { value, .. } => CellSet::from_refs(value.references().iter()),
            Node::Adjust { offset, delta } => {
                let mut set = CellSet::from_refs(delta.references().iter());
                set.add_sure(*offset);
                set
            }
            Node::Output(expr) => CellSet::from_refs(expr.references().iter()),
            Node::Seek { target, .. } => {
                let mut set = CellSet::new();
                set.add_sure(*target);
                set.add_unsure_bottom();
                set
            }
            Node::If { cond, body } => {
                let mut set = CellSet::from_refs(cond.references().iter());
                set.absorb_unsure(&body_prereferences(body));
                set
            }
            Node::Repeat { count, body } => {
                let mut set = CellSet::from_refs(count.references().iter());
                set.absorb_unsure(&body_prereferences(body));
                if stride(body) != Some(0) {
                    set.add_unsure_bottom();
                }
                set
            }
            Node::While { cond, body } => {
                let mut set = CellSet::from_refs(cond.references().iter());
                set.absorb_unsure(&body_prereferences(body));
                if stride(body) != Some(0) {
                    set.add_unsure_bottom();
                }
                set
            }
            _ => CellSet::new(),
        }
    }

    /// Cells possibly referenced, relative to the pointer after execution.
    pub fn postreferences(&self) -> CellSet {
        match self {
            Node::If { cond, body } => {
                let mut set = CellSet::new();
                set.absorb_unsure(&body_postreferences(body));
                match stride(body) {
                    Some(s) => shifted_sure_refs(&mut set, cond.references(), -s),
                    None => set.add_sure_bottom(),
                }
                set
            }
            Node::Repeat { count, body } => {
                let mut set = CellSet::new();
                set.absorb_unsure(&body_postreferences(body));
                let s = stride(body);
                if let Some(s) = s {
                    shifted_sure_refs(&mut set, count.references(), -s);
                }
                if s != Some(0) {
                    set.add_unsure_bottom();
                }
                set
            }
            Node::While { cond, body } => {
                // the condition is evaluated at the final pointer position
                let mut set = CellSet::from_refs(cond.references().iter());
                set.absorb_unsure(&body_postreferences(body));
                if stride(body) != Some(0) {
                    set.add_unsure_bottom();
                }
                set
            }
            _ => self.prereferences(),
        }
    }

    /// Cells possibly updated, relative to the pointer before execution.
    pub fn preupdates(&self) -> CellSet {
        match self {
            Node::Set { offset, .. } | Node::Adjust { offset, .. } | Node::Input { offset } => {
                let mut set = CellSet::new();
                set.add_sure(*offset);
                set
            }
            Node::If { body, .. } => {
                let mut set = CellSet::new();
                set.absorb_unsure(&body_preupdates(body));
                set
            }
            Node::Repeat { body, .. } | Node::While { body, .. } => {
                let mut set = CellSet::new();
                set.absorb_unsure(&body_preupdates(body));
                if stride(body) != Some(0) {
                    set.add_unsure_bottom();
                }
                set
            }
            _ => CellSet::new(),
        }
    }

    /// Cells possibly updated, relative to the pointer after execution.
    pub fn postupdates(&self) -> CellSet {
        match self {
            Node::If { body, .. } => {
                let mut set = CellSet::new();
                set.absorb_unsure(&body_postupdates(body));
                set
            }
            Node::Repeat { body, .. } | Node::While { body, .. } => {
                let mut set = CellSet::new();
                set.absorb_unsure(&body_postupdates(body));
                if stride(body) != Some(0) {
                    set.add_unsure_bottom();
                }
                set
            }
            _ => self.preupdates(),
        }
    }
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &[Node]) -> fmt::Result {
    for (i, child) in body.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", child)?;
    }
    Ok(())
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}

// Display uses the brace notation of the expression layer: {0}=12, {0}+=1,
// @7, While[{0}; ...]. The optimizer tests assert on these strings.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Nop => write!(f, "Nop[]"),
            Node::Set { offset, value } => write!(f, "{{{}}}={}", offset, value),
            Node::Adjust { offset, delta } => match delta.as_const() {
                Some(d) if d < 0 => write!(f, "{{{}}}-={}", offset, -d),
                _ => write!(f, "{{{}}}+={}", offset, delta),
            },
            Node::MovePointer(d) => write!(f, "@{}", d),
            Node::Input { offset } => write!(f, "Input[{}]", offset),
            Node::Output(expr) => write!(f, "Output[{}]", expr),
            Node::OutputStr(bytes) => write!(f, "OutputStr[\"{}\"]", escape_bytes(bytes)),
            Node::Seek { target, stride, value } => {
                if *target == 0 {
                    write!(f, "Seek[{{{}*k}}!={}]", stride, value)
                } else {
                    write!(f, "Seek[{{{}+{}*k}}!={}]", target, stride, value)
                }
            }
            Node::If { cond, body } => {
                write!(f, "If[{}; ", cond)?;
                write_body(f, body)?;
                write!(f, "]")
            }
            Node::Repeat { count, body } => {
                write!(f, "Repeat[{}; ", count)?;
                write_body(f, body)?;
                write!(f, "]")
            }
            Node::While { cond, body } => {
                write!(f, "While[{}; ", cond)?;
                write_body(f, body)?;
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Program[")?;
        write_body(f, &self.body)?;
        write!(f, "]")
    }
}
