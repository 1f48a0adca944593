//! Coalesces adjacent memory writes and pointer moves.
//!
//! A straight-line run of Set/Adjust/MovePointer nodes collapses into one
//! pending-change map keyed by the cell relative to the running pointer
//! offset. Anything else flushes the map in insertion order; the pointer
//! offset itself is pushed as far right as possible and only forced out in
//! front of a node that relocates the pointer unpredictably.

use indexmap::IndexMap;

use tapc_ir::{Expr, IrError, Node, Program};

use crate::{visit_post_order, Pass};

enum Change {
    Set(Expr),
    Shift(Expr),
}

pub struct Flatten;

impl Pass for Flatten {
    fn name(&self) -> &'static str {
        "flatten"
    }

    fn run(&self, program: &mut Program) -> Result<(), IrError> {
        visit_post_order(&mut program.body, &mut |block| {
            transform(block);
            Ok(())
        })
    }
}

fn flush(result: &mut Vec<Node>, changes: &mut IndexMap<i64, Change>) {
    for (cell, change) in changes.drain(..) {
        match change {
            Change::Set(value) => result.push(Node::Set { offset: cell, value }),
            Change::Shift(delta) => {
                if delta.as_const() != Some(0) {
                    result.push(Node::Adjust { offset: cell, delta });
                }
            }
        }
    }
}

fn transform(block: &mut Vec<Node>) {
    let mut result = Vec::with_capacity(block.len());
    let mut changes: IndexMap<i64, Change> = IndexMap::new();
    let mut offset = 0i64;

    for node in block.drain(..) {
        match node {
            Node::Set { offset: o, value } if value.simple() => {
                changes.insert(offset + o, Change::Set(value));
            }
            Node::Adjust { offset: o, delta } if delta.simple() => {
                let entry = changes.entry(offset + o);
                match entry.or_insert(Change::Shift(Expr::Const(0))) {
                    Change::Set(value) => *value = value.clone() + delta,
                    Change::Shift(sum) => *sum = sum.clone() + delta,
                }
            }
            Node::MovePointer(d) => offset += d,
            Node::Nop => {}
            mut other => {
                flush(&mut result, &mut changes);
                if other.offsets().is_none() {
                    // past this node the running offset no longer describes
                    // the pointer, so it has to materialize first
                    if offset != 0 {
                        result.push(Node::MovePointer(offset));
                        offset = 0;
                    }
                    result.push(other);
                } else {
                    other.movepointer(offset);
                    result.push(other);
                }
            }
        }
    }

    flush(&mut result, &mut changes);
    if offset != 0 {
        result.push(Node::MovePointer(offset));
    }
    *block = result;
}
