//! The shared invariant-restoration walk called at the end of most passes.
//!
//! One forward pass over a child list that removes no-ops, merges pointer
//! moves into the nodes that follow them, splices trivially-true Ifs,
//! unrolls constant-shaped Repeats and drops everything behind a
//! non-returning node. Not recursive.

use tapc_ir::{Cond, Cursor, Expr, Node};

/// Restores block-local invariants in place.
pub fn cleanup(children: &mut Vec<Node>) {
    let mut offsets = 0i64;
    let mut cur = Cursor::new(children);
    while cur.advance() {
        if cur.peek().is_noop() {
            cur.remove();
            continue;
        }

        cur.current().movepointer(offsets);
        if let Some(d) = cur.peek().offsets() {
            offsets += d;
        }
        if matches!(cur.peek(), Node::MovePointer(_)) {
            cur.remove();
            continue;
        }

        let returns = cur.peek().returns();

        let splice_if = matches!(cur.peek(), Node::If { cond, .. } if cond.is_always());
        if splice_if {
            if let Node::If { mut body, .. } = std::mem::replace(cur.current(), Node::Nop) {
                body.retain(|n| !n.is_noop());
                cur.replace(body);
            }
        } else if matches!(cur.peek(), Node::Repeat { .. }) {
            if let Node::Repeat { count, body } = std::mem::replace(cur.current(), Node::Nop) {
                match unroll_repeat(count, body) {
                    Ok(items) => cur.replace(items),
                    Err((count, body)) => *cur.current() = Node::Repeat { count, body },
                }
            }
        }

        // nothing after a non-returning node ever runs
        if !returns {
            cur.truncate();
            offsets = 0;
        }
    }

    if offsets != 0 {
        children.push(Node::MovePointer(offsets));
    }
}

/// Tries to lower `Repeat(count, body)` where the body is nothing but
/// constant-operand Set/Adjust nodes. Adjusts to cells the body never sets
/// accumulate linearly and are multiplied by the count; cells touched by a
/// Set reach the same state on every iteration past the first, so they are
/// kept as written. Without any Set the body splices into the parent;
/// otherwise one guarded `If(count != 0)` keeps the zero-iteration case
/// intact.
fn unroll_repeat(count: Expr, body: Vec<Node>) -> Result<Vec<Node>, (Expr, Vec<Node>)> {
    let mut has_set = false;
    let mut liftable = true;
    for inode in &body {
        match inode {
            Node::Set { value, .. } if value.simple() => has_set = true,
            Node::Adjust { delta, .. } if delta.simple() => {}
            _ => {
                liftable = false;
                break;
            }
        }
    }
    if !liftable {
        return Err((count, body));
    }

    let set_cells: Vec<i64> = body
        .iter()
        .filter_map(|n| match n {
            Node::Set { offset, .. } => Some(*offset),
            _ => None,
        })
        .collect();

    let mut items: Vec<Node> = body
        .into_iter()
        .map(|node| match node {
            Node::Adjust { offset, delta } if !set_cells.contains(&offset) => Node::Adjust {
                offset,
                delta: delta * count.clone(),
            },
            other => other,
        })
        .collect();
    items.retain(|n| !n.is_noop());

    if !has_set {
        return Ok(items);
    }
    Ok(match Cond::not_equal(count, 0) {
        Cond::Always => items,
        Cond::Never => Vec::new(),
        cond => vec![Node::If { cond, body: items }],
    })
}
