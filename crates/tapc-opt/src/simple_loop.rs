//! Recognizes the three reducible loop shapes.
//!
//! - `While({0} != v; MovePointer(s))` scans the tape: it becomes a Seek.
//! - A pure, stride-0 body that adjusts its own counter cell by a constant
//!   terminates after a computable number of iterations: the loop becomes a
//!   Repeat with an extended-gcd iteration count.
//! - A body that *sets* the counter to the condition value reduces to an
//!   If; setting it to anything else means the loop can never exit.
//!
//! Loops that do not exit are rewritten as `While(True)` behind a guard on
//! the original condition, so the may-not-enter case stays intact.

use tapc_ir::{expr, CellWidth, Cond, Cursor, Expr, IrError, Node, Program};

use crate::cleanup::cleanup;
use crate::{visit_post_order, Pass};

/// Extended Euclid with floored quotients: returns `(u, v, g)` with
/// `u*x + v*y = g`.
fn gcdex(mut x: i64, mut y: i64) -> (i64, i64, i64) {
    let (mut a, mut b) = (0i64, 1i64);
    let (mut c, mut d) = (1i64, 0i64);
    while x != 0 {
        let q = expr::floor_div(y, x);
        let r = expr::floor_mod(y, x);
        let u = a - c * q;
        let v = b - d * q;
        y = x;
        x = r;
        a = c;
        b = d;
        c = u;
        d = v;
    }
    (a, b, y)
}

#[derive(PartialEq)]
enum Mode {
    Adjust,
    Set,
    Unknown,
}

pub struct SimpleLoop {
    modulus: i64,
}

impl SimpleLoop {
    pub fn new(width: CellWidth) -> SimpleLoop {
        SimpleLoop {
            modulus: width.modulus(),
        }
    }
}

impl Pass for SimpleLoop {
    fn name(&self) -> &'static str {
        "simpleloop"
    }

    fn run(&self, program: &mut Program) -> Result<(), IrError> {
        let w = self.modulus;
        visit_post_order(&mut program.body, &mut |block| transform(block, w))
    }
}

fn transform(block: &mut Vec<Node>, w: i64) -> Result<(), IrError> {
    let mut cur = Cursor::new(block);
    while cur.advance() {
        let (target, value) = match cur.peek() {
            Node::While {
                cond: Cond::CellNotEqual { offset, value },
                ..
            } => (*offset, *value),
            _ => continue,
        };

        // the tape scan: [>] and friends
        if target == 0 {
            let scan_stride = match cur.peek() {
                Node::While { body, .. } => match body[..] {
                    [Node::MovePointer(s)] => Some(s),
                    _ => None,
                },
                _ => None,
            };
            if let Some(stride) = scan_stride {
                cur.replace(vec![Node::Seek { target: 0, stride, value }]);
                continue;
            }
        }

        if cur.peek().offsets() != Some(0) {
            continue;
        }

        // per-iteration effect on the counter cell
        let mut repeat_ok = true;
        let mut cell = Expr::Const(0);
        let mut mode = Mode::Adjust;
        if let Node::While { body, .. } = cur.peek() {
            for inode in body {
                match inode {
                    Node::Adjust { offset, delta } if *offset == target => {
                        cell = cell + delta.clone();
                    }
                    Node::Set { offset, value } if *offset == target => {
                        cell = value.clone();
                        mode = Mode::Set;
                    }
                    Node::Set { .. } | Node::Adjust { .. } => {}
                    other => {
                        if !other.pure() {
                            repeat_ok = false;
                        }
                        if other.offsets() != Some(0) {
                            repeat_ok = false;
                            mode = Mode::Unknown;
                        }
                        let updates = other.postupdates();
                        if updates.unsure_has_bottom() || updates.unsure_contains(target) {
                            repeat_ok = false;
                            mode = Mode::Unknown;
                        }
                    }
                }
                // anything that reads the counter beyond its own update
                // keeps the loop out of Repeat form
                let refs = inode.postreferences();
                let updates = inode.postupdates();
                if refs.unsure_has_bottom() && !updates.sure_has_bottom() {
                    repeat_ok = false;
                }
                if refs.unsure_contains(target) && !updates.sure_contains(target) {
                    repeat_ok = false;
                }
            }
        }

        let cell = match (&mode, cell.as_const()) {
            (Mode::Unknown, _) | (_, None) => continue,
            (_, Some(v)) => v,
        };
        let delta = expr::floor_mod(value - cell, w);

        match mode {
            Mode::Set => {
                let (cond, body) = match std::mem::replace(cur.current(), Node::Nop) {
                    Node::While { cond, body } => (cond, body),
                    _ => continue,
                };
                if delta == 0 {
                    // one pass through the body pins the counter to the
                    // exit value
                    cur.replace(vec![
                        Node::If { cond, body },
                        Node::Set { offset: target, value: Expr::Const(value) },
                    ]);
                } else {
                    // the counter never reaches the exit value once entered
                    let spin = if body.iter().all(Node::pure) {
                        Vec::new()
                    } else {
                        body
                    };
                    cur.replace(vec![Node::If {
                        cond,
                        body: vec![Node::While { cond: Cond::Always, body: spin }],
                    }]);
                }
            }
            Mode::Adjust if repeat_ok => {
                let (cond, body) = match std::mem::replace(cur.current(), Node::Nop) {
                    Node::While { cond, body } => (cond, body),
                    _ => continue,
                };
                if delta == 0 {
                    cur.replace(vec![Node::If {
                        cond,
                        body: vec![Node::While { cond: Cond::Always, body: Vec::new() }],
                    }]);
                    continue;
                }

                let (u, _, g) = gcdex(delta, w);
                // the iteration count solves j*delta = diff (mod W), which
                // is unique modulo W/g only; u is the inverse of delta/g
                // in that smaller ring
                let period = w / g;
                let diff = Expr::cell(target) - Expr::Const(value);
                let mut count = Expr::Const(expr::floor_mod(u, period))
                    * diff.clone().exact_div(Expr::Const(g))?;
                if g > 1 {
                    count = count.modulo(Expr::Const(period));
                }

                let others: Vec<Node> = body
                    .into_iter()
                    .filter(|inode| {
                        !matches!(inode,
                            Node::Set { offset, .. } | Node::Adjust { offset, .. }
                                if *offset == target)
                    })
                    .collect();

                let mut replacement = Vec::new();
                if g > 1 {
                    // iteration count only exists when the difference is a
                    // multiple of the gcd
                    replacement.push(Node::If {
                        cond: Cond::not_equal(diff.modulo(Expr::Const(g)), 0),
                        body: vec![Node::While { cond: Cond::Always, body: Vec::new() }],
                    });
                }
                if !others.is_empty() {
                    replacement.push(Node::Repeat { count, body: others });
                }
                replacement.push(Node::Set { offset: target, value: Expr::Const(value) });
                cur.replace(replacement);
            }
            _ => {}
        }
    }
    cleanup(block);
    Ok(())
}
