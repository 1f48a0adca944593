//! Seeds zero-value facts from the untouched initial tape.
//!
//! Later passes only know what the tree tells them, so every cell that is
//! read before anything writes it gets an explicit `Set(c, 0)` prepended.
//! Runs on the Program root only: the walk tracks offsets relative to the
//! pre-program pointer and stops as soon as a child makes them unknown.

use rustc_hash::FxHashSet;

use tapc_ir::{Cursor, Expr, IrError, Node, Program};

use crate::Pass;

pub struct InitialMemory;

impl Pass for InitialMemory {
    fn name(&self) -> &'static str {
        "initialmemory"
    }

    fn run(&self, program: &mut Program) -> Result<(), IrError> {
        let mut offsets = 0i64;
        let mut changed: FxHashSet<i64> = FxHashSet::default();
        let mut cur = Cursor::new(&mut program.body);
        while cur.advance() {
            let refs = cur.peek().prereferences().movepointer(offsets);
            let updates = cur.peek().preupdates().movepointer(offsets);

            let zerorefs: Vec<i64> = refs
                .iter_unsure()
                .filter(|k| !changed.contains(k))
                .collect();
            if !zerorefs.is_empty() {
                cur.prepend(
                    zerorefs
                        .iter()
                        .map(|&k| Node::Set { offset: k - offsets, value: Expr::Const(0) })
                        .collect(),
                );
                changed.extend(zerorefs);
            }
            changed.extend(updates.iter_unsure());

            match cur.peek().offsets() {
                Some(d) => offsets += d,
                None => break,
            }
        }
        Ok(())
    }
}
