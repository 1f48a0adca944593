//! Dead-store elimination within a block.
//!
//! A store is dead once another store certainly overwrites its cell with no
//! possible read in between; the walk nops the earlier writer on the spot.
//! Nodes with unknown offsets are barriers that reset the bookkeeping.
//! Final stores are never removed — the tape state a program leaves behind
//! is part of its observable behavior — but pure pointer shuffling at the
//! end of the program is.

use rustc_hash::{FxHashMap, FxHashSet};

use tapc_ir::{Cursor, IrError, Node, Program};

use crate::cleanup::cleanup;
use crate::Pass;

pub struct RemoveDead;

impl Pass for RemoveDead {
    fn name(&self) -> &'static str {
        "removedead"
    }

    fn run(&self, program: &mut Program) -> Result<(), IrError> {
        recurse(&mut program.body, true);
        Ok(())
    }
}

fn recurse(children: &mut Vec<Node>, is_root: bool) {
    for child in children.iter_mut() {
        if let Node::If { body, .. } | Node::Repeat { body, .. } | Node::While { body, .. } =
            child
        {
            recurse(body, false);
        }
    }
    transform(children, is_root);
}

fn transform(block: &mut Vec<Node>, is_root: bool) {
    // cell -> index of the store whose value nothing has read yet
    let mut unusedcells: FxHashMap<i64, usize> = FxHashMap::default();
    let mut unusednodes: FxHashSet<usize> = FxHashSet::default();
    // trailing pure nodes that touch no cell at all
    let mut unusedmoves: Vec<usize> = Vec::new();

    let mut offsets = 0i64;
    let mut cur = Cursor::new(block);
    while cur.advance() {
        let i = cur.index();
        let ioffsets = cur.peek().offsets();
        match ioffsets {
            None => {
                unusedcells.clear();
                unusednodes.clear();
            }
            Some(d) => offsets += d,
        }

        let pure = cur.peek().pure() && cur.peek().returns();
        if pure {
            unusedmoves.push(i);
        }

        let irefs = cur.peek().postreferences();
        let iupdates = cur.peek().postupdates();
        let removable = pure && ioffsets == Some(0);
        if !irefs.is_empty() || !iupdates.is_empty() {
            unusedmoves.clear();
        }

        // whatever this node reads keeps its writer alive
        if irefs.unsure_has_bottom() {
            unusedcells.clear();
            unusednodes.clear();
        } else {
            for k in irefs.iter_unsure() {
                if let Some(writer) = unusedcells.remove(&(k + offsets)) {
                    unusednodes.remove(&writer);
                }
            }
        }

        // whatever it certainly overwrites kills the unread writer before it
        for k in iupdates.iter_sure() {
            let cell = k + offsets;
            if let Some(&old) = unusedcells.get(&cell) {
                if unusednodes.remove(&old) {
                    *cur.node(old) = Node::Nop;
                }
            }
            if removable {
                unusedcells.insert(cell, i);
                unusednodes.insert(i);
            }
        }
    }

    if is_root {
        for &i in &unusedmoves {
            block[i] = Node::Nop;
        }
    }

    cleanup(block);
}
