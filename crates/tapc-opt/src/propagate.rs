//! Forward value propagation and store combining within one child list.
//!
//! Four tables ride along the cursor:
//! - `substs`: cell -> value known to hold at the cursor, substituted into
//!   every node as it is visited;
//! - `backrefs`: cell -> index of the latest Set/Adjust on it that a later
//!   store could still merge into;
//! - `usedrefs`: cell -> index of the latest node that read it (plus a
//!   side marker for reads through unknown offsets);
//! - `lastwrite`: cell -> index of the latest write of any kind, mergeable
//!   or not.
//!
//! MovePointer, loops and seeks are barriers: they clear every table, then
//! may seed `substs` with the one fact their own shape guarantees.

use rustc_hash::FxHashMap;

use tapc_ir::{expr, CellMap, CellWidth, Cond, Cursor, Expr, IrError, Node, Program};

use crate::cleanup::cleanup;
use crate::{visit_post_order, Pass};

pub struct Propagate {
    modulus: i64,
}

impl Propagate {
    pub fn new(width: CellWidth) -> Propagate {
        Propagate {
            modulus: width.modulus(),
        }
    }
}

impl Pass for Propagate {
    fn name(&self) -> &'static str {
        "propagate"
    }

    fn run(&self, program: &mut Program) -> Result<(), IrError> {
        let w = self.modulus;
        visit_post_order(&mut program.body, &mut |block| transform(block, w))
    }
}

/// A value is only "known" up to the cell modulus; reducing it on entry
/// keeps every comparison the tables feed consistent with the wraparound
/// the running program sees.
fn masked(value: Expr, w: i64) -> Expr {
    match value.as_const() {
        Some(c) => Expr::Const(expr::floor_mod(c, w)),
        None => value,
    }
}

fn transform(block: &mut Vec<Node>, w: i64) -> Result<(), IrError> {
    let mut backrefs: FxHashMap<i64, usize> = FxHashMap::default();
    let mut usedrefs: FxHashMap<i64, usize> = FxHashMap::default();
    let mut lastwrite: FxHashMap<i64, usize> = FxHashMap::default();
    let mut used_any: Option<usize> = None;
    let mut substs: CellMap = CellMap::default();

    let mut cur = Cursor::new(block);
    while cur.advance() {
        cur.current().withmemory(&substs)?;
        let i = cur.index();

        // an adjust on a cell with a known value strengthens into a store
        let strengthened = match cur.peek() {
            Node::Adjust { offset, delta } => substs
                .get(offset)
                .map(|known| (*offset, known.clone() + delta.clone())),
            _ => None,
        };
        if let Some((offset, summed)) = strengthened {
            if summed.simple() {
                cur.replace(vec![Node::Set { offset, value: summed }]);
            } else {
                substs.remove(&offset);
            }
        }

        let mut alters = false;
        let mut mergeable = false;
        let mut slot = 0i64;

        match cur.peek() {
            Node::Nop | Node::Output(_) => {}
            Node::Set { offset, value } => {
                alters = true;
                mergeable = true;
                slot = *offset;
                if value.simple() {
                    substs.insert(*offset, masked(value.clone(), w));
                } else {
                    substs.remove(offset);
                }
            }
            Node::Adjust { offset, .. } => {
                alters = true;
                mergeable = true;
                slot = *offset;
            }
            Node::Input { offset } => {
                alters = true;
                slot = *offset;
                substs.remove(offset);
            }
            barrier => {
                backrefs.clear();
                usedrefs.clear();
                lastwrite.clear();
                used_any = None;
                substs.clear();
                match barrier {
                    // the loop only exits once the cell reads the value
                    Node::While { cond: Cond::CellNotEqual { offset, value }, .. }
                    | Node::If { cond: Cond::CellNotEqual { offset, value }, .. } => {
                        substs.insert(*offset, Expr::Const(*value));
                    }
                    Node::Seek { target, value, .. } => {
                        substs.insert(*target, Expr::Const(*value));
                    }
                    _ => {}
                }
            }
        }

        let refs = cur.peek().postreferences();
        let mut merged_into: Option<usize> = None;
        if alters {
            if !mergeable {
                // nothing may merge across an input
                backrefs.remove(&slot);
            } else if let Some(&target) = backrefs.get(&slot) {
                // merging is sound when nothing read the slot since the
                // earlier store, and nothing rewrote a cell its new value
                // reads
                let unread = usedrefs.get(&slot).map_or(true, |&u| target >= u)
                    && used_any.map_or(true, |u| target >= u);
                let unclobbered = !refs.unsure_has_bottom()
                    && refs
                        .iter_unsure()
                        .all(|k| lastwrite.get(&k).map_or(true, |&w| target >= w));
                if unread && unclobbered {
                    match cur.peek().clone() {
                        Node::Adjust { delta, .. } => {
                            let earlier = cur.node(target);
                            match earlier {
                                Node::Set { value, .. } => *value = value.clone() + delta,
                                Node::Adjust { delta: sum, .. } => *sum = sum.clone() + delta,
                                _ => {}
                            }
                            if earlier.is_noop() {
                                *earlier = Node::Nop;
                            }
                        }
                        node => *cur.node(target) = node,
                    }
                    cur.remove();
                    merged_into = Some(target);
                }
            }
            if merged_into.is_none() && mergeable {
                backrefs.insert(slot, i);
            }
            lastwrite.insert(slot, merged_into.unwrap_or(i));
        }

        let used_at = merged_into.unwrap_or(i);
        for k in refs.iter_unsure() {
            usedrefs.insert(k, used_at);
        }
        if refs.unsure_has_bottom() {
            used_any = Some(used_at);
        }
    }

    cleanup(block);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(v: i64) -> Expr {
        Expr::Const(v)
    }

    fn m(k: i64) -> Expr {
        Expr::cell(c(k))
    }

    fn set(o: i64, v: i64) -> Node {
        Node::Set { offset: o, value: c(v) }
    }

    fn adj(o: i64, d: i64) -> Node {
        Node::Adjust { offset: o, delta: c(d) }
    }

    fn run(body: Vec<Node>) -> String {
        let mut program = Program::new(body);
        Propagate::new(CellWidth::W8).run(&mut program).unwrap();
        program.to_string()
    }

    #[test]
    fn adjusts_on_known_cells_become_stores() {
        assert_eq!(run(vec![set(0, 5), adj(0, 3)]), "Program[{0}=8]");
        assert_eq!(
            run(vec![set(0, 5), adj(0, 3), adj(0, -8)]),
            "Program[{0}=0]"
        );
    }

    #[test]
    fn adjacent_adjusts_merge() {
        assert_eq!(run(vec![adj(0, 2), adj(0, 3)]), "Program[{0}+=5]");
        assert_eq!(run(vec![adj(0, 2), adj(0, -2)]), "Program[]");
    }

    #[test]
    fn later_store_overwrites_earlier() {
        assert_eq!(run(vec![set(0, 1), set(0, 2)]), "Program[{0}=2]");
    }

    #[test]
    fn known_values_reach_outputs() {
        assert_eq!(
            run(vec![set(0, 64), Node::Output(m(0))]),
            "Program[{0}=64, Output[64]]"
        );
    }

    #[test]
    fn reads_between_stores_block_the_merge() {
        // the stored value is unknown, so the output keeps a live read of
        // cell 0 and the stores cannot collapse
        let body = vec![
            Node::Set { offset: 0, value: m(5) },
            Node::Output(m(0)),
            set(0, 2),
        ];
        assert_eq!(
            run(body),
            "Program[{0}={5}, Output[{0}], {0}=2]"
        );
    }

    #[test]
    fn value_dependencies_block_the_merge() {
        // the input rewrites cell 0, so the two writes of {0}'s value into
        // cell 1 must not collapse
        let body = vec![
            Node::Set { offset: 1, value: m(0) },
            Node::Input { offset: 0 },
            Node::Adjust { offset: 1, delta: m(0) },
        ];
        assert_eq!(
            run(body),
            "Program[{1}={0}, Input[0], {1}+={0}]"
        );
    }

    #[test]
    fn input_invalidates_knowledge() {
        assert_eq!(
            run(vec![set(0, 5), Node::Input { offset: 0 }, Node::Output(m(0))]),
            "Program[{0}=5, Input[0], Output[{0}]]"
        );
    }

    #[test]
    fn barriers_reset_but_seed_their_exit_fact() {
        // after the loop the counter cell reads zero
        let body = vec![
            Node::While {
                cond: Cond::cell_not_equal(0, 0),
                body: vec![adj(0, -1)],
            },
            Node::Output(m(0)),
        ];
        assert_eq!(
            run(body),
            "Program[While[{0}; {0}-=1], Output[0]]"
        );
    }

    #[test]
    fn seek_seeds_its_target_value() {
        let body = vec![
            Node::Seek { target: 0, stride: 1, value: 0 },
            Node::Output(m(0)),
        ];
        assert_eq!(run(body), "Program[Seek[{1*k}!=0], Output[0]]");
    }

    #[test]
    fn collapsed_while_is_cleaned_away() {
        let body = vec![
            set(0, 0),
            Node::While {
                cond: Cond::cell_not_equal(0, 0),
                body: vec![Node::Output(m(0))],
            },
        ];
        assert_eq!(run(body), "Program[{0}=0]");
    }

    #[test]
    fn substitution_reaches_loop_counts() {
        let body = vec![
            set(0, 6),
            Node::Repeat { count: m(0), body: vec![Node::Output(m(1))] },
        ];
        assert_eq!(
            run(body),
            "Program[{0}=6, Repeat[6; Output[{1}]]]"
        );
    }

    #[test]
    fn transfer_chains_collapse_to_constants() {
        // the flattened form of ++++++[->++<]
        let body = vec![
            set(0, 0),
            adj(0, 6),
            set(1, 0),
            Node::Adjust { offset: 1, delta: c(2) * m(0) },
            set(0, 0),
        ];
        assert_eq!(run(body), "Program[{0}=0, {1}=12]");
    }
}
