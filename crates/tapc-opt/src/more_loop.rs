//! Peephole for directly nested conditionals.
//!
//! `If(c1, [If(c2, body)])` runs `body` exactly when both conditions hold,
//! so the pair collapses into one `If` over their conjunction. Working
//! bottom-up lets whole chains fold into a single node. Not part of the
//! fixed pipeline.

use tapc_ir::{Cond, Cursor, IrError, Node, Program};

use crate::{visit_post_order, Pass};

pub struct MoreLoop;

impl Pass for MoreLoop {
    fn name(&self) -> &'static str {
        "moreloop"
    }

    fn run(&self, program: &mut Program) -> Result<(), IrError> {
        visit_post_order(&mut program.body, &mut |block| {
            transform(block);
            Ok(())
        })
    }
}

fn transform(block: &mut Vec<Node>) {
    let mut cur = Cursor::new(block);
    while cur.advance() {
        let collapsible = matches!(
            cur.peek(),
            Node::If { body, .. } if body.len() == 1 && matches!(body[0], Node::If { .. })
        );
        if !collapsible {
            continue;
        }
        if let Node::If { cond, mut body } = std::mem::replace(cur.current(), Node::Nop) {
            if let Some(Node::If { cond: inner, body: inner_body }) = body.pop() {
                cur.replace(vec![Node::If {
                    cond: Cond::all(vec![cond, inner]),
                    body: inner_body,
                }]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapc_ir::Expr;

    fn adj(o: i64, d: i64) -> Node {
        Node::Adjust { offset: o, delta: Expr::Const(d) }
    }

    fn iff(cond: Cond, body: Vec<Node>) -> Node {
        Node::If { cond, body }
    }

    fn run(body: Vec<Node>) -> String {
        let mut program = Program::new(body);
        MoreLoop.run(&mut program).unwrap();
        program.to_string()
    }

    #[test]
    fn nested_ifs_conjoin() {
        let nested = iff(
            Cond::cell_not_equal(0, 0),
            vec![iff(Cond::cell_not_equal(1, 0), vec![adj(2, 1)])],
        );
        assert_eq!(
            run(vec![nested]),
            "Program[If[({0} && {1}); {2}+=1]]"
        );
    }

    #[test]
    fn chains_collapse_bottom_up() {
        let chain = iff(
            Cond::cell_not_equal(0, 0),
            vec![iff(
                Cond::cell_not_equal(1, 0),
                vec![iff(Cond::cell_not_equal(2, 0), vec![adj(3, 1)])],
            )],
        );
        assert_eq!(
            run(vec![chain]),
            "Program[If[({0} && {1} && {2}); {3}+=1]]"
        );
    }

    #[test]
    fn sibling_statements_block_the_fold() {
        let guarded = iff(
            Cond::cell_not_equal(0, 0),
            vec![
                adj(1, 1),
                iff(Cond::cell_not_equal(1, 0), vec![adj(2, 1)]),
            ],
        );
        assert_eq!(
            run(vec![guarded.clone()]),
            Program::new(vec![guarded]).to_string()
        );
    }

    #[test]
    fn duplicate_conditions_dedupe() {
        let nested = iff(
            Cond::cell_not_equal(0, 0),
            vec![iff(Cond::cell_not_equal(0, 0), vec![adj(1, 1)])],
        );
        assert_eq!(run(vec![nested]), "Program[If[{0}; {1}+=1]]");
    }
}
