//! Output fusion: maximal runs of constant output collapse into one
//! literal byte string, which the emitter turns into a single `PUTS`.
//!
//! Pure nodes pass through a run without breaking it — moving a constant
//! write ahead of them changes nothing observable. Any other impure node
//! (an input, a loop that performs I/O) flushes the run first so the byte
//! order on the wire is preserved.

use tapc_ir::{Cursor, IrError, Node, Program};

use crate::{visit_post_order, Pass};

pub struct Stdlib;

impl Pass for Stdlib {
    fn name(&self) -> &'static str {
        "stdlib"
    }

    fn run(&self, program: &mut Program) -> Result<(), IrError> {
        visit_post_order(&mut program.body, &mut |block| {
            transform(block);
            Ok(())
        })
    }
}

fn transform(block: &mut Vec<Node>) {
    let mut pending: Vec<u8> = Vec::new();
    let mut cur = Cursor::new(block);
    while cur.advance() {
        enum Action {
            Take(u8),
            TakeStr,
            Flush,
            Keep,
        }
        let action = match cur.peek() {
            Node::Output(expr) => match expr.as_const() {
                Some(v) => Action::Take((v & 0xff) as u8),
                None => Action::Flush,
            },
            Node::OutputStr(_) => Action::TakeStr,
            node if !node.pure() => Action::Flush,
            _ => Action::Keep,
        };
        match action {
            Action::Take(byte) => {
                pending.push(byte);
                cur.remove();
            }
            Action::TakeStr => {
                if let Node::OutputStr(bytes) = std::mem::replace(cur.current(), Node::Nop) {
                    pending.extend(bytes);
                }
                cur.remove();
            }
            Action::Flush => {
                if !pending.is_empty() {
                    cur.prepend(vec![Node::OutputStr(std::mem::take(&mut pending))]);
                }
            }
            Action::Keep => {}
        }
    }
    if !pending.is_empty() {
        block.push(Node::OutputStr(pending));
    }
}
