//! tapc-par - Source Parser
//!
//! Turns tape-machine source into the initial IR tree. The tree the parser
//! delivers only contains `Adjust`, `MovePointer`, `Input`, `Output({0})`
//! and `While({0}; ...)` nodes; everything more specific is the
//! optimizer's business.
//!
//! Runs of `+ - > <` are merged into one node at parse time. This keeps
//! memory in check on machine-generated sources while still preserving the
//! original code: `>>>` is one `MovePointer(3)`, and `>>><<` stays two
//! nodes for the flatten pass to combine.

use thiserror::Error;

use tapc_ir::{Cond, Expr, Node, Program};

/// Bracket-matching failures, with the line the offender sits on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no matching [ for ] at line {line}")]
    UnmatchedClose { line: usize },
    #[error("unclosed [ at end of input")]
    UnclosedLoop,
}

/// Nested loop bodies under construction.
struct TreeBuilder {
    current: Vec<Node>,
    outer: Vec<Vec<Node>>,
}

impl TreeBuilder {
    fn new() -> TreeBuilder {
        TreeBuilder {
            current: Vec::new(),
            outer: Vec::new(),
        }
    }

    fn push(&mut self, node: Node) {
        self.current.push(node);
    }

    fn open_loop(&mut self) {
        self.outer.push(std::mem::take(&mut self.current));
    }

    fn close_loop(&mut self, line: usize) -> Result<(), ParseError> {
        match self.outer.pop() {
            Some(mut parent) => {
                let body = std::mem::replace(&mut self.current, Vec::new());
                parent.push(Node::While {
                    cond: Cond::cell_not_equal(0, 0),
                    body,
                });
                self.current = parent;
                Ok(())
            }
            None => Err(ParseError::UnmatchedClose { line }),
        }
    }

    fn finish(self) -> Result<Program, ParseError> {
        if self.outer.is_empty() {
            Ok(Program::new(self.current))
        } else {
            Err(ParseError::UnclosedLoop)
        }
    }
}

fn run_node(ch: u8, count: i64) -> Node {
    match ch {
        b'+' => Node::Adjust { offset: 0, delta: Expr::Const(count) },
        b'-' => Node::Adjust { offset: 0, delta: Expr::Const(-count) },
        b'>' => Node::MovePointer(count),
        _ => Node::MovePointer(-count),
    }
}

/// Parses the plain eight-instruction dialect. Every byte outside the
/// instruction set is a comment.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let mut tree = TreeBuilder::new();
    let mut line = 1usize;
    let mut run: Option<(u8, i64)> = None;

    for &ch in source.as_bytes() {
        if let Some((prev, count)) = run {
            if prev == ch {
                run = Some((prev, count + 1));
                continue;
            }
            tree.push(run_node(prev, count));
            run = None;
        }
        match ch {
            b'+' | b'-' | b'>' | b'<' => run = Some((ch, 1)),
            b'.' => tree.push(Node::Output(Expr::cell(0i64))),
            b',' => tree.push(Node::Input { offset: 0 }),
            b'[' => tree.open_loop(),
            b']' => tree.close_loop(line)?,
            b'\n' => line += 1,
            _ => {}
        }
    }
    if let Some((prev, count)) = run {
        tree.push(run_node(prev, count));
    }
    tree.finish()
}

/// Parses the run-length-encoded dialect: `+*12` stands for twelve `+`,
/// and likewise for `-`, `>` and `<`. The count must start with a non-zero
/// digit; otherwise the `*` is an ordinary comment.
pub fn parse_rle(source: &str) -> Result<Program, ParseError> {
    let bytes = source.as_bytes();
    let mut tree = TreeBuilder::new();
    let mut line = 1usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let ch = bytes[i];
        i += 1;
        match ch {
            b'+' | b'-' | b'>' | b'<' => {
                let mut count = 1i64;
                if i + 1 < bytes.len() && bytes[i] == b'*' && bytes[i + 1].is_ascii_digit() && bytes[i + 1] != b'0' {
                    let mut end = i + 2;
                    while end < bytes.len() && bytes[end].is_ascii_digit() {
                        end += 1;
                    }
                    if let Ok(parsed) = source[i + 1..end].parse::<i64>() {
                        count = parsed;
                        i = end;
                    }
                }
                tree.push(run_node(ch, count));
            }
            b'.' => tree.push(Node::Output(Expr::cell(0i64))),
            b',' => tree.push(Node::Input { offset: 0 }),
            b'[' => tree.open_loop(),
            b']' => tree.close_loop(line)?,
            b'\n' => line += 1,
            _ => {}
        }
    }
    tree.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_are_merged() {
        let program = parse("+++").unwrap();
        assert_eq!(program.to_string(), "Program[{0}+=3]");
        let program = parse("--").unwrap();
        assert_eq!(program.to_string(), "Program[{0}-=2]");
        let program = parse(">>>").unwrap();
        assert_eq!(program.to_string(), "Program[@3]");
        let program = parse("<<").unwrap();
        assert_eq!(program.to_string(), "Program[@-2]");
    }

    #[test]
    fn mixed_runs_stay_separate() {
        // >< sequences are left for the flatten pass
        let program = parse(">>><<").unwrap();
        assert_eq!(program.to_string(), "Program[@3, @-2]");
        let program = parse("+-").unwrap();
        assert_eq!(program.to_string(), "Program[{0}+=1, {0}-=1]");
    }

    #[test]
    fn io_and_loops() {
        let program = parse(",[.,]").unwrap();
        assert_eq!(
            program.to_string(),
            "Program[Input[0], While[{0}; Output[{0}], Input[0]]]"
        );
    }

    #[test]
    fn nested_loops() {
        let program = parse("[[-]]").unwrap();
        assert_eq!(
            program.to_string(),
            "Program[While[{0}; While[{0}; {0}-=1]]]"
        );
    }

    #[test]
    fn comments_are_ignored() {
        let program = parse("add two! + and + done").unwrap();
        // comment characters break a run apart
        assert_eq!(program.to_string(), "Program[{0}+=1, {0}+=1]");
    }

    #[test]
    fn unmatched_close_carries_the_line() {
        let err = parse("+\n+]\n").unwrap_err();
        assert_eq!(err, ParseError::UnmatchedClose { line: 2 });
    }

    #[test]
    fn unclosed_loop_is_reported() {
        assert_eq!(parse("[[]").unwrap_err(), ParseError::UnclosedLoop);
        assert!(parse("[]").is_ok());
    }

    #[test]
    fn empty_source() {
        assert_eq!(parse("").unwrap(), Program::default());
    }

    #[test]
    fn rle_counts() {
        let program = parse_rle("+*12>*3-*2<*4").unwrap();
        assert_eq!(
            program.to_string(),
            "Program[{0}+=12, @3, {0}-=2, @-4]"
        );
    }

    #[test]
    fn rle_rejects_leading_zero() {
        // "*0" is not a count; the star and digit read as comments
        let program = parse_rle("+*07").unwrap();
        assert_eq!(program.to_string(), "Program[{0}+=1]");
    }

    #[test]
    fn rle_plain_commands_still_work() {
        let program = parse_rle(",[.,]").unwrap();
        assert_eq!(
            program.to_string(),
            "Program[Input[0], While[{0}; Output[{0}], Input[0]]]"
        );
    }
}
