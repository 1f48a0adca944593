//! Iteration-with-edit over the children of a complex node.
//!
//! Every pass walks child lists in order while inserting, replacing and
//! truncating around the current position. The cursor tracks the span
//! `[lo, hi)` it last produced; iteration resumes after that span, so newly
//! inserted predecessors are never revisited within the same walk.

use crate::node::Node;

pub struct Cursor<'a> {
    list: &'a mut Vec<Node>,
    lo: usize,
    hi: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(list: &'a mut Vec<Node>) -> Cursor<'a> {
        Cursor { list, lo: 0, hi: 0 }
    }

    /// Advances to the next child; false once the list is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.hi >= self.list.len() {
            return false;
        }
        self.lo = self.hi;
        self.hi = self.lo + 1;
        true
    }

    /// Index of the current child.
    pub fn index(&self) -> usize {
        self.lo
    }

    pub fn current(&mut self) -> &mut Node {
        &mut self.list[self.lo]
    }

    pub fn peek(&self) -> &Node {
        &self.list[self.lo]
    }

    /// Access to an already-visited child (passes patch earlier slots).
    pub fn node(&mut self, index: usize) -> &mut Node {
        &mut self.list[index]
    }

    /// Inserts before the current child; the cursor still points at it.
    pub fn prepend(&mut self, items: Vec<Node>) {
        let n = items.len();
        self.list.splice(self.lo..self.lo, items);
        self.lo += n;
        self.hi += n;
    }

    /// Inserts after the current span; the inserted nodes are visited next.
    pub fn append(&mut self, items: Vec<Node>) {
        self.list.splice(self.hi..self.hi, items);
    }

    /// Replaces the current span with zero or more nodes; iteration resumes
    /// after the replacement.
    pub fn replace(&mut self, items: Vec<Node>) {
        let n = items.len();
        self.list.splice(self.lo..self.hi, items);
        self.hi = self.lo + n;
    }

    /// Deletes the current span.
    pub fn remove(&mut self) {
        self.replace(Vec::new());
    }

    /// Deletes everything at and after the position following the current
    /// span.
    pub fn truncate(&mut self) {
        self.list.truncate(self.hi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(d: i64) -> Node {
        Node::MovePointer(d)
    }

    fn offsets(list: &[Node]) -> Vec<i64> {
        list.iter()
            .map(|n| match n {
                Node::MovePointer(d) => *d,
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn visits_in_order() {
        let mut list = vec![mv(1), mv(2), mv(3)];
        let mut cur = Cursor::new(&mut list);
        let mut seen = Vec::new();
        while cur.advance() {
            if let Node::MovePointer(d) = cur.peek() {
                seen.push(*d);
            }
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn replace_with_empty_deletes() {
        let mut list = vec![mv(1), mv(2), mv(3)];
        let mut cur = Cursor::new(&mut list);
        while cur.advance() {
            if matches!(cur.peek(), Node::MovePointer(2)) {
                cur.remove();
            }
        }
        assert_eq!(offsets(&list), vec![1, 3]);
    }

    #[test]
    fn replace_with_many_skips_insertions() {
        let mut list = vec![mv(1), mv(2)];
        let mut cur = Cursor::new(&mut list);
        let mut visited = Vec::new();
        while cur.advance() {
            if let Node::MovePointer(d) = *cur.peek() {
                visited.push(d);
                if d == 1 {
                    cur.replace(vec![mv(10), mv(11)]);
                }
            }
        }
        // the replacement nodes are not revisited
        assert_eq!(visited, vec![1, 2]);
        assert_eq!(offsets(&list), vec![10, 11, 2]);
    }

    #[test]
    fn prepend_is_not_revisited() {
        let mut list = vec![mv(1), mv(2)];
        let mut cur = Cursor::new(&mut list);
        let mut visited = Vec::new();
        while cur.advance() {
            if let Node::MovePointer(d) = *cur.peek() {
                visited.push(d);
                if d == 2 {
                    cur.prepend(vec![mv(20)]);
                }
            }
        }
        assert_eq!(visited, vec![1, 2]);
        assert_eq!(offsets(&list), vec![1, 20, 2]);
    }

    #[test]
    fn append_is_visited_next() {
        let mut list = vec![mv(1)];
        let mut cur = Cursor::new(&mut list);
        let mut visited = Vec::new();
        while cur.advance() {
            if let Node::MovePointer(d) = *cur.peek() {
                visited.push(d);
                if d == 1 {
                    cur.append(vec![mv(30)]);
                }
            }
        }
        assert_eq!(visited, vec![1, 30]);
    }

    #[test]
    fn truncate_drops_the_tail() {
        let mut list = vec![mv(1), mv(2), mv(3), mv(4)];
        let mut cur = Cursor::new(&mut list);
        while cur.advance() {
            if matches!(cur.peek(), Node::MovePointer(2)) {
                cur.truncate();
            }
        }
        assert_eq!(offsets(&list), vec![1, 2]);
    }
}
