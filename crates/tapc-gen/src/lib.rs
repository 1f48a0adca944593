//! tapc-gen - C Code Emitter
//!
//! Renders a fully optimized IR tree as one self-contained C translation
//! unit: a 30000-cell tape of fixed-width unsigned cells, a `main` that
//! walks it, and the three I/O macros, each declared only when some node
//! actually uses it. Emission cannot fail; everything dubious was
//! resolved before the tree got here.

use std::fmt::Write as _;

use tapc_ir::expr::Linear;
use tapc_ir::{CellWidth, Cond, Expr, Node, Program};

/// Number of tape cells the generated program allocates.
const TAPE_CELLS: usize = 30000;

pub struct Emitter {
    cell_width: CellWidth,
    debug: bool,
}

struct Writer {
    buf: String,
    indent: usize,
    getc_used: bool,
    putc_used: bool,
    puts_used: bool,
    next_var: usize,
}

impl Emitter {
    pub fn new(cell_width: CellWidth, debug: bool) -> Emitter {
        Emitter { cell_width, debug }
    }

    /// Produces the complete C source for the program.
    pub fn emit(&self, program: &Program) -> String {
        let mut w = Writer {
            buf: String::new(),
            indent: 0,
            getc_used: false,
            putc_used: false,
            puts_used: false,
            next_var: 0,
        };

        w.line(&format!(
            "static uint{}_t m[{}], *p = m;",
            self.cell_width.bits(),
            TAPE_CELLS
        ));
        w.line("int main(void) {");
        w.indent += 1;
        let mut returns = true;
        for child in &program.body {
            self.emit_node(&mut w, child);
            returns &= child.returns();
        }
        if returns {
            w.line("return 0;");
        }
        w.indent -= 1;
        w.line("}");

        let mut out = String::from("/* generated by tapc */\n");
        out.push_str("#include <stdio.h>\n");
        out.push_str("#include <stdint.h>\n");
        if w.getc_used {
            out.push_str("#define GETC() (fflush(stdout), fgetc(stdin))\n");
        }
        if w.putc_used {
            out.push_str("#define PUTC(c) fputc(c, stdout)\n");
        }
        if w.puts_used {
            out.push_str("#define PUTS(s) fwrite(s, 1, sizeof(s)-1, stdout)\n");
        }
        out.push_str(&w.buf);
        out
    }

    fn emit_node(&self, w: &mut Writer, node: &Node) {
        match node {
            Node::Nop => {}
            Node::Set { offset, value } => {
                w.line(&format!("p[{}] = {};", offset, c_expr(value)));
            }
            Node::Adjust { offset, delta } => {
                if let Some(stmt) = format_adjust(&format!("p[{}]", offset), delta) {
                    w.line(&format!("{};", stmt));
                }
            }
            Node::MovePointer(d) => {
                if let Some(stmt) = format_adjust("p", &Expr::Const(*d)) {
                    w.line(&format!("{};", stmt));
                }
            }
            Node::Input { offset } => {
                w.getc_used = true;
                w.line(&format!("p[{}] = GETC();", offset));
            }
            Node::Output(expr) => {
                w.putc_used = true;
                w.line(&format!("PUTC({});", c_expr(expr)));
            }
            Node::OutputStr(bytes) => {
                w.puts_used = true;
                // one PUTS per output line keeps the source readable
                for chunk in split_keeping_newlines(bytes) {
                    w.line(&format!("PUTS(\"{}\");", escape_c(chunk)));
                }
            }
            Node::Seek { target, stride, value } => {
                let step = format_adjust("p", &Expr::Const(*stride))
                    .unwrap_or_else(|| String::from("p += 0"));
                w.line(&format!("while (p[{}] != {}) {};", target, value, step));
            }
            Node::If { cond, body } => {
                if self.debug {
                    self.dump_complex(w, node, body);
                }
                w.line(&format!("if ({}) {{", c_cond(cond)));
                w.indent += 1;
                for child in body {
                    self.emit_node(w, child);
                }
                w.indent -= 1;
                w.line("}");
            }
            Node::Repeat { count, body } => {
                if self.debug {
                    self.dump_complex(w, node, body);
                }
                // cell values are in range already; everything else is
                // reduced by the modulus
                let bound = match count {
                    Expr::Cell(_) => count.clone(),
                    _ => count.clone().modulo(Expr::Const(self.cell_width.modulus())),
                };
                let var = w.new_variable("loopcnt");
                w.line(&format!(
                    "for ({} = {}; {} > 0; --{}) {{",
                    var,
                    c_expr(&bound),
                    var,
                    var
                ));
                w.indent += 1;
                for child in body {
                    self.emit_node(w, child);
                }
                w.indent -= 1;
                w.line("}");
            }
            Node::While { cond, body } => {
                if self.debug {
                    self.dump_complex(w, node, body);
                }
                if cond.is_always() && body.is_empty() {
                    w.line("while (1); /* infinite loop */");
                    return;
                }
                w.line(&format!("while ({}) {{", c_cond(cond)));
                w.indent += 1;
                for child in body {
                    self.emit_node(w, child);
                }
                w.indent -= 1;
                w.line("}");
            }
        }
    }

    fn dump_complex(&self, w: &mut Writer, node: &Node, body: &[Node]) {
        match tapc_ir::node::stride(body) {
            None => w.line("// stride: unknown"),
            Some(0) => {}
            Some(s) => w.line(&format!("// stride: {}", s)),
        }
        let updates = node.postupdates();
        if !updates.is_empty() {
            let mut cells: Vec<String> =
                updates.iter_unsure().map(|k| k.to_string()).collect();
            if updates.unsure_has_bottom() {
                cells.push(String::from("..."));
            }
            w.line(&format!("// clobbers: {}", cells.join(", ")));
        }
    }
}

impl Writer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.buf.push('\t');
        }
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    fn new_variable(&mut self, prefix: &str) -> String {
        let name = format!("{}{}", prefix, self.next_var);
        self.next_var += 1;
        self.line(&format!("int {};", name));
        name
    }
}

/// `++x`, `--x`, `x += n`, `x -= n`; `None` when the delta is zero.
fn format_adjust(target: &str, delta: &Expr) -> Option<String> {
    match delta.as_const() {
        Some(0) => None,
        Some(1) => Some(format!("++{}", target)),
        Some(-1) => Some(format!("--{}", target)),
        Some(d) if d < 0 => Some(format!("{} -= {}", target, -d)),
        _ => {
            let rendered = c_expr(delta);
            match rendered.strip_prefix('-') {
                Some(positive) => Some(format!("{} -= {}", target, positive)),
                None => Some(format!("{} += {}", target, rendered)),
            }
        }
    }
}

/// Renders an expression as C, parenthesizing by precedence.
fn c_expr(e: &Expr) -> String {
    match e {
        Expr::Const(c) => c.to_string(),
        Expr::Cell(offset) => format!("p[{}]", c_expr(offset)),
        Expr::Linear(l) => c_linear(l),
        Expr::Product(factors) => {
            let parts: Vec<String> = factors.iter().map(c_factor).collect();
            parts.join("*")
        }
        Expr::Div(a, b) | Expr::Exact(a, b) => format!("{}/{}", c_factor(a), c_factor(b)),
        Expr::Mod(a, b) => format!("{}%{}", c_factor(a), c_factor(b)),
    }
}

fn c_linear(l: &Linear) -> String {
    let mut out = String::new();
    for (coeff, term) in &l.terms {
        let rendered = c_factor(term);
        match *coeff {
            1 => {
                if !out.is_empty() {
                    out.push('+');
                }
                out.push_str(&rendered);
            }
            -1 => {
                out.push('-');
                out.push_str(&rendered);
            }
            c => {
                if c > 0 && !out.is_empty() {
                    out.push('+');
                }
                let _ = write!(out, "{}*{}", c, rendered);
            }
        }
    }
    if l.base != 0 {
        if l.base > 0 {
            let _ = write!(out, "+{}", l.base);
        } else {
            let _ = write!(out, "{}", l.base);
        }
    }
    out
}

/// An expression in multiplicative position: sums and negative constants
/// need parentheses.
fn c_factor(e: &Expr) -> String {
    match e {
        Expr::Const(c) if *c < 0 => format!("({})", c),
        Expr::Const(_) | Expr::Cell(_) => c_expr(e),
        _ => format!("({})", c_expr(e)),
    }
}

fn c_cond(cond: &Cond) -> String {
    match cond {
        Cond::Always => String::from("1"),
        Cond::Never => String::from("0"),
        Cond::Equal { expr, value } => format!("{} == {}", c_expr(expr), value),
        Cond::NotEqual { expr, value } => format!("{} != {}", c_expr(expr), value),
        Cond::CellEqual { offset, value } => format!("p[{}] == {}", offset, value),
        Cond::CellNotEqual { offset, value } => {
            if *value == 0 {
                format!("p[{}]", offset)
            } else {
                format!("p[{}] != {}", offset, value)
            }
        }
        Cond::Range { expr, intervals } => {
            let subject = c_expr(expr);
            let clauses: Vec<String> = intervals
                .iter()
                .map(|iv| match (iv.lo, iv.hi) {
                    (Some(lo), Some(hi)) => {
                        format!("({} <= {} && {} <= {})", lo, subject, subject, hi)
                    }
                    (Some(lo), None) => format!("{} <= {}", lo, subject),
                    (None, Some(hi)) => format!("{} <= {}", subject, hi),
                    (None, None) => String::from("1"),
                })
                .collect();
            clauses.join(" || ")
        }
        Cond::All(conds) => {
            let parts: Vec<String> = conds.iter().map(|c| format!("({})", c_cond(c))).collect();
            parts.join(" && ")
        }
        Cond::Any(conds) => {
            let parts: Vec<String> = conds.iter().map(|c| format!("({})", c_cond(c))).collect();
            parts.join(" || ")
        }
    }
}

/// Splits a byte string after every newline, so each PUTS covers one line.
fn split_keeping_newlines(bytes: &[u8]) -> Vec<&[u8]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            chunks.push(&bytes[start..=i]);
            start = i + 1;
        }
    }
    if start < bytes.len() {
        chunks.push(&bytes[start..]);
    }
    chunks
}

fn escape_c(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            0 => out.push_str("\\0"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            }
        }
    }
    out
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

    fn emit(body: Vec<Node>) -> String {
        Emitter::new(CellWidth::W8, false).emit(&Program::new(body))
    }

    #[test]
    fn empty_program_scaffolding() {
        let out = emit(vec![]);
        assert!(out.starts_with("/* generated by tapc */\n"));
        assert!(out.contains("#include <stdio.h>"));
        assert!(out.contains("#include <stdint.h>"));
        assert!(out.contains("static uint8_t m[30000], *p = m;"));
        assert!(out.contains("int main(void) {"));
        assert!(out.contains("\treturn 0;"));
        // no I/O, no macros
        assert!(!out.contains("GETC"));
        assert!(!out.contains("PUTC"));
        assert!(!out.contains("PUTS"));
    }

    #[test]
    fn cell_width_picks_the_type() {
        let out = Emitter::new(CellWidth::W16, false).emit(&Program::new(vec![]));
        assert!(out.contains("static uint16_t m[30000]"));
        let out = Emitter::new(CellWidth::W32, false).emit(&Program::new(vec![]));
        assert!(out.contains("static uint32_t m[30000]"));
    }

    #[test]
    fn stores_and_adjusts() {
        let out = emit(vec![
            Node::Set { offset: 0, value: c(64) },
            Node::Adjust { offset: 1, delta: c(1) },
            Node::Adjust { offset: 2, delta: c(-1) },
            Node::Adjust { offset: 3, delta: c(5) },
            Node::Adjust { offset: 4, delta: c(-5) },
        ]);
        assert!(out.contains("p[0] = 64;"));
        assert!(out.contains("++p[1];"));
        assert!(out.contains("--p[2];"));
        assert!(out.contains("p[3] += 5;"));
        assert!(out.contains("p[4] -= 5;"));
    }

    #[test]
    fn expression_stores() {
        let out = emit(vec![Node::Set {
            offset: 1,
            value: m(0) * c(2) + c(6),
        }]);
        assert!(out.contains("p[1] = 2*p[0]+6;"));
        let out = emit(vec![Node::Adjust {
            offset: 1,
            delta: m(0).floor_div(c(2)),
        }]);
        assert!(out.contains("p[1] += p[0]/2;"));
        let out = emit(vec![Node::Adjust { offset: 1, delta: -m(0) }]);
        assert!(out.contains("p[1] -= p[0];"));
    }

    #[test]
    fn pointer_moves() {
        let out = emit(vec![Node::MovePointer(3)]);
        assert!(out.contains("p += 3;"));
        let out = emit(vec![Node::MovePointer(-1)]);
        assert!(out.contains("--p;"));
    }

    #[test]
    fn io_nodes_pull_their_macros() {
        let out = emit(vec![Node::Input { offset: 0 }]);
        assert!(out.contains("#define GETC() (fflush(stdout), fgetc(stdin))"));
        assert!(out.contains("p[0] = GETC();"));

        let out = emit(vec![Node::Output(m(0))]);
        assert!(out.contains("#define PUTC(c) fputc(c, stdout)"));
        assert!(out.contains("PUTC(p[0]);"));

        let out = emit(vec![Node::OutputStr(b"Hello\nWorld".to_vec())]);
        assert!(out.contains("#define PUTS(s) fwrite(s, 1, sizeof(s)-1, stdout)"));
        assert!(out.contains("PUTS(\"Hello\\n\");"));
        assert!(out.contains("PUTS(\"World\");"));
    }

    #[test]
    fn string_escapes() {
        let out = emit(vec![Node::OutputStr(b"\"\\\x07\x00".to_vec())]);
        assert!(out.contains("PUTS(\"\\\"\\\\\\007\\0\");"));
    }

    #[test]
    fn seek_loops() {
        let out = emit(vec![Node::Seek { target: 0, stride: 2, value: 0 }]);
        assert!(out.contains("while (p[0] != 0) p += 2;"));
        let out = emit(vec![Node::Seek { target: 1, stride: -1, value: 3 }]);
        assert!(out.contains("while (p[1] != 3) --p;"));
    }

    #[test]
    fn conditionals() {
        let out = emit(vec![Node::If {
            cond: Cond::cell_not_equal(0, 0),
            body: vec![Node::Set { offset: 0, value: c(1) }],
        }]);
        assert!(out.contains("if (p[0]) {"));
        assert!(out.contains("\t\tp[0] = 1;"));

        let out = emit(vec![Node::If {
            cond: Cond::cell_not_equal(0, 5),
            body: vec![Node::Nop],
        }]);
        assert!(out.contains("if (p[0] != 5) {"));
    }

    #[test]
    fn repeat_masks_its_count() {
        let out = emit(vec![Node::Repeat {
            count: m(0) * c(3),
            body: vec![Node::Adjust { offset: 1, delta: c(1) }],
        }]);
        assert!(out.contains("int loopcnt0;"));
        assert!(
            out.contains("for (loopcnt0 = (3*p[0])%256; loopcnt0 > 0; --loopcnt0) {"),
            "{}",
            out
        );

        // a bare cell value is already below the modulus
        let out = emit(vec![Node::Repeat {
            count: m(0),
            body: vec![Node::Adjust { offset: 1, delta: c(1) }],
        }]);
        assert!(out.contains("for (loopcnt0 = p[0]; loopcnt0 > 0; --loopcnt0) {"));
    }

    #[test]
    fn while_loops() {
        let out = emit(vec![Node::While {
            cond: Cond::cell_not_equal(0, 0),
            body: vec![Node::Adjust { offset: 0, delta: c(-1) }],
        }]);
        assert!(out.contains("while (p[0]) {"));
        assert!(out.contains("--p[0];"));

        let out = emit(vec![Node::While { cond: Cond::Always, body: vec![] }]);
        assert!(out.contains("while (1); /* infinite loop */"));
        // an unconditional hang means main never returns
        assert!(!out.contains("return 0;"));
    }

    #[test]
    fn debug_annotations() {
        let noisy = Node::While {
            cond: Cond::cell_not_equal(0, 0),
            body: vec![
                Node::Adjust { offset: 1, delta: c(1) },
                Node::MovePointer(2),
            ],
        };
        let out = Emitter::new(CellWidth::W8, true).emit(&Program::new(vec![noisy]));
        assert!(out.contains("// stride: 2"));
        assert!(out.contains("// clobbers:"));

        let quiet = Emitter::new(CellWidth::W8, false).emit(&Program::new(vec![Node::While {
            cond: Cond::cell_not_equal(0, 0),
            body: vec![Node::Adjust { offset: 1, delta: c(1) }],
        }]));
        assert!(!quiet.contains("// stride"));
    }
}
