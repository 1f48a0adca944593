//! A reference interpreter for the IR, used to check that passes preserve
//! observable behavior. Tape cells live in a map keyed by absolute offset,
//! values are masked to the cell width on every write, and execution is
//! fuel-limited so non-terminating trees can still be compared by output
//! prefix.

use std::collections::HashMap;

use tapc_ir::{expr, CellWidth, Cond, Expr, Node, Program};

pub struct Run {
    pub output: Vec<u8>,
    /// Final tape with zero cells dropped; only meaningful if `completed`.
    pub tape: HashMap<i64, i64>,
    pub completed: bool,
}

struct OutOfFuel;

struct Machine<'a> {
    tape: HashMap<i64, i64>,
    ptr: i64,
    input: &'a [u8],
    pos: usize,
    output: Vec<u8>,
    fuel: u64,
    w: i64,
}

pub fn interpret(program: &Program, width: CellWidth, input: &[u8], fuel: u64) -> Run {
    let mut machine = Machine {
        tape: HashMap::new(),
        ptr: 0,
        input,
        pos: 0,
        output: Vec::new(),
        fuel,
        w: width.modulus(),
    };
    let completed = machine.exec(&program.body).is_ok();
    let mut tape = machine.tape;
    tape.retain(|_, v| *v != 0);
    Run {
        output: machine.output,
        tape,
        completed,
    }
}

impl Machine<'_> {
    fn tick(&mut self) -> Result<(), OutOfFuel> {
        if self.fuel == 0 {
            return Err(OutOfFuel);
        }
        self.fuel -= 1;
        Ok(())
    }

    fn read(&self, cell: i64) -> i64 {
        self.tape.get(&cell).copied().unwrap_or(0)
    }

    fn write(&mut self, cell: i64, value: i64) {
        self.tape.insert(cell, expr::floor_mod(value, self.w));
    }

    fn eval(&self, e: &Expr) -> i64 {
        match e {
            Expr::Const(c) => *c,
            Expr::Cell(offset) => self.read(self.ptr + self.eval(offset)),
            Expr::Linear(l) => l.terms.iter().fold(l.base, |acc, (coeff, term)| {
                acc.wrapping_add(coeff.wrapping_mul(self.eval(term)))
            }),
            Expr::Product(factors) => factors
                .iter()
                .fold(1i64, |acc, f| acc.wrapping_mul(self.eval(f))),
            Expr::Div(a, b) | Expr::Exact(a, b) => {
                let d = self.eval(b);
                if d == 0 {
                    0
                } else {
                    expr::floor_div(self.eval(a), d)
                }
            }
            Expr::Mod(a, b) => {
                let d = self.eval(b);
                if d == 0 {
                    0
                } else {
                    expr::floor_mod(self.eval(a), d)
                }
            }
        }
    }

    fn test(&self, cond: &Cond) -> bool {
        match cond {
            Cond::Always => true,
            Cond::Never => false,
            Cond::Equal { expr, value } => self.eval(expr) == *value,
            Cond::NotEqual { expr, value } => self.eval(expr) != *value,
            Cond::CellEqual { offset, value } => self.read(self.ptr + offset) == *value,
            Cond::CellNotEqual { offset, value } => self.read(self.ptr + offset) != *value,
            Cond::Range { expr, intervals } => {
                let v = self.eval(expr);
                intervals.iter().any(|iv| {
                    iv.lo.map_or(true, |lo| lo <= v) && iv.hi.map_or(true, |hi| v <= hi)
                })
            }
            Cond::All(conds) => conds.iter().all(|c| self.test(c)),
            Cond::Any(conds) => conds.iter().any(|c| self.test(c)),
        }
    }

    fn exec(&mut self, body: &[Node]) -> Result<(), OutOfFuel> {
        for node in body {
            self.tick()?;
            match node {
                Node::Nop => {}
                Node::Set { offset, value } => {
                    let v = self.eval(value);
                    self.write(self.ptr + offset, v);
                }
                Node::Adjust { offset, delta } => {
                    let v = self.read(self.ptr + offset).wrapping_add(self.eval(delta));
                    self.write(self.ptr + offset, v);
                }
                Node::MovePointer(d) => self.ptr += d,
                Node::Input { offset } => {
                    let v = if self.pos < self.input.len() {
                        let byte = self.input[self.pos] as i64;
                        self.pos += 1;
                        byte
                    } else {
                        // what fgetc hands back at end of input
                        -1
                    };
                    self.write(self.ptr + offset, v);
                }
                Node::Output(expr) => {
                    let v = self.eval(expr);
                    self.output.push((v & 0xff) as u8);
                }
                Node::OutputStr(bytes) => self.output.extend_from_slice(bytes),
                Node::Seek { target, stride, value } => {
                    while self.read(self.ptr + target) != *value {
                        self.ptr += stride;
                        self.tick()?;
                    }
                }
                Node::If { cond, body } => {
                    if self.test(cond) {
                        self.exec(body)?;
                    }
                }
                Node::Repeat { count, body } => {
                    // the emitted loop counter is reduced by the modulus
                    // with C's truncated remainder unless the count is a
                    // bare cell value, which is in range already
                    let mut n = self.eval(count);
                    if !matches!(count, Expr::Cell(_)) {
                        n %= self.w;
                    }
                    while n > 0 {
                        self.tick()?;
                        self.exec(body)?;
                        n -= 1;
                    }
                }
                Node::While { cond, body } => {
                    while self.test(cond) {
                        self.tick()?;
                        self.exec(body)?;
                    }
                }
            }
        }
        Ok(())
    }
}
