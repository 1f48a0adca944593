//! tapc-ir - Intermediate Representation
//!
//! The canonical algebraic core of the compiler: immutable expression and
//! condition values, the statement tree with its dataflow contract, the
//! CellSet fact those contracts speak in, and the cursor the optimizer
//! walks child lists with.

pub mod cellset;
pub mod cond;
pub mod cursor;
pub mod expr;
pub mod node;

pub use cellset::CellSet;
pub use cond::{Cond, Interval};
pub use cursor::Cursor;
pub use expr::{CellMap, Expr, IrError};
pub use node::{Node, Program};

/// Width of one tape cell. Selects the modulus `W = 2^bits` that stored
/// values and loop-count arithmetic wrap at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CellWidth {
    #[default]
    W8,
    W16,
    W32,
}

impl CellWidth {
    pub fn from_bits(bits: u32) -> Option<CellWidth> {
        match bits {
            8 => Some(CellWidth::W8),
            16 => Some(CellWidth::W16),
            32 => Some(CellWidth::W32),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            CellWidth::W8 => 8,
            CellWidth::W16 => 16,
            CellWidth::W32 => 32,
        }
    }

    pub fn modulus(self) -> i64 {
        1i64 << self.bits()
    }
}
