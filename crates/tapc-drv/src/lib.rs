//! tapc-drv - Compiler Driver
//!
//! Orchestrates one compilation: read source, parse, run the optimization
//! pipeline, emit C. The `tapc` binary in this crate is a thin clap shell
//! over [`Session`].

use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use tapc_gen::Emitter;
use tapc_ir::{CellWidth, IrError, Program};
use tapc_par::ParseError;

/// Which front-end syntax to accept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dialect {
    /// The plain eight-instruction language.
    #[default]
    Plain,
    /// The run-length-encoded extension (`+*12`).
    Rle,
}

/// Everything one compiler invocation depends on.
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    pub cell_width: CellWidth,
    pub debug: bool,
    pub dialect: Dialect,
}

/// Failures a compilation can end with.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("internal arithmetic violation: {0}")]
    Ir(#[from] IrError),
    #[error("cannot read source: {0}")]
    Io(#[from] std::io::Error),
}

/// One compiler invocation.
pub struct Session {
    config: Config,
}

impl Session {
    pub fn new(config: Config) -> Session {
        Session { config }
    }

    /// Compiles source text to a C translation unit.
    pub fn compile(&self, source: &str) -> Result<String, CompileError> {
        let mut program = self.parse(source)?;
        debug!(nodes = program.body.len(), "parsed");
        tapc_opt::optimize(&mut program, self.config.cell_width)?;
        debug!(nodes = program.body.len(), tree = %program, "optimized");
        Ok(Emitter::new(self.config.cell_width, self.config.debug).emit(&program))
    }

    /// Compiles the file at `path`, or standard input when `path` is None.
    pub fn compile_path(&self, path: Option<&Path>) -> Result<String, CompileError> {
        let source = match path {
            Some(path) => std::fs::read_to_string(path)?,
            None => {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            }
        };
        self.compile(&source)
    }

    fn parse(&self, source: &str) -> Result<Program, ParseError> {
        match self.config.dialect {
            Dialect::Plain => tapc_par::parse(source),
            Dialect::Rle => tapc_par::parse_rle(source),
        }
    }
}
