//! The `tapc` command line: compile one tape-machine source file to C.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use tapc_drv::{Config, Dialect, Session};
use tapc_ir::CellWidth;

/// An optimizing tape-machine-to-C compiler.
#[derive(Parser, Debug)]
#[command(name = "tapc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compiles tape-machine programs to C", long_about = None)]
struct Cli {
    /// Source file, or - for standard input
    source: String,

    /// Size of one tape cell in bits
    #[arg(short = 's', long = "cellsize", default_value_t = 8)]
    cellsize: u32,

    /// Annotate generated loops with stride and clobber comments
    #[arg(long)]
    debug: bool,

    /// Source dialect
    #[arg(long, value_enum, default_value_t = DialectArg::Plain)]
    dialect: DialectArg,

    /// Output file (default: standard output)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DialectArg {
    Plain,
    Rle,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    let Some(cell_width) = CellWidth::from_bits(cli.cellsize) else {
        bail!("invalid cell size {} (expected 8, 16 or 32)", cli.cellsize);
    };
    let config = Config {
        cell_width,
        debug: cli.debug,
        dialect: match cli.dialect {
            DialectArg::Plain => Dialect::Plain,
            DialectArg::Rle => Dialect::Rle,
        },
    };

    let path = match cli.source.as_str() {
        "-" => None,
        name => Some(PathBuf::from(name)),
    };
    let code = Session::new(config)
        .compile_path(path.as_deref())
        .with_context(|| format!("failed to compile {}", cli.source))?;

    match cli.output {
        Some(out) => std::fs::write(&out, code)
            .with_context(|| format!("cannot write {}", out.display()))?,
        None => std::io::stdout().write_all(code.as_bytes())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_source() {
        let cli = Cli::parse_from(["tapc", "program.t"]);
        assert_eq!(cli.source, "program.t");
        assert_eq!(cli.cellsize, 8);
        assert!(!cli.debug);
    }

    #[test]
    fn parses_cellsize_flag() {
        let cli = Cli::parse_from(["tapc", "-s", "16", "x.t"]);
        assert_eq!(cli.cellsize, 16);
        let cli = Cli::parse_from(["tapc", "--cellsize", "32", "x.t"]);
        assert_eq!(cli.cellsize, 32);
    }

    #[test]
    fn parses_debug_and_output() {
        let cli = Cli::parse_from(["tapc", "--debug", "-o", "out.c", "x.t"]);
        assert!(cli.debug);
        assert_eq!(cli.output, Some(PathBuf::from("out.c")));
    }

    #[test]
    fn parses_stdin_marker() {
        let cli = Cli::parse_from(["tapc", "-"]);
        assert_eq!(cli.source, "-");
    }

    #[test]
    fn parses_dialect() {
        let cli = Cli::parse_from(["tapc", "--dialect", "rle", "x.t"]);
        assert!(matches!(cli.dialect, DialectArg::Rle));
    }
}
