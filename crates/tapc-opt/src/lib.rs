//! tapc-opt - Optimization Passes
//!
//! The middle end: a fixed pipeline of tree-to-tree passes over the IR,
//! each one a bounded walk of the child lists with the cursor, each
//! restoring block invariants through [`cleanup`] where it rewrites
//! anything. Passes run to completion one after another; there is no
//! fixpoint iteration and no state survives a pass.

pub mod cleanup;
pub mod flatten;
pub mod initial_memory;
pub mod more_loop;
pub mod propagate;
pub mod remove_dead;
pub mod simple_loop;
pub mod stdlib;

pub use cleanup::cleanup;
pub use flatten::Flatten;
pub use initial_memory::InitialMemory;
pub use more_loop::MoreLoop;
pub use propagate::Propagate;
pub use remove_dead::RemoveDead;
pub use simple_loop::SimpleLoop;
pub use stdlib::Stdlib;

use tapc_ir::{CellWidth, IrError, Node, Program};

/// One tree-to-tree optimization.
pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&self, program: &mut Program) -> Result<(), IrError>;
}

/// Applies `f` to every block of the tree, children before parents.
pub(crate) fn visit_post_order(
    children: &mut Vec<Node>,
    f: &mut dyn FnMut(&mut Vec<Node>) -> Result<(), IrError>,
) -> Result<(), IrError> {
    for child in children.iter_mut() {
        if let Node::If { body, .. } | Node::Repeat { body, .. } | Node::While { body, .. } =
            child
        {
            visit_post_order(body, f)?;
        }
    }
    f(children)
}

/// The fixed pipeline. Loop recognition runs twice: value propagation can
/// expose counter shapes the first round could not see, and propagation
/// runs again over whatever the second round produced.
pub fn optimize(program: &mut Program, width: CellWidth) -> Result<(), IrError> {
    let passes: Vec<Box<dyn Pass>> = vec![
        Box::new(Flatten),
        Box::new(SimpleLoop::new(width)),
        Box::new(InitialMemory),
        Box::new(Propagate::new(width)),
        Box::new(SimpleLoop::new(width)),
        Box::new(Propagate::new(width)),
        Box::new(RemoveDead),
        Box::new(Stdlib),
    ];
    for pass in passes {
        tracing::debug!(pass = pass.name(), "running optimization pass");
        pass.run(program)?;
    }
    Ok(())
}
