//! Quickening and inline caches
//!
//! The first execution of a quickenable opcode resolves its constant-pool
//! operand, builds a [`QuickNode`] and rewrites the site:
//!
//! ```text
//! getfield #12        ->  QUICK  <arena index:u16>
//! iaload              ->  SLIM_QUICK              (index found by bci)
//! ```
//!
//! Resolution runs outside any lock. Publication takes the method's section
//! lock and re-checks the tag, so when two threads race on one site exactly
//! one node is installed and the loser executes the winner's node.

pub(crate) mod linker;
pub mod node;
pub mod table;

use std::sync::Arc;

pub use node::{ArrayAccessNode, Dispatch, FieldAccessNode, InvokeNode, MiscNode, QuickNode, TypeCheckNode};
pub use table::QuickTable;

pub(crate) use node::Site;

use crate::bytecode::Opcode;
use crate::vm::method::MethodCode;

/// Publish `node` for the site at `bci`
///
/// Returns the node to execute and its arena slot. When another thread won
/// the race, that thread's node is returned and `node` is dropped. A full
/// arena leaves the site unquickened and returns `node` without a slot.
pub(crate) fn install(
    code: &MethodCode,
    bci: u32,
    opcode: Opcode,
    node: QuickNode,
) -> (Arc<QuickNode>, Option<usize>) {
    let stream = code.stream();
    let table = code.quick_table();
    let at = bci as usize;
    let _guard = code.section().lock();

    match stream.tag(at).and_then(Opcode::from_u8) {
        Some(Opcode::Quick) => {
            if let Some(index) = stream.quick_operand(at + 1).map(usize::from) {
                if let Some(existing) = table.get(index) {
                    return (existing, Some(index));
                }
            }
        }
        Some(Opcode::SlimQuick) => {
            if let Some(index) = table.slim_index(bci) {
                if let Some(existing) = table.get(index) {
                    return (existing, Some(index));
                }
            }
        }
        _ => {}
    }

    let node = Arc::new(node);
    let Some(index) = table.push(node.clone()) else {
        tracing::debug!(target: "roast::quicken", bci, opcode = opcode.name(), "quick arena full, site left generic");
        return (node, None);
    };
    if opcode.is_slim_quickenable() {
        table.index_slim(bci, index);
        stream.patch(at, &[], Opcode::SlimQuick.to_u8());
    } else {
        // index < MAX_QUICK_NODES, so it fits the u16 operand
        stream.patch(at, &(index as u16).to_be_bytes(), Opcode::Quick.to_u8());
    }
    tracing::debug!(target: "roast::quicken", bci, opcode = opcode.name(), index, "site quickened");
    (node, Some(index))
}
