//! Method versions
//!
//! A `MethodCode` is one executable version of a method body. It owns the
//! shared opcode stream together with everything rewritten or memoized while
//! running it: the quick-node table, the `ret` target cache, the handler
//! catch-type memo and the profile. All of it is shared by every thread
//! interpreting the method, and all writers serialize on the section lock.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::vm::exception::{HandlerEntry, HandlerTable};
use crate::vm::osr::MethodProfile;
use crate::vm::quicken::QuickTable;
use crate::vm::runtime::Resolver;
use crate::vm::stream::OpcodeStream;
use crate::vm::subroutine::SubroutineCache;
use crate::vm::{VmError, VmResult};

/// Line-table row: the statement starting at `start_bci`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    /// First bci of the statement
    pub start_bci: u32,
    /// Source line
    pub line: u32,
}

/// One executable version of a method body
pub struct MethodCode {
    stream: OpcodeStream,
    max_locals: usize,
    max_stack: usize,
    handlers: HandlerTable,
    /// Sorted by `start_bci`
    lines: Vec<LineEntry>,
    resolver: Arc<dyn Resolver>,
    /// Serializes quickening, node generification and `ret` cache growth
    section: Mutex<()>,
    quick: QuickTable,
    subroutines: SubroutineCache,
    profile: MethodProfile,
}

impl MethodCode {
    /// Create a method version
    ///
    /// Handler ranges must lie inside the code.
    pub fn new(
        code: &[u8],
        max_locals: u16,
        max_stack: u16,
        handlers: Vec<HandlerEntry>,
        mut lines: Vec<LineEntry>,
        resolver: Arc<dyn Resolver>,
    ) -> VmResult<Self> {
        let len = code.len() as u32;
        for h in &handlers {
            if h.start_bci >= h.end_bci || h.end_bci > len || h.handler_bci >= len {
                return Err(VmError::Malformed(format!(
                    "handler [{}, {}) -> {} outside code of length {}",
                    h.start_bci, h.end_bci, h.handler_bci, len
                )));
            }
        }
        lines.sort_by_key(|e| e.start_bci);
        lines.dedup_by_key(|e| e.start_bci);

        Ok(Self {
            stream: OpcodeStream::new(code),
            max_locals: max_locals as usize,
            max_stack: max_stack as usize,
            handlers: HandlerTable::new(handlers),
            lines,
            resolver,
            section: Mutex::new(()),
            quick: QuickTable::new(),
            subroutines: SubroutineCache::new(),
            profile: MethodProfile::new(),
        })
    }

    /// Opcode stream
    #[inline]
    pub fn stream(&self) -> &OpcodeStream {
        &self.stream
    }

    /// Local variable slots
    #[inline]
    pub fn max_locals(&self) -> usize {
        self.max_locals
    }

    /// Operand stack slots
    #[inline]
    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Exception handler table
    #[inline]
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Line table, sorted by bci
    #[inline]
    pub fn lines(&self) -> &[LineEntry] {
        &self.lines
    }

    /// Constant-pool resolver
    #[inline]
    pub fn resolver(&self) -> &dyn Resolver {
        &*self.resolver
    }

    /// Profiling counters and OSR entry points
    #[inline]
    pub fn profile(&self) -> &MethodProfile {
        &self.profile
    }

    /// Quick-node table
    #[inline]
    pub fn quick_table(&self) -> &QuickTable {
        &self.quick
    }

    /// `ret` target cache
    #[inline]
    pub fn subroutines(&self) -> &SubroutineCache {
        &self.subroutines
    }

    #[inline]
    pub(crate) fn section(&self) -> &Mutex<()> {
        &self.section
    }

    /// Index of the statement containing `bci`
    pub fn statement_index(&self, bci: u32) -> Option<usize> {
        self.lines
            .partition_point(|e| e.start_bci <= bci)
            .checked_sub(1)
    }

    /// Statement index and line if a statement starts exactly at `bci`
    pub fn statement_starting_at(&self, bci: u32) -> Option<(usize, u32)> {
        self.lines
            .binary_search_by_key(&bci, |e| e.start_bci)
            .ok()
            .map(|i| (i, self.lines[i].line))
    }
}

impl std::fmt::Debug for MethodCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodCode")
            .field("len", &self.stream.len())
            .field("max_locals", &self.max_locals)
            .field("max_stack", &self.max_stack)
            .field("handlers", &self.handlers)
            .field("quick_nodes", &self.quick.len())
            .finish()
    }
}
