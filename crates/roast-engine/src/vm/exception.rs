//! Exception handler table
//!
//! Handler entries are immutable once the method version is built. Catch
//! types are resolved on first use and memoized per entry. The per-kind
//! recovery lists used for resource exhaustion are computed once per method
//! version, so handling a stack overflow never resolves or allocates.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::vm::class::ClassInfo;
use crate::vm::runtime::{LinkError, Resolver, ResourceKind, Runtime};

/// One `(start, end, catch_type, handler)` row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerEntry {
    /// First covered bci (inclusive)
    pub start_bci: u32,
    /// End of the covered range (exclusive)
    pub end_bci: u32,
    /// Handler entry point
    pub handler_bci: u32,
    /// Constant-pool index of the catch type; `None` catches everything
    pub catch_type: Option<u16>,
}

impl HandlerEntry {
    /// Whether `bci` lies in `[start_bci, end_bci)`
    #[inline]
    pub fn covers(&self, bci: u32) -> bool {
        self.start_bci <= bci && bci < self.end_bci
    }
}

/// Ordered handler entries of one method version
pub struct HandlerTable {
    entries: Vec<HandlerEntry>,
    /// Resolved catch class per entry
    catch_classes: Vec<OnceCell<Arc<ClassInfo>>>,
    /// Entry indices usable for each [`ResourceKind`]
    recovery: [OnceCell<Box<[usize]>>; 2],
}

impl HandlerTable {
    /// Build a table; program order is match order
    pub fn new(entries: Vec<HandlerEntry>) -> Self {
        let catch_classes = entries.iter().map(|_| OnceCell::new()).collect();
        Self {
            entries,
            catch_classes,
            recovery: [OnceCell::new(), OnceCell::new()],
        }
    }

    /// Entries in program order
    pub fn entries(&self) -> &[HandlerEntry] {
        &self.entries
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn catch_class(
        &self,
        index: usize,
        cp_index: u16,
        resolver: &dyn Resolver,
    ) -> Result<&Arc<ClassInfo>, LinkError> {
        self.catch_classes[index].get_or_try_init(|| resolver.resolve_type(cp_index))
    }

    /// Find the handler for an exception of class `thrown` raised at `bci`
    ///
    /// The first entry in program order that covers `bci` and whose catch type
    /// accepts `thrown` wins. A catch type that fails to resolve aborts the
    /// search with its linkage error.
    pub fn find_handler(
        &self,
        bci: u32,
        thrown: &ClassInfo,
        resolver: &dyn Resolver,
        runtime: &dyn Runtime,
    ) -> Result<Option<u32>, LinkError> {
        for (index, entry) in self.entries.iter().enumerate() {
            if !entry.covers(bci) {
                continue;
            }
            match entry.catch_type {
                None => return Ok(Some(entry.handler_bci)),
                Some(cp_index) => {
                    let catch = self.catch_class(index, cp_index, resolver)?;
                    if runtime.is_assignable(thrown, catch) {
                        return Ok(Some(entry.handler_bci));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Find the handler for an exhausted resource at `bci`
    ///
    /// Only entries on the kind's recovery list are considered. The list is
    /// built on the first exhaustion of that kind: wildcard entries plus
    /// entries whose catch type accepts `thrown`. Entries whose catch type
    /// cannot be resolved are left off the list.
    pub fn find_recovery_handler(
        &self,
        bci: u32,
        kind: ResourceKind,
        thrown: &ClassInfo,
        resolver: &dyn Resolver,
        runtime: &dyn Runtime,
    ) -> Option<u32> {
        let list = self.recovery[kind.index()].get_or_init(|| {
            self.entries
                .iter()
                .enumerate()
                .filter(|(index, entry)| match entry.catch_type {
                    None => true,
                    Some(cp_index) => self
                        .catch_class(*index, cp_index, resolver)
                        .map(|catch| runtime.is_assignable(thrown, catch))
                        .unwrap_or(false),
                })
                .map(|(index, _)| index)
                .collect()
        });
        list.iter()
            .map(|&index| &self.entries[index])
            .find(|entry| entry.covers(bci))
            .map(|entry| entry.handler_bci)
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}
