//! `jsr`/`ret` return-target cache
//!
//! A `ret` may only resume right after a `jsr` or `jsr_w`. Each `ret` site
//! remembers the targets it has already validated so the check runs once per
//! (site, target). Lists are append-only: a new list is fully built, then
//! published in place of the old one while the section lock is held.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::bytecode::Opcode;
use crate::vm::{VmError, VmResult};

/// Observed return targets per `ret` site
#[derive(Debug, Default)]
pub struct SubroutineCache {
    targets: RwLock<FxHashMap<u32, Arc<[u32]>>>,
}

impl SubroutineCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets recorded for the `ret` at `ret_bci`
    pub fn targets(&self, ret_bci: u32) -> Option<Arc<[u32]>> {
        self.targets.read().get(&ret_bci).cloned()
    }

    /// Check `target` against the site's cache, validating and recording it on a miss
    pub fn resolve(
        &self,
        section: &Mutex<()>,
        original: &[u8],
        ret_bci: u32,
        target: u32,
    ) -> VmResult<u32> {
        if let Some(known) = self.targets.read().get(&ret_bci) {
            if known.contains(&target) {
                return Ok(target);
            }
        }
        if !follows_jsr(original, target) {
            return Err(VmError::Malformed(format!(
                "ret at {} to {} which does not follow a jsr",
                ret_bci, target
            )));
        }

        let _guard = section.lock();
        let current = self.targets.read().get(&ret_bci).cloned();
        if current.as_deref().is_some_and(|list| list.contains(&target)) {
            return Ok(target);
        }
        let mut grown: Vec<u32> = current.as_deref().unwrap_or(&[]).to_vec();
        grown.push(target);
        let grown: Arc<[u32]> = grown.into();
        tracing::trace!(
            target: "roast::subroutine",
            ret_bci,
            target,
            known = grown.len(),
            "new ret target"
        );
        self.targets.write().insert(ret_bci, grown);
        Ok(target)
    }
}

fn follows_jsr(original: &[u8], target: u32) -> bool {
    let target = target as usize;
    let at = |back: usize| target.checked_sub(back).and_then(|i| original.get(i)).copied();
    at(3) == Some(Opcode::Jsr.to_u8()) || at(5) == Some(Opcode::JsrW.to_u8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> Vec<u8> {
        // 0: jsr +4 ; 3: return ; 4: astore_1 ; 5: ret 1
        vec![
            Opcode::Jsr.to_u8(),
            0,
            4,
            Opcode::Return.to_u8(),
            Opcode::Astore1.to_u8(),
            Opcode::Ret.to_u8(),
            1,
        ]
    }

    #[test]
    fn test_records_valid_target_once() {
        let cache = SubroutineCache::new();
        let lock = Mutex::new(());
        let code = code();
        assert_eq!(cache.resolve(&lock, &code, 5, 3).unwrap(), 3);
        assert_eq!(cache.resolve(&lock, &code, 5, 3).unwrap(), 3);
        assert_eq!(&*cache.targets(5).unwrap(), &[3]);
    }

    #[test]
    fn test_rejects_target_not_after_jsr() {
        let cache = SubroutineCache::new();
        let lock = Mutex::new(());
        let err = cache.resolve(&lock, &code(), 5, 4).unwrap_err();
        assert!(matches!(err, VmError::Malformed(_)));
        assert!(cache.targets(5).is_none());
    }

    #[test]
    fn test_jsr_w_target() {
        let mut code = vec![Opcode::JsrW.to_u8(), 0, 0, 0, 6, Opcode::Return.to_u8()];
        code.extend_from_slice(&[Opcode::Astore0.to_u8(), Opcode::Ret.to_u8(), 0]);
        let cache = SubroutineCache::new();
        let lock = Mutex::new(());
        assert_eq!(cache.resolve(&lock, &code, 7, 5).unwrap(), 5);
    }
}
