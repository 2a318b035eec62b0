//! Shared, self-modifying opcode stream
//!
//! Every activation of a method version reads the same stream while
//! quickening rewrites it in place. A rewrite stores its operand bytes with
//! `Relaxed` ordering and the opcode tag last with `Release`; readers load the
//! tag with `Acquire`, so a reader that sees a quick tag also sees its
//! operands. The original bytes are kept separately: the generic (slow) path
//! always decodes constant-pool indices and instruction lengths from them and
//! never from bytes that may be mid-rewrite.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::bytecode::opcode::read_u16;

/// Opcode stream of one method version
pub struct OpcodeStream {
    /// Live bytes, rewritten by quickening
    bytes: Box<[AtomicU8]>,
    /// Bytes as loaded
    original: Box<[u8]>,
}

impl OpcodeStream {
    /// Create a stream over a copy of `code`
    pub fn new(code: &[u8]) -> Self {
        Self {
            bytes: code.iter().map(|&b| AtomicU8::new(b)).collect(),
            original: code.into(),
        }
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.original.len()
    }

    /// Whether the stream is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Read the opcode tag at `bci`
    #[inline]
    pub fn tag(&self, bci: usize) -> Option<u8> {
        self.bytes.get(bci).map(|b| b.load(Ordering::Acquire))
    }

    /// Read a big-endian `u16` operand written by a rewrite
    ///
    /// Only meaningful after [`tag`](Self::tag) returned the rewritten tag.
    #[inline]
    pub fn quick_operand(&self, at: usize) -> Option<u16> {
        let hi = self.bytes.get(at)?.load(Ordering::Relaxed);
        let lo = self.bytes.get(at + 1)?.load(Ordering::Relaxed);
        Some(u16::from_be_bytes([hi, lo]))
    }

    /// Bytes as loaded, never rewritten
    #[inline]
    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// Original opcode byte at `bci`
    #[inline]
    pub fn original_tag(&self, bci: usize) -> Option<u8> {
        self.original.get(bci).copied()
    }

    /// Original `u16` operand (constant-pool index) at `at`
    #[inline]
    pub fn original_u16(&self, at: usize) -> Option<u16> {
        read_u16(&self.original, at)
    }

    /// Rewrite the instruction at `bci`: operands first, tag last
    ///
    /// Callers hold the method's section lock and have checked that the site
    /// is still in its original form.
    pub(crate) fn patch(&self, bci: usize, operands: &[u8], tag: u8) {
        for (i, &b) in operands.iter().enumerate() {
            self.bytes[bci + 1 + i].store(b, Ordering::Relaxed);
        }
        self.bytes[bci].store(tag, Ordering::Release);
    }

    /// Copy of the live bytes
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.iter().map(|b| b.load(Ordering::Acquire)).collect()
    }
}

impl std::fmt::Debug for OpcodeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcodeStream")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Opcode;

    #[test]
    fn test_patch_keeps_original() {
        let code = [Opcode::Getfield.to_u8(), 0x00, 0x07, Opcode::Return.to_u8()];
        let stream = OpcodeStream::new(&code);
        stream.patch(0, &[0x00, 0x02], Opcode::Quick.to_u8());

        assert_eq!(stream.tag(0), Some(Opcode::Quick.to_u8()));
        assert_eq!(stream.quick_operand(1), Some(2));
        assert_eq!(stream.original_tag(0), Some(Opcode::Getfield.to_u8()));
        assert_eq!(stream.original_u16(1), Some(7));
        assert_eq!(stream.snapshot()[3], Opcode::Return.to_u8());
    }

    #[test]
    fn test_out_of_range() {
        let stream = OpcodeStream::new(&[Opcode::Nop.to_u8()]);
        assert_eq!(stream.tag(1), None);
        assert_eq!(stream.quick_operand(0), None);
        assert_eq!(stream.len(), 1);
    }
}
