//! Bytecode opcodes for the Roast VM
//!
//! The instruction set follows the JVM opcode table (`0x00..=0xC9`), plus two
//! internal tags written by quickening:
//! - `QUICK` (0xCB): the two bytes after the tag index the method's quick node arena
//! - `SLIM_QUICK` (0xCC): a 1-byte site whose node is looked up by bytecode offset
//!
//! Operands are big-endian. `length == 0` in the table marks a variable-length
//! instruction (`tableswitch`, `lookupswitch`, `wide`).

macro_rules! opcodes {
    ($( $name:ident = $byte:literal, $mnemonic:literal, $len:literal, $effect:expr; )*) => {
        /// Bytecode opcode enumeration
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $(
                #[doc = concat!("`", $mnemonic, "`")]
                $name = $byte,
            )*
        }

        impl Opcode {
            /// Decode an opcode byte
            #[inline]
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(Self::$name), )*
                    _ => None,
                }
            }

            /// Mnemonic as written in class-file disassembly
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$name => $mnemonic, )*
                }
            }

            /// Instruction length in bytes including the tag, or 0 if variable
            #[inline]
            pub const fn fixed_length(self) -> usize {
                match self {
                    $( Self::$name => $len, )*
                }
            }

            /// Operand stack effect in value slots, when it does not depend on operands
            ///
            /// Returns `None` for field access, invokes, `multianewarray`, `wide`,
            /// returns and the quick tags; their handlers adjust `top` themselves.
            #[inline]
            pub const fn stack_effect(self) -> Option<i8> {
                match self {
                    $( Self::$name => $effect, )*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", 1, Some(0);
    AconstNull = 0x01, "aconst_null", 1, Some(1);
    IconstM1 = 0x02, "iconst_m1", 1, Some(1);
    Iconst0 = 0x03, "iconst_0", 1, Some(1);
    Iconst1 = 0x04, "iconst_1", 1, Some(1);
    Iconst2 = 0x05, "iconst_2", 1, Some(1);
    Iconst3 = 0x06, "iconst_3", 1, Some(1);
    Iconst4 = 0x07, "iconst_4", 1, Some(1);
    Iconst5 = 0x08, "iconst_5", 1, Some(1);
    Lconst0 = 0x09, "lconst_0", 1, Some(2);
    Lconst1 = 0x0A, "lconst_1", 1, Some(2);
    Fconst0 = 0x0B, "fconst_0", 1, Some(1);
    Fconst1 = 0x0C, "fconst_1", 1, Some(1);
    Fconst2 = 0x0D, "fconst_2", 1, Some(1);
    Dconst0 = 0x0E, "dconst_0", 1, Some(2);
    Dconst1 = 0x0F, "dconst_1", 1, Some(2);
    Bipush = 0x10, "bipush", 2, Some(1);
    Sipush = 0x11, "sipush", 3, Some(1);
    Ldc = 0x12, "ldc", 2, Some(1);
    LdcW = 0x13, "ldc_w", 3, Some(1);
    Ldc2W = 0x14, "ldc2_w", 3, Some(2);

    Iload = 0x15, "iload", 2, Some(1);
    Lload = 0x16, "lload", 2, Some(2);
    Fload = 0x17, "fload", 2, Some(1);
    Dload = 0x18, "dload", 2, Some(2);
    Aload = 0x19, "aload", 2, Some(1);
    Iload0 = 0x1A, "iload_0", 1, Some(1);
    Iload1 = 0x1B, "iload_1", 1, Some(1);
    Iload2 = 0x1C, "iload_2", 1, Some(1);
    Iload3 = 0x1D, "iload_3", 1, Some(1);
    Lload0 = 0x1E, "lload_0", 1, Some(2);
    Lload1 = 0x1F, "lload_1", 1, Some(2);
    Lload2 = 0x20, "lload_2", 1, Some(2);
    Lload3 = 0x21, "lload_3", 1, Some(2);
    Fload0 = 0x22, "fload_0", 1, Some(1);
    Fload1 = 0x23, "fload_1", 1, Some(1);
    Fload2 = 0x24, "fload_2", 1, Some(1);
    Fload3 = 0x25, "fload_3", 1, Some(1);
    Dload0 = 0x26, "dload_0", 1, Some(2);
    Dload1 = 0x27, "dload_1", 1, Some(2);
    Dload2 = 0x28, "dload_2", 1, Some(2);
    Dload3 = 0x29, "dload_3", 1, Some(2);
    Aload0 = 0x2A, "aload_0", 1, Some(1);
    Aload1 = 0x2B, "aload_1", 1, Some(1);
    Aload2 = 0x2C, "aload_2", 1, Some(1);
    Aload3 = 0x2D, "aload_3", 1, Some(1);
    Iaload = 0x2E, "iaload", 1, Some(-1);
    Laload = 0x2F, "laload", 1, Some(0);
    Faload = 0x30, "faload", 1, Some(-1);
    Daload = 0x31, "daload", 1, Some(0);
    Aaload = 0x32, "aaload", 1, Some(-1);
    Baload = 0x33, "baload", 1, Some(-1);
    Caload = 0x34, "caload", 1, Some(-1);
    Saload = 0x35, "saload", 1, Some(-1);

    Istore = 0x36, "istore", 2, Some(-1);
    Lstore = 0x37, "lstore", 2, Some(-2);
    Fstore = 0x38, "fstore", 2, Some(-1);
    Dstore = 0x39, "dstore", 2, Some(-2);
    Astore = 0x3A, "astore", 2, Some(-1);
    Istore0 = 0x3B, "istore_0", 1, Some(-1);
    Istore1 = 0x3C, "istore_1", 1, Some(-1);
    Istore2 = 0x3D, "istore_2", 1, Some(-1);
    Istore3 = 0x3E, "istore_3", 1, Some(-1);
    Lstore0 = 0x3F, "lstore_0", 1, Some(-2);
    Lstore1 = 0x40, "lstore_1", 1, Some(-2);
    Lstore2 = 0x41, "lstore_2", 1, Some(-2);
    Lstore3 = 0x42, "lstore_3", 1, Some(-2);
    Fstore0 = 0x43, "fstore_0", 1, Some(-1);
    Fstore1 = 0x44, "fstore_1", 1, Some(-1);
    Fstore2 = 0x45, "fstore_2", 1, Some(-1);
    Fstore3 = 0x46, "fstore_3", 1, Some(-1);
    Dstore0 = 0x47, "dstore_0", 1, Some(-2);
    Dstore1 = 0x48, "dstore_1", 1, Some(-2);
    Dstore2 = 0x49, "dstore_2", 1, Some(-2);
    Dstore3 = 0x4A, "dstore_3", 1, Some(-2);
    Astore0 = 0x4B, "astore_0", 1, Some(-1);
    Astore1 = 0x4C, "astore_1", 1, Some(-1);
    Astore2 = 0x4D, "astore_2", 1, Some(-1);
    Astore3 = 0x4E, "astore_3", 1, Some(-1);
    Iastore = 0x4F, "iastore", 1, Some(-3);
    Lastore = 0x50, "lastore", 1, Some(-4);
    Fastore = 0x51, "fastore", 1, Some(-3);
    Dastore = 0x52, "dastore", 1, Some(-4);
    Aastore = 0x53, "aastore", 1, Some(-3);
    Bastore = 0x54, "bastore", 1, Some(-3);
    Castore = 0x55, "castore", 1, Some(-3);
    Sastore = 0x56, "sastore", 1, Some(-3);

    Pop = 0x57, "pop", 1, Some(-1);
    Pop2 = 0x58, "pop2", 1, Some(-2);
    Dup = 0x59, "dup", 1, Some(1);
    DupX1 = 0x5A, "dup_x1", 1, Some(1);
    DupX2 = 0x5B, "dup_x2", 1, Some(1);
    Dup2 = 0x5C, "dup2", 1, Some(2);
    Dup2X1 = 0x5D, "dup2_x1", 1, Some(2);
    Dup2X2 = 0x5E, "dup2_x2", 1, Some(2);
    Swap = 0x5F, "swap", 1, Some(0);

    Iadd = 0x60, "iadd", 1, Some(-1);
    Ladd = 0x61, "ladd", 1, Some(-2);
    Fadd = 0x62, "fadd", 1, Some(-1);
    Dadd = 0x63, "dadd", 1, Some(-2);
    Isub = 0x64, "isub", 1, Some(-1);
    Lsub = 0x65, "lsub", 1, Some(-2);
    Fsub = 0x66, "fsub", 1, Some(-1);
    Dsub = 0x67, "dsub", 1, Some(-2);
    Imul = 0x68, "imul", 1, Some(-1);
    Lmul = 0x69, "lmul", 1, Some(-2);
    Fmul = 0x6A, "fmul", 1, Some(-1);
    Dmul = 0x6B, "dmul", 1, Some(-2);
    Idiv = 0x6C, "idiv", 1, Some(-1);
    Ldiv = 0x6D, "ldiv", 1, Some(-2);
    Fdiv = 0x6E, "fdiv", 1, Some(-1);
    Ddiv = 0x6F, "ddiv", 1, Some(-2);
    Irem = 0x70, "irem", 1, Some(-1);
    Lrem = 0x71, "lrem", 1, Some(-2);
    Frem = 0x72, "frem", 1, Some(-1);
    Drem = 0x73, "drem", 1, Some(-2);
    Ineg = 0x74, "ineg", 1, Some(0);
    Lneg = 0x75, "lneg", 1, Some(0);
    Fneg = 0x76, "fneg", 1, Some(0);
    Dneg = 0x77, "dneg", 1, Some(0);
    Ishl = 0x78, "ishl", 1, Some(-1);
    Lshl = 0x79, "lshl", 1, Some(-1);
    Ishr = 0x7A, "ishr", 1, Some(-1);
    Lshr = 0x7B, "lshr", 1, Some(-1);
    Iushr = 0x7C, "iushr", 1, Some(-1);
    Lushr = 0x7D, "lushr", 1, Some(-1);
    Iand = 0x7E, "iand", 1, Some(-1);
    Land = 0x7F, "land", 1, Some(-2);
    Ior = 0x80, "ior", 1, Some(-1);
    Lor = 0x81, "lor", 1, Some(-2);
    Ixor = 0x82, "ixor", 1, Some(-1);
    Lxor = 0x83, "lxor", 1, Some(-2);
    Iinc = 0x84, "iinc", 3, Some(0);

    I2l = 0x85, "i2l", 1, Some(1);
    I2f = 0x86, "i2f", 1, Some(0);
    I2d = 0x87, "i2d", 1, Some(1);
    L2i = 0x88, "l2i", 1, Some(-1);
    L2f = 0x89, "l2f", 1, Some(-1);
    L2d = 0x8A, "l2d", 1, Some(0);
    F2i = 0x8B, "f2i", 1, Some(0);
    F2l = 0x8C, "f2l", 1, Some(1);
    F2d = 0x8D, "f2d", 1, Some(1);
    D2i = 0x8E, "d2i", 1, Some(-1);
    D2l = 0x8F, "d2l", 1, Some(0);
    D2f = 0x90, "d2f", 1, Some(-1);
    I2b = 0x91, "i2b", 1, Some(0);
    I2c = 0x92, "i2c", 1, Some(0);
    I2s = 0x93, "i2s", 1, Some(0);

    Lcmp = 0x94, "lcmp", 1, Some(-3);
    Fcmpl = 0x95, "fcmpl", 1, Some(-1);
    Fcmpg = 0x96, "fcmpg", 1, Some(-1);
    Dcmpl = 0x97, "dcmpl", 1, Some(-3);
    Dcmpg = 0x98, "dcmpg", 1, Some(-3);
    Ifeq = 0x99, "ifeq", 3, Some(-1);
    Ifne = 0x9A, "ifne", 3, Some(-1);
    Iflt = 0x9B, "iflt", 3, Some(-1);
    Ifge = 0x9C, "ifge", 3, Some(-1);
    Ifgt = 0x9D, "ifgt", 3, Some(-1);
    Ifle = 0x9E, "ifle", 3, Some(-1);
    IfIcmpeq = 0x9F, "if_icmpeq", 3, Some(-2);
    IfIcmpne = 0xA0, "if_icmpne", 3, Some(-2);
    IfIcmplt = 0xA1, "if_icmplt", 3, Some(-2);
    IfIcmpge = 0xA2, "if_icmpge", 3, Some(-2);
    IfIcmpgt = 0xA3, "if_icmpgt", 3, Some(-2);
    IfIcmple = 0xA4, "if_icmple", 3, Some(-2);
    IfAcmpeq = 0xA5, "if_acmpeq", 3, Some(-2);
    IfAcmpne = 0xA6, "if_acmpne", 3, Some(-2);
    Goto = 0xA7, "goto", 3, Some(0);
    Jsr = 0xA8, "jsr", 3, Some(1);
    Ret = 0xA9, "ret", 2, Some(0);
    Tableswitch = 0xAA, "tableswitch", 0, Some(-1);
    Lookupswitch = 0xAB, "lookupswitch", 0, Some(-1);
    Ireturn = 0xAC, "ireturn", 1, None;
    Lreturn = 0xAD, "lreturn", 1, None;
    Freturn = 0xAE, "freturn", 1, None;
    Dreturn = 0xAF, "dreturn", 1, None;
    Areturn = 0xB0, "areturn", 1, None;
    Return = 0xB1, "return", 1, None;

    Getstatic = 0xB2, "getstatic", 3, None;
    Putstatic = 0xB3, "putstatic", 3, None;
    Getfield = 0xB4, "getfield", 3, None;
    Putfield = 0xB5, "putfield", 3, None;
    Invokevirtual = 0xB6, "invokevirtual", 3, None;
    Invokespecial = 0xB7, "invokespecial", 3, None;
    Invokestatic = 0xB8, "invokestatic", 3, None;
    Invokeinterface = 0xB9, "invokeinterface", 5, None;
    Invokedynamic = 0xBA, "invokedynamic", 5, None;
    New = 0xBB, "new", 3, Some(1);
    Newarray = 0xBC, "newarray", 2, Some(0);
    Anewarray = 0xBD, "anewarray", 3, Some(0);
    Arraylength = 0xBE, "arraylength", 1, Some(0);
    Athrow = 0xBF, "athrow", 1, None;
    Checkcast = 0xC0, "checkcast", 3, Some(0);
    Instanceof = 0xC1, "instanceof", 3, Some(0);
    Monitorenter = 0xC2, "monitorenter", 1, Some(-1);
    Monitorexit = 0xC3, "monitorexit", 1, Some(-1);
    Wide = 0xC4, "wide", 0, None;
    Multianewarray = 0xC5, "multianewarray", 4, None;
    Ifnull = 0xC6, "ifnull", 3, Some(-1);
    Ifnonnull = 0xC7, "ifnonnull", 3, Some(-1);
    GotoW = 0xC8, "goto_w", 5, Some(0);
    JsrW = 0xC9, "jsr_w", 5, Some(1);

    Quick = 0xCB, "quick", 0, None;
    SlimQuick = 0xCC, "slim_quick", 1, None;
}

impl Opcode {
    /// Raw byte value
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Opcodes whose first execution rewrites them to `QUICK` with a node index operand
    pub fn is_quickenable(self) -> bool {
        matches!(
            self,
            Opcode::Getstatic
                | Opcode::Putstatic
                | Opcode::Getfield
                | Opcode::Putfield
                | Opcode::Invokevirtual
                | Opcode::Invokespecial
                | Opcode::Invokestatic
                | Opcode::Invokeinterface
                | Opcode::Invokedynamic
                | Opcode::New
                | Opcode::Anewarray
                | Opcode::Multianewarray
                | Opcode::Checkcast
                | Opcode::Instanceof
        ) || self.is_slim_quickenable()
    }

    /// 1-byte opcodes whose specialization lives in the sparse, offset-keyed index
    pub fn is_slim_quickenable(self) -> bool {
        self.is_array_load() || self.is_array_store()
    }

    /// `iaload` .. `saload`
    pub fn is_array_load(self) -> bool {
        (Opcode::Iaload as u8..=Opcode::Saload as u8).contains(&(self as u8))
    }

    /// `iastore` .. `sastore`
    pub fn is_array_store(self) -> bool {
        (Opcode::Iastore as u8..=Opcode::Sastore as u8).contains(&(self as u8))
    }

    /// Conditional or unconditional branch with a relative offset operand
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Ifeq
                | Opcode::Ifne
                | Opcode::Iflt
                | Opcode::Ifge
                | Opcode::Ifgt
                | Opcode::Ifle
                | Opcode::IfIcmpeq
                | Opcode::IfIcmpne
                | Opcode::IfIcmplt
                | Opcode::IfIcmpge
                | Opcode::IfIcmpgt
                | Opcode::IfIcmple
                | Opcode::IfAcmpeq
                | Opcode::IfAcmpne
                | Opcode::Ifnull
                | Opcode::Ifnonnull
                | Opcode::Goto
                | Opcode::GotoW
                | Opcode::Jsr
                | Opcode::JsrW
        )
    }

    /// Method return opcodes
    pub fn is_return(self) -> bool {
        (Opcode::Ireturn as u8..=Opcode::Return as u8).contains(&(self as u8))
    }

    /// Invoke opcodes
    pub fn is_invoke(self) -> bool {
        (Opcode::Invokevirtual as u8..=Opcode::Invokedynamic as u8).contains(&(self as u8))
    }

    /// Opcodes that `wide` may prefix
    pub fn is_widenable(self) -> bool {
        (Opcode::Iload as u8..=Opcode::Aload as u8).contains(&(self as u8))
            || (Opcode::Istore as u8..=Opcode::Astore as u8).contains(&(self as u8))
            || matches!(self, Opcode::Ret | Opcode::Iinc)
    }
}

/// Read a big-endian `u16` operand
#[inline]
pub fn read_u16(code: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*code.get(at)?, *code.get(at + 1)?]))
}

/// Read a big-endian `i16` operand
#[inline]
pub fn read_i16(code: &[u8], at: usize) -> Option<i16> {
    read_u16(code, at).map(|v| v as i16)
}

/// Read a big-endian `i32` operand
#[inline]
pub fn read_i32(code: &[u8], at: usize) -> Option<i32> {
    Some(i32::from_be_bytes([
        *code.get(at)?,
        *code.get(at + 1)?,
        *code.get(at + 2)?,
        *code.get(at + 3)?,
    ]))
}

/// Offset of the first 4-byte-aligned switch operand after the tag at `bci`
#[inline]
pub fn switch_operands_start(bci: usize) -> usize {
    (bci + 4) & !3
}

/// Length in bytes of the instruction at `bci`, decoding variable-length forms
///
/// Returns `None` for an unknown opcode or a truncated instruction.
pub fn instruction_length(code: &[u8], bci: usize) -> Option<usize> {
    let opcode = Opcode::from_u8(*code.get(bci)?)?;
    let len = match opcode {
        Opcode::Tableswitch => {
            let base = switch_operands_start(bci);
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            if high < low {
                return None;
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            base + 12 + count * 4 - bci
        }
        Opcode::Lookupswitch => {
            let base = switch_operands_start(bci);
            let npairs = read_i32(code, base + 4)?;
            if npairs < 0 {
                return None;
            }
            base + 8 + npairs as usize * 8 - bci
        }
        Opcode::Wide => {
            let inner = Opcode::from_u8(*code.get(bci + 1)?)?;
            match inner {
                Opcode::Iinc => 6,
                op if op.is_widenable() => 4,
                _ => return None,
            }
        }
        // Quick tags inherit the length of the opcode they replaced; callers
        // decode lengths against the original stream.
        Opcode::Quick => return None,
        op => op.fixed_length(),
    };
    if bci + len > code.len() {
        return None;
    }
    Some(len)
}
