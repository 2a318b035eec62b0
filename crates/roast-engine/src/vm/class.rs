//! Resolved class, method and field handles
//!
//! These are the already-resolved entities a [`Resolver`](crate::vm::runtime::Resolver)
//! hands back. The core reads their shape (flags, kinds, slot counts) but never
//! loads or lays them out itself.

use std::fmt;
use std::sync::Arc;

use crate::vm::method::MethodCode;
use crate::vm::runtime::LinkError;
use crate::vm::value::ObjRef;

/// Host-assigned class identity, used as the inline-cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// A loaded class or interface
#[derive(Debug)]
pub struct ClassInfo {
    /// Identity used for inline-cache checks
    pub id: ClassId,
    /// Internal name, e.g. `java/lang/Object`
    pub name: String,
    /// Direct superclass (`None` for the root class and for interfaces)
    pub super_class: Option<Arc<ClassInfo>>,
    /// Directly implemented interfaces
    pub interfaces: Vec<Arc<ClassInfo>>,
    /// `ACC_INTERFACE`
    pub is_interface: bool,
    /// `ACC_FINAL`
    pub is_final: bool,
    /// Class object locked by static synchronized methods
    pub mirror: Option<ObjRef>,
}

impl ClassInfo {
    /// Create a plain class with no flags
    pub fn new(id: u32, name: impl Into<String>, super_class: Option<Arc<ClassInfo>>) -> Self {
        Self {
            id: ClassId(id),
            name: name.into(),
            super_class,
            interfaces: Vec::new(),
            is_interface: false,
            is_final: false,
            mirror: None,
        }
    }

    /// Whether instances of `self` are instances of `other`
    ///
    /// Walks the superclass chain and every transitively implemented interface.
    pub fn is_subclass_of(&self, other: &ClassInfo) -> bool {
        if self.id == other.id {
            return true;
        }
        if self
            .interfaces
            .iter()
            .any(|iface| iface.is_subclass_of(other))
        {
            return true;
        }
        match &self.super_class {
            Some(sup) => sup.is_subclass_of(other),
            None => false,
        }
    }
}

impl fmt::Display for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Value kinds as they appear in descriptors and on the operand stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `L...;` or `[...`
    Object,
    /// `V`
    Void,
}

impl Kind {
    /// Number of frame slots a value of this kind occupies
    #[inline]
    pub fn slots(self) -> usize {
        match self {
            Kind::Long | Kind::Double => 2,
            Kind::Void => 0,
            _ => 1,
        }
    }

    /// Kinds stored in an int slot
    #[inline]
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            Kind::Boolean | Kind::Byte | Kind::Char | Kind::Short | Kind::Int
        )
    }

    /// Kind for a `newarray` `atype` operand
    pub fn from_array_type(atype: u8) -> Option<Kind> {
        match atype {
            4 => Some(Kind::Boolean),
            5 => Some(Kind::Char),
            6 => Some(Kind::Float),
            7 => Some(Kind::Double),
            8 => Some(Kind::Byte),
            9 => Some(Kind::Short),
            10 => Some(Kind::Int),
            11 => Some(Kind::Long),
            _ => None,
        }
    }

    /// Kind for a descriptor's leading character
    pub fn from_descriptor_char(c: u8) -> Option<Kind> {
        match c {
            b'Z' => Some(Kind::Boolean),
            b'B' => Some(Kind::Byte),
            b'C' => Some(Kind::Char),
            b'S' => Some(Kind::Short),
            b'I' => Some(Kind::Int),
            b'J' => Some(Kind::Long),
            b'F' => Some(Kind::Float),
            b'D' => Some(Kind::Double),
            b'L' | b'[' => Some(Kind::Object),
            b'V' => Some(Kind::Void),
            _ => None,
        }
    }

    /// Narrow an int-slot value to this kind
    #[inline]
    pub fn narrow(self, v: i32) -> i32 {
        match self {
            Kind::Byte => v as i8 as i32,
            Kind::Char => v as u16 as i32,
            Kind::Short => v as i16 as i32,
            _ => v,
        }
    }
}

/// Method access flags (class-file `access_flags` bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodFlags(pub u16);

impl MethodFlags {
    /// `ACC_PUBLIC`
    pub const PUBLIC: MethodFlags = MethodFlags(0x0001);
    /// `ACC_PRIVATE`
    pub const PRIVATE: MethodFlags = MethodFlags(0x0002);
    /// `ACC_STATIC`
    pub const STATIC: MethodFlags = MethodFlags(0x0008);
    /// `ACC_FINAL`
    pub const FINAL: MethodFlags = MethodFlags(0x0010);
    /// `ACC_SYNCHRONIZED`
    pub const SYNCHRONIZED: MethodFlags = MethodFlags(0x0020);
    /// `ACC_NATIVE`
    pub const NATIVE: MethodFlags = MethodFlags(0x0100);
    /// `ACC_ABSTRACT`
    pub const ABSTRACT: MethodFlags = MethodFlags(0x0400);

    /// Check whether every bit of `other` is set
    #[inline]
    pub fn contains(self, other: MethodFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for MethodFlags {
    type Output = MethodFlags;

    fn bitor(self, rhs: MethodFlags) -> MethodFlags {
        MethodFlags(self.0 | rhs.0)
    }
}

/// Parse a method descriptor into (argument slots, return kind)
///
/// Argument slots exclude the receiver.
pub fn parse_method_descriptor(descriptor: &str) -> Option<(usize, Kind)> {
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return None;
    }
    let mut i = 1;
    let mut slots = 0;
    while *bytes.get(i)? != b')' {
        let kind = Kind::from_descriptor_char(bytes[i])?;
        i = skip_field_type(bytes, i)?;
        if kind == Kind::Void {
            return None;
        }
        slots += kind.slots();
    }
    i += 1;
    let ret = Kind::from_descriptor_char(*bytes.get(i)?)?;
    if skip_field_type(bytes, i)? != bytes.len() {
        return None;
    }
    Some((slots, ret))
}

fn skip_field_type(bytes: &[u8], mut i: usize) -> Option<usize> {
    while *bytes.get(i)? == b'[' {
        i += 1;
    }
    match *bytes.get(i)? {
        b'L' => {
            let end = bytes[i..].iter().position(|&b| b == b';')?;
            Some(i + end + 1)
        }
        c => Kind::from_descriptor_char(c).map(|_| i + 1),
    }
}

/// A resolved method
pub struct MethodInfo {
    /// Simple name, `<init>` for constructors
    pub name: String,
    /// Method descriptor, e.g. `(IJ)Z`
    pub descriptor: String,
    /// Declaring class
    pub holder: Arc<ClassInfo>,
    /// Access flags
    pub flags: MethodFlags,
    /// Argument slots excluding the receiver
    pub arg_slots: usize,
    /// Declared return kind
    pub return_kind: Kind,
    /// Bytecode body; `None` for native and abstract methods
    pub code: Option<Arc<MethodCode>>,
}

impl MethodInfo {
    /// Create a method, deriving argument slots and return kind from `descriptor`
    pub fn new(
        holder: Arc<ClassInfo>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        flags: MethodFlags,
        code: Option<MethodCode>,
    ) -> Result<Self, LinkError> {
        let descriptor = descriptor.into();
        let (arg_slots, return_kind) = parse_method_descriptor(&descriptor)
            .ok_or_else(|| LinkError::InvalidDescriptor(descriptor.clone()))?;
        Ok(Self {
            name: name.into(),
            descriptor,
            holder,
            flags,
            arg_slots,
            return_kind,
            code: code.map(Arc::new),
        })
    }

    /// `ACC_STATIC`
    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// `ACC_PRIVATE`
    #[inline]
    pub fn is_private(&self) -> bool {
        self.flags.contains(MethodFlags::PRIVATE)
    }

    /// `ACC_FINAL`
    #[inline]
    pub fn is_final(&self) -> bool {
        self.flags.contains(MethodFlags::FINAL)
    }

    /// `ACC_SYNCHRONIZED`
    #[inline]
    pub fn is_synchronized(&self) -> bool {
        self.flags.contains(MethodFlags::SYNCHRONIZED)
    }

    /// `ACC_ABSTRACT`
    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodFlags::ABSTRACT)
    }

    /// Instance initializer
    #[inline]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// Cannot be overridden: final method, final holder, or private
    #[inline]
    pub fn is_effectively_final(&self) -> bool {
        self.is_final() || self.holder.is_final || self.is_private()
    }

    /// Slots consumed from the caller's stack, receiver included
    #[inline]
    pub fn param_slots(&self) -> usize {
        self.arg_slots + usize::from(!self.is_static())
    }
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.holder.name, self.name, self.descriptor)
    }
}

impl fmt::Display for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.holder.name, self.name, self.descriptor)
    }
}

/// A resolved field
#[derive(Debug)]
pub struct FieldInfo {
    /// Simple name
    pub name: String,
    /// Declaring class
    pub holder: Arc<ClassInfo>,
    /// Declared kind
    pub kind: Kind,
    /// `ACC_STATIC`
    pub is_static: bool,
    /// Host slot index for the accessor
    pub slot: u32,
}

impl fmt::Display for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.holder.name, self.name)
    }
}
