use crate::jvm::TypeKind;
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// Raw JVM opcode
///
/// Opcodes modified by the `wide` prefix get their own values: the prefix goes in the high byte
/// (so `wide iload` is `0xC415`). Values are only ever constructed from the table below, so every
/// `Opcode` is a valid one.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-6.html#jvms-6.5
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(u16);

/// Rough category of an opcode, matching the variants of [`super::Instruction`]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum OpcodeKind {
    Nop,
    ConstantIntrinsic,
    ConstantArgument,
    ConstantLoad,
    Load,
    Store,
    Increment,
    Branch,
    TableSwitch,
    LookupSwitch,
    Return,
    Throw,
    Field,
    Invoke,
    InvokeDynamic,
    NewObject,
    NewPrimitiveArray,
    NewReferenceArray,
    NewMultiArray,
    ArrayLoad,
    ArrayStore,
    TypeCheck,
    Convert,
    Operator,
    Stack,
    Monitor,
    DiscontinuedRet,
}

const WIDE_PREFIX: u16 = 0xC4;

macro_rules! opcodes {
    ($($name:ident = $value:literal, $mnemonic:literal, $kind:ident, $size:literal;)*) => {
        impl Opcode {
            $(pub const $name: Opcode = Opcode($value);)*

            /// Mnemonic, kind, and fixed size (0 for switches, whose size depends on padding)
            fn info(self) -> Option<(&'static str, OpcodeKind, u8)> {
                match self.0 {
                    $($value => Some(($mnemonic, OpcodeKind::$kind, $size)),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    NOP = 0x00, "nop", Nop, 1;
    ACONST_NULL = 0x01, "aconst_null", ConstantIntrinsic, 1;
    ICONST_M1 = 0x02, "iconst_m1", ConstantIntrinsic, 1;
    ICONST_0 = 0x03, "iconst_0", ConstantIntrinsic, 1;
    ICONST_1 = 0x04, "iconst_1", ConstantIntrinsic, 1;
    ICONST_2 = 0x05, "iconst_2", ConstantIntrinsic, 1;
    ICONST_3 = 0x06, "iconst_3", ConstantIntrinsic, 1;
    ICONST_4 = 0x07, "iconst_4", ConstantIntrinsic, 1;
    ICONST_5 = 0x08, "iconst_5", ConstantIntrinsic, 1;
    LCONST_0 = 0x09, "lconst_0", ConstantIntrinsic, 1;
    LCONST_1 = 0x0a, "lconst_1", ConstantIntrinsic, 1;
    FCONST_0 = 0x0b, "fconst_0", ConstantIntrinsic, 1;
    FCONST_1 = 0x0c, "fconst_1", ConstantIntrinsic, 1;
    FCONST_2 = 0x0d, "fconst_2", ConstantIntrinsic, 1;
    DCONST_0 = 0x0e, "dconst_0", ConstantIntrinsic, 1;
    DCONST_1 = 0x0f, "dconst_1", ConstantIntrinsic, 1;
    BIPUSH = 0x10, "bipush", ConstantArgument, 2;
    SIPUSH = 0x11, "sipush", ConstantArgument, 3;
    LDC = 0x12, "ldc", ConstantLoad, 2;
    LDC_W = 0x13, "ldc_w", ConstantLoad, 3;
    LDC2_W = 0x14, "ldc2_w", ConstantLoad, 3;
    ILOAD = 0x15, "iload", Load, 2;
    LLOAD = 0x16, "lload", Load, 2;
    FLOAD = 0x17, "fload", Load, 2;
    DLOAD = 0x18, "dload", Load, 2;
    ALOAD = 0x19, "aload", Load, 2;
    ILOAD_0 = 0x1a, "iload_0", Load, 1;
    ILOAD_1 = 0x1b, "iload_1", Load, 1;
    ILOAD_2 = 0x1c, "iload_2", Load, 1;
    ILOAD_3 = 0x1d, "iload_3", Load, 1;
    LLOAD_0 = 0x1e, "lload_0", Load, 1;
    LLOAD_1 = 0x1f, "lload_1", Load, 1;
    LLOAD_2 = 0x20, "lload_2", Load, 1;
    LLOAD_3 = 0x21, "lload_3", Load, 1;
    FLOAD_0 = 0x22, "fload_0", Load, 1;
    FLOAD_1 = 0x23, "fload_1", Load, 1;
    FLOAD_2 = 0x24, "fload_2", Load, 1;
    FLOAD_3 = 0x25, "fload_3", Load, 1;
    DLOAD_0 = 0x26, "dload_0", Load, 1;
    DLOAD_1 = 0x27, "dload_1", Load, 1;
    DLOAD_2 = 0x28, "dload_2", Load, 1;
    DLOAD_3 = 0x29, "dload_3", Load, 1;
    ALOAD_0 = 0x2a, "aload_0", Load, 1;
    ALOAD_1 = 0x2b, "aload_1", Load, 1;
    ALOAD_2 = 0x2c, "aload_2", Load, 1;
    ALOAD_3 = 0x2d, "aload_3", Load, 1;
    IALOAD = 0x2e, "iaload", ArrayLoad, 1;
    LALOAD = 0x2f, "laload", ArrayLoad, 1;
    FALOAD = 0x30, "faload", ArrayLoad, 1;
    DALOAD = 0x31, "daload", ArrayLoad, 1;
    AALOAD = 0x32, "aaload", ArrayLoad, 1;
    BALOAD = 0x33, "baload", ArrayLoad, 1;
    CALOAD = 0x34, "caload", ArrayLoad, 1;
    SALOAD = 0x35, "saload", ArrayLoad, 1;
    ISTORE = 0x36, "istore", Store, 2;
    LSTORE = 0x37, "lstore", Store, 2;
    FSTORE = 0x38, "fstore", Store, 2;
    DSTORE = 0x39, "dstore", Store, 2;
    ASTORE = 0x3a, "astore", Store, 2;
    ISTORE_0 = 0x3b, "istore_0", Store, 1;
    ISTORE_1 = 0x3c, "istore_1", Store, 1;
    ISTORE_2 = 0x3d, "istore_2", Store, 1;
    ISTORE_3 = 0x3e, "istore_3", Store, 1;
    LSTORE_0 = 0x3f, "lstore_0", Store, 1;
    LSTORE_1 = 0x40, "lstore_1", Store, 1;
    LSTORE_2 = 0x41, "lstore_2", Store, 1;
    LSTORE_3 = 0x42, "lstore_3", Store, 1;
    FSTORE_0 = 0x43, "fstore_0", Store, 1;
    FSTORE_1 = 0x44, "fstore_1", Store, 1;
    FSTORE_2 = 0x45, "fstore_2", Store, 1;
    FSTORE_3 = 0x46, "fstore_3", Store, 1;
    DSTORE_0 = 0x47, "dstore_0", Store, 1;
    DSTORE_1 = 0x48, "dstore_1", Store, 1;
    DSTORE_2 = 0x49, "dstore_2", Store, 1;
    DSTORE_3 = 0x4a, "dstore_3", Store, 1;
    ASTORE_0 = 0x4b, "astore_0", Store, 1;
    ASTORE_1 = 0x4c, "astore_1", Store, 1;
    ASTORE_2 = 0x4d, "astore_2", Store, 1;
    ASTORE_3 = 0x4e, "astore_3", Store, 1;
    IASTORE = 0x4f, "iastore", ArrayStore, 1;
    LASTORE = 0x50, "lastore", ArrayStore, 1;
    FASTORE = 0x51, "fastore", ArrayStore, 1;
    DASTORE = 0x52, "dastore", ArrayStore, 1;
    AASTORE = 0x53, "aastore", ArrayStore, 1;
    BASTORE = 0x54, "bastore", ArrayStore, 1;
    CASTORE = 0x55, "castore", ArrayStore, 1;
    SASTORE = 0x56, "sastore", ArrayStore, 1;
    POP = 0x57, "pop", Stack, 1;
    POP2 = 0x58, "pop2", Stack, 1;
    DUP = 0x59, "dup", Stack, 1;
    DUP_X1 = 0x5a, "dup_x1", Stack, 1;
    DUP_X2 = 0x5b, "dup_x2", Stack, 1;
    DUP2 = 0x5c, "dup2", Stack, 1;
    DUP2_X1 = 0x5d, "dup2_x1", Stack, 1;
    DUP2_X2 = 0x5e, "dup2_x2", Stack, 1;
    SWAP = 0x5f, "swap", Stack, 1;
    IADD = 0x60, "iadd", Operator, 1;
    LADD = 0x61, "ladd", Operator, 1;
    FADD = 0x62, "fadd", Operator, 1;
    DADD = 0x63, "dadd", Operator, 1;
    ISUB = 0x64, "isub", Operator, 1;
    LSUB = 0x65, "lsub", Operator, 1;
    FSUB = 0x66, "fsub", Operator, 1;
    DSUB = 0x67, "dsub", Operator, 1;
    IMUL = 0x68, "imul", Operator, 1;
    LMUL = 0x69, "lmul", Operator, 1;
    FMUL = 0x6a, "fmul", Operator, 1;
    DMUL = 0x6b, "dmul", Operator, 1;
    IDIV = 0x6c, "idiv", Operator, 1;
    LDIV = 0x6d, "ldiv", Operator, 1;
    FDIV = 0x6e, "fdiv", Operator, 1;
    DDIV = 0x6f, "ddiv", Operator, 1;
    IREM = 0x70, "irem", Operator, 1;
    LREM = 0x71, "lrem", Operator, 1;
    FREM = 0x72, "frem", Operator, 1;
    DREM = 0x73, "drem", Operator, 1;
    INEG = 0x74, "ineg", Operator, 1;
    LNEG = 0x75, "lneg", Operator, 1;
    FNEG = 0x76, "fneg", Operator, 1;
    DNEG = 0x77, "dneg", Operator, 1;
    ISHL = 0x78, "ishl", Operator, 1;
    LSHL = 0x79, "lshl", Operator, 1;
    ISHR = 0x7a, "ishr", Operator, 1;
    LSHR = 0x7b, "lshr", Operator, 1;
    IUSHR = 0x7c, "iushr", Operator, 1;
    LUSHR = 0x7d, "lushr", Operator, 1;
    IAND = 0x7e, "iand", Operator, 1;
    LAND = 0x7f, "land", Operator, 1;
    IOR = 0x80, "ior", Operator, 1;
    LOR = 0x81, "lor", Operator, 1;
    IXOR = 0x82, "ixor", Operator, 1;
    LXOR = 0x83, "lxor", Operator, 1;
    IINC = 0x84, "iinc", Increment, 3;
    I2L = 0x85, "i2l", Convert, 1;
    I2F = 0x86, "i2f", Convert, 1;
    I2D = 0x87, "i2d", Convert, 1;
    L2I = 0x88, "l2i", Convert, 1;
    L2F = 0x89, "l2f", Convert, 1;
    L2D = 0x8a, "l2d", Convert, 1;
    F2I = 0x8b, "f2i", Convert, 1;
    F2L = 0x8c, "f2l", Convert, 1;
    F2D = 0x8d, "f2d", Convert, 1;
    D2I = 0x8e, "d2i", Convert, 1;
    D2L = 0x8f, "d2l", Convert, 1;
    D2F = 0x90, "d2f", Convert, 1;
    I2B = 0x91, "i2b", Convert, 1;
    I2C = 0x92, "i2c", Convert, 1;
    I2S = 0x93, "i2s", Convert, 1;
    LCMP = 0x94, "lcmp", Operator, 1;
    FCMPL = 0x95, "fcmpl", Operator, 1;
    FCMPG = 0x96, "fcmpg", Operator, 1;
    DCMPL = 0x97, "dcmpl", Operator, 1;
    DCMPG = 0x98, "dcmpg", Operator, 1;
    IFEQ = 0x99, "ifeq", Branch, 3;
    IFNE = 0x9a, "ifne", Branch, 3;
    IFLT = 0x9b, "iflt", Branch, 3;
    IFGE = 0x9c, "ifge", Branch, 3;
    IFGT = 0x9d, "ifgt", Branch, 3;
    IFLE = 0x9e, "ifle", Branch, 3;
    IF_ICMPEQ = 0x9f, "if_icmpeq", Branch, 3;
    IF_ICMPNE = 0xa0, "if_icmpne", Branch, 3;
    IF_ICMPLT = 0xa1, "if_icmplt", Branch, 3;
    IF_ICMPGE = 0xa2, "if_icmpge", Branch, 3;
    IF_ICMPGT = 0xa3, "if_icmpgt", Branch, 3;
    IF_ICMPLE = 0xa4, "if_icmple", Branch, 3;
    IF_ACMPEQ = 0xa5, "if_acmpeq", Branch, 3;
    IF_ACMPNE = 0xa6, "if_acmpne", Branch, 3;
    GOTO = 0xa7, "goto", Branch, 3;
    JSR = 0xa8, "jsr", Branch, 3;
    RET = 0xa9, "ret", DiscontinuedRet, 2;
    TABLESWITCH = 0xaa, "tableswitch", TableSwitch, 0;
    LOOKUPSWITCH = 0xab, "lookupswitch", LookupSwitch, 0;
    IRETURN = 0xac, "ireturn", Return, 1;
    LRETURN = 0xad, "lreturn", Return, 1;
    FRETURN = 0xae, "freturn", Return, 1;
    DRETURN = 0xaf, "dreturn", Return, 1;
    ARETURN = 0xb0, "areturn", Return, 1;
    RETURN = 0xb1, "return", Return, 1;
    GETSTATIC = 0xb2, "getstatic", Field, 3;
    PUTSTATIC = 0xb3, "putstatic", Field, 3;
    GETFIELD = 0xb4, "getfield", Field, 3;
    PUTFIELD = 0xb5, "putfield", Field, 3;
    INVOKEVIRTUAL = 0xb6, "invokevirtual", Invoke, 3;
    INVOKESPECIAL = 0xb7, "invokespecial", Invoke, 3;
    INVOKESTATIC = 0xb8, "invokestatic", Invoke, 3;
    INVOKEINTERFACE = 0xb9, "invokeinterface", Invoke, 5;
    INVOKEDYNAMIC = 0xba, "invokedynamic", InvokeDynamic, 5;
    NEW = 0xbb, "new", NewObject, 3;
    NEWARRAY = 0xbc, "newarray", NewPrimitiveArray, 2;
    ANEWARRAY = 0xbd, "anewarray", NewReferenceArray, 3;
    ARRAYLENGTH = 0xbe, "arraylength", Operator, 1;
    ATHROW = 0xbf, "athrow", Throw, 1;
    CHECKCAST = 0xc0, "checkcast", TypeCheck, 3;
    INSTANCEOF = 0xc1, "instanceof", TypeCheck, 3;
    MONITORENTER = 0xc2, "monitorenter", Monitor, 1;
    MONITOREXIT = 0xc3, "monitorexit", Monitor, 1;
    MULTIANEWARRAY = 0xc5, "multianewarray", NewMultiArray, 4;
    IFNULL = 0xc6, "ifnull", Branch, 3;
    IFNONNULL = 0xc7, "ifnonnull", Branch, 3;
    GOTO_W = 0xc8, "goto_w", Branch, 5;
    JSR_W = 0xc9, "jsr_w", Branch, 5;

    ILOAD_WIDE = 0xC415, "iload", Load, 4;
    LLOAD_WIDE = 0xC416, "lload", Load, 4;
    FLOAD_WIDE = 0xC417, "fload", Load, 4;
    DLOAD_WIDE = 0xC418, "dload", Load, 4;
    ALOAD_WIDE = 0xC419, "aload", Load, 4;
    ISTORE_WIDE = 0xC436, "istore", Store, 4;
    LSTORE_WIDE = 0xC437, "lstore", Store, 4;
    FSTORE_WIDE = 0xC438, "fstore", Store, 4;
    DSTORE_WIDE = 0xC439, "dstore", Store, 4;
    ASTORE_WIDE = 0xC43a, "astore", Store, 4;
    IINC_WIDE = 0xC484, "iinc", Increment, 6;
    RET_WIDE = 0xC4a9, "ret", DiscontinuedRet, 4;
}

impl Opcode {
    /// Opcode for a byte in the code array (the `wide` prefix itself is not an opcode)
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        let opcode = Opcode(byte as u16);
        opcode.info().map(|_| opcode)
    }

    /// Opcode for the byte following a `wide` prefix
    pub fn from_wide_byte(byte: u8) -> Option<Opcode> {
        let opcode = Opcode(WIDE_PREFIX << 8 | byte as u16);
        opcode.info().map(|_| opcode)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// The opcode byte, not counting any `wide` prefix
    pub fn byte(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn is_wide(self) -> bool {
        self.0 >> 8 == WIDE_PREFIX
    }

    fn expect_info(self) -> (&'static str, OpcodeKind, u8) {
        match self.info() {
            Some(info) => info,
            None => unreachable!("opcode {:#x} is not in the opcode table", self.0),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        self.expect_info().0
    }

    pub fn kind(self) -> OpcodeKind {
        self.expect_info().1
    }

    /// Encoded size, including the `wide` prefix (`None` for switches)
    pub fn size(self) -> Option<usize> {
        match self.expect_info().2 {
            0 => None,
            size => Some(size as usize),
        }
    }

    /// Does control never continue to the next instruction?
    pub fn is_unconditional(self) -> bool {
        matches!(
            self.kind(),
            OpcodeKind::Return
                | OpcodeKind::Throw
                | OpcodeKind::TableSwitch
                | OpcodeKind::LookupSwitch
                | OpcodeKind::DiscontinuedRet
        ) || self == Opcode::GOTO
            || self == Opcode::GOTO_W
    }

    /// Is this a branch whose offset is a signed 16-bit value?
    pub fn is_short_branch(self) -> bool {
        self.kind() == OpcodeKind::Branch && self != Opcode::GOTO_W && self != Opcode::JSR_W
    }

    /// Is this a two-way conditional branch?
    pub fn is_conditional_branch(self) -> bool {
        matches!(self.0, 0x99..=0xa6 | 0xc6 | 0xc7)
    }

    /// Conditional branch testing the opposite condition
    pub fn invert(self) -> Option<Opcode> {
        match self.0 {
            0x99..=0xa6 => Some(Opcode(((self.0 - 0x99) ^ 1) + 0x99)),
            0xc6 | 0xc7 => Some(Opcode(self.0 ^ 1)),
            _ => None,
        }
    }

    /// `wide` form of a local variable instruction
    pub fn widened(self) -> Option<Opcode> {
        let base = match self.0 {
            0x15..=0x19 | 0x36..=0x3a | 0x84 | 0xa9 => self.0,
            0x1a..=0x2d => 0x15 + (self.0 - 0x1a) / 4,
            0x3b..=0x4e => 0x36 + (self.0 - 0x3b) / 4,
            _ if self.is_wide() => return Some(self),
            _ => return None,
        };
        Some(Opcode(WIDE_PREFIX << 8 | base))
    }

    /// Slot implied by a `<x>load_<n>` or `<x>store_<n>` opcode
    pub fn implicit_slot(self) -> Option<u16> {
        match self.0 {
            0x1a..=0x2d => Some((self.0 - 0x1a) % 4),
            0x3b..=0x4e => Some((self.0 - 0x3b) % 4),
            _ => None,
        }
    }

    /// Kind of value operated on by loads, stores, returns, and array accesses
    pub fn type_kind(self) -> Option<TypeKind> {
        const KINDS: [TypeKind; 5] = [
            TypeKind::Int,
            TypeKind::Long,
            TypeKind::Float,
            TypeKind::Double,
            TypeKind::Reference,
        ];
        let byte = self.byte() as usize;
        match self.kind() {
            OpcodeKind::Load | OpcodeKind::Store => {
                let kind = match byte {
                    0x15..=0x19 => byte - 0x15,
                    0x1a..=0x2d => (byte - 0x1a) / 4,
                    0x36..=0x3a => byte - 0x36,
                    _ => (byte - 0x3b) / 4,
                };
                Some(KINDS[kind])
            }
            OpcodeKind::Return if self != Opcode::RETURN => Some(KINDS[byte - 0xac]),
            OpcodeKind::Return => Some(TypeKind::Void),
            OpcodeKind::ArrayLoad | OpcodeKind::ArrayStore => {
                let index = if byte >= 0x4f { byte - 0x4f } else { byte - 0x2e };
                Some(match index {
                    5 => TypeKind::Byte,
                    6 => TypeKind::Char,
                    7 => TypeKind::Short,
                    other => KINDS[other],
                })
            }
            _ => None,
        }
    }

    /// Load opcode for a kind of value, picking the one-byte form for slots 0 through 3
    pub fn load(kind: TypeKind, slot: u16) -> Option<Opcode> {
        Self::local_access(0x15, 0x1a, kind, slot)
    }

    /// Store opcode for a kind of value, picking the one-byte form for slots 0 through 3
    pub fn store(kind: TypeKind, slot: u16) -> Option<Opcode> {
        Self::local_access(0x36, 0x3b, kind, slot)
    }

    fn local_access(base: u16, base_short: u16, kind: TypeKind, slot: u16) -> Option<Opcode> {
        let offset = match kind.as_computational() {
            TypeKind::Int => 0,
            TypeKind::Long => 1,
            TypeKind::Float => 2,
            TypeKind::Double => 3,
            TypeKind::Reference => 4,
            _ => return None,
        };
        Some(match slot {
            0..=3 => Opcode(base_short + offset * 4 + slot),
            4..=255 => Opcode(base + offset),
            _ => Opcode(WIDE_PREFIX << 8 | (base + offset)),
        })
    }

    /// Return opcode for a kind of value (`Void` gives `return`)
    pub fn return_(kind: TypeKind) -> Opcode {
        match kind.as_computational() {
            TypeKind::Int => Opcode::IRETURN,
            TypeKind::Long => Opcode::LRETURN,
            TypeKind::Float => Opcode::FRETURN,
            TypeKind::Double => Opcode::DRETURN,
            TypeKind::Reference => Opcode::ARETURN,
            _ => Opcode::RETURN,
        }
    }
}

impl Debug for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.is_wide() {
            f.write_str("wide ")?;
        }
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_byte_decodes_consistently() {
        for byte in 0..=255u8 {
            if let Some(opcode) = Opcode::from_byte(byte) {
                assert_eq!(opcode.byte(), byte);
                assert!(!opcode.is_wide());
            }
        }
        assert_eq!(Opcode::from_byte(0xc4), None, "wide is a prefix");
        assert_eq!(Opcode::from_byte(0xca), None, "breakpoint is reserved");
        assert_eq!(Opcode::from_wide_byte(0x60), None, "iadd has no wide form");
        assert_eq!(Opcode::from_wide_byte(0x84), Some(Opcode::IINC_WIDE));
    }

    #[test]
    fn inverting_conditions() {
        assert_eq!(Opcode::IFEQ.invert(), Some(Opcode::IFNE));
        assert_eq!(Opcode::IFNE.invert(), Some(Opcode::IFEQ));
        assert_eq!(Opcode::IFLT.invert(), Some(Opcode::IFGE));
        assert_eq!(Opcode::IF_ICMPGT.invert(), Some(Opcode::IF_ICMPLE));
        assert_eq!(Opcode::IF_ACMPEQ.invert(), Some(Opcode::IF_ACMPNE));
        assert_eq!(Opcode::IFNULL.invert(), Some(Opcode::IFNONNULL));
        assert_eq!(Opcode::GOTO.invert(), None);
        for byte in 0x99..=0xa6 {
            let opcode = Opcode::from_byte(byte).unwrap();
            assert_eq!(opcode.invert().and_then(Opcode::invert), Some(opcode));
        }
    }

    #[test]
    fn local_access_forms() {
        assert_eq!(Opcode::load(TypeKind::Int, 0), Some(Opcode::ILOAD_0));
        assert_eq!(Opcode::load(TypeKind::Boolean, 3), Some(Opcode::ILOAD_3));
        assert_eq!(Opcode::load(TypeKind::Reference, 4), Some(Opcode::ALOAD));
        assert_eq!(Opcode::store(TypeKind::Double, 300), Some(Opcode::DSTORE_WIDE));
        assert_eq!(Opcode::load(TypeKind::Void, 0), None);

        assert_eq!(Opcode::LLOAD_2.implicit_slot(), Some(2));
        assert_eq!(Opcode::ASTORE_1.widened(), Some(Opcode::ASTORE_WIDE));
        assert_eq!(Opcode::FSTORE_3.type_kind(), Some(TypeKind::Float));
        assert_eq!(Opcode::DLOAD_WIDE.type_kind(), Some(TypeKind::Double));
        assert_eq!(Opcode::CALOAD.type_kind(), Some(TypeKind::Char));
        assert_eq!(Opcode::SASTORE.type_kind(), Some(TypeKind::Short));
        assert_eq!(Opcode::ARETURN.type_kind(), Some(TypeKind::Reference));
        assert_eq!(Opcode::RETURN.type_kind(), Some(TypeKind::Void));
    }

    #[test]
    fn sizes() {
        assert_eq!(Opcode::GOTO.size(), Some(3));
        assert_eq!(Opcode::GOTO_W.size(), Some(5));
        assert_eq!(Opcode::IINC_WIDE.size(), Some(6));
        assert_eq!(Opcode::TABLESWITCH.size(), None);
        assert!(Opcode::GOTO.is_unconditional());
        assert!(!Opcode::IFEQ.is_unconditional());
        assert!(Opcode::JSR.is_short_branch());
        assert!(!Opcode::JSR_W.is_short_branch());
        assert_eq!(format!("{:?}", Opcode::ILOAD_WIDE), "wide iload");
    }
}
