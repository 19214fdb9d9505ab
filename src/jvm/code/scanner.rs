use super::{Opcode, OpcodeKind};
use crate::jvm::Error;
use byteorder::{BigEndian, ByteOrder};

/// Decoded operands of one raw instruction
///
/// Branch offsets are kept relative to the instruction, exactly as encoded.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RawOperands {
    None,

    /// Local variable slot (including the implicit slot of `iload_2` and friends)
    Local(u16),
    Increment { slot: u16, delta: i16 },

    /// Immediate of `bipush`, `sipush`, `newarray`
    Value(i32),

    /// Constant pool index
    Index(u16),
    InvokeInterface { index: u16, count: u8 },
    MultiArray { index: u16, dimensions: u8 },
    Branch(i32),
    TableSwitch {
        default: i32,
        low: i32,
        high: i32,
        offsets: Vec<i32>,
    },
    LookupSwitch {
        default: i32,
        pairs: Vec<(i32, i32)>,
    },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RawInstruction {
    pub offset: u32,
    pub opcode: Opcode,

    /// Encoded size, including any prefix and switch padding
    pub size: u32,
    pub operands: RawOperands,
}

impl RawInstruction {
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// Absolute offsets this instruction can branch to
    pub fn branch_targets(&self) -> Vec<i64> {
        let base = self.offset as i64;
        match &self.operands {
            RawOperands::Branch(relative) => vec![base + *relative as i64],
            RawOperands::TableSwitch {
                default, offsets, ..
            } => std::iter::once(default)
                .chain(offsets.iter())
                .map(|relative| base + *relative as i64)
                .collect(),
            RawOperands::LookupSwitch { default, pairs } => std::iter::once(default)
                .chain(pairs.iter().map(|(_, relative)| relative))
                .map(|relative| base + *relative as i64)
                .collect(),
            _ => vec![],
        }
    }
}

/// Iterator over the instructions of a code array
///
/// Decoding stops at the first error.
pub struct RawBytecode<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> RawBytecode<'a> {
    pub fn new(code: &'a [u8]) -> RawBytecode<'a> {
        RawBytecode {
            code,
            offset: 0,
            failed: false,
        }
    }

    fn illegal(&self, reason: &'static str) -> Error {
        Error::IllegalBytecode {
            offset: self.offset as u32,
            reason,
        }
    }

    /// Bytes `start..start + len`, checking they are within the code
    fn bytes(&self, start: usize, len: usize) -> Result<&'a [u8], Error> {
        start
            .checked_add(len)
            .and_then(|end| self.code.get(start..end))
            .ok_or_else(|| self.illegal("instruction runs past the end of the code"))
    }

    fn decode(&self) -> Result<RawInstruction, Error> {
        let offset = self.offset;
        let first = self.code[offset];

        let opcode = if first == 0xc4 {
            let second = self.bytes(offset + 1, 1)?[0];
            Opcode::from_wide_byte(second).ok_or_else(|| self.illegal("invalid wide opcode"))?
        } else {
            Opcode::from_byte(first).ok_or_else(|| self.illegal("unknown opcode"))?
        };

        match opcode.size() {
            Some(size) => {
                let operand_start = offset + if opcode.is_wide() { 2 } else { 1 };
                let operands = self.bytes(operand_start, size - (operand_start - offset))?;
                Ok(RawInstruction {
                    offset: offset as u32,
                    opcode,
                    size: size as u32,
                    operands: Self::fixed_operands(opcode, operands),
                })
            }
            None => self.decode_switch(opcode),
        }
    }

    fn fixed_operands(opcode: Opcode, operands: &[u8]) -> RawOperands {
        let u2 = |at: usize| BigEndian::read_u16(&operands[at..]);
        match opcode.kind() {
            OpcodeKind::Load | OpcodeKind::Store | OpcodeKind::DiscontinuedRet => {
                if let Some(slot) = opcode.implicit_slot() {
                    RawOperands::Local(slot)
                } else if opcode.is_wide() {
                    RawOperands::Local(u2(0))
                } else {
                    RawOperands::Local(operands[0] as u16)
                }
            }
            OpcodeKind::Increment if opcode.is_wide() => RawOperands::Increment {
                slot: u2(0),
                delta: u2(2) as i16,
            },
            OpcodeKind::Increment => RawOperands::Increment {
                slot: operands[0] as u16,
                delta: operands[1] as i8 as i16,
            },
            OpcodeKind::ConstantArgument if opcode == Opcode::BIPUSH => {
                RawOperands::Value(operands[0] as i8 as i32)
            }
            OpcodeKind::ConstantArgument => RawOperands::Value(u2(0) as i16 as i32),
            OpcodeKind::NewPrimitiveArray => RawOperands::Value(operands[0] as i32),
            OpcodeKind::ConstantLoad if opcode == Opcode::LDC => {
                RawOperands::Index(operands[0] as u16)
            }
            OpcodeKind::Invoke if opcode == Opcode::INVOKEINTERFACE => {
                RawOperands::InvokeInterface {
                    index: u2(0),
                    count: operands[2],
                }
            }
            OpcodeKind::ConstantLoad
            | OpcodeKind::Field
            | OpcodeKind::Invoke
            | OpcodeKind::InvokeDynamic
            | OpcodeKind::NewObject
            | OpcodeKind::NewReferenceArray
            | OpcodeKind::TypeCheck => RawOperands::Index(u2(0)),
            OpcodeKind::NewMultiArray => RawOperands::MultiArray {
                index: u2(0),
                dimensions: operands[2],
            },
            OpcodeKind::Branch if operands.len() == 4 => {
                RawOperands::Branch(BigEndian::read_i32(operands))
            }
            OpcodeKind::Branch => RawOperands::Branch(u2(0) as i16 as i32),
            _ => RawOperands::None,
        }
    }

    fn decode_switch(&self, opcode: Opcode) -> Result<RawInstruction, Error> {
        let offset = self.offset;
        let i4 = |at: usize| -> Result<i32, Error> { Ok(BigEndian::read_i32(self.bytes(at, 4)?)) };

        // Operands start at the next multiple of 4
        let mut at = (offset + 4) & !3;
        let default = i4(at)?;
        at += 4;

        let operands = if opcode == Opcode::TABLESWITCH {
            let low = i4(at)?;
            let high = i4(at + 4)?;
            at += 8;
            if low > high {
                return Err(self.illegal("tableswitch low bound exceeds high bound"));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            self.bytes(at, count.saturating_mul(4))?;
            let offsets = (0..count)
                .map(|i| i4(at + 4 * i))
                .collect::<Result<Vec<_>, _>>()?;
            at += 4 * count;
            RawOperands::TableSwitch {
                default,
                low,
                high,
                offsets,
            }
        } else {
            let npairs = i4(at)?;
            at += 4;
            if npairs < 0 {
                return Err(self.illegal("lookupswitch has a negative number of pairs"));
            }
            let count = npairs as usize;
            self.bytes(at, count.saturating_mul(8))?;
            let pairs = (0..count)
                .map(|i| Ok((i4(at + 8 * i)?, i4(at + 8 * i + 4)?)))
                .collect::<Result<Vec<_>, Error>>()?;
            if pairs.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
                return Err(self.illegal("lookupswitch keys are not sorted"));
            }
            at += 8 * count;
            RawOperands::LookupSwitch { default, pairs }
        };

        Ok(RawInstruction {
            offset: offset as u32,
            opcode,
            size: (at - offset) as u32,
            operands,
        })
    }
}

impl<'a> Iterator for RawBytecode<'a> {
    type Item = Result<RawInstruction, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        match self.decode() {
            Ok(instruction) => {
                self.offset = instruction.next_offset() as usize;
                Some(Ok(instruction))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scan(code: &[u8]) -> Result<Vec<RawInstruction>, Error> {
        RawBytecode::new(code).collect()
    }

    #[test]
    fn simple_instructions() {
        // iload_1; bipush -2; iadd; wide istore 300; iinc 1 -1; ireturn
        let code = [
            0x1b, 0x10, 0xfe, 0x60, 0xc4, 0x36, 0x01, 0x2c, 0x84, 0x01, 0xff, 0xac,
        ];
        let instructions = scan(&code).unwrap();
        let summary: Vec<(u32, Opcode, RawOperands)> = instructions
            .into_iter()
            .map(|insn| (insn.offset, insn.opcode, insn.operands))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, Opcode::ILOAD_1, RawOperands::Local(1)),
                (1, Opcode::BIPUSH, RawOperands::Value(-2)),
                (3, Opcode::IADD, RawOperands::None),
                (4, Opcode::ISTORE_WIDE, RawOperands::Local(300)),
                (
                    8,
                    Opcode::IINC,
                    RawOperands::Increment { slot: 1, delta: -1 }
                ),
                (11, Opcode::IRETURN, RawOperands::None),
            ]
        );
    }

    #[test]
    fn switch_padding() {
        // nop; tableswitch (pad 2) default=20 low=0 high=1 [24, 28]
        let mut code = vec![0x00, 0xaa, 0, 0];
        for value in [20, 0, 1, 24, 28] {
            code.extend_from_slice(&i32::to_be_bytes(value));
        }
        let instructions = scan(&code).unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[1].size, 23);
        assert_eq!(instructions[1].branch_targets(), vec![21, 25, 29]);
    }

    #[test]
    fn lookupswitch() {
        // lookupswitch (pad 3) default=8 npairs=2 [1 -> 12, 5 -> 16]
        let mut code = vec![0xab, 0, 0, 0];
        for value in [8, 2, 1, 12, 5, 16] {
            code.extend_from_slice(&i32::to_be_bytes(value));
        }
        let instructions = scan(&code).unwrap();
        assert_eq!(
            instructions[0].operands,
            RawOperands::LookupSwitch {
                default: 8,
                pairs: vec![(1, 12), (5, 16)],
            }
        );
        assert_eq!(instructions[0].size, 28);
    }

    #[test]
    fn illegal_code() {
        assert!(matches!(
            scan(&[0x11, 0x00]),
            Err(Error::IllegalBytecode { offset: 0, .. })
        ));
        assert!(matches!(
            scan(&[0x00, 0xca]),
            Err(Error::IllegalBytecode { offset: 1, .. })
        ));
        assert!(matches!(
            scan(&[0xc4, 0x60]),
            Err(Error::IllegalBytecode { offset: 0, .. })
        ));

        let mut inverted = vec![0xaa, 0, 0, 0];
        for value in [0, 5, 1] {
            inverted.extend_from_slice(&i32::to_be_bytes(value));
        }
        assert!(matches!(
            scan(&inverted),
            Err(Error::IllegalBytecode { .. })
        ));

        let mut negative = vec![0xab, 0, 0, 0];
        for value in [0, -1] {
            negative.extend_from_slice(&i32::to_be_bytes(value));
        }
        assert!(matches!(
            scan(&negative),
            Err(Error::IllegalBytecode { .. })
        ));
    }

    #[test]
    fn stops_after_error() {
        let mut scanner = RawBytecode::new(&[0x00, 0xff, 0x00]);
        assert!(scanner.next().unwrap().is_ok());
        assert!(scanner.next().unwrap().is_err());
        assert!(scanner.next().is_none());
    }
}
