use foxjit_ir::Opcode;
use foxjit_types::{Type, Value};

/// Maximum number of general-purpose bytecode registers (spec §4.C).
pub const REGISTER_COUNT: usize = 16;
/// Maximum number of spill slots the bytecode's stack frame reserves
/// (spec §4.C).
pub const SPILL_COUNT: usize = 32;

/// A register or spill-slot operand, packed into a single byte: bit 7
/// selects spill vs. register, bits 0–6 are the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Register(u8),
    Spill(u8),
}

impl Slot {
    const SPILL_BIT: u8 = 0x80;

    pub fn to_byte(self) -> u8 {
        match self {
            Slot::Register(i) => {
                assert!((i as usize) < REGISTER_COUNT, "register index out of range");
                i
            }
            Slot::Spill(i) => {
                assert!((i as usize) < SPILL_COUNT, "spill index out of range");
                Self::SPILL_BIT | i
            }
        }
    }

    pub fn from_byte(byte: u8) -> Slot {
        if byte & Self::SPILL_BIT != 0 {
            Slot::Spill(byte & !Self::SPILL_BIT)
        } else {
            Slot::Register(byte)
        }
    }
}

/// One decoded bytecode instruction: opcode, result type, and operand
/// slots/constants in the order the IR instruction they were lowered from
/// declared its sources (spec §4.C).
///
/// Every source carries its own [`Type`] alongside it (not just the
/// result's) — comparisons, conversions, and `select` all mix operand
/// types that differ from the result type, and [`foxjit_ir::Calculator`]
/// (shared with the optimizer) needs the real per-operand type to agree
/// with it on semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeInstr {
    pub opcode: Opcode,
    pub result_type: Type,
    pub result: Option<Slot>,
    pub sources: Vec<TypedOperand>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypedOperand {
    pub ty: Type,
    pub operand: BytecodeOperand,
}

impl TypedOperand {
    pub fn slot(ty: Type, slot: Slot) -> Self {
        TypedOperand { ty, operand: BytecodeOperand::Slot(slot) }
    }

    pub fn constant(ty: Type, value: Value) -> Self {
        TypedOperand { ty, operand: BytecodeOperand::Constant(value) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BytecodeOperand {
    Slot(Slot),
    Constant(Value),
}

impl BytecodeInstr {
    /// Encode as `[tag, ty, has_result, source_count, register bytes...,
    /// constant bytes (8 each)...]`, with each source's own type tag
    /// prefixed onto it. `source_count` is explicit (rather than
    /// re-derived from `opcode.source_arity()`) so `call`'s variable
    /// arity decodes correctly when records are packed back-to-back in a
    /// [`crate::RoutineBody`] stream.
    pub fn encode(&self) -> Vec<u8> {
        assert!(self.sources.len() <= u8::MAX as usize, "too many bytecode operands");
        let mut bytes = vec![
            self.opcode.tag(),
            self.result_type as u8,
            self.result.is_some() as u8,
            self.sources.len() as u8,
        ];
        if let Some(result) = self.result {
            bytes.push(result.to_byte());
        }
        for src in &self.sources {
            bytes.push(src.ty as u8);
            match src.operand {
                BytecodeOperand::Slot(slot) => {
                    bytes.push(0);
                    bytes.push(slot.to_byte());
                }
                BytecodeOperand::Constant(value) => {
                    bytes.push(1);
                    bytes.extend_from_slice(&value.as_u64().to_le_bytes());
                }
            }
        }
        bytes
    }

    pub fn decode(bytes: &[u8]) -> (BytecodeInstr, usize) {
        let tag = bytes[0];
        let ty = Type::from_tag(bytes[1]).expect("bad bytecode type tag");
        let opcode = Opcode::from_tag(tag, ty).expect("bad bytecode opcode tag");
        let has_result = bytes[2] != 0;
        let source_count = bytes[3] as usize;
        let mut offset = 4;
        let result = if has_result {
            let slot = Slot::from_byte(bytes[offset]);
            offset += 1;
            Some(slot)
        } else {
            None
        };

        let mut sources = Vec::with_capacity(source_count);
        for _ in 0..source_count {
            let src_ty = Type::from_tag(bytes[offset]).expect("bad bytecode source type tag");
            offset += 1;
            let kind = bytes[offset];
            offset += 1;
            match kind {
                0 => {
                    sources.push(TypedOperand::slot(src_ty, Slot::from_byte(bytes[offset])));
                    offset += 1;
                }
                1 => {
                    let value = Value::from_u64(u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap()));
                    sources.push(TypedOperand::constant(src_ty, value));
                    offset += 8;
                }
                other => panic!("bad bytecode operand kind {other}"),
            }
        }

        (
            BytecodeInstr {
                opcode,
                result_type: ty,
                result,
                sources,
            },
            offset,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_round_trips_register_and_spill() {
        assert_eq!(Slot::from_byte(Slot::Register(3).to_byte()), Slot::Register(3));
        assert_eq!(Slot::from_byte(Slot::Spill(7).to_byte()), Slot::Spill(7));
    }

    #[test]
    fn add_instruction_round_trips() {
        let instr = BytecodeInstr {
            opcode: Opcode::Add,
            result_type: Type::I32,
            result: Some(Slot::Register(2)),
            sources: vec![
                TypedOperand::slot(Type::I32, Slot::Register(0)),
                TypedOperand::slot(Type::I32, Slot::Register(1)),
            ],
        };
        let bytes = instr.encode();
        let (decoded, consumed) = BytecodeInstr::decode(&bytes);
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, instr);
    }

    #[test]
    fn call_with_mixed_operands_round_trips() {
        let instr = BytecodeInstr {
            opcode: Opcode::Call,
            result_type: Type::I64,
            result: Some(Slot::Register(5)),
            sources: vec![
                TypedOperand::slot(Type::I64, Slot::Register(1)),
                TypedOperand::constant(Type::HostAddress, Value::from_i64(9)),
            ],
        };
        let bytes = instr.encode();
        let (decoded, _) = BytecodeInstr::decode(&bytes);
        assert_eq!(decoded, instr);
    }
}
