use crate::{BytecodeInstr, CompileError, RoutineBody, Slot, TypedOperand, REGISTER_COUNT, SPILL_COUNT};
use foxjit_ir::{ExecutionUnit, Operand};
use foxjit_types::{Type, Value};
use std::collections::HashMap;

/// Lowers an optimized [`ExecutionUnit`] straight to bytecode: every SSA
/// register gets a physical slot on first definition (general register
/// while `< `[`REGISTER_COUNT`]`, spill slot after), with no liveness-based
/// reuse. The bytecode VM is the reference/oracle backend (spec §4.C); its
/// compiler favors simplicity and a direct correspondence to the IR over
/// the register pressure a real allocator (see `foxjit-rtl`) would
/// optimize for.
pub struct Compiler {
    slots: HashMap<u32, Slot>,
    next_slot: usize,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            slots: HashMap::new(),
            next_slot: 0,
        }
    }

    fn slot_for(&mut self, index: u32) -> Result<Slot, CompileError> {
        if let Some(slot) = self.slots.get(&index) {
            return Ok(*slot);
        }
        let slot = if self.next_slot < REGISTER_COUNT {
            Slot::Register(self.next_slot as u8)
        } else if self.next_slot < REGISTER_COUNT + SPILL_COUNT {
            Slot::Spill((self.next_slot - REGISTER_COUNT) as u8)
        } else {
            return Err(CompileError::OutOfSlots {
                available: REGISTER_COUNT + SPILL_COUNT,
            });
        };
        self.next_slot += 1;
        self.slots.insert(index, slot);
        Ok(slot)
    }

    fn operand(&mut self, operand: &Operand) -> Result<TypedOperand, CompileError> {
        Ok(match operand {
            Operand::Constant { ty, value } => TypedOperand::constant(*ty, *value),
            Operand::Register { index, ty } => TypedOperand::slot(*ty, self.slot_for(*index)?),
        })
    }

    /// Compile a single execution unit into a standalone routine body. The
    /// unit must already satisfy [`ExecutionUnit::validate`]'s single-
    /// terminator invariant; this is not re-checked here.
    pub fn compile(&mut self, unit: &ExecutionUnit) -> Result<RoutineBody, CompileError> {
        let mut body = RoutineBody::new();
        let mut saw_terminator = false;

        for instr in unit.iter() {
            let mut sources = Vec::with_capacity(instr.sources.len() + 1);
            for src in &instr.sources {
                sources.push(self.operand(src)?);
            }
            if let Some(payload) = &instr.call_payload {
                sources.push(TypedOperand::constant(Type::HostAddress, Value::from_u64(payload.function as u64)));
            }

            let result = match instr.result {
                Some(index) => Some(self.slot_for(index)?),
                None => None,
            };

            saw_terminator |= instr.opcode.is_terminator();

            body.push(&BytecodeInstr {
                opcode: instr.opcode,
                result_type: instr.result_type.unwrap_or(Type::I64),
                result,
                sources,
            });
        }

        if !saw_terminator {
            return Err(CompileError::MissingTerminator);
        }
        Ok(body)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foxjit_ir::Assembler;
    use foxjit_types::Type;

    struct NullGuest;

    #[test]
    fn compiles_scenario_a_to_a_routine_with_a_terminator() {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let a = asm.konst(Type::I32, Value::from_i32(7));
        let b = asm.konst(Type::I32, Value::from_i32(35));
        let sum = asm.add(a, b).unwrap();
        let idx = asm.konst(Type::I32, Value::from_i32(0));
        asm.writegr(idx, sum).unwrap();
        let cond = asm.konst(Type::Bool, Value::from_bool(true));
        let cycles = asm.konst(Type::I64, Value::from_i64(1));
        asm.exit(cond, cycles).unwrap();
        let unit = asm.export_unit();

        let routine = Compiler::new().compile(&unit).unwrap();
        assert_eq!(routine.len(), 3);
    }

    #[test]
    fn missing_terminator_is_an_error() {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let a = asm.konst(Type::I32, Value::from_i32(1));
        let b = asm.konst(Type::I32, Value::from_i32(2));
        asm.add(a, b).unwrap();
        let unit = asm.export_unit();

        assert_eq!(
            Compiler::new().compile(&unit).unwrap_err(),
            CompileError::MissingTerminator
        );
    }
}
