use crate::{BytecodeInstr, BytecodeOperand, RoutineBody, Slot, TypedOperand, VmError, REGISTER_COUNT, SPILL_COUNT};
use foxjit_ir::{Calculator, Opcode};
use foxjit_types::{Guest, Type, Value};

/// How a routine's single terminator handed control back to the driver
/// (spec §4.H): `exit` reports an elapsed cycle count, `br`/a taken `ifbr`
/// report a guest jump target, and a not-taken `ifbr` reports fallthrough
/// (the driver computes the next guest PC itself — this VM never guesses
/// at guest instruction widths).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Exit { cycles: u64 },
    Jump { target: Value },
    Fallthrough,
}

/// The reference bytecode interpreter: a switch over [`Opcode`] that
/// re-uses [`Calculator`] for every pure arithmetic/bitwise/compare/
/// conversion opcode, so its semantics can never drift from the
/// constant-folding optimizer's (spec §4.B/§4.C — both must agree on
/// Scenario A/B/C).
pub struct Vm {
    registers: [Value; REGISTER_COUNT],
    spills: [Value; SPILL_COUNT],
}

impl Default for Vm {
    fn default() -> Self {
        Vm {
            registers: [Value::zero(); REGISTER_COUNT],
            spills: [Value::zero(); SPILL_COUNT],
        }
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm::default()
    }

    fn read(&self, slot: Slot) -> Value {
        match slot {
            Slot::Register(i) => self.registers[i as usize],
            Slot::Spill(i) => self.spills[i as usize],
        }
    }

    fn write(&mut self, slot: Slot, value: Value) {
        match slot {
            Slot::Register(i) => self.registers[i as usize] = value,
            Slot::Spill(i) => self.spills[i as usize] = value,
        }
    }

    fn resolve(&self, operand: &TypedOperand) -> Value {
        match operand.operand {
            BytecodeOperand::Slot(slot) => self.read(slot),
            BytecodeOperand::Constant(value) => value,
        }
    }

    fn resolve_typed(&self, operand: &TypedOperand) -> (Type, Value) {
        (operand.ty, self.resolve(operand))
    }

    /// Run `routine` to its terminator. `guest` services every `readgr`/
    /// `writegr`/`load`/`store`/`call` the routine performs.
    pub fn run<G: Guest>(&mut self, routine: &RoutineBody, guest: &mut G) -> Result<Outcome, VmError> {
        tracing::trace!(instructions = routine.len(), "entering routine");
        for instr in routine.iter() {
            if let Some(outcome) = self.step(&instr, guest)? {
                tracing::trace!(?outcome, "routine terminated");
                return Ok(outcome);
            }
        }
        Err(VmError::FellOffTheEnd)
    }

    #[tracing::instrument(name = "bytecode_instr", skip(self, guest), fields(opcode = %instr.opcode))]
    fn step<G: Guest>(&mut self, instr: &BytecodeInstr, guest: &mut G) -> Result<Option<Outcome>, VmError> {
        let ty = instr.result_type;
        match instr.opcode {
            Opcode::Nop => {}

            Opcode::ReadGr => {
                let index = self.resolve(&instr.sources[0]).as_u32();
                let value = guest.register_read(index, ty.byte_size());
                self.write(instr.result.unwrap(), value);
            }
            Opcode::WriteGr => {
                let index = self.resolve(&instr.sources[0]).as_u32();
                let width = instr.sources[1].ty.byte_size();
                let value = self.resolve(&instr.sources[1]);
                guest.register_write(index, width, value);
            }
            Opcode::Load => {
                let address = self.resolve(&instr.sources[0]).as_u32();
                let value = guest.load(address, ty.byte_size());
                self.write(instr.result.unwrap(), value);
            }
            Opcode::Store => {
                let address = self.resolve(&instr.sources[0]).as_u32();
                let width = instr.sources[1].ty.byte_size();
                let value = self.resolve(&instr.sources[1]);
                guest.store(address, width, value);
            }

            Opcode::Br => {
                let target = self.resolve(&instr.sources[0]);
                return Ok(Some(Outcome::Jump { target }));
            }
            Opcode::IfBr => {
                let condition = self.resolve(&instr.sources[0]).as_bool();
                return Ok(Some(if condition {
                    Outcome::Jump { target: self.resolve(&instr.sources[1]) }
                } else {
                    Outcome::Fallthrough
                }));
            }
            Opcode::Exit => {
                let condition = self.resolve(&instr.sources[0]).as_bool();
                if condition {
                    let cycles = self.resolve(&instr.sources[1]).as_i64() as u64;
                    return Ok(Some(Outcome::Exit { cycles }));
                }
            }

            Opcode::Select => {
                let condition = self.resolve(&instr.sources[0]).as_bool();
                let value = if condition {
                    self.resolve(&instr.sources[2])
                } else {
                    self.resolve(&instr.sources[1])
                };
                self.write(instr.result.unwrap(), value);
            }

            Opcode::Call => {
                let function = instr
                    .sources
                    .last()
                    .and_then(|op| match op.operand {
                        BytecodeOperand::Constant(v) => Some(v.as_u64() as usize),
                        _ => None,
                    })
                    .ok_or(VmError::MissingCallTarget)?;
                let args: Vec<Value> = instr.sources[..instr.sources.len() - 1]
                    .iter()
                    .map(|op| self.resolve(op))
                    .collect();
                // SAFETY: `function` was produced by `Assembler::call` from a
                // real `HostFn<G>`, type-erased to `usize` on the same `G`
                // this VM is instantiated with.
                let host_fn: foxjit_ir::HostFn<G> = unsafe { std::mem::transmute(function) };
                let result = unsafe { host_fn(guest as *mut G, args.as_ptr(), args.len()) };
                if let Some(slot) = instr.result {
                    self.write(slot, result);
                }
            }

            opcode => {
                let sources: Vec<(Type, Value)> = instr.sources.iter().map(|op| self.resolve_typed(op)).collect();
                let result = Calculator::eval(opcode, ty, &sources).expect("non-foldable opcode reached Calculator fallback");
                self.write(instr.result.unwrap(), result);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Compiler;
    use foxjit_ir::Assembler;
    use foxjit_types::Type;

    struct NullGuest;
    impl Guest for NullGuest {
        fn register_read(&mut self, _index: u32, _width: u32) -> Value {
            Value::zero()
        }
        fn register_write(&mut self, _index: u32, _width: u32, _value: Value) {}
        fn load(&mut self, _address: u32, _width: u32) -> Value {
            Value::zero()
        }
        fn store(&mut self, _address: u32, _width: u32, _value: Value) {}
    }

    #[derive(Default)]
    struct RecordingGuest {
        written: Vec<(u32, Value)>,
    }
    impl Guest for RecordingGuest {
        fn register_read(&mut self, _index: u32, _width: u32) -> Value {
            Value::zero()
        }
        fn register_write(&mut self, index: u32, _width: u32, value: Value) {
            self.written.push((index, value));
        }
        fn load(&mut self, _address: u32, _width: u32) -> Value {
            Value::zero()
        }
        fn store(&mut self, _address: u32, _width: u32, _value: Value) {}
    }

    #[test]
    fn scenario_a_runs_and_writes_42_to_guest_register_0() {
        let mut asm: Assembler<RecordingGuest> = Assembler::new();
        let a = asm.konst(Type::I32, Value::from_i32(7));
        let b = asm.konst(Type::I32, Value::from_i32(35));
        let sum = asm.add(a, b).unwrap();
        let idx = asm.konst(Type::I32, Value::from_i32(0));
        asm.writegr(idx, sum).unwrap();
        let cond = asm.konst(Type::Bool, Value::from_bool(true));
        let cycles = asm.konst(Type::I64, Value::from_i64(3));
        asm.exit(cond, cycles).unwrap();
        let unit = asm.export_unit();

        let routine = Compiler::new().compile(&unit).unwrap();
        let mut vm = Vm::new();
        let mut guest = RecordingGuest::default();
        let outcome = vm.run(&routine, &mut guest).unwrap();

        assert_eq!(outcome, Outcome::Exit { cycles: 3 });
        assert_eq!(guest.written, vec![(0, Value::from_i32(42))]);
    }

    #[test]
    fn exit_not_taken_falls_through_to_the_next_instruction() {
        let mut asm: Assembler<RecordingGuest> = Assembler::new();
        let cond = asm.konst(Type::Bool, Value::from_bool(false));
        let cycles = asm.konst(Type::I64, Value::from_i64(99));
        asm.exit(cond, cycles).unwrap();
        let idx = asm.konst(Type::I32, Value::from_i32(0));
        let value = asm.konst(Type::I32, Value::from_i32(7));
        asm.writegr(idx, value).unwrap();
        let real_cond = asm.konst(Type::Bool, Value::from_bool(true));
        let real_cycles = asm.konst(Type::I64, Value::from_i64(1));
        asm.exit(real_cond, real_cycles).unwrap();
        let unit = asm.export_unit();

        let routine = Compiler::new().compile(&unit).unwrap();
        let mut vm = Vm::new();
        let mut guest = RecordingGuest::default();
        let outcome = vm.run(&routine, &mut guest).unwrap();

        assert_eq!(outcome, Outcome::Exit { cycles: 1 });
        assert_eq!(guest.written, vec![(0, Value::from_i32(7))]);
    }

    #[test]
    fn ifbr_not_taken_reports_fallthrough() {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let cond = asm.konst(Type::Bool, Value::from_bool(false));
        let target = asm.konst(Type::BranchLabel, Value::from_u32(0x1000));
        asm.ifbr(cond, target).unwrap();
        let unit = asm.export_unit();

        let routine = Compiler::new().compile(&unit).unwrap();
        let mut vm = Vm::new();
        let mut guest = NullGuest;
        assert_eq!(vm.run(&routine, &mut guest).unwrap(), Outcome::Fallthrough);
    }

    #[test]
    fn ifbr_taken_reports_the_jump_target() {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let cond = asm.konst(Type::Bool, Value::from_bool(true));
        let target = asm.konst(Type::BranchLabel, Value::from_u32(0x2000));
        asm.ifbr(cond, target).unwrap();
        let unit = asm.export_unit();

        let routine = Compiler::new().compile(&unit).unwrap();
        let mut vm = Vm::new();
        let mut guest = NullGuest;
        assert_eq!(
            vm.run(&routine, &mut guest).unwrap(),
            Outcome::Jump { target: Value::from_u32(0x2000) }
        );
    }
}
