use crate::{Opcode, Operand};
use foxjit_types::{Type, Value};
use std::fmt;

/// A host function invoked by the `call` opcode. The guest is first
/// argument; the remaining arguments and the return value are all
/// [`Value`]s, untyped from the call's perspective (the assembler already
/// checked the operand types when `call` was emitted).
pub type HostFn<G> = unsafe extern "C" fn(guest: *mut G, args: *const Value, argc: usize) -> Value;

/// Extra data an instruction needs beyond its opcode and operand list.
/// Only `call` uses this today: the host function pointer doesn't fit in an
/// [`Operand`] (it isn't a guest-visible value), so it rides in the payload.
#[derive(Clone, Copy)]
pub struct CallPayload {
    pub function: usize, // type-erased `HostFn<G>`, reinterpreted by the caller
}

impl fmt::Debug for CallPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallPayload(0x{:x})", self.function)
    }
}

/// One IR instruction: an opcode, up to three typed source operands, and an
/// optional SSA result. Mirrors spec §3's `ExecutionUnit` instruction
/// layout exactly (opcode, result-type, result-ssa-index, sources, payload).
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub result_type: Option<Type>,
    pub result: Option<u32>,
    pub sources: Vec<Operand>,
    pub call_payload: Option<CallPayload>,
}

impl Instruction {
    pub fn result_operand(&self) -> Option<Operand> {
        match (self.result, self.result_type) {
            (Some(index), Some(ty)) => Some(Operand::Register { index, ty }),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(index) = self.result {
            write!(f, "${index} := {}", self.opcode)?;
        } else {
            write!(f, "{}", self.opcode)?;
        }
        for (i, src) in self.sources.iter().enumerate() {
            if i == 0 {
                write!(f, " {src}")?;
            } else {
                write!(f, ", {src}")?;
            }
        }
        Ok(())
    }
}

/// One extended basic block of IR instructions (spec §3/Glossary): single
/// entry, possibly multiple exits via `exit`, no internal back edges. This
/// is the unit compilation works on end to end — the assembler builds it,
/// the optimizer rewrites it, and the bytecode/native compilers lower it.
#[derive(Debug, Clone, Default)]
pub struct ExecutionUnit {
    instructions: Vec<Instruction>,
}

impl ExecutionUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    pub fn get(&self, i: usize) -> Option<&Instruction> {
        self.instructions.get(i)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Validate the invariants spec §3 requires of every `ExecutionUnit`:
    /// every register source refers to a prior definition in the same unit,
    /// and the unit ends with a terminator. A conditional `exit` or `ifbr`
    /// may appear mid-unit (it only terminates its own linear path when
    /// taken); `br` and an unconditionally-taken `exit` always terminate,
    /// so only the unit's final instruction is required to be one.
    pub fn validate(&self) -> Result<(), String> {
        let mut defined = std::collections::HashSet::new();
        for (i, instr) in self.instructions.iter().enumerate() {
            for src in &instr.sources {
                if let Operand::Register { index, .. } = src {
                    if !defined.contains(index) {
                        return Err(format!(
                            "instruction {i} ({}) uses undefined register ${index}",
                            instr.opcode
                        ));
                    }
                }
            }
            if let Some(result) = instr.result {
                defined.insert(result);
            }
        }
        match self.instructions.last() {
            Some(instr) if instr.opcode.is_terminator() => Ok(()),
            Some(instr) => Err(format!("unit ends with {}, not a terminator", instr.opcode)),
            None => Err("unit has no instructions".to_string()),
        }
    }
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "[{i:04}] {instr}")?;
        }
        Ok(())
    }
}
