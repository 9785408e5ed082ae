//! Lowers an optimized [`foxjit_ir::ExecutionUnit`] to a packed bytecode
//! stream and interprets it with a switch-dispatch VM (spec §4.C/§6). This
//! is FoxJIT's reference/oracle backend: it shares [`foxjit_ir::Calculator`]
//! with the optimizer so the two can never disagree about what a program
//! computes, and a future native backend is only "correct" to the extent it
//! agrees with this one.

mod compiler;
mod disasm;
mod error;
mod record;
mod routine;
mod vm;

pub use compiler::Compiler;
pub use disasm::disassemble;
pub use error::{CompileError, VmError};
pub use record::{BytecodeInstr, BytecodeOperand, Slot, TypedOperand, REGISTER_COUNT, SPILL_COUNT};
pub use routine::{RoutineBody, RoutineIter};
pub use vm::{Outcome, Vm};
