use thiserror::Error;

/// Failures lowering an [`foxjit_ir::ExecutionUnit`] to bytecode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("execution unit uses more SSA registers than the bytecode register file + spill area can hold ({available} available)")]
    OutOfSlots { available: usize },

    #[error("execution unit has no terminator (a call to exit/br/ifbr)")]
    MissingTerminator,
}

/// Failures the bytecode VM can raise while interpreting a compiled
/// [`crate::RoutineBody`]. Both variants indicate a malformed routine —
/// one compiled from a validated [`foxjit_ir::ExecutionUnit`] can't
/// trigger either.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VmError {
    #[error("routine ended without hitting exit/br/ifbr")]
    FellOffTheEnd,

    #[error("call instruction carried no function-pointer payload")]
    MissingCallTarget,
}
