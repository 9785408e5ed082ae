use crate::{Routine, StorageError};
use foxjit_ir::ExecutionUnit;
use thiserror::Error;

/// Why a native backend declined to compile a unit. Distinct from
/// [`crate::JitError`]: this is purely the backend's verdict, consumed by
/// [`crate::CacheEntry::compile`], which always has a bytecode fallback
/// ready regardless of which variant comes back.
#[derive(Debug, Error)]
pub enum NativeCompileError {
    #[error("target has no native emitter for this unit")]
    Unsupported,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A target-specific code generator (spec §4.G / §9's "capability table"
/// guidance: `{compile, execute, disassemble}` function pointers attached
/// per backend rather than an inheritance chain of `Routine` subclasses).
/// `execute` isn't part of the trait because every backend produces the
/// same ABI (spec §6) — [`Routine::execute`] is the one call site.
pub trait NativeBackend: Send + Sync {
    fn compile(&self, unit: &ExecutionUnit) -> Result<Routine, NativeCompileError>;
    fn disassemble(&self, routine: &Routine) -> String;
}

/// A placeholder AMD64 emitter. Per-architecture native code generation is
/// explicitly an external collaborator's job; this exists only so
/// [`crate::BlockDriver`]'s fallback-to-bytecode path is exercised and
/// testable without waiting on that work.
#[derive(Debug, Default)]
pub struct Amd64Backend;

impl NativeBackend for Amd64Backend {
    fn compile(&self, _unit: &ExecutionUnit) -> Result<Routine, NativeCompileError> {
        Err(NativeCompileError::Unsupported)
    }

    fn disassemble(&self, routine: &Routine) -> String {
        routine.disassemble()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullGuest;

    #[test]
    fn stub_backend_always_declines() {
        let mut asm: foxjit_ir::Assembler<NullGuest> = foxjit_ir::Assembler::new();
        let cond = asm.konst(foxjit_types::Type::Bool, foxjit_types::Value::from_bool(true));
        let cycles = asm.konst(foxjit_types::Type::I64, foxjit_types::Value::from_i64(1));
        asm.exit(cond, cycles).unwrap();
        let unit = asm.export_unit();

        assert!(matches!(Amd64Backend.compile(&unit), Err(NativeCompileError::Unsupported)));
    }
}
