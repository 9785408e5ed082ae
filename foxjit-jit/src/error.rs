use thiserror::Error;

/// Failures from a storage slab: the process-wide pool of executable memory
/// that compiled routines live in (spec §4.D).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("mmap failed: {0}")]
    MmapFailed(std::io::Error),

    #[error("mprotect failed: {0}")]
    MprotectFailed(std::io::Error),

    #[error("slab exhausted: {requested} bytes requested, {available} available")]
    OutOfSpace { requested: usize, available: usize },
}

/// Failures compiling or executing a cached block, contained within the
/// entry per spec §7 ("compilation failures are contained within the
/// entry") — none of these stop the driver; they only force a fallback to
/// the bytecode VM.
#[derive(Debug, Error)]
pub enum JitError {
    #[error("execution unit failed validation: {0}")]
    InvalidUnit(String),

    #[error(transparent)]
    Compile(#[from] foxjit_bytecode::CompileError),

    #[error(transparent)]
    Vm(#[from] foxjit_bytecode::VmError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
