use crate::{NativeBackend, Routine};
use foxjit_ir::ExecutionUnit;
use foxjit_bytecode::RoutineBody;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Whichever backend actually produced this entry's compiled form.
/// `Routine` is cheap to `Clone` (an `Arc` to its slab plus an offset);
/// `RoutineBody` already derives `Clone`.
#[derive(Clone)]
pub enum CompiledBody {
    Native(Routine),
    Bytecode(RoutineBody),
}

/// A reference-counted handle to one compiled (or pending) block, keyed by
/// guest virtual address (spec §4.E). Unlike a C++ `CacheEntry` with an
/// abstract base class and a pure-virtual `compile()`, this is concrete:
/// the "which backend" polymorphism lives in the [`NativeBackend`] trait
/// object the cache hands to [`compile`](CacheEntry::compile), not in a
/// `CacheEntry` subclass per backend (spec §9's "capability table" guidance).
pub struct CacheEntry {
    virtual_address: u32,
    physical_address: u32,
    size: u32,
    invalidated: AtomicBool,
    compiled: AtomicBool,
    queued_for_compile: AtomicBool,
    /// Heuristic hint to the block most likely to execute after this one.
    /// A weak reference — resolved through the cache at hit time, never a
    /// strong cycle (spec §9).
    next_block: Mutex<Weak<CacheEntry>>,
    unit: ExecutionUnit,
    body: Mutex<Option<CompiledBody>>,
}

impl CacheEntry {
    pub fn new(virtual_address: u32, physical_address: u32, size: u32, unit: ExecutionUnit) -> Arc<CacheEntry> {
        assert!(size > 0, "cache entries must cover at least one byte");
        Arc::new(CacheEntry {
            virtual_address,
            physical_address,
            size,
            invalidated: AtomicBool::new(false),
            compiled: AtomicBool::new(false),
            queued_for_compile: AtomicBool::new(false),
            next_block: Mutex::new(Weak::new()),
            unit,
            body: Mutex::new(None),
        })
    }

    pub fn virtual_address(&self) -> u32 {
        self.virtual_address
    }

    pub fn physical_address(&self) -> u32 {
        self.physical_address
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// End address, exclusive (spec §4.E: "end minus start equals length").
    pub fn end_address(&self) -> u32 {
        self.physical_address + self.size
    }

    pub fn unit(&self) -> &ExecutionUnit {
        &self.unit
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.load(Ordering::Acquire)
    }

    pub fn is_queued(&self) -> bool {
        self.queued_for_compile.load(Ordering::Acquire)
    }

    pub fn set_is_invalidated(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    pub fn set_is_queued(&self, queued: bool) {
        self.queued_for_compile.store(queued, Ordering::Release);
    }

    pub fn set_next_block(&self, next: &Arc<CacheEntry>) {
        *self.next_block.lock().unwrap() = Arc::downgrade(next);
    }

    pub fn next_block(&self) -> Option<Arc<CacheEntry>> {
        self.next_block.lock().unwrap().upgrade()
    }

    pub fn body(&self) -> Option<CompiledBody> {
        self.body.lock().unwrap().clone()
    }

    /// Compile this entry's unit at most once (spec §4.E: "`compile()` is
    /// called at most once per entry"). Tries `backend` first; on any
    /// failure (including the stub backend's permanent
    /// `CompileError::Unsupported`), falls back to the bytecode compiler,
    /// which cannot fail for a unit that has already passed
    /// [`ExecutionUnit::validate`]. Returns whether a compiled body now
    /// exists.
    pub fn compile(&self, backend: &dyn NativeBackend) -> bool {
        if self.is_compiled() {
            return true;
        }
        let mut body = self.body.lock().unwrap();
        if body.is_some() {
            self.compiled.store(true, Ordering::Release);
            return true;
        }

        let compiled = match backend.compile(&self.unit) {
            Ok(routine) => CompiledBody::Native(routine),
            Err(err) => {
                tracing::trace!(%err, "native backend declined, falling back to bytecode");
                match foxjit_bytecode::Compiler::new().compile(&self.unit) {
                    Ok(routine) => CompiledBody::Bytecode(routine),
                    Err(err) => {
                        tracing::warn!(%err, va = self.virtual_address, "bytecode fallback also failed to compile");
                        return false;
                    }
                }
            }
        };
        *body = Some(compiled);
        self.compiled.store(true, Ordering::Release);
        true
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("virtual_address", &self.virtual_address)
            .field("physical_address", &self.physical_address)
            .field("size", &self.size)
            .field("invalidated", &self.is_invalidated())
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amd64Backend;
    use foxjit_ir::Assembler;
    use foxjit_types::{Type, Value};

    struct NullGuest;

    fn sample_unit() -> ExecutionUnit {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let cond = asm.konst(Type::Bool, Value::from_bool(true));
        let cycles = asm.konst(Type::I64, Value::from_i64(1));
        asm.exit(cond, cycles).unwrap();
        asm.export_unit()
    }

    #[test]
    fn compile_falls_back_to_bytecode_when_native_is_unsupported() {
        let entry = CacheEntry::new(0x1000, 0x1000, 4, sample_unit());
        assert!(entry.compile(&Amd64Backend));
        assert!(entry.is_compiled());
        assert!(matches!(entry.body(), Some(CompiledBody::Bytecode(_))));
    }

    #[test]
    fn compile_is_idempotent() {
        let entry = CacheEntry::new(0x1000, 0x1000, 4, sample_unit());
        assert!(entry.compile(&Amd64Backend));
        let first = match entry.body() {
            Some(CompiledBody::Bytecode(routine)) => routine.len(),
            _ => panic!("expected bytecode body"),
        };
        assert!(entry.compile(&Amd64Backend));
        let second = match entry.body() {
            Some(CompiledBody::Bytecode(routine)) => routine.len(),
            _ => panic!("expected bytecode body"),
        };
        assert_eq!(first, second);
    }

    #[test]
    fn next_block_hint_is_a_weak_reference() {
        let a = CacheEntry::new(0x1000, 0x1000, 4, sample_unit());
        let b = CacheEntry::new(0x2000, 0x2000, 4, sample_unit());
        a.set_next_block(&b);
        assert_eq!(a.next_block().unwrap().virtual_address(), 0x2000);
        drop(b);
        assert!(a.next_block().is_none());
    }
}
