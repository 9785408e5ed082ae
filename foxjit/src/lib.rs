//! FoxJIT: a dynamic recompiler framework for multi-guest emulation —
//! IR → RTL → register allocation → bytecode VM or native codegen, backed
//! by a JIT cache with memory-watch invalidation (spec §1/§2).
//!
//! This crate re-exports every sub-crate's public surface and wires them
//! into [`Engine`], the type an embedder actually constructs. Individual
//! layers (`foxjit_ir`, `foxjit_rtl`, `foxjit_bytecode`, `foxjit_jit`) stay
//! usable standalone for embedders who want to drive compilation themselves
//! rather than go through the reference driver loop.

pub use foxjit_bytecode::{
    disassemble as disassemble_bytecode, BytecodeInstr, BytecodeOperand, CompileError, Compiler,
    Outcome, RoutineBody, Slot, TypedOperand, VmError, REGISTER_COUNT, SPILL_COUNT,
};
pub use foxjit_ir::{
    constant_propagation, dead_code_elimination, optimize, AssemblyError, Assembler, CallPayload,
    Calculator, ExecutionUnit, HostFn, Instruction, Opcode, Operand, RegisterCache,
};
pub use foxjit_jit::{
    physical_address, Amd64Backend, BlockDriver, Cache, CacheEntry, CompiledBody, GuestMemoryWatch,
    JitError, NativeBackend, NativeCompileError, NativeEntry, NullWatch, Routine, Slab,
    StorageError, ALLOC_ALIGN, DEFAULT_SLAB_SIZE, PAGE_SIZE, PHYSICAL_ADDRESS_MASK,
};
pub use foxjit_rtl::{
    AllocError, HwRegister, LinearScanAllocator, RegisterAllocator, RegisterAssignment,
    RegisterClass, RegisterSet, RegisterState, RegisterUsage, RtlCursor, RtlFlags, RtlInstruction,
    RtlInstructions, RtlOp, RtlProgram, RtlRegister, SPILL_CLASS,
};
pub use foxjit_types::{is_valid_access_width, Guest, Type, Value, VALID_ACCESS_WIDTHS};

use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced across the whole pipeline, unifying each layer's own
/// error type (spec ambient stack: "one `thiserror` enum per fallible
/// surface, plus a top-level enum unifying them for driver code").
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Vm(#[from] VmError),

    #[error(transparent)]
    Jit(#[from] JitError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("unsupported engine configuration: {0}")]
    UnsupportedConfig(String),
}

/// When a freshly inserted block is handed to the compile queue.
///
/// Only [`CompileQueuePolicy::Synchronous`] is implemented by this
/// reference engine (spec §5: "background compilation is permitted by
/// design but the current reference compiles synchronously") — `Deferred`
/// is accepted by [`EngineConfig`] for forward compatibility with an
/// embedder that drains the queue from a worker thread, but [`Engine::new`]
/// rejects it until that worker exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileQueuePolicy {
    #[default]
    Synchronous,
    Deferred,
}

/// Engine-wide knobs, mirroring how `fuel-vm/src/interpreter/constructors.rs`
/// threads a single `Default`-able config struct through its interpreter
/// constructors.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Size in bytes of each native-code storage slab (spec §4.D).
    pub slab_size: usize,
    /// Upper bound on physical addresses the cache's page-refcount table
    /// covers; guest physical addresses are masked into `[0, limit)` by
    /// [`physical_address`].
    pub physical_address_limit: u32,
    pub compile_queue_policy: CompileQueuePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            slab_size: DEFAULT_SLAB_SIZE,
            physical_address_limit: PHYSICAL_ADDRESS_MASK + 1,
            compile_queue_policy: CompileQueuePolicy::Synchronous,
        }
    }
}

/// The reference recompiler: a [`Cache`] of compiled blocks plus a
/// [`BlockDriver`] that looks a guest PC up, compiles on miss, and falls
/// back to the bytecode VM whenever no ready native routine exists.
///
/// `G` is the guest this engine is compiling for; decoding guest
/// instructions into an [`ExecutionUnit`] is the embedder's job (per-guest
/// decoders are explicitly out of scope — spec Non-goals), supplied as a
/// closure at construction.
pub struct Engine<G: Guest> {
    driver: BlockDriver<G>,
    slab: Arc<Slab>,
}

impl<G: Guest> Engine<G> {
    pub fn new(
        config: EngineConfig,
        watcher: Box<dyn GuestMemoryWatch>,
        backend: Box<dyn NativeBackend>,
        decode: impl FnMut(u32) -> (ExecutionUnit, u32) + Send + 'static,
    ) -> Result<Self, EngineError> {
        if config.compile_queue_policy == CompileQueuePolicy::Deferred {
            return Err(EngineError::UnsupportedConfig(
                "deferred compile-queue draining has no worker implementation yet; use Synchronous".into(),
            ));
        }
        let slab = Slab::new(config.slab_size)?;
        let cache = Cache::new(config.physical_address_limit, watcher);
        Ok(Engine {
            driver: BlockDriver::new(cache, backend, decode),
            slab,
        })
    }

    /// Construct an engine with [`NullWatch`], the stub [`Amd64Backend`],
    /// and default config — the degenerate always-bytecode configuration
    /// useful for tests and embedders without a native backend yet.
    pub fn with_defaults(decode: impl FnMut(u32) -> (ExecutionUnit, u32) + Send + 'static) -> Self {
        Engine::new(EngineConfig::default(), Box::new(NullWatch), Box::new(Amd64Backend), decode)
            .expect("default configuration is always valid")
    }

    /// Run the block at guest virtual address `address`, compiling and
    /// caching it first on a miss.
    pub fn step(&mut self, address: u32, guest: &mut G) -> Result<Outcome, EngineError> {
        Ok(self.driver.step(address, guest)?)
    }

    pub fn cache(&self) -> &Cache {
        self.driver.cache()
    }

    /// The executable-memory slab this engine's native backend allocates
    /// routines from, if it ever does so (the reference `Amd64Backend`
    /// never does, but a real backend would via this same slab).
    pub fn slab(&self) -> &Arc<Slab> {
        &self.slab
    }

    pub fn memory_dirtied(&self, start: u32, len: u32) {
        self.cache().memory_dirtied(start, len);
    }

    pub fn garbage_collect(&self) -> bool {
        self.cache().garbage_collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingGuest {
        register: Value,
    }
    impl Guest for CountingGuest {
        fn register_read(&mut self, _index: u32, _width: u32) -> Value {
            self.register
        }
        fn register_write(&mut self, _index: u32, _width: u32, value: Value) {
            self.register = value;
        }
        fn load(&mut self, _address: u32, _width: u32) -> Value {
            Value::zero()
        }
        fn store(&mut self, _address: u32, _width: u32, _value: Value) {}
    }

    fn scenario_a_unit() -> ExecutionUnit {
        let mut asm: Assembler<CountingGuest> = Assembler::new();
        let a = asm.konst(Type::I32, Value::from_i32(7));
        let b = asm.konst(Type::I32, Value::from_i32(35));
        let sum = asm.add(a, b).unwrap();
        let idx = asm.konst(Type::I32, Value::from_i32(0));
        asm.writegr(idx, sum).unwrap();
        let cond = asm.konst(Type::Bool, Value::from_bool(true));
        let cycles = asm.konst(Type::I64, Value::from_i64(5));
        asm.exit(cond, cycles).unwrap();
        asm.export_unit()
    }

    #[test]
    fn engine_compiles_and_runs_scenario_a_through_the_umbrella_api() {
        let mut engine: Engine<CountingGuest> = Engine::with_defaults(|_addr| (scenario_a_unit(), 4));
        let mut guest = CountingGuest::default();

        let outcome = engine.step(0x4000, &mut guest).unwrap();
        assert_eq!(outcome, Outcome::Exit { cycles: 5 });
        assert_eq!(guest.register.as_i32(), 42);
    }

    #[test]
    fn deferred_policy_is_rejected_until_a_worker_exists() {
        let config = EngineConfig {
            compile_queue_policy: CompileQueuePolicy::Deferred,
            ..EngineConfig::default()
        };
        let result: Result<Engine<CountingGuest>, _> =
            Engine::new(config, Box::new(NullWatch), Box::new(Amd64Backend), |_addr| (scenario_a_unit(), 4));
        assert!(matches!(result, Err(EngineError::UnsupportedConfig(_))));
    }

    #[test]
    fn memory_dirtied_invalidates_a_cached_block() {
        let mut engine: Engine<CountingGuest> = Engine::with_defaults(|_addr| (scenario_a_unit(), 4));
        let mut guest = CountingGuest::default();
        engine.step(0x4000, &mut guest).unwrap();
        assert!(engine.cache().lookup(0x4000).is_some());

        engine.memory_dirtied(physical_address(0x4000), 1);
        assert!(engine.cache().lookup(0x4000).is_none());
        assert!(engine.garbage_collect());
    }
}
