use crate::{Cache, CacheEntry, CompiledBody, JitError, NativeBackend};
use foxjit_bytecode::{Outcome, Vm};
use foxjit_ir::ExecutionUnit;
use foxjit_types::Guest;
use std::sync::Arc;

/// High bits masked off a guest virtual address to get its physical address
/// (spec §4.E: "Physical address = virtual address with architectural high
/// bits masked to select a memory image").
pub const PHYSICAL_ADDRESS_MASK: u32 = 0x1FFF_FFFF;

pub fn physical_address(virtual_address: u32) -> u32 {
    virtual_address & PHYSICAL_ADDRESS_MASK
}

/// Owns the per-guest lookup/compile/execute loop (spec §4.G/§6): looks a
/// guest PC up in the [`Cache`], building and inserting a fresh
/// [`CacheEntry`] on a miss, and falls back to the bytecode VM whenever the
/// entry has no ready native routine — whether because the native backend
/// declined, or because the routine's executable prefix hasn't caught up
/// with its writable tail yet (spec §7's "compilation failure is
/// non-fatal").
///
/// Decoding a guest instruction stream into an [`ExecutionUnit`] is
/// explicitly out of scope (per-architecture guest decoders are an external
/// collaborator's job) — the driver takes that as a caller-supplied
/// closure, matching how the original source's per-guest translators
/// (`arm7di_ir.cpp`, `r3000_ir.cpp`) sit on top of a generic driver loop.
pub struct BlockDriver<G: Guest> {
    cache: Cache,
    backend: Box<dyn NativeBackend>,
    vm: Vm,
    decode: Box<dyn FnMut(u32) -> (ExecutionUnit, u32) + Send>,
    _guest: std::marker::PhantomData<fn(&mut G)>,
}

impl<G: Guest> BlockDriver<G> {
    pub fn new(
        cache: Cache,
        backend: Box<dyn NativeBackend>,
        decode: impl FnMut(u32) -> (ExecutionUnit, u32) + Send + 'static,
    ) -> Self {
        BlockDriver {
            cache,
            backend,
            vm: Vm::new(),
            decode: Box::new(decode),
            _guest: std::marker::PhantomData,
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Run the block starting at guest virtual address `address`, compiling
    /// and inserting it into the cache first if this is the first visit.
    pub fn step(&mut self, address: u32, guest: &mut G) -> Result<Outcome, JitError> {
        let entry = match self.cache.lookup(address) {
            Some(entry) => entry,
            None => self.compile_new_block(address)?,
        };
        self.run_entry(&entry, guest)
    }

    fn compile_new_block(&mut self, address: u32) -> Result<Arc<CacheEntry>, JitError> {
        let (unit, size) = (self.decode)(address);
        unit.validate().map_err(JitError::InvalidUnit)?;

        let entry = CacheEntry::new(address, physical_address(address), size, unit);
        self.cache.insert(entry.clone());
        self.cache.queue_compile_unit(entry.clone(), self.backend.as_ref());
        Ok(entry)
    }

    fn run_entry(&mut self, entry: &Arc<CacheEntry>, guest: &mut G) -> Result<Outcome, JitError> {
        match entry.body() {
            Some(CompiledBody::Native(routine)) if routine.ready() => {
                tracing::trace!(va = entry.virtual_address(), "executing native routine");
                // SAFETY: `routine.ready()` confirmed its executable prefix
                // covers its full byte range, and `G` is the same guest
                // type the routine was compiled against.
                let cycles = unsafe { routine.execute(guest as *mut G as *mut u8, std::ptr::null_mut(), std::ptr::null_mut()) };
                Ok(Outcome::Exit { cycles })
            }
            Some(CompiledBody::Bytecode(routine)) => {
                tracing::trace!(va = entry.virtual_address(), "executing bytecode routine");
                Ok(self.vm.run(&routine, guest)?)
            }
            _ => {
                // Either still queued, or a native routine whose executable
                // prefix hasn't been remapped far enough yet: fall back to
                // compiling the oracle path directly from the unit without
                // touching the entry's stored body.
                tracing::trace!(va = entry.virtual_address(), "falling back to on-demand bytecode compile");
                let fallback = foxjit_bytecode::Compiler::new().compile(entry.unit())?;
                Ok(self.vm.run(&fallback, guest)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Amd64Backend, NullWatch};
    use foxjit_ir::Assembler;
    use foxjit_types::{Type, Value};

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

    fn scenario_a_unit() -> ExecutionUnit {
        let mut asm: Assembler<RecordingGuest> = Assembler::new();
        let a = asm.konst(Type::I32, Value::from_i32(7));
        let b = asm.konst(Type::I32, Value::from_i32(35));
        let sum = asm.add(a, b).unwrap();
        let idx = asm.konst(Type::I32, Value::from_i32(0));
        asm.writegr(idx, sum).unwrap();
        let cond = asm.konst(Type::Bool, Value::from_bool(true));
        let cycles = asm.konst(Type::I64, Value::from_i64(3));
        asm.exit(cond, cycles).unwrap();
        asm.export_unit()
    }

    #[test]
    fn first_visit_compiles_and_caches_then_reuses_the_entry() {
        let cache = Cache::new(0x10000, Box::new(NullWatch));
        let mut driver: BlockDriver<RecordingGuest> =
            BlockDriver::new(cache, Box::new(Amd64Backend), |_addr| (scenario_a_unit(), 4));
        let mut guest = RecordingGuest::default();

        let outcome = driver.step(0x1000, &mut guest).unwrap();
        assert_eq!(outcome, Outcome::Exit { cycles: 3 });
        assert_eq!(guest.written, vec![(0, Value::from_i32(42))]);

        assert!(driver.cache().lookup(0x1000).is_some());

        guest.written.clear();
        let outcome = driver.step(0x1000, &mut guest).unwrap();
        assert_eq!(outcome, Outcome::Exit { cycles: 3 });
        assert_eq!(guest.written, vec![(0, Value::from_i32(42))]);
    }

    #[test]
    fn physical_address_masks_high_bits() {
        assert_eq!(physical_address(0xFFFF_FFFF), PHYSICAL_ADDRESS_MASK);
        assert_eq!(physical_address(0x0000_1000), 0x1000);
    }
}
