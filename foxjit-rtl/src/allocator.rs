use crate::{AllocError, HwRegister, RegisterAssignment, RegisterClass, RegisterSet, RtlInstruction, RtlInstructions, RtlProgram};
use std::collections::HashMap;

/// The interface `foxjit-rtl` exposes to a backend-specific register
/// allocator (spec §4.F, grounded on the reference `RegisterAllocator`
/// abstract class): declare the hardware register pool for each class the
/// RTL program uses, then run the allocator over an unallocated program to
/// get back one where every [`RegisterAssignment`] has `hw.is_assigned()`.
pub trait RegisterAllocator {
    /// Register the pool of hardware registers available for `class`.
    /// Must be called for every class the program references before
    /// [`execute`](Self::execute) is called.
    fn define_register_type(&mut self, class: RegisterClass, registers: RegisterSet);

    /// Consume an RTL program whose `RegisterAssignment`s carry only the
    /// SSA `rtl` half and return one where every `hw` half is filled in
    /// (spilling to [`HwRegister::spill`] slots once a class's hardware
    /// pool is exhausted).
    fn execute(&mut self, program: RtlProgram) -> Result<RtlProgram, AllocError>;
}

/// A linear-scan allocator, one basic block at a time: within each block,
/// a register is live from the instruction that defines it to the last
/// instruction that reads it, and the lowest-numbered free hardware
/// register of its class is assigned greedily, spilling when the class's
/// pool is exhausted.
///
/// This is a reference allocator, not an optimizing one — it doesn't
/// coalesce moves or consider cross-block liveness. It exists so the
/// higher layers (bytecode compiler, native backend) have something real
/// to allocate against.
#[derive(Debug, Default)]
pub struct LinearScanAllocator {
    pools: HashMap<RegisterClass, RegisterSet>,
}

impl LinearScanAllocator {
    pub fn new() -> Self {
        LinearScanAllocator::default()
    }

    fn allocate_block(&self, block: &RtlInstructions, program: &mut RtlProgram) -> Result<RtlInstructions, AllocError> {
        let records: Vec<RtlInstruction> = block.iter().map(|(_, instr)| instr).collect();

        let mut last_use: HashMap<u32, usize> = HashMap::new();
        for (i, instr) in records.iter().enumerate() {
            for src in &instr.sources {
                if src.rtl.valid() {
                    last_use.insert(src.rtl.index(), i);
                }
            }
        }

        let mut pools = self.pools.clone();
        let mut spill_next: HashMap<RegisterClass, u32> = HashMap::new();
        let mut active: HashMap<u32, RegisterAssignment> = HashMap::new();
        let mut allocated_count: HashMap<RegisterClass, u32> = HashMap::new();

        let mut out = RtlInstructions::new(block.label());

        for (i, instr) in records.into_iter().enumerate() {
            let mut resolved_sources = Vec::with_capacity(instr.sources.len());
            for src in &instr.sources {
                let assignment = *active
                    .get(&src.rtl.index())
                    .ok_or(AllocError::UseBeforeDef { index: src.rtl.index() })?;
                resolved_sources.push(assignment);
            }

            // Free any source whose last use is this instruction before
            // allocating this instruction's own results, so a dying source
            // and a freshly defined result can share the same hardware
            // register.
            for src in &resolved_sources {
                if last_use.get(&src.rtl.index()) == Some(&i) {
                    if let Some(pool) = pools.get_mut(&src.hw.class()) {
                        if !src.hw.is_spill() {
                            pool.mark_free(src.hw.raw_index());
                            if let Some(count) = allocated_count.get_mut(&src.hw.class()) {
                                *count = count.saturating_sub(1);
                            }
                        }
                    }
                }
            }

            let mut resolved_results = Vec::with_capacity(instr.results.len());
            for result in &instr.results {
                let class = result.hw.class();
                let pool = self.pools.get(&class).ok_or(AllocError::UnknownClass { class })?;
                let free = pools.entry(class).or_insert(*pool);
                let hw = match free.allocate_lowest() {
                    Some(index) => HwRegister::assigned(class, index),
                    None => {
                        let slot = spill_next.entry(class).or_insert(0);
                        let hw = HwRegister::spill(*slot);
                        *slot += 1;
                        hw
                    }
                };
                let assignment = RegisterAssignment::new(result.rtl, hw);
                active.insert(result.rtl.index(), assignment);
                resolved_results.push(assignment);

                let count = allocated_count.entry(class).or_insert(0);
                *count += 1;
                program.record_usage(class, *count, *spill_next.get(&class).unwrap_or(&0));
            }

            let rewritten = RtlInstruction {
                op: instr.op,
                flags: instr.flags,
                position: instr.position,
                payload: instr.payload,
                save_state: instr.save_state,
                sources: resolved_sources,
                results: resolved_results,
            };
            out.append(&rewritten);
        }

        Ok(out)
    }
}

impl RegisterAllocator for LinearScanAllocator {
    fn define_register_type(&mut self, class: RegisterClass, registers: RegisterSet) {
        self.pools.insert(class, registers);
    }

    fn execute(&mut self, mut program: RtlProgram) -> Result<RtlProgram, AllocError> {
        tracing::trace!(blocks = program.block_count(), "running linear-scan allocation");
        for index in 0..program.block_count() {
            let block = program.take_block(index);
            let allocated = self.allocate_block(&block, &mut program)?;
            program.replace_block(index, allocated);
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RtlFlags, RtlOp, RtlRegister};
    use foxjit_types::Value;

    fn unassigned(rtl: RtlRegister, class: RegisterClass) -> RegisterAssignment {
        RegisterAssignment::new(rtl, HwRegister::unassigned(class))
    }

    #[test]
    fn assigns_and_reuses_a_register_after_its_last_use() {
        let mut block = RtlInstructions::new("entry");
        let r0 = RtlRegister::new(0);
        let r1 = RtlRegister::new(1);
        let r2 = RtlRegister::new(2);

        // r0 = const
        block.append(
            &RtlInstruction::new(RtlOp::Forwarded(1))
                .with_results(vec![unassigned(r0, 1)]),
        );
        // r1 = const
        block.append(
            &RtlInstruction::new(RtlOp::Forwarded(1))
                .with_results(vec![unassigned(r1, 1)]),
        );
        // r2 = add r0, r1   (r0 and r1 both die here)
        block.append(
            &RtlInstruction::new(RtlOp::Forwarded(2))
                .with_flags(RtlFlags::empty())
                .with_payload(Value::zero())
                .with_sources(vec![unassigned(r0, 1), unassigned(r1, 1)])
                .with_results(vec![unassigned(r2, 1)]),
        );

        let mut program = RtlProgram::new();
        program.push_block(block);

        let mut allocator = LinearScanAllocator::new();
        allocator.define_register_type(1, RegisterSet::from_range(1, 2));
        let allocated = allocator.execute(program).unwrap();

        let records: Vec<_> = allocated.block(0).iter().map(|(_, i)| i).collect();
        assert!(records[0].results[0].hw.is_assigned());
        assert!(records[1].results[0].hw.is_assigned());
        // r0 and r1 used registers 0 and 1; r2 can reuse register 0 once r0 dies.
        assert_eq!(records[2].results[0].hw.index(), 0);
        assert_eq!(allocated.usage_for(1).peak_allocated, 2);
    }

    #[test]
    fn spills_once_the_class_pool_is_exhausted() {
        let mut block = RtlInstructions::new("entry");
        let regs: Vec<RtlRegister> = (0..3).map(RtlRegister::new).collect();
        for r in &regs {
            block.append(&RtlInstruction::new(RtlOp::Forwarded(1)).with_results(vec![unassigned(*r, 1)]));
        }
        // keep all three alive with one instruction that reads them all
        block.append(
            &RtlInstruction::new(RtlOp::Forwarded(9))
                .with_sources(regs.iter().map(|r| unassigned(*r, 1)).collect()),
        );

        let mut program = RtlProgram::new();
        program.push_block(block);

        let mut allocator = LinearScanAllocator::new();
        allocator.define_register_type(1, RegisterSet::from_range(1, 2));
        let allocated = allocator.execute(program).unwrap();

        let records: Vec<_> = allocated.block(0).iter().map(|(_, i)| i).collect();
        let spilled = records[..3].iter().any(|r| r.results[0].hw.is_spill());
        assert!(spilled);
        assert_eq!(allocated.usage_for(1).peak_spill, 1);
    }

    #[test]
    fn unregistered_class_is_an_error() {
        let mut block = RtlInstructions::new("entry");
        block.append(&RtlInstruction::new(RtlOp::Forwarded(1)).with_results(vec![unassigned(RtlRegister::new(0), 7)]));
        let mut program = RtlProgram::new();
        program.push_block(block);

        let mut allocator = LinearScanAllocator::new();
        let err = allocator.execute(program).unwrap_err();
        assert_eq!(err, AllocError::UnknownClass { class: 7 });
    }
}
