use crate::{Assembler, AssemblyError, Operand};
use foxjit_types::{Type, Value};

#[derive(Clone, Copy)]
struct Entry {
    operand: Operand,
    valid: bool,
    dirty: bool,
}

/// Per-guest-register caching layer for the [`Assembler`] (spec §4.A).
///
/// This is a pattern, not IR: it reduces redundant `readgr`/`writegr` pairs
/// by remembering the SSA operand currently holding each guest register.
/// The IR itself only ever sees `readgr`/`writegr` — callers that bypass
/// this cache and emit those opcodes directly must invalidate it, or route
/// every access through here instead (the usual, and recommended, pattern
/// every bundled guest translator follows).
pub struct RegisterCache {
    entries: Vec<Entry>,
    ty: Type,
}

impl RegisterCache {
    /// `count` is the number of guest registers this cache tracks; `ty` is
    /// the IR type every guest register is read/written as (callers that
    /// need mixed-width guest registers should keep one cache per width).
    pub fn new(count: usize, ty: Type) -> Self {
        RegisterCache {
            entries: vec![
                Entry {
                    operand: Operand::Constant {
                        ty,
                        value: Value::zero(),
                    },
                    valid: false,
                    dirty: false,
                };
                count
            ],
            ty,
        }
    }

    fn index_operand<G>(&self, asm: &Assembler<G>, index: usize) -> Operand {
        let _ = asm;
        Operand::Constant {
            ty: Type::I32,
            value: Value::from_u32(index as u32),
        }
    }

    /// Return the cached operand for guest register `index`, issuing a
    /// `readgr` and caching the result if this is the first access.
    pub fn read_reg<G>(
        &mut self,
        asm: &mut Assembler<G>,
        index: usize,
    ) -> Result<Operand, AssemblyError> {
        if self.entries[index].valid {
            return Ok(self.entries[index].operand);
        }
        let reg_index = self.index_operand(asm, index);
        let operand = asm.readgr(self.ty, reg_index)?;
        self.entries[index] = Entry {
            operand,
            valid: true,
            dirty: false,
        };
        Ok(operand)
    }

    /// Record that guest register `index` now holds `operand`. Does not
    /// emit `writegr` immediately — call [`flush`](Self::flush) before any
    /// observer of guest state.
    pub fn write_reg(&mut self, index: usize, operand: Operand) {
        self.entries[index] = Entry {
            operand,
            valid: true,
            dirty: true,
        };
    }

    /// Emit `writegr` for every dirty entry, then clear their dirty bits.
    /// Must be called before every `exit`, and before any `call` that
    /// observes guest state.
    pub fn flush<G>(&mut self, asm: &mut Assembler<G>) -> Result<(), AssemblyError> {
        for index in 0..self.entries.len() {
            self.flush_one(asm, index)?;
        }
        Ok(())
    }

    /// Emit `writegr` for a single dirty entry, if dirty.
    pub fn flush_one<G>(
        &mut self,
        asm: &mut Assembler<G>,
        index: usize,
    ) -> Result<(), AssemblyError> {
        if self.entries[index].dirty {
            let reg_index = self.index_operand(asm, index);
            asm.writegr(reg_index, self.entries[index].operand)?;
            self.entries[index].dirty = false;
        }
        Ok(())
    }

    /// Clear validity for every entry without emitting writes. Used when
    /// guest state may have changed underneath the cache (e.g. after a
    /// `call` that wrote registers directly).
    pub fn invalidate(&mut self) {
        for entry in &mut self.entries {
            entry.valid = false;
            entry.dirty = false;
        }
    }
}
