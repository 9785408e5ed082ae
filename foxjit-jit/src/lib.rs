//! Native code storage, the JIT cache, and the basic-block driver loop that
//! ties them to a bytecode fallback (spec §4.D/§4.E/§4.G).
//!
//! This crate owns everything downstream of "I have an optimized
//! [`foxjit_ir::ExecutionUnit`] for a guest basic block": where its compiled
//! form lives in memory, how it's found again on the next visit to the same
//! address, and how writes to guest memory invalidate stale entries.

mod cache;
mod driver;
mod entry;
mod error;
mod native;
mod storage;

pub use cache::{Cache, GuestMemoryWatch, NullWatch, PAGE_SIZE};
pub use driver::{physical_address, BlockDriver, PHYSICAL_ADDRESS_MASK};
pub use entry::{CacheEntry, CompiledBody};
pub use error::{JitError, StorageError};
pub use native::{Amd64Backend, NativeBackend, NativeCompileError};
pub use storage::{NativeEntry, Routine, Slab, ALLOC_ALIGN, DEFAULT_SLAB_SIZE};
