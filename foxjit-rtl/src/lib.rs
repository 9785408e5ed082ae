//! The register-transfer layer: a packed, variable-width instruction
//! stream sitting between the optimized IR and the code-generation
//! backends, plus the register allocator interface that turns SSA
//! registers into hardware registers or spill slots (spec §3, §4.F).

mod allocator;
mod block;
mod error;
mod flags;
mod instruction;
mod program;
mod registers;

pub use allocator::{LinearScanAllocator, RegisterAllocator};
pub use block::{RtlCursor, RtlInstructions};
pub use error::AllocError;
pub use flags::RtlFlags;
pub use instruction::{RegisterState, RtlInstruction, RtlOp};
pub use program::{RegisterUsage, RtlProgram};
pub use registers::{HwRegister, RegisterAssignment, RegisterClass, RegisterSet, RtlRegister, SPILL_CLASS};
