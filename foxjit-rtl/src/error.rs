use thiserror::Error;

/// Failures a [`crate::RegisterAllocator`] implementation can report.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    #[error("register class {class} was used but never registered with define_register_type")]
    UnknownClass { class: u8 },

    #[error("ran out of hardware registers and spill slots for class {class}")]
    OutOfRegisters { class: u8 },

    #[error("RTL register index {index} was read before any instruction defined it")]
    UseBeforeDef { index: u32 },
}
