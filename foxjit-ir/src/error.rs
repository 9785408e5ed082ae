use foxjit_types::Type;

/// Assembly-time failures (spec §7: "Assembly-time type violation... Fatal
/// (programmer error)"). These are the only errors the IR layer raises —
/// the assembler does not enforce domain-level conditions like shift-amount
/// range; that's the opcode's runtime semantics, checked by the `Calculator`
/// and the VM, not here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AssemblyError {
    #[error("operand {index} of {opcode} expected type {expected}, got {actual}")]
    TypeMismatch {
        opcode: &'static str,
        index: usize,
        expected: Type,
        actual: Type,
    },
    #[error("{opcode} expects {expected} source operands, got {actual}")]
    ArityMismatch {
        opcode: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("call accepts at most 3 arguments, got {actual}")]
    TooManyCallArguments { actual: usize },
}
