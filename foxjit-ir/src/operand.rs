use foxjit_types::{Type, Value};

/// An SSA value reference: either a prior instruction's result or an
/// immediate. Operand equality is by `(kind, index)` for registers and by
/// `(type, bits)` for constants, matching spec §3.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    /// A reference to the result of a prior instruction in the same
    /// [`ExecutionUnit`](crate::ExecutionUnit), identified by its dense SSA
    /// index.
    Register { index: u32, ty: Type },
    /// An immediate value, carried inline rather than assigned an SSA index.
    Constant { ty: Type, value: Value },
}

impl Operand {
    pub const fn ty(&self) -> Type {
        match self {
            Operand::Register { ty, .. } => *ty,
            Operand::Constant { ty, .. } => *ty,
        }
    }

    pub const fn is_constant(&self) -> bool {
        matches!(self, Operand::Constant { .. })
    }

    pub fn as_constant_value(&self) -> Option<Value> {
        match self {
            Operand::Constant { value, .. } => Some(*value),
            Operand::Register { .. } => None,
        }
    }
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operand::Register { index: a, .. }, Operand::Register { index: b, .. }) => a == b,
            (
                Operand::Constant { ty: at, value: av },
                Operand::Constant { ty: bt, value: bv },
            ) => at == bt && av.as_u64() == bv.as_u64(),
            _ => false,
        }
    }
}
impl Eq for Operand {}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Register { index, .. } => write!(f, "${index}"),
            Operand::Constant { ty, value } => write!(f, "#{}", value.display(*ty)),
        }
    }
}
