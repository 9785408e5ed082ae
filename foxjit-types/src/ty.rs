use strum::EnumCount;

/// Closed enumeration of every type an IR operand, RTL register, or bytecode
/// slot can carry.
///
/// `BranchLabel` and `HostAddress` carry no arithmetic semantics of their own
/// — they exist so that the assembler can type-check `br`/`call` targets the
/// same way it type-checks arithmetic operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount)]
#[repr(u8)]
pub enum Type {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bool,
    BranchLabel,
    HostAddress,
}

impl Type {
    /// All variants, in declaration order. Used by tables that are indexed
    /// by `Type as usize` (e.g. the bytecode opcode-per-width tables).
    pub const ALL: [Type; Type::COUNT] = [
        Type::I8,
        Type::I16,
        Type::I32,
        Type::I64,
        Type::F32,
        Type::F64,
        Type::Bool,
        Type::BranchLabel,
        Type::HostAddress,
    ];

    pub const fn is_integer(self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Size in bytes of the scalar this type denotes. `Bool` is modeled as a
    /// single byte (the VM and RTL never pack bools smaller than a byte);
    /// `BranchLabel` is a `u32` label id.
    pub const fn byte_size(self) -> u32 {
        match self {
            Type::I8 | Type::Bool => 1,
            Type::I16 => 2,
            Type::I32 | Type::F32 | Type::BranchLabel => 4,
            Type::I64 | Type::F64 | Type::HostAddress => 8,
        }
    }

    /// Reconstruct a type from the `u8` its `#[repr(u8)]` discriminant was
    /// stored as (bytecode records, RTL payloads). `None` for any value
    /// outside `0..Type::COUNT`.
    pub fn from_tag(tag: u8) -> Option<Type> {
        Type::ALL.get(tag as usize).copied()
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Type::I8 => "i8",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::Bool => "bool",
            Type::BranchLabel => "label",
            Type::HostAddress => "hostaddr",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_float_are_disjoint() {
        for ty in Type::ALL {
            assert_ne!(ty.is_integer(), ty.is_float() && ty.is_integer());
            if ty.is_integer() {
                assert!(!ty.is_float());
            }
        }
    }

    #[test]
    fn byte_sizes_match_scalar_widths() {
        assert_eq!(Type::I8.byte_size(), 1);
        assert_eq!(Type::I16.byte_size(), 2);
        assert_eq!(Type::I32.byte_size(), 4);
        assert_eq!(Type::I64.byte_size(), 8);
        assert_eq!(Type::F32.byte_size(), 4);
        assert_eq!(Type::F64.byte_size(), 8);
    }

    #[test]
    fn display_round_trips_mnemonics() {
        assert_eq!(Type::I32.to_string(), "i32");
        assert_eq!(Type::F64.to_string(), "f64");
    }
}
