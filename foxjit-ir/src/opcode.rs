use foxjit_types::Type;

/// The IR opcode table (spec §3/§4.A). Every variant is a pure description
/// of an operation's shape — arity, whether it produces a result, and its
/// mnemonic. Operand type-checking against this table happens in the
/// assembler, not here.
///
/// Conversion opcodes that are parameterized by a target type (`bitcast`,
/// `castf2i`, `casti2f`, `resizef`) carry that [`Type`] inline rather than
/// being exploded into one variant per target type, which keeps the table
/// around 40 entries instead of closer to 60.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // -- Memory --
    /// Read a guest register. Source 0 is a constant register index.
    ReadGr,
    /// Write a guest register. Source 0 is a constant register index,
    /// source 1 is the value.
    WriteGr,
    /// Load from guest memory at the address given by source 0.
    Load,
    /// Store source 1 to the guest memory address given by source 0.
    Store,

    // -- Bitwise --
    And,
    Or,
    Xor,
    Not,
    /// Logical shift left. Shift amount is masked to `type_width - 1` bits.
    ShiftL,
    /// Logical shift right. Shift amount is masked to `type_width - 1` bits.
    ShiftR,
    /// Arithmetic (sign-preserving) shift right.
    AShiftR,
    RotL,
    RotR,
    /// Conditionally set/clear a bit: `(value, control, bit_index)`.
    Bsc,

    // -- Arithmetic --
    Add,
    Sub,
    Mul,
    /// Unsigned multiplication (distinct from signed `Mul` for integers).
    UMul,
    Div,
    UDiv,
    Mod,
    Sqrt,

    // -- Conversion --
    Extend16,
    Extend32,
    Extend64,
    /// Reinterpret the input bits as `Type`, truncating or zero-extending.
    Bitcast(Type),
    /// Convert a float source to the signed integer type `Type`.
    CastF2I(Type),
    /// Convert a signed integer source to the float type `Type`.
    CastI2F(Type),
    /// Convert between float widths; target is `Type` (`F32`/`F64`).
    ResizeF(Type),

    // -- Compare --
    /// Bitwise AND of the two sources, result is nonzero-ness as bool.
    Test,
    Eq,
    Lt,
    Lte,
    Ult,
    Ulte,

    // -- Control --
    Br,
    /// Conditional branch: `(condition, target)`.
    IfBr,
    /// `(condition, value_if_false, value_if_true)`.
    Select,
    /// `(condition, cycle_count)`. Terminates the unit.
    Exit,
    /// Call a host function: `(args...)`, up to 3, fn pointer in the
    /// instruction payload.
    Call,
    Nop,
}

impl Opcode {
    /// Number of source operands this opcode consumes.
    ///
    /// `Call` is variable arity (0–3, per spec §4.A); this returns its
    /// maximum and callers that need the true count must use the assembled
    /// instruction's `sources.len()` instead.
    pub const fn source_arity(self) -> usize {
        use Opcode::*;
        match self {
            Nop => 0,
            ReadGr | Load | Not | Sqrt | Extend16 | Extend32 | Extend64 | Bitcast(_)
            | CastF2I(_) | CastI2F(_) | ResizeF(_) | Br => 1,
            WriteGr | Store | And | Or | Xor | ShiftL | ShiftR | AShiftR | RotL | RotR
            | Add | Sub | Mul | UMul | Div | UDiv | Mod | Test | Eq | Lt | Lte | Ult
            | Ulte | IfBr | Exit => 2,
            Bsc | Select | Call => 3,
        }
    }

    /// Whether this opcode produces an SSA result.
    pub const fn has_result(self) -> bool {
        use Opcode::*;
        !matches!(self, WriteGr | Store | Br | IfBr | Exit | Nop)
    }

    /// Short assembly mnemonic, as printed by the disassembler.
    pub const fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            ReadGr => "readgr",
            WriteGr => "writegr",
            Load => "load",
            Store => "store",
            And => "and",
            Or => "or",
            Xor => "xor",
            Not => "not",
            ShiftL => "shiftl",
            ShiftR => "shiftr",
            AShiftR => "ashiftr",
            RotL => "rotl",
            RotR => "rotr",
            Bsc => "bsc",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            UMul => "umul",
            Div => "div",
            UDiv => "udiv",
            Mod => "mod",
            Sqrt => "sqrt",
            Extend16 => "extend16",
            Extend32 => "extend32",
            Extend64 => "extend64",
            Bitcast(_) => "bitcast",
            CastF2I(_) => "castf2i",
            CastI2F(_) => "casti2f",
            ResizeF(_) => "resizef",
            Test => "test",
            Eq => "eq",
            Lt => "lt",
            Lte => "lte",
            Ult => "ult",
            Ulte => "ulte",
            Br => "br",
            IfBr => "ifbr",
            Select => "select",
            Exit => "exit",
            Call => "call",
            Nop => "nop",
        }
    }

    /// True for the opcodes the bytecode and native backends must treat as
    /// terminators: they end the extended basic block.
    pub const fn is_terminator(self) -> bool {
        matches!(self, Opcode::Exit | Opcode::Br | Opcode::IfBr)
    }

    /// True for opcodes that observe or mutate state outside the SSA value
    /// graph (used by the dead-code-elimination pass to anchor liveness).
    pub const fn has_side_effect(self) -> bool {
        matches!(
            self,
            Opcode::Store
                | Opcode::WriteGr
                | Opcode::Exit
                | Opcode::Call
                | Opcode::IfBr
                | Opcode::Br
        )
    }

    /// Stable numeric tag for the opcode's *kind*, independent of the
    /// target-type parameter the four conversion variants carry. Used by
    /// the bytecode encoder, which stores that type parameter alongside
    /// the tag rather than exploding it into the tag space.
    pub const fn tag(self) -> u8 {
        use Opcode::*;
        match self {
            Nop => 0,
            ReadGr => 1,
            WriteGr => 2,
            Load => 3,
            Store => 4,
            And => 5,
            Or => 6,
            Xor => 7,
            Not => 8,
            ShiftL => 9,
            ShiftR => 10,
            AShiftR => 11,
            RotL => 12,
            RotR => 13,
            Bsc => 14,
            Add => 15,
            Sub => 16,
            Mul => 17,
            UMul => 18,
            Div => 19,
            UDiv => 20,
            Mod => 21,
            Sqrt => 22,
            Extend16 => 23,
            Extend32 => 24,
            Extend64 => 25,
            Bitcast(_) => 26,
            CastF2I(_) => 27,
            CastI2F(_) => 28,
            ResizeF(_) => 29,
            Test => 30,
            Eq => 31,
            Lt => 32,
            Lte => 33,
            Ult => 34,
            Ulte => 35,
            Br => 36,
            IfBr => 37,
            Select => 38,
            Exit => 39,
            Call => 40,
        }
    }

    /// Reconstruct an opcode from a [`tag`](Self::tag) plus, for the four
    /// conversion variants, the target type that was stored beside it.
    /// `ty` is ignored for every non-conversion tag.
    pub fn from_tag(tag: u8, ty: Type) -> Option<Opcode> {
        use Opcode::*;
        Some(match tag {
            0 => Nop,
            1 => ReadGr,
            2 => WriteGr,
            3 => Load,
            4 => Store,
            5 => And,
            6 => Or,
            7 => Xor,
            8 => Not,
            9 => ShiftL,
            10 => ShiftR,
            11 => AShiftR,
            12 => RotL,
            13 => RotR,
            14 => Bsc,
            15 => Add,
            16 => Sub,
            17 => Mul,
            18 => UMul,
            19 => Div,
            20 => UDiv,
            21 => Mod,
            22 => Sqrt,
            23 => Extend16,
            24 => Extend32,
            25 => Extend64,
            26 => Bitcast(ty),
            27 => CastF2I(ty),
            28 => CastI2F(ty),
            29 => ResizeF(ty),
            30 => Test,
            31 => Eq,
            32 => Lt,
            33 => Lte,
            34 => Ult,
            35 => Ulte,
            36 => Br,
            37 => IfBr,
            38 => Select,
            39 => Exit,
            40 => Call,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Opcode::Bitcast(ty) => write!(f, "bitcast.{ty}"),
            Opcode::CastF2I(ty) => write!(f, "castf2i.{ty}"),
            Opcode::CastI2F(ty) => write!(f, "casti2f.{ty}"),
            Opcode::ResizeF(ty) => write!(f, "resizef.{ty}"),
            other => f.write_str(other.mnemonic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writegr_store_have_no_result() {
        assert!(!Opcode::WriteGr.has_result());
        assert!(!Opcode::Store.has_result());
        assert!(Opcode::Add.has_result());
    }

    #[test]
    fn bitcast_mnemonic_includes_target_type() {
        assert_eq!(Opcode::Bitcast(Type::I32).to_string(), "bitcast.i32");
    }

    #[test]
    fn side_effects_cover_control_and_memory() {
        assert!(Opcode::Store.has_side_effect());
        assert!(Opcode::Exit.has_side_effect());
        assert!(!Opcode::Add.has_side_effect());
    }
}
