use crate::{AssemblyError, CallPayload, ExecutionUnit, HostFn, Instruction, Opcode, Operand};
use foxjit_types::{Type, Value};

/// Fluent builder that accepts guest-level calls and appends well-typed IR
/// instructions to an internal [`ExecutionUnit`] (spec §4.A).
///
/// Every factory method returns a fresh [`Operand`] whose type is the
/// opcode's declared result type. Source operand types are validated at
/// call time; a mismatch is fatal (`AssemblyError`), matching spec §7's
/// "Assembly-time type violation ... Fatal (programmer error)".
pub struct Assembler<G> {
    unit: ExecutionUnit,
    next_ssa: u32,
    _guest: std::marker::PhantomData<fn(&G)>,
}

impl<G> Default for Assembler<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> Assembler<G> {
    pub fn new() -> Self {
        Assembler {
            unit: ExecutionUnit::new(),
            next_ssa: 0,
            _guest: std::marker::PhantomData,
        }
    }

    /// Transfer ownership of the assembled unit out. The assembler is
    /// thereafter empty and its SSA counter resets, ready for the next
    /// block.
    pub fn export_unit(&mut self) -> ExecutionUnit {
        tracing::trace!(instructions = self.unit.len(), "exporting execution unit");
        self.next_ssa = 0;
        std::mem::take(&mut self.unit)
    }

    fn fresh(&mut self, ty: Type) -> Operand {
        let index = self.next_ssa;
        self.next_ssa += 1;
        Operand::Register { index, ty }
    }

    fn push(
        &mut self,
        opcode: Opcode,
        result_type: Option<Type>,
        sources: Vec<Operand>,
    ) -> Option<Operand> {
        let result = result_type.map(|ty| self.fresh(ty));
        self.unit.push(Instruction {
            opcode,
            result_type,
            result: result.as_ref().and_then(|op| match op {
                Operand::Register { index, .. } => Some(*index),
                _ => None,
            }),
            sources,
            call_payload: None,
        });
        result
    }

    fn expect_type(
        opcode: Opcode,
        index: usize,
        operand: &Operand,
        expected: Type,
    ) -> Result<(), AssemblyError> {
        if operand.ty() != expected {
            return Err(AssemblyError::TypeMismatch {
                opcode: opcode.mnemonic(),
                index,
                expected,
                actual: operand.ty(),
            });
        }
        Ok(())
    }

    fn expect_numeric(
        opcode: Opcode,
        index: usize,
        operand: &Operand,
    ) -> Result<(), AssemblyError> {
        if !operand.ty().is_numeric() {
            return Err(AssemblyError::TypeMismatch {
                opcode: opcode.mnemonic(),
                index,
                expected: Type::I64,
                actual: operand.ty(),
            });
        }
        Ok(())
    }

    fn expect_same(opcode: Opcode, a: &Operand, b: &Operand) -> Result<(), AssemblyError> {
        if a.ty() != b.ty() {
            return Err(AssemblyError::TypeMismatch {
                opcode: opcode.mnemonic(),
                index: 1,
                expected: a.ty(),
                actual: b.ty(),
            });
        }
        Ok(())
    }

    /// `const<T>(value) -> Operand` — constants are operands, not
    /// instructions; they never enter the unit's instruction stream.
    pub fn konst(&self, ty: Type, value: Value) -> Operand {
        Operand::Constant { ty, value }
    }

    pub fn readgr(&mut self, ty: Type, reg_index: Operand) -> Result<Operand, AssemblyError> {
        Self::expect_type(Opcode::ReadGr, 0, &reg_index, Type::I32)?;
        Ok(self.push(Opcode::ReadGr, Some(ty), vec![reg_index]).unwrap())
    }

    pub fn writegr(&mut self, reg_index: Operand, value: Operand) -> Result<(), AssemblyError> {
        Self::expect_type(Opcode::WriteGr, 0, &reg_index, Type::I32)?;
        Self::expect_numeric(Opcode::WriteGr, 1, &value)?;
        self.push(Opcode::WriteGr, None, vec![reg_index, value]);
        Ok(())
    }

    pub fn load(&mut self, ty: Type, address: Operand) -> Result<Operand, AssemblyError> {
        Self::expect_type(Opcode::Load, 0, &address, Type::I32)?;
        Ok(self.push(Opcode::Load, Some(ty), vec![address]).unwrap())
    }

    pub fn store(&mut self, address: Operand, value: Operand) -> Result<(), AssemblyError> {
        Self::expect_type(Opcode::Store, 0, &address, Type::I32)?;
        Self::expect_numeric(Opcode::Store, 1, &value)?;
        self.push(Opcode::Store, None, vec![address, value]);
        Ok(())
    }

    fn binary_integer(
        &mut self,
        opcode: Opcode,
        a: Operand,
        b: Operand,
    ) -> Result<Operand, AssemblyError> {
        if !a.ty().is_integer() && a.ty() != Type::Bool {
            return Err(AssemblyError::TypeMismatch {
                opcode: opcode.mnemonic(),
                index: 0,
                expected: Type::I64,
                actual: a.ty(),
            });
        }
        Self::expect_same(opcode, &a, &b)?;
        let ty = a.ty();
        Ok(self.push(opcode, Some(ty), vec![a, b]).unwrap())
    }

    pub fn and(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.binary_integer(Opcode::And, a, b)
    }
    pub fn or(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.binary_integer(Opcode::Or, a, b)
    }
    pub fn xor(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.binary_integer(Opcode::Xor, a, b)
    }

    pub fn not(&mut self, a: Operand) -> Result<Operand, AssemblyError> {
        if !a.ty().is_integer() && a.ty() != Type::Bool {
            return Err(AssemblyError::TypeMismatch {
                opcode: Opcode::Not.mnemonic(),
                index: 0,
                expected: Type::I64,
                actual: a.ty(),
            });
        }
        let ty = a.ty();
        Ok(self.push(Opcode::Not, Some(ty), vec![a]).unwrap())
    }

    fn shift(&mut self, opcode: Opcode, value: Operand, amount: Operand) -> Result<Operand, AssemblyError> {
        if !value.ty().is_integer() {
            return Err(AssemblyError::TypeMismatch {
                opcode: opcode.mnemonic(),
                index: 0,
                expected: Type::I64,
                actual: value.ty(),
            });
        }
        Self::expect_numeric(opcode, 1, &amount)?;
        let ty = value.ty();
        Ok(self.push(opcode, Some(ty), vec![value, amount]).unwrap())
    }

    pub fn shiftl(&mut self, v: Operand, amount: Operand) -> Result<Operand, AssemblyError> {
        self.shift(Opcode::ShiftL, v, amount)
    }
    pub fn shiftr(&mut self, v: Operand, amount: Operand) -> Result<Operand, AssemblyError> {
        self.shift(Opcode::ShiftR, v, amount)
    }
    pub fn ashiftr(&mut self, v: Operand, amount: Operand) -> Result<Operand, AssemblyError> {
        self.shift(Opcode::AShiftR, v, amount)
    }
    pub fn rotl(&mut self, v: Operand, amount: Operand) -> Result<Operand, AssemblyError> {
        self.shift(Opcode::RotL, v, amount)
    }
    pub fn rotr(&mut self, v: Operand, amount: Operand) -> Result<Operand, AssemblyError> {
        self.shift(Opcode::RotR, v, amount)
    }

    pub fn bsc(
        &mut self,
        value: Operand,
        control: Operand,
        bit_index: Operand,
    ) -> Result<Operand, AssemblyError> {
        if !value.ty().is_integer() {
            return Err(AssemblyError::TypeMismatch {
                opcode: Opcode::Bsc.mnemonic(),
                index: 0,
                expected: Type::I64,
                actual: value.ty(),
            });
        }
        Self::expect_type(Opcode::Bsc, 1, &control, Type::Bool)?;
        Self::expect_numeric(Opcode::Bsc, 2, &bit_index)?;
        let ty = value.ty();
        Ok(self
            .push(Opcode::Bsc, Some(ty), vec![value, control, bit_index])
            .unwrap())
    }

    fn arith(&mut self, opcode: Opcode, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        Self::expect_numeric(opcode, 0, &a)?;
        Self::expect_same(opcode, &a, &b)?;
        let ty = a.ty();
        Ok(self.push(opcode, Some(ty), vec![a, b]).unwrap())
    }

    pub fn add(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.arith(Opcode::Add, a, b)
    }
    pub fn sub(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.arith(Opcode::Sub, a, b)
    }
    pub fn mul(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.arith(Opcode::Mul, a, b)
    }
    pub fn div(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.arith(Opcode::Div, a, b)
    }
    pub fn modulo(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.arith(Opcode::Mod, a, b)
    }

    fn arith_integer_only(
        &mut self,
        opcode: Opcode,
        a: Operand,
        b: Operand,
    ) -> Result<Operand, AssemblyError> {
        if !a.ty().is_integer() {
            return Err(AssemblyError::TypeMismatch {
                opcode: opcode.mnemonic(),
                index: 0,
                expected: Type::I64,
                actual: a.ty(),
            });
        }
        Self::expect_same(opcode, &a, &b)?;
        let ty = a.ty();
        Ok(self.push(opcode, Some(ty), vec![a, b]).unwrap())
    }

    pub fn umul(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.arith_integer_only(Opcode::UMul, a, b)
    }
    pub fn udiv(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.arith_integer_only(Opcode::UDiv, a, b)
    }

    pub fn sqrt(&mut self, a: Operand) -> Result<Operand, AssemblyError> {
        if !a.ty().is_float() {
            return Err(AssemblyError::TypeMismatch {
                opcode: Opcode::Sqrt.mnemonic(),
                index: 0,
                expected: Type::F64,
                actual: a.ty(),
            });
        }
        let ty = a.ty();
        Ok(self.push(Opcode::Sqrt, Some(ty), vec![a]).unwrap())
    }

    pub fn extend16(&mut self, a: Operand) -> Result<Operand, AssemblyError> {
        Self::expect_type(Opcode::Extend16, 0, &a, Type::I8)?;
        Ok(self.push(Opcode::Extend16, Some(Type::I16), vec![a]).unwrap())
    }

    pub fn extend32(&mut self, a: Operand) -> Result<Operand, AssemblyError> {
        if a.ty() != Type::I8 && a.ty() != Type::I16 {
            return Err(AssemblyError::TypeMismatch {
                opcode: Opcode::Extend32.mnemonic(),
                index: 0,
                expected: Type::I16,
                actual: a.ty(),
            });
        }
        Ok(self.push(Opcode::Extend32, Some(Type::I32), vec![a]).unwrap())
    }

    pub fn extend64(&mut self, a: Operand) -> Result<Operand, AssemblyError> {
        if !matches!(a.ty(), Type::I8 | Type::I16 | Type::I32) {
            return Err(AssemblyError::TypeMismatch {
                opcode: Opcode::Extend64.mnemonic(),
                index: 0,
                expected: Type::I32,
                actual: a.ty(),
            });
        }
        Ok(self.push(Opcode::Extend64, Some(Type::I64), vec![a]).unwrap())
    }

    pub fn bitcast(&mut self, target: Type, a: Operand) -> Result<Operand, AssemblyError> {
        Self::expect_numeric(Opcode::Bitcast(target), 0, &a)?;
        Ok(self.push(Opcode::Bitcast(target), Some(target), vec![a]).unwrap())
    }

    pub fn castf2i(&mut self, target: Type, a: Operand) -> Result<Operand, AssemblyError> {
        if !a.ty().is_float() {
            return Err(AssemblyError::TypeMismatch {
                opcode: Opcode::CastF2I(target).mnemonic(),
                index: 0,
                expected: Type::F64,
                actual: a.ty(),
            });
        }
        Ok(self.push(Opcode::CastF2I(target), Some(target), vec![a]).unwrap())
    }

    pub fn casti2f(&mut self, target: Type, a: Operand) -> Result<Operand, AssemblyError> {
        if !a.ty().is_integer() {
            return Err(AssemblyError::TypeMismatch {
                opcode: Opcode::CastI2F(target).mnemonic(),
                index: 0,
                expected: Type::I64,
                actual: a.ty(),
            });
        }
        Ok(self.push(Opcode::CastI2F(target), Some(target), vec![a]).unwrap())
    }

    pub fn resizef(&mut self, target: Type, a: Operand) -> Result<Operand, AssemblyError> {
        if !a.ty().is_float() {
            return Err(AssemblyError::TypeMismatch {
                opcode: Opcode::ResizeF(target).mnemonic(),
                index: 0,
                expected: Type::F64,
                actual: a.ty(),
            });
        }
        Ok(self.push(Opcode::ResizeF(target), Some(target), vec![a]).unwrap())
    }

    fn compare(&mut self, opcode: Opcode, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        Self::expect_numeric(opcode, 0, &a)?;
        Self::expect_same(opcode, &a, &b)?;
        Ok(self.push(opcode, Some(Type::Bool), vec![a, b]).unwrap())
    }

    pub fn test(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.compare(Opcode::Test, a, b)
    }
    pub fn eq(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.compare(Opcode::Eq, a, b)
    }
    pub fn lt(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.compare(Opcode::Lt, a, b)
    }
    pub fn lte(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.compare(Opcode::Lte, a, b)
    }
    pub fn ult(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.compare(Opcode::Ult, a, b)
    }
    pub fn ulte(&mut self, a: Operand, b: Operand) -> Result<Operand, AssemblyError> {
        self.compare(Opcode::Ulte, a, b)
    }

    pub fn br(&mut self, target: Operand) -> Result<(), AssemblyError> {
        Self::expect_type(Opcode::Br, 0, &target, Type::BranchLabel)?;
        self.push(Opcode::Br, None, vec![target]);
        Ok(())
    }

    pub fn ifbr(&mut self, condition: Operand, target: Operand) -> Result<(), AssemblyError> {
        Self::expect_type(Opcode::IfBr, 0, &condition, Type::Bool)?;
        Self::expect_type(Opcode::IfBr, 1, &target, Type::BranchLabel)?;
        self.push(Opcode::IfBr, None, vec![condition, target]);
        Ok(())
    }

    pub fn select(
        &mut self,
        condition: Operand,
        v_false: Operand,
        v_true: Operand,
    ) -> Result<Operand, AssemblyError> {
        Self::expect_type(Opcode::Select, 0, &condition, Type::Bool)?;
        Self::expect_same(Opcode::Select, &v_false, &v_true)?;
        let ty = v_false.ty();
        Ok(self
            .push(Opcode::Select, Some(ty), vec![condition, v_false, v_true])
            .unwrap())
    }

    /// `exit(condition, cycle_count)` — the terminating instruction of this
    /// unit's linear path (spec §3 invariant).
    pub fn exit(&mut self, condition: Operand, cycle_count: Operand) -> Result<(), AssemblyError> {
        Self::expect_type(Opcode::Exit, 0, &condition, Type::Bool)?;
        Self::expect_type(Opcode::Exit, 1, &cycle_count, Type::I64)?;
        self.push(Opcode::Exit, None, vec![condition, cycle_count]);
        Ok(())
    }

    /// `call(ret_type, host_fn_ptr, args…) -> Operand`. The guest supplies a
    /// plain host-callable function `(Guest*, Value…) -> Value`; the
    /// assembler captures the pointer in the instruction payload.
    pub fn call(
        &mut self,
        ret_type: Option<Type>,
        function: HostFn<G>,
        args: Vec<Operand>,
    ) -> Result<Option<Operand>, AssemblyError> {
        if args.len() > 3 {
            return Err(AssemblyError::TooManyCallArguments { actual: args.len() });
        }
        let result = ret_type.map(|ty| self.fresh(ty));
        self.unit.push(Instruction {
            opcode: Opcode::Call,
            result_type: ret_type,
            result: result.as_ref().and_then(|op| match op {
                Operand::Register { index, .. } => Some(*index),
                _ => None,
            }),
            sources: args,
            call_payload: Some(CallPayload {
                function: function as usize,
            }),
        });
        Ok(result)
    }

    pub fn nop(&mut self) {
        self.push(Opcode::Nop, None, vec![]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullGuest;

    #[test]
    fn arithmetic_constant_folding_inputs_type_check() {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let a = asm.konst(Type::I32, Value::from_i32(7));
        let b = asm.konst(Type::I32, Value::from_i32(35));
        let sum = asm.add(a, b).unwrap();
        assert_eq!(sum.ty(), Type::I32);
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let a = asm.konst(Type::I32, Value::from_i32(1));
        let b = asm.konst(Type::I64, Value::from_i64(1));
        assert!(asm.add(a, b).is_err());
    }

    #[test]
    fn export_resets_ssa_counter() {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let a = asm.konst(Type::I32, Value::from_i32(1));
        let b = asm.konst(Type::I32, Value::from_i32(2));
        asm.add(a, b).unwrap();
        let unit = asm.export_unit();
        assert_eq!(unit.len(), 1);
        assert!(asm.export_unit().is_empty());
    }

    #[test]
    fn call_rejects_more_than_three_arguments() {
        unsafe extern "C" fn f(_g: *mut NullGuest, _a: *const Value, _n: usize) -> Value {
            Value::zero()
        }
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let args = vec![
            asm.konst(Type::I32, Value::from_i32(0)),
            asm.konst(Type::I32, Value::from_i32(0)),
            asm.konst(Type::I32, Value::from_i32(0)),
            asm.konst(Type::I32, Value::from_i32(0)),
        ];
        assert!(asm.call(Some(Type::I32), f, args).is_err());
    }
}
