use crate::Opcode;
use foxjit_types::{Type, Value};

/// Pure host-side evaluator: given an opcode and constant operands, compute
/// the constant result with the exact overflow/rounding/shift semantics the
/// bytecode VM implements (spec §4.B). Shared between the constant-folding
/// optimizer pass and the VM so the two can never drift — both ultimately
/// call [`Calculator::eval`].
///
/// Returns `None` if the opcode has no constant-form semantics (memory,
/// control flow, and `call` are never foldable).
pub struct Calculator;

impl Calculator {
    /// Evaluate `opcode` over already-typed constant operands. `result_ty`
    /// is needed for opcodes whose result type isn't implied by the sources
    /// alone (conversions).
    pub fn eval(opcode: Opcode, result_ty: Type, sources: &[(Type, Value)]) -> Option<Value> {
        use Opcode::*;
        match opcode {
            And | Or | Xor | Not | ShiftL | ShiftR | AShiftR | RotL | RotR | Bsc => {
                Self::eval_bitwise(opcode, result_ty, sources)
            }
            Add | Sub | Mul | UMul | Div | UDiv | Mod | Sqrt => {
                Self::eval_arith(opcode, result_ty, sources)
            }
            Extend16 | Extend32 | Extend64 | Bitcast(_) | CastF2I(_) | CastI2F(_)
            | ResizeF(_) => Self::eval_convert(opcode, result_ty, sources),
            Test | Eq | Lt | Lte | Ult | Ulte => Self::eval_compare(opcode, sources),
            Select => {
                let (_, cond) = sources[0];
                if cond.as_bool() {
                    Some(sources[2].1)
                } else {
                    Some(sources[1].1)
                }
            }
            ReadGr | WriteGr | Load | Store | Br | IfBr | Exit | Call | Nop => None,
        }
    }

    fn shift_mask(ty: Type, amount: u64) -> u32 {
        let width_bits = ty.byte_size() * 8;
        (amount as u32) & (width_bits - 1)
    }

    fn eval_bitwise(opcode: Opcode, ty: Type, sources: &[(Type, Value)]) -> Option<Value> {
        use Opcode::*;
        let a = sources[0].1.as_u64();
        match opcode {
            And => Some(Value::from_u64(a & sources[1].1.as_u64()).truncate_to(ty)),
            Or => Some(Value::from_u64(a | sources[1].1.as_u64()).truncate_to(ty)),
            Xor => Some(Value::from_u64(a ^ sources[1].1.as_u64()).truncate_to(ty)),
            Not => Some(Value::from_u64(!a).truncate_to(ty)),
            ShiftL => {
                let amt = Self::shift_mask(ty, sources[1].1.as_u64());
                Some(Value::from_u64(a.wrapping_shl(amt)).truncate_to(ty))
            }
            ShiftR => {
                let amt = Self::shift_mask(ty, sources[1].1.as_u64());
                let masked = a & Self::unsigned_mask(ty);
                Some(Value::from_u64(masked.wrapping_shr(amt)).truncate_to(ty))
            }
            AShiftR => {
                let amt = Self::shift_mask(ty, sources[1].1.as_u64());
                let signed = Self::sign_extend(a, ty);
                Some(Value::from_i64(signed.wrapping_shr(amt)).truncate_to(ty))
            }
            RotL => {
                let bits = ty.byte_size() * 8;
                let amt = Self::shift_mask(ty, sources[1].1.as_u64()) % bits;
                let masked = a & Self::unsigned_mask(ty);
                let rotated = (masked.wrapping_shl(amt)) | (masked.wrapping_shr((bits - amt) % bits.max(1)));
                Some(Value::from_u64(rotated).truncate_to(ty))
            }
            RotR => {
                let bits = ty.byte_size() * 8;
                let amt = Self::shift_mask(ty, sources[1].1.as_u64()) % bits;
                let masked = a & Self::unsigned_mask(ty);
                let rotated = (masked.wrapping_shr(amt)) | (masked.wrapping_shl((bits - amt) % bits.max(1)));
                Some(Value::from_u64(rotated).truncate_to(ty))
            }
            Bsc => {
                let control = sources[1].1.as_bool();
                let bit = sources[2].1.as_u64() & u64::from(ty.byte_size() * 8 - 1);
                let result = if control { a | (1u64 << bit) } else { a & !(1u64 << bit) };
                Some(Value::from_u64(result).truncate_to(ty))
            }
            _ => unreachable!(),
        }
    }

    fn unsigned_mask(ty: Type) -> u64 {
        let bits = ty.byte_size() * 8;
        if bits >= 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        }
    }

    fn sign_extend(raw: u64, ty: Type) -> i64 {
        let bits = ty.byte_size() * 8;
        if bits >= 64 {
            return raw as i64;
        }
        let shift = 64 - bits;
        ((raw << shift) as i64) >> shift
    }

    fn eval_arith(opcode: Opcode, ty: Type, sources: &[(Type, Value)]) -> Option<Value> {
        use Opcode::*;
        if ty.is_float() {
            let a = if ty == Type::F32 {
                sources[0].1.as_f32() as f64
            } else {
                sources[0].1.as_f64()
            };
            let b = if opcode != Sqrt {
                Some(if ty == Type::F32 {
                    sources[1].1.as_f32() as f64
                } else {
                    sources[1].1.as_f64()
                })
            } else {
                None
            };
            let result = match opcode {
                Add => a + b.unwrap(),
                Sub => a - b.unwrap(),
                Mul => a * b.unwrap(),
                Div => a / b.unwrap(),
                // Open Question (spec §9): implemented as IEEE fmod, matching
                // Rust's native float `%` operator.
                Mod => a % b.unwrap(),
                Sqrt => a.sqrt(),
                UMul | UDiv => return None,
                _ => unreachable!(),
            };
            return Some(if ty == Type::F32 {
                Value::from_f32(result as f32)
            } else {
                Value::from_f64(result)
            });
        }

        let a = sources[0].1.as_u64();
        let b = sources.get(1).map(|(_, v)| v.as_u64()).unwrap_or(0);
        let result = match opcode {
            Add => a.wrapping_add(b),
            Sub => a.wrapping_sub(b),
            Mul => {
                let sa = Self::sign_extend(a, ty);
                let sb = Self::sign_extend(b, ty);
                (sa.wrapping_mul(sb)) as u64
            }
            UMul => a.wrapping_mul(b),
            Div => {
                let sa = Self::sign_extend(a, ty);
                let sb = Self::sign_extend(b, ty);
                if sb == 0 {
                    0
                } else {
                    sa.wrapping_div(sb) as u64
                }
            }
            UDiv => {
                if b == 0 {
                    0
                } else {
                    a.wrapping_div(b)
                }
            }
            Mod => {
                let sa = Self::sign_extend(a, ty);
                let sb = Self::sign_extend(b, ty);
                if sb == 0 {
                    0
                } else {
                    sa.wrapping_rem(sb) as u64
                }
            }
            Sqrt => return None,
            _ => unreachable!(),
        };
        Some(Value::from_u64(result).truncate_to(ty))
    }

    fn eval_convert(opcode: Opcode, ty: Type, sources: &[(Type, Value)]) -> Option<Value> {
        use Opcode::*;
        let (src_ty, src) = sources[0];
        match opcode {
            Extend16 => Some(Value::from_i16(src.as_i8() as i16)),
            Extend32 => {
                let widened = if src_ty == Type::I8 {
                    src.as_i8() as i32
                } else {
                    src.as_i16() as i32
                };
                Some(Value::from_i32(widened))
            }
            Extend64 => {
                let widened = match src_ty {
                    Type::I8 => src.as_i8() as i64,
                    Type::I16 => src.as_i16() as i64,
                    _ => src.as_i32() as i64,
                };
                Some(Value::from_i64(widened))
            }
            Bitcast(_) => Some(src.truncate_to(ty)),
            CastF2I(_) => {
                let f = if src_ty == Type::F32 {
                    src.as_f32() as f64
                } else {
                    src.as_f64()
                };
                let i = f as i64;
                Some(Value::from_i64(i).truncate_to(ty))
            }
            CastI2F(_) => {
                let i = Self::sign_extend(src.as_u64(), src_ty);
                if ty == Type::F32 {
                    Some(Value::from_f32(i as f32))
                } else {
                    Some(Value::from_f64(i as f64))
                }
            }
            ResizeF(_) => {
                let f = if src_ty == Type::F32 {
                    src.as_f32() as f64
                } else {
                    src.as_f64()
                };
                if ty == Type::F32 {
                    Some(Value::from_f32(f as f32))
                } else {
                    Some(Value::from_f64(f))
                }
            }
            _ => unreachable!(),
        }
    }

    fn eval_compare(opcode: Opcode, sources: &[(Type, Value)]) -> Option<Value> {
        use Opcode::*;
        let (ty, a) = sources[0];
        let (_, b) = sources[1];
        let result = if ty.is_float() {
            let (fa, fb) = if ty == Type::F32 {
                (a.as_f32() as f64, b.as_f32() as f64)
            } else {
                (a.as_f64(), b.as_f64())
            };
            match opcode {
                Eq => fa == fb,
                Lt | Ult => fa < fb,
                Lte | Ulte => fa <= fb,
                Test => (a.as_u64() & b.as_u64()) != 0,
                _ => unreachable!(),
            }
        } else {
            match opcode {
                Test => (a.as_u64() & b.as_u64()) != 0,
                Eq => a.truncate_to(ty).as_u64() == b.truncate_to(ty).as_u64(),
                Lt => Self::sign_extend(a.as_u64(), ty) < Self::sign_extend(b.as_u64(), ty),
                Lte => Self::sign_extend(a.as_u64(), ty) <= Self::sign_extend(b.as_u64(), ty),
                Ult => (a.as_u64() & Self::unsigned_mask(ty)) < (b.as_u64() & Self::unsigned_mask(ty)),
                Ulte => (a.as_u64() & Self::unsigned_mask(ty)) <= (b.as_u64() & Self::unsigned_mask(ty)),
                _ => unreachable!(),
            }
        };
        Some(Value::from_bool(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_masks_amount_to_type_width() {
        // Scenario B: shiftl(1, 32) on i32 masks 32 to 5 bits -> 0, so result is 1.
        let result = Calculator::eval(
            Opcode::ShiftL,
            Type::I32,
            &[(Type::I32, Value::from_i32(1)), (Type::I32, Value::from_i32(32))],
        )
        .unwrap();
        assert_eq!(result.as_i32(), 1);
    }

    #[test]
    fn constant_add_matches_scenario_a() {
        let result = Calculator::eval(
            Opcode::Add,
            Type::I32,
            &[(Type::I32, Value::from_i32(7)), (Type::I32, Value::from_i32(35))],
        )
        .unwrap();
        assert_eq!(result.as_i32(), 42);
    }

    #[test]
    fn float_mod_matches_ieee_fmod() {
        let result = Calculator::eval(
            Opcode::Mod,
            Type::F64,
            &[(Type::F64, Value::from_f64(5.5)), (Type::F64, Value::from_f64(2.0))],
        )
        .unwrap();
        assert_eq!(result.as_f64(), 5.5f64 % 2.0f64);
    }

    #[test]
    fn ult_is_unsigned() {
        let result = Calculator::eval(
            Opcode::Ult,
            Type::I32,
            &[(Type::I32, Value::from_i32(-1)), (Type::I32, Value::from_i32(1))],
        )
        .unwrap();
        // -1 as u32 is huge, so -1 is NOT unsigned-less-than 1.
        assert!(!result.as_bool());
    }

    #[test]
    fn lt_is_signed() {
        let result = Calculator::eval(
            Opcode::Lt,
            Type::I32,
            &[(Type::I32, Value::from_i32(-1)), (Type::I32, Value::from_i32(1))],
        )
        .unwrap();
        assert!(result.as_bool());
    }

    #[test]
    fn memory_and_control_ops_are_not_foldable() {
        assert!(Calculator::eval(Opcode::Load, Type::I32, &[(Type::I32, Value::zero())]).is_none());
        assert!(Calculator::eval(Opcode::Call, Type::I32, &[]).is_none());
    }
}
