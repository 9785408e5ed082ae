use crate::{Calculator, ExecutionUnit, Instruction, Opcode, Operand};
use std::collections::{HashMap, HashSet};

/// Fold every instruction whose sources are all immediates into a constant,
/// rewriting subsequent uses transparently (spec §4.B).
///
/// Folded instructions become `Nop`s carrying no operands; their SSA slot is
/// remapped to an `Operand::Constant` everywhere it's used downstream. This
/// keeps SSA numbering stable for [`dead_code_elimination`], which runs
/// after this pass and actually drops the `Nop`s.
pub fn constant_propagation(unit: &ExecutionUnit) -> ExecutionUnit {
    let mut constants: HashMap<u32, Operand> = HashMap::new();
    let mut out = ExecutionUnit::new();

    for instr in unit.iter() {
        let resolved_sources: Vec<Operand> = instr
            .sources
            .iter()
            .map(|src| match src {
                Operand::Register { index, .. } => constants.get(index).copied().unwrap_or(*src),
                Operand::Constant { .. } => *src,
            })
            .collect();

        let all_constant = !resolved_sources.is_empty()
            && resolved_sources.iter().all(Operand::is_constant)
            && instr.call_payload.is_none();

        if all_constant {
            if let Some(ty) = instr.result_type {
                let values: Vec<(foxjit_types::Type, foxjit_types::Value)> = resolved_sources
                    .iter()
                    .map(|op| (op.ty(), op.as_constant_value().unwrap()))
                    .collect();
                if let Some(folded) = Calculator::eval(instr.opcode, ty, &values) {
                    if let Some(result) = instr.result {
                        constants.insert(
                            result,
                            Operand::Constant { ty, value: folded },
                        );
                    }
                    out.push(Instruction {
                        opcode: Opcode::Nop,
                        result_type: None,
                        result: None,
                        sources: vec![],
                        call_payload: None,
                    });
                    continue;
                }
            }
        }

        out.push(Instruction {
            opcode: instr.opcode,
            result_type: instr.result_type,
            result: instr.result,
            sources: resolved_sources,
            call_payload: instr.call_payload,
        });
    }

    out
}

/// Reverse-walk marking live any instruction whose result is used by a
/// side-effecting instruction or by another live instruction; drop the
/// rest (spec §4.B). Side-effecting opcodes ([`Opcode::has_side_effect`])
/// are always retained.
pub fn dead_code_elimination(unit: &ExecutionUnit) -> ExecutionUnit {
    let instructions = unit.instructions();
    let mut live = vec![false; instructions.len()];
    let mut live_registers: HashSet<u32> = HashSet::new();

    for (i, instr) in instructions.iter().enumerate().rev() {
        let keep = instr.opcode.has_side_effect()
            || instr
                .result
                .map(|r| live_registers.contains(&r))
                .unwrap_or(false);
        if keep {
            live[i] = true;
            for src in &instr.sources {
                if let Operand::Register { index, .. } = src {
                    live_registers.insert(*index);
                }
            }
        }
    }

    let mut out = ExecutionUnit::new();
    for (i, instr) in instructions.iter().enumerate() {
        if live[i] {
            out.push(instr.clone());
        }
    }
    out
}

/// Run both thin optimizer passes in the order spec §4.B describes:
/// constant propagation first, then dead-code elimination.
pub fn optimize(unit: &ExecutionUnit) -> ExecutionUnit {
    let folded = constant_propagation(unit);
    dead_code_elimination(&folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Assembler;
    use foxjit_types::{Type, Value};

    struct NullGuest;

    #[test]
    fn scenario_a_arithmetic_constant_folding() {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let r0 = asm.konst(Type::I32, Value::from_i32(7));
        let r1 = asm.konst(Type::I32, Value::from_i32(35));
        let r2 = asm.add(r0, r1).unwrap();
        let idx = asm.konst(Type::I32, Value::from_i32(0));
        asm.writegr(idx, r2).unwrap();
        let one = asm.konst(Type::Bool, Value::from_bool(true));
        let cycles = asm.konst(Type::I64, Value::from_i64(1));
        asm.exit(one, cycles).unwrap();
        let unit = asm.export_unit();

        let optimized = optimize(&unit);
        // writegr + exit should survive; the add collapses into the writegr's
        // now-constant source.
        assert_eq!(optimized.len(), 2);
        let writegr = optimized.get(0).unwrap();
        assert_eq!(writegr.opcode, Opcode::WriteGr);
        assert_eq!(
            writegr.sources[1],
            Operand::Constant {
                ty: Type::I32,
                value: Value::from_i32(42)
            }
        );
    }

    #[test]
    fn dce_drops_instructions_with_unused_results() {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let a = asm.konst(Type::I32, Value::from_i32(1));
        let b = asm.konst(Type::I32, Value::from_i32(2));
        let _unused = asm.add(a, b).unwrap();
        let cond = asm.konst(Type::Bool, Value::from_bool(true));
        let cycles = asm.konst(Type::I64, Value::from_i64(0));
        asm.exit(cond, cycles).unwrap();
        let unit = asm.export_unit();

        let reduced = dead_code_elimination(&unit);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced.get(0).unwrap().opcode, Opcode::Exit);
    }
}
