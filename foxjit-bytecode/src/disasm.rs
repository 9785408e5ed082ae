use crate::{BytecodeOperand, RoutineBody, Slot, TypedOperand};
use std::fmt::Write as _;

fn fmt_slot(slot: Slot) -> String {
    match slot {
        Slot::Register(i) => format!("r{i}"),
        Slot::Spill(i) => format!("s{i}"),
    }
}

fn fmt_operand(operand: &TypedOperand) -> String {
    match operand.operand {
        BytecodeOperand::Slot(slot) => fmt_slot(slot),
        BytecodeOperand::Constant(value) => format!("#{}", value.display(operand.ty)),
    }
}

/// Render a compiled routine one instruction per line, in the same
/// `$result := opcode sources...` shape `foxjit_ir::Instruction`'s
/// `Display` uses, so a reader can compare the IR a unit started from
/// against the bytecode it was lowered to without learning a second
/// notation.
pub fn disassemble(routine: &RoutineBody) -> String {
    let mut out = String::new();
    for (i, instr) in routine.iter().enumerate() {
        if let Some(result) = instr.result {
            let _ = write!(out, "[{i:04}] {} := {}", fmt_slot(result), instr.opcode);
        } else {
            let _ = write!(out, "[{i:04}] {}", instr.opcode);
        }
        for (j, src) in instr.sources.iter().enumerate() {
            let sep = if j == 0 { " " } else { ", " };
            let _ = write!(out, "{sep}{}", fmt_operand(src));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BytecodeInstr, Compiler};
    use foxjit_ir::{Assembler, Opcode};
    use foxjit_types::{Type, Value};

    struct NullGuest;

    #[test]
    fn disassembles_one_line_per_instruction() {
        let mut asm: Assembler<NullGuest> = Assembler::new();
        let a = asm.konst(Type::I32, Value::from_i32(1));
        let b = asm.konst(Type::I32, Value::from_i32(2));
        let sum = asm.add(a, b).unwrap();
        let idx = asm.konst(Type::I32, Value::from_i32(0));
        asm.writegr(idx, sum).unwrap();
        let cond = asm.konst(Type::Bool, Value::from_bool(true));
        let cycles = asm.konst(Type::I64, Value::from_i64(1));
        asm.exit(cond, cycles).unwrap();
        let unit = asm.export_unit();

        let routine = Compiler::new().compile(&unit).unwrap();
        let text = disassemble(&routine);
        assert_eq!(text.lines().count(), routine.len());
        assert!(text.contains("add"));
        assert!(text.contains("exit"));
    }

    #[test]
    fn nop_has_no_operands_or_result() {
        let mut body = RoutineBody::new();
        body.push(&BytecodeInstr {
            opcode: Opcode::Nop,
            result_type: Type::I8,
            result: None,
            sources: vec![],
        });
        let text = disassemble(&body);
        assert_eq!(text.trim(), "[0000] nop");
    }
}
