//! End-to-end scenarios and universal properties from spec §8, driven
//! through the public `foxjit` surface rather than any single layer's
//! internals.

use foxjit::{optimize, Assembler, Engine, EngineConfig, Guest, NullWatch, Outcome, Type, Value};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
struct RecordingGuest {
    registers: [Value; 4],
}

impl Guest for RecordingGuest {
    fn register_read(&mut self, index: u32, _width: u32) -> Value {
        self.registers[index as usize]
    }
    fn register_write(&mut self, index: u32, _width: u32, value: Value) {
        self.registers[index as usize] = value;
    }
    fn load(&mut self, _address: u32, _width: u32) -> Value {
        Value::zero()
    }
    fn store(&mut self, _address: u32, _width: u32, _value: Value) {}
}

fn scenario_a() -> foxjit::ExecutionUnit {
    let mut asm: Assembler<RecordingGuest> = Assembler::new();
    let a = asm.konst(Type::I32, Value::from_i32(7));
    let b = asm.konst(Type::I32, Value::from_i32(35));
    let sum = asm.add(a, b).unwrap();
    let idx = asm.konst(Type::I32, Value::from_i32(0));
    asm.writegr(idx, sum).unwrap();
    let cond = asm.konst(Type::Bool, Value::from_bool(true));
    let cycles = asm.konst(Type::I64, Value::from_i64(1));
    asm.exit(cond, cycles).unwrap();
    asm.export_unit()
}

fn scenario_b() -> foxjit::ExecutionUnit {
    let mut asm: Assembler<RecordingGuest> = Assembler::new();
    let one = asm.konst(Type::I32, Value::from_i32(1));
    let amount = asm.konst(Type::I32, Value::from_i32(32));
    let shifted = asm.shiftl(one, amount).unwrap();
    let idx = asm.konst(Type::I32, Value::from_i32(0));
    asm.writegr(idx, shifted).unwrap();
    let cond = asm.konst(Type::Bool, Value::from_bool(true));
    let cycles = asm.konst(Type::I64, Value::from_i64(1));
    asm.exit(cond, cycles).unwrap();
    asm.export_unit()
}

static HOST_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

unsafe extern "C" fn increment_and_tag_odd(_guest: *mut RecordingGuest, args: *const Value, argc: usize) -> Value {
    assert_eq!(argc, 1);
    HOST_CALL_COUNT.fetch_add(1, Ordering::SeqCst);
    let input = (*args).as_u32();
    Value::from_u32(input | 1)
}

fn scenario_c() -> foxjit::ExecutionUnit {
    let mut asm: Assembler<RecordingGuest> = Assembler::new();
    let arg = asm.konst(Type::I32, Value::from_u32(0xDEAD));
    let result = asm.call(Some(Type::I32), increment_and_tag_odd, vec![arg]).unwrap().unwrap();
    let idx = asm.konst(Type::I32, Value::from_i32(1));
    asm.writegr(idx, result).unwrap();
    let cond = asm.konst(Type::Bool, Value::from_bool(true));
    let cycles = asm.konst(Type::I64, Value::from_i64(2));
    asm.exit(cond, cycles).unwrap();
    asm.export_unit()
}

fn run_once(unit: foxjit::ExecutionUnit) -> (Outcome, RecordingGuest) {
    let mut engine: Engine<RecordingGuest> = Engine::new(
        EngineConfig::default(),
        Box::new(NullWatch),
        Box::new(foxjit::Amd64Backend),
        move |_addr| (unit.clone(), 4),
    )
    .unwrap();
    let mut guest = RecordingGuest::default();
    let outcome = engine.step(0x8000, &mut guest).unwrap();
    (outcome, guest)
}

#[test]
fn scenario_a_arithmetic_constant_folding() {
    let (outcome, guest) = run_once(scenario_a());
    assert_eq!(outcome, Outcome::Exit { cycles: 1 });
    assert_eq!(guest.registers[0].as_i32(), 42);
}

#[test]
fn scenario_b_shift_amount_is_masked_to_five_bits() {
    let (outcome, guest) = run_once(scenario_b());
    assert_eq!(outcome, Outcome::Exit { cycles: 1 });
    // 32 masked to 5 bits is 0, so `1 << 0 == 1`, not 0.
    assert_eq!(guest.registers[0].as_i32(), 1);
}

#[test]
fn scenario_c_guest_call_has_its_side_effect_exactly_once() {
    let before = HOST_CALL_COUNT.load(Ordering::SeqCst);
    let (outcome, guest) = run_once(scenario_c());
    assert_eq!(outcome, Outcome::Exit { cycles: 2 });
    assert_eq!(HOST_CALL_COUNT.load(Ordering::SeqCst), before + 1);
    assert_eq!(guest.registers[1].as_u32(), 0xDEAD | 1);
}

/// Property 2: optimizing a unit (constant-propagation + DCE) must not
/// change what executing it produces.
#[test]
fn optimizer_preserves_semantics_for_scenario_a_and_b() {
    for unit in [scenario_a(), scenario_b()] {
        let (baseline, baseline_guest) = run_once(unit.clone());
        let optimized = optimize(&unit);
        let (after, after_guest) = run_once(optimized);
        assert_eq!(baseline, after);
        assert_eq!(baseline_guest.registers, after_guest.registers);
    }
}

/// Property 1 (reference equivalence): this reference engine ships exactly
/// one executable backend (the bytecode VM) since native code generation is
/// out of scope here — `Amd64Backend` always declines, so every block runs
/// through the same interpreter whether or not a "native" backend was
/// configured. What's actually checkable without a second backend is that
/// the VM's dispatch and the optimizer's `Calculator`-based folding (the two
/// code paths spec §4.B warns must not drift) agree: running the
/// constant-folded unit through the VM reproduces the same result the
/// optimizer computed at compile time.
#[test]
fn vm_dispatch_agrees_with_calculator_based_constant_folding() {
    let folded = optimize(&scenario_a());
    let (outcome, guest) = run_once(folded);
    assert_eq!(outcome, Outcome::Exit { cycles: 1 });
    assert_eq!(guest.registers[0].as_i32(), 42);
}
