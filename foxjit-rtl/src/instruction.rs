use crate::{RegisterAssignment, RtlFlags};
use foxjit_types::Value;

/// High bit of the 16-bit op field marks an allocator-private pseudo-op;
/// everything below it is an opcode forwarded verbatim from the IR layer
/// (spec §3: "the register allocator may introduce its own pseudo
/// instructions, e.g. `move`, interleaved with the forwarded program").
const RESERVED_BIT: u16 = 0x8000;

const OP_MOVE: u16 = RESERVED_BIT | 0;
const OP_NOP: u16 = RESERVED_BIT | 1;
const OP_INVALID: u16 = RESERVED_BIT | 2;

/// The operation an [`RtlInstruction`] performs. Ops below the reserved bit
/// are IR opcodes carried through unchanged (`foxjit-rtl` doesn't depend on
/// `foxjit-ir`, so they're opaque `u16`s here); ops at or above it are
/// allocator-introduced pseudo-instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtlOp {
    /// An opcode forwarded from the IR layer, by its numeric encoding.
    Forwarded(u16),
    /// Allocator-inserted register-to-register or register-to-spill move.
    Move,
    /// A no-op left behind by a rewrite; skipped by codegen.
    Nop,
    /// Placeholder written by [`crate::RtlInstructions::reserve`] before the
    /// real instruction is known.
    Invalid,
}

impl RtlOp {
    pub fn to_bits(self) -> u16 {
        match self {
            RtlOp::Forwarded(op) => {
                debug_assert!(op & RESERVED_BIT == 0, "forwarded opcode collides with reserved bit");
                op
            }
            RtlOp::Move => OP_MOVE,
            RtlOp::Nop => OP_NOP,
            RtlOp::Invalid => OP_INVALID,
        }
    }

    pub fn from_bits(bits: u16) -> Self {
        match bits {
            OP_MOVE => RtlOp::Move,
            OP_NOP => RtlOp::Nop,
            OP_INVALID => RtlOp::Invalid,
            op if op & RESERVED_BIT == 0 => RtlOp::Forwarded(op),
            other => panic!("unknown reserved RTL op {other:#06x}"),
        }
    }

    pub const fn is_pseudo(self) -> bool {
        !matches!(self, RtlOp::Forwarded(_))
    }
}

/// A snapshot of which hardware registers hold which SSA values at an
/// instruction boundary, attached when [`RtlFlags::SAVE_STATE`] is set
/// (spec §3: emitters restoring register state around calls/side exits).
pub type RegisterState = Vec<RegisterAssignment>;

/// One RTL instruction: an op, allocator hints, and (pre-allocation) the
/// bare SSA register list or (post-allocation) the hardware assignments
/// the allocator filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtlInstruction {
    pub op: RtlOp,
    pub flags: RtlFlags,
    pub position: u32,
    pub payload: Value,
    pub save_state: RegisterState,
    pub sources: Vec<RegisterAssignment>,
    pub results: Vec<RegisterAssignment>,
}

impl RtlInstruction {
    pub fn new(op: RtlOp) -> Self {
        RtlInstruction {
            op,
            flags: RtlFlags::empty(),
            position: 0,
            payload: Value::zero(),
            save_state: Vec::new(),
            sources: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: RtlFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_sources(mut self, sources: Vec<RegisterAssignment>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_results(mut self, results: Vec<RegisterAssignment>) -> Self {
        self.results = results;
        self
    }

    /// Encode into the record's packed on-the-wire form: a fixed 18-byte
    /// header (op, flags, source/result/save counts, position, payload)
    /// followed by the save-state, source, and result assignment arrays,
    /// 8 bytes each (spec §3: "records are concatenated tightly in a
    /// variable-width byte stream").
    pub fn encode(&self) -> Vec<u8> {
        assert!(self.sources.len() <= u8::MAX as usize, "too many RTL sources");
        assert!(self.results.len() <= u8::MAX as usize, "too many RTL results");
        assert!(self.save_state.len() <= u8::MAX as usize, "too large a save-state snapshot");

        let mut bytes = Vec::with_capacity(18 + 8 * (self.sources.len() + self.results.len() + self.save_state.len()));
        bytes.extend_from_slice(&self.op.to_bits().to_le_bytes());
        bytes.push(self.flags.bits());
        bytes.push(self.sources.len() as u8);
        bytes.push(self.results.len() as u8);
        bytes.push(self.save_state.len() as u8);
        bytes.extend_from_slice(&self.position.to_le_bytes());
        bytes.extend_from_slice(&self.payload.as_u64().to_le_bytes());
        for assignment in &self.save_state {
            bytes.extend_from_slice(&assignment.to_bits().to_le_bytes());
        }
        for assignment in &self.sources {
            bytes.extend_from_slice(&assignment.to_bits().to_le_bytes());
        }
        for assignment in &self.results {
            bytes.extend_from_slice(&assignment.to_bits().to_le_bytes());
        }
        bytes
    }

    /// Decode one record starting at `bytes[0]`, returning it and the
    /// number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> (RtlInstruction, usize) {
        let op = RtlOp::from_bits(u16::from_le_bytes([bytes[0], bytes[1]]));
        let flags = RtlFlags::from_bits_truncate(bytes[2]);
        let source_count = bytes[3] as usize;
        let result_count = bytes[4] as usize;
        let save_count = bytes[5] as usize;
        let position = u32::from_le_bytes(bytes[6..10].try_into().unwrap());
        let payload = Value::from_u64(u64::from_le_bytes(bytes[10..18].try_into().unwrap()));

        let mut offset = 18;
        let read_assignments = |bytes: &[u8], offset: &mut usize, count: usize| -> Vec<RegisterAssignment> {
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                let bits = u64::from_le_bytes(bytes[*offset..*offset + 8].try_into().unwrap());
                out.push(RegisterAssignment::from_bits(bits));
                *offset += 8;
            }
            out
        };

        let save_state = read_assignments(bytes, &mut offset, save_count);
        let sources = read_assignments(bytes, &mut offset, source_count);
        let results = read_assignments(bytes, &mut offset, result_count);

        (
            RtlInstruction {
                op,
                flags,
                position,
                payload,
                save_state,
                sources,
                results,
            },
            offset,
        )
    }
}
