//! Instruction set: opcode table, operand widths and the byte codec.
//!
//! Instructions are a one-byte opcode followed by its operands in
//! declaration order, each little-endian at a fixed width (1/2/4/8 bytes).
//! The operand width table below is normative; the executor trusts it when
//! fetching and the compiler trusts it when patching jumps.

use crate::error::DecodeError;
use smallvec::SmallVec;
use std::fmt;

/// Decoded operand list. No instruction carries more than two operands.
pub type Operands = SmallVec<[u64; 2]>;

/// One-byte operation codes.
///
/// Discriminants are part of the archive format and must not be reordered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Noop = 0,
    LoadConst,
    LoadModConst,
    LoadLocal,
    LoadBuiltin,
    LoadI32,
    LoadI64,
    LoadU32,
    LoadU64,
    SetLocal,
    Alloc,
    Realloc,
    Free,
    New,
    NewMod,
    NewBuiltin,
    Pop,
    Swap,
    Call,
    Return,
    ReturnValue,

    // Arithmetic
    AddU64,
    AddI64,
    SubU64,
    SubI64,
    MulU64,
    MulI64,
    DivU64,
    DivI64,
    DivF64,
    ModU64,
    ModI64,

    // Logic
    And,
    Or,
    MaskAnd,
    MaskOr,
    MaskXor,
    MaskNot,
    ShiftRight,
    ShiftLeft,

    // Control flow
    Jmp,
    Jmpz,
    Jmpt,
    Jmpn,
    Jmpp,

    Yield,
    Trap,
    Halt,
}

/// Static description of an opcode: mnemonic and operand widths in bytes.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub widths: &'static [usize],
}

/// Width of a jump instruction: one opcode byte plus a signed 16-bit
/// displacement. The compiler's patch arithmetic depends on this.
pub const JUMP_WIDTH: usize = 3;

const OP_TABLE: [OpInfo; 48] = [
    OpInfo { name: "noop", widths: &[] },
    OpInfo { name: "load.const", widths: &[4] },
    OpInfo { name: "load.modconst", widths: &[4, 4] },
    OpInfo { name: "load.local", widths: &[4] },
    OpInfo { name: "load.builtin", widths: &[2] },
    OpInfo { name: "load.i32", widths: &[4] },
    OpInfo { name: "load.i64", widths: &[8] },
    OpInfo { name: "load.u32", widths: &[4] },
    OpInfo { name: "load.u64", widths: &[8] },
    OpInfo { name: "set.local", widths: &[4] },
    OpInfo { name: "alloc", widths: &[4] },
    OpInfo { name: "realloc", widths: &[8, 4] },
    OpInfo { name: "free", widths: &[8] },
    OpInfo { name: "new", widths: &[4] },
    OpInfo { name: "new.mod", widths: &[4, 4] },
    OpInfo { name: "new.builtin", widths: &[2] },
    OpInfo { name: "pop", widths: &[] },
    OpInfo { name: "swap", widths: &[] },
    OpInfo { name: "call", widths: &[2] },
    OpInfo { name: "return", widths: &[] },
    OpInfo { name: "return.value", widths: &[] },
    OpInfo { name: "add.u64", widths: &[] },
    OpInfo { name: "add.i64", widths: &[] },
    OpInfo { name: "sub.u64", widths: &[] },
    OpInfo { name: "sub.i64", widths: &[] },
    OpInfo { name: "mul.u64", widths: &[] },
    OpInfo { name: "mul.i64", widths: &[] },
    OpInfo { name: "div.u64", widths: &[] },
    OpInfo { name: "div.i64", widths: &[] },
    OpInfo { name: "div.f64", widths: &[] },
    OpInfo { name: "mod.u64", widths: &[] },
    OpInfo { name: "mod.i64", widths: &[] },
    OpInfo { name: "and", widths: &[] },
    OpInfo { name: "or", widths: &[] },
    OpInfo { name: "mask.and", widths: &[] },
    OpInfo { name: "mask.or", widths: &[] },
    OpInfo { name: "mask.xor", widths: &[] },
    OpInfo { name: "mask.not", widths: &[] },
    OpInfo { name: "shift.right", widths: &[] },
    OpInfo { name: "shift.left", widths: &[] },
    OpInfo { name: "jmp", widths: &[2] },
    OpInfo { name: "jmpz", widths: &[2] },
    OpInfo { name: "jmpt", widths: &[2] },
    OpInfo { name: "jmpn", widths: &[2] },
    OpInfo { name: "jmpp", widths: &[2] },
    OpInfo { name: "yield", widths: &[] },
    OpInfo { name: "trap", widths: &[] },
    OpInfo { name: "halt", widths: &[] },
];

impl Opcode {
    /// Decode an opcode byte. Unknown bytes are decode errors.
    pub fn from_u8(byte: u8) -> Result<Opcode, DecodeError> {
        if byte as usize >= OP_TABLE.len() {
            return Err(DecodeError::UnknownOpcode(byte));
        }
        // Discriminants are dense from 0, so the byte is the discriminant.
        Ok(unsafe { std::mem::transmute::<u8, Opcode>(byte) })
    }

    /// Look up an opcode by its mnemonic.
    pub fn from_name(name: &str) -> Option<Opcode> {
        OP_TABLE
            .iter()
            .position(|info| info.name == name)
            .map(|idx| Opcode::from_u8(idx as u8).expect("table index is a valid opcode"))
    }

    /// Static operand metadata for this opcode.
    #[inline]
    pub fn info(self) -> &'static OpInfo {
        &OP_TABLE[self as usize]
    }

    /// Total encoded width including the opcode byte.
    #[inline]
    pub fn width(self) -> usize {
        1 + self.info().widths.iter().sum::<usize>()
    }

    /// Whether this is one of the `jmp*` family.
    #[inline]
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Jmpz | Opcode::Jmpt | Opcode::Jmpn | Opcode::Jmpp
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info().name)
    }
}

/// Encode a single instruction.
///
/// Operand values are truncated to their declared widths; signed immediates
/// are passed as their two's-complement bit patterns.
///
/// # Panics
///
/// Panics if the operand count does not match the opcode's declaration.
/// Callers validate arity against [`OpInfo::widths`] first; the compiler
/// reports a proper error for malformed IR before reaching this point.
pub fn encode_op(code: Opcode, operands: &[u64]) -> Instructions {
    let info = code.info();
    assert_eq!(
        operands.len(),
        info.widths.len(),
        "invalid number of operands for op {}: expected {} found {}",
        code,
        info.widths.len(),
        operands.len(),
    );

    let mut bytes = Vec::with_capacity(code.width());
    bytes.push(code as u8);
    for (operand, width) in operands.iter().zip(info.widths) {
        match *width {
            1 => bytes.push(*operand as u8),
            2 => bytes.extend_from_slice(&(*operand as u16).to_le_bytes()),
            4 => bytes.extend_from_slice(&(*operand as u32).to_le_bytes()),
            8 => bytes.extend_from_slice(&operand.to_le_bytes()),
            _ => unreachable!("invalid operand width {}", width),
        }
    }
    Instructions(bytes)
}

/// Read the operands described by `info` from `bytes`.
///
/// `bytes` starts immediately after the opcode byte and must contain at
/// least the declared widths; the executor's fetch checks this before
/// calling. Returns the operands and the number of bytes consumed.
pub fn read_operands(info: &OpInfo, bytes: &[u8]) -> (Operands, usize) {
    let mut operands = Operands::new();
    let mut off = 0;
    for width in info.widths.iter().copied() {
        let operand = match width {
            1 => bytes[off] as u64,
            2 => u16::from_le_bytes([bytes[off], bytes[off + 1]]) as u64,
            4 => u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()) as u64,
            8 => u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap()),
            _ => unreachable!("invalid operand width {}", width),
        };
        operands.push(operand);
        off += width;
    }
    (operands, off)
}

/// A flat instruction stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Instructions(Vec::new())
    }

    /// Append an encoded instruction.
    pub fn push_op(&mut self, code: Opcode, operands: &[u64]) {
        self.0.extend_from_slice(&encode_op(code, operands).0);
    }

    /// Append another stream.
    pub fn extend(&mut self, other: &Instructions) {
        self.0.extend_from_slice(&other.0);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(bytes: Vec<u8>) -> Self {
        Instructions(bytes)
    }
}

impl std::ops::Deref for Instructions {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Disassembly: one instruction per line, `offset: mnemonic operands`.
///
/// Undecodable tails are rendered as a trailing error line rather than
/// aborting, so partial streams stay inspectable.
impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut off = 0;
        while off < self.0.len() {
            let code = match Opcode::from_u8(self.0[off]) {
                Ok(code) => code,
                Err(_) => {
                    return writeln!(f, "{:04}: <bad opcode {:#04x}>", off, self.0[off]);
                }
            };
            if off + code.width() > self.0.len() {
                return writeln!(f, "{:04}: <truncated {}>", off, code);
            }

            let (operands, _) = read_operands(code.info(), &self.0[off + 1..]);
            write!(f, "{:04}: {}", off, code)?;
            for (i, operand) in operands.iter().enumerate() {
                if i == 0 {
                    write!(f, " {}", operand)?;
                } else {
                    write!(f, ", {}", operand)?;
                }
            }
            writeln!(f)?;
            off += code.width();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..OP_TABLE.len() as u8 {
            let code = Opcode::from_u8(byte).unwrap();
            assert_eq!(code as u8, byte);
            assert_eq!(Opcode::from_name(code.info().name), Some(code));
        }
        assert!(Opcode::from_u8(48).is_err());
        assert!(Opcode::from_name("load.global").is_none());
    }

    #[test]
    fn test_encode_widths() {
        let cases: &[(Opcode, &[u64], &[u8])] = &[
            (Opcode::Noop, &[], &[0]),
            (Opcode::LoadConst, &[256], &[1, 0, 1, 0, 0]),
            (Opcode::LoadModConst, &[42, 256], &[2, 42, 0, 0, 0, 0, 1, 0, 0]),
            (Opcode::LoadLocal, &[256], &[3, 0, 1, 0, 0]),
            (Opcode::LoadBuiltin, &[256], &[4, 0, 1]),
            (Opcode::LoadI64, &[256], &[6, 0, 1, 0, 0, 0, 0, 0, 0]),
            (Opcode::SetLocal, &[256], &[9, 0, 1, 0, 0]),
            (Opcode::Realloc, &[256, 256], &[11, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0]),
            (Opcode::Call, &[256], &[18, 0, 1]),
            (Opcode::Jmp, &[0], &[40, 0, 0]),
            (Opcode::Halt, &[], &[47]),
        ];

        for (code, operands, expected) in cases {
            let set = encode_op(*code, operands);
            assert_eq!(set.as_slice(), *expected, "encoding {}", code);

            let (decoded, off) = read_operands(code.info(), &set[1..]);
            assert_eq!(decoded.as_slice(), *operands, "operands of {}", code);
            assert_eq!(off, expected.len() - 1, "width of {}", code);
        }
    }

    #[test]
    fn test_all_opcodes_roundtrip_operands() {
        for byte in 0..OP_TABLE.len() as u8 {
            let code = Opcode::from_u8(byte).unwrap();
            let operands: Vec<u64> = code
                .info()
                .widths
                .iter()
                .map(|width| match width {
                    1 => 0x7f,
                    2 => 0x1234,
                    4 => 0xdead_beef,
                    _ => 0x0123_4567_89ab_cdef,
                })
                .collect();

            let set = encode_op(code, &operands);
            assert_eq!(set.len(), code.width());

            let (decoded, off) = read_operands(code.info(), &set[1..]);
            assert_eq!(decoded.as_slice(), operands.as_slice());
            assert_eq!(off + 1, code.width());
        }
    }

    #[test]
    fn test_signed_immediates_wrap() {
        let set = encode_op(Opcode::Jmp, &[(-4i16) as u16 as u64]);
        let (operands, _) = read_operands(Opcode::Jmp.info(), &set[1..]);
        assert_eq!(operands[0] as u16 as i16, -4);

        let set = encode_op(Opcode::LoadI64, &[(-256i64) as u64]);
        let (operands, _) = read_operands(Opcode::LoadI64.info(), &set[1..]);
        assert_eq!(operands[0] as i64, -256);
    }

    #[test]
    fn test_disassembly() {
        let mut set = Instructions::new();
        set.push_op(Opcode::LoadI64, &[5]);
        set.push_op(Opcode::Call, &[2]);
        set.push_op(Opcode::Halt, &[]);

        let text = set.to_string();
        assert!(text.contains("0000: load.i64 5"));
        assert!(text.contains("0009: call 2"));
        assert!(text.contains("0012: halt"));
    }
}
