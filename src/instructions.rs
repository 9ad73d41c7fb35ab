//! The static catalog of 6809 operations and assembler directives.
//!
//! Built once behind `lazy_static` and never mutated; statements hold
//! `&'static Instruction` references into it. Two-byte opcodes (the `$10xx`
//! and `$11xx` rows) are stored as a single 16-bit integer whose mode size
//! counts both bytes.

use crate::values::Value;
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Per-addressing-mode opcodes and total emitted sizes. A `None` opcode means
/// the instruction does not support that mode. Sizes include the opcode and
/// operand bytes; indexed sizes cover the opcode and post-byte but not the
/// optional displacement, which the operand translation adds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Mode {
    pub inh: Option<u16>,
    pub inh_sz: usize,
    pub imm: Option<u16>,
    pub imm_sz: usize,
    pub dir: Option<u16>,
    pub dir_sz: usize,
    pub ind: Option<u16>,
    pub ind_sz: usize,
    pub ext: Option<u16>,
    pub ext_sz: usize,
    pub rel: Option<u16>,
    pub rel_sz: usize,
}

impl Mode {
    pub fn new() -> Mode {
        Mode::default()
    }

    pub fn inherent(mut self, op_code: u16, size: usize) -> Mode {
        self.inh = Some(op_code);
        self.inh_sz = size;
        self
    }

    pub fn immediate(mut self, op_code: u16, size: usize) -> Mode {
        self.imm = Some(op_code);
        self.imm_sz = size;
        self
    }

    pub fn direct(mut self, op_code: u16, size: usize) -> Mode {
        self.dir = Some(op_code);
        self.dir_sz = size;
        self
    }

    pub fn indexed(mut self, op_code: u16, size: usize) -> Mode {
        self.ind = Some(op_code);
        self.ind_sz = size;
        self
    }

    pub fn extended(mut self, op_code: u16, size: usize) -> Mode {
        self.ext = Some(op_code);
        self.ext_sz = size;
        self
    }

    pub fn relative(mut self, op_code: u16, size: usize) -> Mode {
        self.rel = Some(op_code);
        self.rel_sz = size;
        self
    }

    pub fn supports_inherent(&self) -> bool {
        self.inh.is_some()
    }

    pub fn supports_immediate(&self) -> bool {
        self.imm.is_some()
    }

    pub fn supports_direct(&self) -> bool {
        self.dir.is_some()
    }

    pub fn supports_indexed(&self) -> bool {
        self.ind.is_some()
    }

    pub fn supports_extended(&self) -> bool {
        self.ext.is_some()
    }

    pub fn supports_relative(&self) -> bool {
        self.rel.is_some()
    }
}

/// One operation the assembler understands: a mnemonic, the addressing modes
/// it supports, and the directive flags that route it through parsing and
/// translation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Instruction {
    pub mnemonic: &'static str,
    pub mode: Mode,
    pub is_pseudo: bool,
    pub is_pseudo_define: bool,
    pub is_string_define: bool,
    pub is_special: bool,
    pub is_short_branch: bool,
    pub is_long_branch: bool,
    pub is_origin: bool,
    pub is_end: bool,
    pub is_name: bool,
    pub is_include: bool,
    pub is_start_macro: bool,
    pub is_end_macro: bool,
    pub is_macro_call: bool,
}

impl Instruction {
    fn new(mnemonic: &'static str, mode: Mode) -> Instruction {
        Instruction {
            mnemonic,
            mode,
            ..Instruction::default()
        }
    }

    fn pseudo(mnemonic: &'static str) -> Instruction {
        Instruction {
            mnemonic,
            is_pseudo: true,
            ..Instruction::default()
        }
    }

    fn special(mnemonic: &'static str, mode: Mode) -> Instruction {
        Instruction {
            mnemonic,
            mode,
            is_special: true,
            ..Instruction::default()
        }
    }

    fn short_branch(mnemonic: &'static str, op_code: u16) -> Instruction {
        Instruction {
            mnemonic,
            mode: Mode::new().relative(op_code, 2),
            is_short_branch: true,
            ..Instruction::default()
        }
    }

    fn long_branch(mnemonic: &'static str, op_code: u16, size: usize) -> Instruction {
        Instruction {
            mnemonic,
            mode: Mode::new().relative(op_code, size),
            is_long_branch: true,
            ..Instruction::default()
        }
    }

    pub fn is_branch(&self) -> bool {
        self.is_short_branch || self.is_long_branch
    }
}

/// The assembled form of a single statement: the opcode, post-byte and
/// operand bytes, the address once assigned, and the size bookkeeping the
/// PCR fixpoint needs. `post_byte_choices` carries the 8-bit and 16-bit PCR
/// post-byte bits while the displacement width is still undecided.
#[derive(Clone, Debug)]
pub struct CodePackage {
    pub op_code: Value,
    pub post_byte: Value,
    pub additional: Value,
    pub address: Value,
    pub size: usize,
    pub max_size: usize,
    pub additional_needs_resolution: bool,
    pub post_byte_choices: Option<(u8, u8)>,
}

impl Default for CodePackage {
    fn default() -> CodePackage {
        CodePackage {
            op_code: Value::None,
            post_byte: Value::None,
            additional: Value::None,
            address: Value::None,
            size: 0,
            max_size: 0,
            additional_needs_resolution: false,
            post_byte_choices: None,
        }
    }
}

impl CodePackage {
    /// Every byte the statement emits, in order.
    pub fn bytes(&self) -> Vec<u8> {
        let mut bytes = self.op_code.bytes();
        bytes.extend(self.post_byte.bytes());
        bytes.extend(self.additional.bytes());
        bytes
    }
}

fn instruction_set() -> Vec<Instruction> {
    vec![
        Instruction::new("ABX", Mode::new().inherent(0x3A, 1)),
        Instruction::new("ADCA", Mode::new().immediate(0x89, 2).direct(0x99, 2).indexed(0xA9, 2).extended(0xB9, 3)),
        Instruction::new("ADCB", Mode::new().immediate(0xC9, 2).direct(0xD9, 2).indexed(0xE9, 2).extended(0xF9, 3)),
        Instruction::new("ADDA", Mode::new().immediate(0x8B, 2).direct(0x9B, 2).indexed(0xAB, 2).extended(0xBB, 3)),
        Instruction::new("ADDB", Mode::new().immediate(0xCB, 2).direct(0xDB, 2).indexed(0xEB, 2).extended(0xFB, 3)),
        Instruction::new("ADDD", Mode::new().immediate(0xC3, 3).direct(0xD3, 2).indexed(0xE3, 2).extended(0xF3, 3)),
        Instruction::new("ANDA", Mode::new().immediate(0x84, 2).direct(0x94, 2).indexed(0xA4, 2).extended(0xB4, 3)),
        Instruction::new("ANDB", Mode::new().immediate(0xC4, 2).direct(0xD4, 2).indexed(0xE4, 2).extended(0xF4, 3)),
        Instruction::new("ANDCC", Mode::new().immediate(0x1C, 2)),
        Instruction::new("ASLA", Mode::new().inherent(0x48, 1)),
        Instruction::new("ASLB", Mode::new().inherent(0x58, 1)),
        Instruction::new("ASL", Mode::new().direct(0x08, 2).indexed(0x68, 2).extended(0x78, 3)),
        Instruction::new("ASRA", Mode::new().inherent(0x47, 1)),
        Instruction::new("ASRB", Mode::new().inherent(0x57, 1)),
        Instruction::new("ASR", Mode::new().direct(0x07, 2).indexed(0x67, 2).extended(0x77, 3)),
        Instruction::new("BITA", Mode::new().immediate(0x85, 2).direct(0x95, 2).indexed(0xA5, 2).extended(0xB5, 3)),
        Instruction::new("BITB", Mode::new().immediate(0xC5, 2).direct(0xD5, 2).indexed(0xE5, 2).extended(0xF5, 3)),
        Instruction::new("CLRA", Mode::new().inherent(0x4F, 1)),
        Instruction::new("CLRB", Mode::new().inherent(0x5F, 1)),
        Instruction::new("CLR", Mode::new().direct(0x0F, 2).indexed(0x6F, 2).extended(0x7F, 3)),
        Instruction::new("CMPA", Mode::new().immediate(0x81, 2).direct(0x91, 2).indexed(0xA1, 2).extended(0xB1, 3)),
        Instruction::new("CMPB", Mode::new().immediate(0xC1, 2).direct(0xD1, 2).indexed(0xE1, 2).extended(0xF1, 3)),
        Instruction::new("CMPX", Mode::new().immediate(0x8C, 3).direct(0x9C, 2).indexed(0xAC, 2).extended(0xBC, 3)),
        Instruction::new("COMA", Mode::new().inherent(0x43, 1)),
        Instruction::new("COMB", Mode::new().inherent(0x53, 1)),
        Instruction::new("COM", Mode::new().direct(0x03, 2).indexed(0x63, 2).extended(0x73, 3)),
        Instruction::new("CWAI", Mode::new().immediate(0x3C, 2)),
        Instruction::new("DAA", Mode::new().inherent(0x19, 1)),
        Instruction::new("DECA", Mode::new().inherent(0x4A, 1)),
        Instruction::new("DECB", Mode::new().inherent(0x5A, 1)),
        Instruction::new("DEC", Mode::new().direct(0x0A, 2).indexed(0x6A, 2).extended(0x7A, 3)),
        Instruction::new("EORA", Mode::new().immediate(0x88, 2).direct(0x98, 2).indexed(0xA8, 2).extended(0xB8, 3)),
        Instruction::new("EORB", Mode::new().immediate(0xC8, 2).direct(0xD8, 2).indexed(0xE8, 2).extended(0xF8, 3)),
        Instruction::special("EXG", Mode::new().immediate(0x1E, 2)),
        Instruction::new("INCA", Mode::new().inherent(0x4C, 1)),
        Instruction::new("INCB", Mode::new().inherent(0x5C, 1)),
        Instruction::new("INC", Mode::new().direct(0x0C, 2).indexed(0x6C, 2).extended(0x7C, 3)),
        Instruction::new("JMP", Mode::new().direct(0x0E, 2).indexed(0x6E, 2).extended(0x7E, 3)),
        Instruction::new("JSR", Mode::new().direct(0x9D, 2).indexed(0xAD, 2).extended(0xBD, 3)),
        Instruction::new("LDA", Mode::new().immediate(0x86, 2).direct(0x96, 2).indexed(0xA6, 2).extended(0xB6, 3)),
        Instruction::new("LDB", Mode::new().immediate(0xC6, 2).direct(0xD6, 2).indexed(0xE6, 2).extended(0xF6, 3)),
        Instruction::new("LDD", Mode::new().immediate(0xCC, 3).direct(0xDC, 2).indexed(0xEC, 2).extended(0xFC, 3)),
        Instruction::new("LDU", Mode::new().immediate(0xCE, 3).direct(0xDE, 2).indexed(0xEE, 2).extended(0xFE, 3)),
        Instruction::new("LDX", Mode::new().immediate(0x8E, 3).direct(0x9E, 2).indexed(0xAE, 2).extended(0xBE, 3)),
        Instruction::new("LEAS", Mode::new().indexed(0x32, 2)),
        Instruction::new("LEAU", Mode::new().indexed(0x33, 2)),
        Instruction::new("LEAX", Mode::new().indexed(0x30, 2)),
        Instruction::new("LEAY", Mode::new().indexed(0x31, 2)),
        Instruction::new("LSLA", Mode::new().inherent(0x48, 1)),
        Instruction::new("LSLB", Mode::new().inherent(0x58, 1)),
        Instruction::new("LSL", Mode::new().direct(0x08, 2).indexed(0x68, 2).extended(0x78, 3)),
        Instruction::new("LSRA", Mode::new().inherent(0x44, 1)),
        Instruction::new("LSRB", Mode::new().inherent(0x54, 1)),
        Instruction::new("LSR", Mode::new().direct(0x04, 2).indexed(0x64, 2).extended(0x74, 3)),
        Instruction::new("MUL", Mode::new().inherent(0x3D, 1)),
        Instruction::new("NEGA", Mode::new().inherent(0x40, 1)),
        Instruction::new("NEGB", Mode::new().inherent(0x50, 1)),
        Instruction::new("NEG", Mode::new().direct(0x00, 2).indexed(0x60, 2).extended(0x70, 3)),
        Instruction::new("NOP", Mode::new().inherent(0x12, 1)),
        Instruction::new("ORA", Mode::new().immediate(0x8A, 2).direct(0x9A, 2).indexed(0xAA, 2).extended(0xBA, 3)),
        Instruction::new("ORB", Mode::new().immediate(0xCA, 2).direct(0xDA, 2).indexed(0xEA, 2).extended(0xFA, 3)),
        Instruction::new("ORCC", Mode::new().immediate(0x1A, 2)),
        Instruction::special("PSHS", Mode::new().immediate(0x34, 2)),
        Instruction::special("PSHU", Mode::new().immediate(0x36, 2)),
        Instruction::special("PULS", Mode::new().immediate(0x35, 2)),
        Instruction::special("PULU", Mode::new().immediate(0x37, 2)),
        Instruction::new("ROLA", Mode::new().inherent(0x49, 1)),
        Instruction::new("ROLB", Mode::new().inherent(0x59, 1)),
        Instruction::new("ROL", Mode::new().direct(0x09, 2).indexed(0x69, 2).extended(0x79, 3)),
        Instruction::new("RORA", Mode::new().inherent(0x46, 1)),
        Instruction::new("RORB", Mode::new().inherent(0x56, 1)),
        Instruction::new("ROR", Mode::new().direct(0x06, 2).indexed(0x66, 2).extended(0x76, 3)),
        Instruction::new("RTI", Mode::new().inherent(0x3B, 1)),
        Instruction::new("RTS", Mode::new().inherent(0x39, 1)),
        Instruction::new("SBCA", Mode::new().immediate(0x82, 2).direct(0x92, 2).indexed(0xA2, 2).extended(0xB2, 3)),
        Instruction::new("SBCB", Mode::new().immediate(0xC2, 2).direct(0xD2, 2).indexed(0xE2, 2).extended(0xF2, 3)),
        Instruction::new("SEX", Mode::new().inherent(0x1D, 1)),
        Instruction::new("STA", Mode::new().direct(0x97, 2).indexed(0xA7, 2).extended(0xB7, 3)),
        Instruction::new("STB", Mode::new().direct(0xD7, 2).indexed(0xE7, 2).extended(0xF7, 3)),
        Instruction::new("STD", Mode::new().direct(0xDD, 2).indexed(0xED, 2).extended(0xFD, 3)),
        Instruction::new("STU", Mode::new().direct(0xDF, 2).indexed(0xEF, 2).extended(0xFF, 3)),
        Instruction::new("STX", Mode::new().direct(0x9F, 2).indexed(0xAF, 2).extended(0xBF, 3)),
        Instruction::new("SUBA", Mode::new().immediate(0x80, 2).direct(0x90, 2).indexed(0xA0, 2).extended(0xB0, 3)),
        Instruction::new("SUBB", Mode::new().immediate(0xC0, 2).direct(0xD0, 2).indexed(0xE0, 2).extended(0xF0, 3)),
        Instruction::new("SUBD", Mode::new().immediate(0x83, 3).direct(0x93, 2).indexed(0xA3, 2).extended(0xB3, 3)),
        Instruction::new("SWI", Mode::new().inherent(0x3F, 1)),
        Instruction::new("SYNC", Mode::new().inherent(0x13, 1)),
        Instruction::special("TFR", Mode::new().immediate(0x1F, 2)),
        Instruction::new("TSTA", Mode::new().inherent(0x4D, 1)),
        Instruction::new("TSTB", Mode::new().inherent(0x5D, 1)),
        Instruction::new("TST", Mode::new().direct(0x0D, 2).indexed(0x6D, 2).extended(0x7D, 3)),
        // Two-byte opcodes
        Instruction::new("CMPD", Mode::new().immediate(0x1083, 4).direct(0x1093, 3).indexed(0x10A3, 3).extended(0x10B3, 4)),
        Instruction::new("CMPS", Mode::new().immediate(0x118C, 4).direct(0x119C, 3).indexed(0x11AC, 3).extended(0x11BC, 4)),
        Instruction::new("CMPU", Mode::new().immediate(0x1183, 4).direct(0x1193, 3).indexed(0x11A3, 3).extended(0x11B3, 4)),
        Instruction::new("CMPY", Mode::new().immediate(0x108C, 4).direct(0x109C, 3).indexed(0x10AC, 3).extended(0x10BC, 4)),
        Instruction::new("LDS", Mode::new().immediate(0x10CE, 4).direct(0x10DE, 3).indexed(0x10EE, 3).extended(0x10FE, 4)),
        Instruction::new("LDY", Mode::new().immediate(0x108E, 4).direct(0x109E, 3).indexed(0x10AE, 3).extended(0x10BE, 4)),
        Instruction::new("STS", Mode::new().direct(0x10DF, 3).indexed(0x10EF, 3).extended(0x10FF, 4)),
        Instruction::new("STY", Mode::new().direct(0x109F, 3).indexed(0x10AF, 3).extended(0x10BF, 4)),
        Instruction::new("SWI2", Mode::new().inherent(0x103F, 2)),
        Instruction::new("SWI3", Mode::new().inherent(0x113F, 2)),
        // Short branches
        Instruction::short_branch("BCC", 0x24),
        Instruction::short_branch("BCS", 0x25),
        Instruction::short_branch("BEQ", 0x27),
        Instruction::short_branch("BGE", 0x2C),
        Instruction::short_branch("BGT", 0x2E),
        Instruction::short_branch("BHI", 0x22),
        Instruction::short_branch("BHS", 0x24),
        Instruction::short_branch("BLE", 0x2F),
        Instruction::short_branch("BLO", 0x25),
        Instruction::short_branch("BLS", 0x23),
        Instruction::short_branch("BLT", 0x2D),
        Instruction::short_branch("BMI", 0x2B),
        Instruction::short_branch("BNE", 0x26),
        Instruction::short_branch("BPL", 0x2A),
        Instruction::short_branch("BRA", 0x20),
        Instruction::short_branch("BRN", 0x21),
        Instruction::short_branch("BSR", 0x8D),
        Instruction::short_branch("BVC", 0x28),
        Instruction::short_branch("BVS", 0x29),
        // Long branches
        Instruction::long_branch("LBCC", 0x1024, 4),
        Instruction::long_branch("LBCS", 0x1025, 4),
        Instruction::long_branch("LBEQ", 0x1027, 4),
        Instruction::long_branch("LBGE", 0x102C, 4),
        Instruction::long_branch("LBGT", 0x102E, 4),
        Instruction::long_branch("LBHI", 0x1022, 4),
        Instruction::long_branch("LBHS", 0x1024, 4),
        Instruction::long_branch("LBLE", 0x102F, 4),
        Instruction::long_branch("LBLO", 0x1025, 4),
        Instruction::long_branch("LBLS", 0x1023, 4),
        Instruction::long_branch("LBLT", 0x102D, 4),
        Instruction::long_branch("LBMI", 0x102B, 4),
        Instruction::long_branch("LBNE", 0x1026, 4),
        Instruction::long_branch("LBPL", 0x102A, 4),
        Instruction::long_branch("LBRA", 0x16, 3),
        Instruction::long_branch("LBRN", 0x1021, 4),
        Instruction::long_branch("LBSR", 0x17, 3),
        Instruction::long_branch("LBVC", 0x1028, 4),
        Instruction::long_branch("LBVS", 0x1029, 4),
        // Assembler directives
        Instruction {
            is_end: true,
            ..Instruction::pseudo("END")
        },
        Instruction {
            is_origin: true,
            ..Instruction::pseudo("ORG")
        },
        Instruction {
            is_pseudo_define: true,
            ..Instruction::pseudo("EQU")
        },
        Instruction {
            is_pseudo_define: true,
            ..Instruction::pseudo("SET")
        },
        Instruction::pseudo("RMB"),
        Instruction::pseudo("FCB"),
        Instruction::pseudo("FDB"),
        Instruction {
            is_string_define: true,
            ..Instruction::pseudo("FCC")
        },
        Instruction::pseudo("SETDP"),
        Instruction {
            is_include: true,
            ..Instruction::pseudo("INCLUDE")
        },
        Instruction {
            is_name: true,
            ..Instruction::pseudo("NAM")
        },
        Instruction {
            is_start_macro: true,
            ..Instruction::pseudo("MACRO")
        },
        Instruction {
            is_end_macro: true,
            ..Instruction::pseudo("ENDM")
        },
    ]
}

lazy_static! {
    static ref INSTRUCTIONS: Vec<Instruction> = instruction_set();
    static ref MNEMONIC_INDEX: HashMap<&'static str, usize> = {
        let mut index = HashMap::new();
        for (position, instruction) in INSTRUCTIONS.iter().enumerate() {
            index.insert(instruction.mnemonic, position);
        }
        index
    };
    /// The synthetic instruction attached to calls of user-defined macros.
    pub static ref MACRO_CALL_INSTRUCTION: Instruction = Instruction {
        is_macro_call: true,
        ..Instruction::default()
    };
}

/// Looks up an instruction by case-folded mnemonic.
pub fn instruction_named(mnemonic: &str) -> Option<&'static Instruction> {
    let folded = mnemonic.to_uppercase();
    MNEMONIC_INDEX
        .get(folded.as_str())
        .map(|&position| &INSTRUCTIONS[position])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup_is_case_folded() {
        let instruction = instruction_named("lda").unwrap();
        assert_eq!("LDA", instruction.mnemonic);
        assert_eq!(Some(0x86), instruction.mode.imm);
    }

    #[test]
    fn two_byte_opcodes_count_both_bytes() {
        let instruction = instruction_named("STY").unwrap();
        assert_eq!(Some(0x10AF), instruction.mode.ind);
        assert_eq!(3, instruction.mode.ind_sz);
    }

    #[test]
    fn branch_flags_are_distinct() {
        assert!(instruction_named("BEQ").unwrap().is_short_branch);
        assert!(instruction_named("LBEQ").unwrap().is_long_branch);
        assert!(!instruction_named("LBEQ").unwrap().is_short_branch);
    }

    #[test]
    fn set_binds_like_equ() {
        assert!(instruction_named("SET").unwrap().is_pseudo_define);
        assert!(instruction_named("EQU").unwrap().is_pseudo_define);
    }

    #[test]
    fn swi_occupies_one_byte() {
        let instruction = instruction_named("SWI").unwrap();
        assert_eq!(1, instruction.mode.inh_sz);
    }
}
