//! Operand classification and translation.
//!
//! The operand field of a statement is classified into one of the variants
//! below before symbols exist, so several variants carry values that are only
//! pinned down later: `Unknown` becomes `Direct` or `Extended` once the
//! referenced symbol's width is known, and a `,PCR` offset against a label
//! cannot pick its displacement width until the surrounding statements have
//! been sized.

use crate::error::{OperandTypeError, ValueTypeError};
use crate::instructions::{CodePackage, Instruction};
use crate::values::{
    AddressValue, ExpressionValue, NumericValue, StringValue, SymbolTable, Value,
};
use num_derive::ToPrimitive;
use num_traits::ToPrimitive;
use util::EnumFromStr;
use util_derive::EnumFromStr;

/// Index registers usable on the right side of an indexed operand. The
/// discriminant is the post-byte register field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ToPrimitive, EnumFromStr)]
pub enum IndexRegister {
    X = 0,
    Y = 1,
    U = 2,
    S = 3,
}

/// Registers accepted by PSHS/PULS/PSHU/PULU. The discriminant is the
/// register's bit in the stack post-byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ToPrimitive, EnumFromStr)]
pub enum StackRegister {
    CC = 0x01,
    A = 0x02,
    B = 0x04,
    D = 0x06,
    DP = 0x08,
    X = 0x10,
    Y = 0x20,
    U = 0x40,
    PC = 0x80,
}

/// Registers accepted by EXG/TFR. The discriminant is the register's nibble
/// in the transfer post-byte; values below 8 are the 16-bit group.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ToPrimitive, EnumFromStr)]
pub enum InterRegister {
    D = 0x0,
    X = 0x1,
    Y = 0x2,
    U = 0x3,
    S = 0x4,
    PC = 0x5,
    A = 0x8,
    B = 0x9,
    CC = 0xA,
    DP = 0xB,
}

fn enum_to_u8<T: ToPrimitive + Copy>(val: T) -> u8 {
    val.to_u8().unwrap()
}

/// Accumulator offsets in indexed addressing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Accumulator {
    A,
    B,
    D,
}

/// The left side of an indexed operand.
#[derive(Clone, Debug)]
pub enum IndexedOffset {
    None,
    Accumulator(Accumulator),
    Value(Value),
}

/// The body of an `[...]` operand: either an inner indexed pair or a bare
/// address.
#[derive(Clone, Debug)]
pub enum IndirectBody {
    Indexed { left: IndexedOffset, right: String },
    Address(Value),
}

#[derive(Clone, Debug)]
pub enum Operand {
    Inherent,
    Immediate {
        operand_string: String,
        value: Value,
    },
    Direct {
        operand_string: String,
        value: Value,
    },
    Extended {
        operand_string: String,
        value: Value,
    },
    Indexed {
        operand_string: String,
        left: IndexedOffset,
        right: String,
    },
    ExtendedIndirect {
        operand_string: String,
        body: IndirectBody,
    },
    Relative {
        operand_string: String,
        value: Value,
    },
    Pseudo {
        operand_string: String,
        value: Value,
    },
    Special {
        operand_string: String,
    },
    Unknown {
        operand_string: String,
        value: Value,
    },
}

const SPECIAL_MNEMONICS: [&str; 6] = ["PSHS", "PULS", "PSHU", "PULU", "EXG", "TFR"];

impl Operand {
    /// Classifies the operand field of a statement. The rules are ordered:
    /// empty, relative, pseudo, special, extended indirect, immediate,
    /// indexed, forced direct, forced extended, and finally unknown.
    pub fn parse(text: &str, instruction: &Instruction) -> Result<Operand, OperandTypeError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Operand::Inherent);
        }
        // Macro argument and local-label markers survive classification
        // verbatim; template statements are excised into the macro table and
        // re-parsed after substitution, so they are never translated.
        if text.contains('\\') {
            return Ok(Operand::Unknown {
                operand_string: text.to_string(),
                value: Value::None,
            });
        }
        if instruction.is_branch() {
            let value = Value::parse(text, Some(instruction))?;
            return Ok(Operand::Relative {
                operand_string: text.to_string(),
                value,
            });
        }
        if instruction.is_pseudo {
            // An INCLUDE operand is a filename, carried verbatim.
            let value = if instruction.is_include {
                Value::None
            } else {
                Value::parse(text, Some(instruction))?
            };
            return Ok(Operand::Pseudo {
                operand_string: text.to_string(),
                value,
            });
        }
        if SPECIAL_MNEMONICS.contains(&instruction.mnemonic) {
            return Ok(Operand::Special {
                operand_string: text.to_string(),
            });
        }
        if text.starts_with('[') {
            return Self::parse_extended_indirect(text);
        }
        if let Some(body) = text.strip_prefix('#') {
            let value = Value::parse(body, Some(instruction))?;
            return Ok(Operand::Immediate {
                operand_string: text.to_string(),
                value,
            });
        }
        if text.contains(',') {
            if let Some((left, right)) = Self::parse_indexed_body(text) {
                return Ok(Operand::Indexed {
                    operand_string: text.to_string(),
                    left,
                    right,
                });
            }
        }
        if let Some(body) = text.strip_prefix('<') {
            let value = Value::parse(body, Some(instruction))?;
            if value.is_numeric() && value.byte_len() > 1 {
                return Err(OperandTypeError(format!(
                    "[{}] is not a direct value",
                    text
                )));
            }
            return Ok(Operand::Direct {
                operand_string: text.to_string(),
                value,
            });
        }
        if let Some(body) = text.strip_prefix('>') {
            let value = Value::parse(body, Some(instruction))?;
            return Ok(Operand::Extended {
                operand_string: text.to_string(),
                value,
            });
        }
        match Value::parse(text, Some(instruction)) {
            Ok(value) => Ok(Operand::Unknown {
                operand_string: text.to_string(),
                value,
            }),
            Err(_) => Err(OperandTypeError(format!(
                "[{}] unknown operand type",
                text
            ))),
        }
    }

    fn parse_extended_indirect(text: &str) -> Result<Operand, OperandTypeError> {
        let body = text
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| {
                OperandTypeError(format!("[{}] is not an extended indexed value", text))
            })?;
        if body.contains(',') {
            let (left, right) = Self::parse_indexed_body(body).ok_or_else(|| {
                OperandTypeError(format!("[{}] is not an extended indexed value", text))
            })?;
            return Ok(Operand::ExtendedIndirect {
                operand_string: text.to_string(),
                body: IndirectBody::Indexed { left, right },
            });
        }
        let value = Value::parse(body, None).map_err(|_| {
            OperandTypeError(format!("[{}] is not an extended indexed value", text))
        })?;
        Ok(Operand::ExtendedIndirect {
            operand_string: text.to_string(),
            body: IndirectBody::Address(value),
        })
    }

    fn parse_indexed_body(body: &str) -> Option<(IndexedOffset, String)> {
        let parts: Vec<&str> = body.split(',').collect();
        if parts.len() != 2 {
            return None;
        }
        let left = match parts[0] {
            "" => IndexedOffset::None,
            "A" => IndexedOffset::Accumulator(Accumulator::A),
            "B" => IndexedOffset::Accumulator(Accumulator::B),
            "D" => IndexedOffset::Accumulator(Accumulator::D),
            text => IndexedOffset::Value(Value::parse(text, None).ok()?),
        };
        Some((left, parts[1].to_string()))
    }

    /// The text of the operand field as written in the source.
    pub fn operand_string(&self) -> &str {
        match self {
            Operand::Inherent => "",
            Operand::Immediate { operand_string, .. }
            | Operand::Direct { operand_string, .. }
            | Operand::Extended { operand_string, .. }
            | Operand::Indexed { operand_string, .. }
            | Operand::ExtendedIndirect { operand_string, .. }
            | Operand::Relative { operand_string, .. }
            | Operand::Pseudo { operand_string, .. }
            | Operand::Special { operand_string }
            | Operand::Unknown { operand_string, .. } => operand_string,
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, Operand::Relative { .. })
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, Operand::Indexed { .. })
    }

    /// The operand's main value, where the variant has one.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Operand::Immediate { value, .. }
            | Operand::Direct { value, .. }
            | Operand::Extended { value, .. }
            | Operand::Relative { value, .. }
            | Operand::Pseudo { value, .. }
            | Operand::Unknown { value, .. } => Some(value),
            Operand::ExtendedIndirect {
                body: IndirectBody::Address(value),
                ..
            } => Some(value),
            _ => None,
        }
    }

    /// The offset value of a `,PCR` operand, if this is one.
    pub fn pcr_offset(&self) -> Option<&Value> {
        let (left, right) = match self {
            Operand::Indexed { left, right, .. } => (left, right),
            Operand::ExtendedIndirect {
                body: IndirectBody::Indexed { left, right },
                ..
            } => (left, right),
            _ => return None,
        };
        if right != "PCR" {
            return None;
        }
        match left {
            IndexedOffset::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The statement index a symbolic PCR offset points at, used to size the
    /// displacement before addresses exist.
    pub fn pcr_target_index(&self) -> Option<usize> {
        match self.pcr_offset()? {
            Value::Address(address) => Some(address.index()),
            Value::Expression(expression) => expression.address_index(),
            _ => None,
        }
    }

    /// The address-bearing expression of an indexed offset, if any.
    pub fn indexed_expression(&self) -> Option<&ExpressionValue> {
        let left = match self {
            Operand::Indexed { left, .. } => left,
            Operand::ExtendedIndirect {
                body: IndirectBody::Indexed { left, .. },
                ..
            } => left,
            _ => return None,
        };
        match left {
            IndexedOffset::Value(Value::Expression(expression))
                if expression.address_index().is_some() =>
            {
                Some(expression)
            }
            _ => None,
        }
    }

    /// Resolves symbols against the table. `Unknown` operands reclassify to
    /// direct or extended on the resolved value's byte width; indexed offsets
    /// keep address-bearing expressions unfolded so the PCR sizing pass can
    /// reach the target statement index.
    pub fn resolve_symbols(self, symbol_table: &SymbolTable) -> Result<Operand, OperandTypeError> {
        Ok(match self {
            Operand::Unknown {
                operand_string,
                value,
            } => {
                let resolved = value.resolve(symbol_table)?;
                let extended = match &resolved {
                    Value::Address(_) => true,
                    other => other.byte_len() > 1,
                };
                if extended {
                    Operand::Extended {
                        operand_string,
                        value: resolved,
                    }
                } else {
                    Operand::Direct {
                        operand_string,
                        value: resolved,
                    }
                }
            }
            Operand::Immediate {
                operand_string,
                value,
            } => Operand::Immediate {
                operand_string,
                value: value.resolve(symbol_table)?,
            },
            Operand::Direct {
                operand_string,
                value,
            } => Operand::Direct {
                operand_string,
                value: value.resolve(symbol_table)?,
            },
            Operand::Extended {
                operand_string,
                value,
            } => Operand::Extended {
                operand_string,
                value: value.resolve(symbol_table)?,
            },
            Operand::Relative {
                operand_string,
                value,
            } => Operand::Relative {
                operand_string,
                value: value.resolve(symbol_table)?,
            },
            Operand::Indexed {
                operand_string,
                left,
                right,
            } => Operand::Indexed {
                operand_string,
                left: Self::resolve_offset(left, symbol_table)?,
                right,
            },
            Operand::ExtendedIndirect {
                operand_string,
                body,
            } => {
                let body = match body {
                    IndirectBody::Indexed { left, right } => IndirectBody::Indexed {
                        left: Self::resolve_offset(left, symbol_table)?,
                        right,
                    },
                    IndirectBody::Address(value) => {
                        IndirectBody::Address(value.resolve(symbol_table)?)
                    }
                };
                Operand::ExtendedIndirect {
                    operand_string,
                    body,
                }
            }
            other => other,
        })
    }

    fn resolve_offset(
        offset: IndexedOffset,
        symbol_table: &SymbolTable,
    ) -> Result<IndexedOffset, ValueTypeError> {
        Ok(match offset {
            IndexedOffset::Value(Value::Symbol(symbol)) => {
                IndexedOffset::Value(Value::Symbol(symbol).resolve(symbol_table)?)
            }
            IndexedOffset::Value(Value::Expression(expression)) => {
                let resolved = expression.resolve(symbol_table)?;
                if resolved.left.is_address() || resolved.right.is_address() {
                    IndexedOffset::Value(Value::Expression(Box::new(resolved)))
                } else {
                    IndexedOffset::Value(resolved.collapse()?)
                }
            }
            other => other,
        })
    }

    /// Translates the operand into a code package for the given instruction.
    pub fn translate(&self, instruction: &Instruction) -> Result<CodePackage, OperandTypeError> {
        match self {
            Operand::Inherent => Self::translate_inherent(instruction),
            Operand::Immediate { value, .. } => Self::translate_immediate(instruction, value),
            Operand::Direct { value, .. } => Self::translate_direct(instruction, value),
            Operand::Extended { value, .. } => Self::translate_extended(instruction, value),
            Operand::Relative { value, .. } => Self::translate_relative(instruction, value),
            Operand::Pseudo { value, .. } => Self::translate_pseudo(instruction, value),
            Operand::Special { operand_string } => {
                Self::translate_special(instruction, operand_string)
            }
            Operand::Indexed {
                operand_string,
                left,
                right,
            } => Self::translate_indexed(instruction, left, right, false, operand_string),
            Operand::ExtendedIndirect {
                operand_string,
                body,
            } => match body {
                IndirectBody::Indexed { left, right } => {
                    Self::translate_indexed(instruction, left, right, true, operand_string)
                }
                IndirectBody::Address(value) => {
                    Self::translate_indirect_address(instruction, value)
                }
            },
            Operand::Unknown { .. } => Ok(CodePackage::default()),
        }
    }

    fn translate_inherent(instruction: &Instruction) -> Result<CodePackage, OperandTypeError> {
        if instruction.is_pseudo {
            return Ok(CodePackage::default());
        }
        let op_code = instruction.mode.inh.ok_or_else(|| {
            OperandTypeError(format!(
                "Instruction [{}] requires an operand",
                instruction.mnemonic
            ))
        })?;
        let mut package = CodePackage::default();
        package.op_code = Value::Numeric(NumericValue::new(op_code));
        package.size = instruction.mode.inh_sz;
        package.max_size = package.size;
        Ok(package)
    }

    fn op_code_bytes(op_code: u16) -> usize {
        if op_code > 0xFF {
            2
        } else {
            1
        }
    }

    /// Attaches the operand bytes at the width the mode demands, or defers
    /// them to fixup when the target address is not yet known.
    fn attach_additional(
        package: &mut CodePackage,
        value: &Value,
        width: usize,
    ) -> Result<(), OperandTypeError> {
        match value {
            Value::Numeric(numeric) => {
                package.additional =
                    Value::Numeric(NumericValue::with_size_hint(numeric.int(), width));
            }
            Value::Address(address) => {
                package.additional =
                    Value::Address(AddressValue::with_size_hint(address.index(), width));
                package.additional_needs_resolution = true;
            }
            Value::Symbol(symbol) => {
                return Err(OperandTypeError(format!(
                    "[{}] unresolved symbol",
                    symbol.name()
                )));
            }
            other => {
                return Err(OperandTypeError(format!(
                    "[{}] is an invalid value",
                    other.hex(0)
                )));
            }
        }
        Ok(())
    }

    fn translate_immediate(
        instruction: &Instruction,
        value: &Value,
    ) -> Result<CodePackage, OperandTypeError> {
        let op_code = instruction.mode.imm.ok_or_else(|| {
            OperandTypeError(format!(
                "Instruction [{}] does not support immediate addressing",
                instruction.mnemonic
            ))
        })?;
        let mut package = CodePackage::default();
        package.op_code = Value::Numeric(NumericValue::new(op_code));
        package.size = instruction.mode.imm_sz;
        package.max_size = package.size;
        let width = (instruction.mode.imm_sz - Self::op_code_bytes(op_code)) * 2;
        Self::attach_additional(&mut package, value, width)?;
        Ok(package)
    }

    fn translate_direct(
        instruction: &Instruction,
        value: &Value,
    ) -> Result<CodePackage, OperandTypeError> {
        let op_code = instruction.mode.dir.ok_or_else(|| {
            OperandTypeError(format!(
                "Instruction [{}] does not support direct addressing",
                instruction.mnemonic
            ))
        })?;
        let mut package = CodePackage::default();
        package.op_code = Value::Numeric(NumericValue::new(op_code));
        package.size = instruction.mode.dir_sz;
        package.max_size = package.size;
        let width = (instruction.mode.dir_sz - Self::op_code_bytes(op_code)) * 2;
        Self::attach_additional(&mut package, value, width)?;
        Ok(package)
    }

    fn translate_extended(
        instruction: &Instruction,
        value: &Value,
    ) -> Result<CodePackage, OperandTypeError> {
        let op_code = instruction.mode.ext.ok_or_else(|| {
            OperandTypeError(format!(
                "Instruction [{}] does not support extended addressing",
                instruction.mnemonic
            ))
        })?;
        let mut package = CodePackage::default();
        package.op_code = Value::Numeric(NumericValue::new(op_code));
        package.size = instruction.mode.ext_sz;
        package.max_size = package.size;
        let width = (instruction.mode.ext_sz - Self::op_code_bytes(op_code)) * 2;
        Self::attach_additional(&mut package, value, width)?;
        Ok(package)
    }

    fn translate_relative(
        instruction: &Instruction,
        value: &Value,
    ) -> Result<CodePackage, OperandTypeError> {
        let op_code = instruction.mode.rel.ok_or_else(|| {
            OperandTypeError(format!(
                "[{}] is not a branch instruction",
                instruction.mnemonic
            ))
        })?;
        let mut package = CodePackage::default();
        package.op_code = Value::Numeric(NumericValue::new(op_code));
        package.size = instruction.mode.rel_sz;
        package.max_size = package.size;
        let width = (instruction.mode.rel_sz - Self::op_code_bytes(op_code)) * 2;
        match value {
            // Displacements against a label are fixed once addresses exist.
            Value::Address(address) => {
                package.additional =
                    Value::Address(AddressValue::with_size_hint(address.index(), width));
            }
            Value::Numeric(numeric) => {
                package.additional =
                    Value::Numeric(NumericValue::with_size_hint(numeric.int(), width));
            }
            other => {
                return Err(OperandTypeError(format!(
                    "[{}] is an invalid value",
                    other.hex(0)
                )))
            }
        }
        Ok(package)
    }

    fn translate_pseudo(
        instruction: &Instruction,
        value: &Value,
    ) -> Result<CodePackage, OperandTypeError> {
        let mut package = CodePackage::default();
        match instruction.mnemonic {
            "FCB" => {
                let numeric = Self::expect_numeric(value, instruction)?;
                package.additional =
                    Value::Numeric(NumericValue::with_size_hint(numeric.int(), 2));
                package.size = 1;
            }
            "FDB" => {
                let numeric = Self::expect_numeric(value, instruction)?;
                package.additional = Value::Numeric(NumericValue::with_size_hint(numeric.int(), 4));
                package.size = 2;
            }
            "FCC" => {
                let string = match value {
                    Value::String(string) => string.clone(),
                    _ => {
                        return Err(OperandTypeError(
                            "[FCC] requires a delimited string".to_string(),
                        ))
                    }
                };
                package.size = string.hex_len() / 2;
                package.additional = Value::String(string);
            }
            "RMB" => {
                let numeric = Self::expect_numeric(value, instruction)?;
                let count = numeric.int() as usize;
                package.additional = Value::String(StringValue::zeroes(count));
                package.size = count;
            }
            "ORG" => {
                let numeric = Self::expect_numeric(value, instruction)?;
                package.address = Value::Numeric(*numeric);
            }
            _ => {}
        }
        package.max_size = package.size;
        Ok(package)
    }

    fn expect_numeric<'a>(
        value: &'a Value,
        instruction: &Instruction,
    ) -> Result<&'a NumericValue, OperandTypeError> {
        value.numeric().ok_or_else(|| {
            OperandTypeError(format!(
                "[{}] requires a numeric value",
                instruction.mnemonic
            ))
        })
    }

    fn translate_special(
        instruction: &Instruction,
        operand_string: &str,
    ) -> Result<CodePackage, OperandTypeError> {
        let op_code = instruction.mode.imm.ok_or_else(|| {
            OperandTypeError(format!(
                "[{}] is not a special instruction",
                instruction.mnemonic
            ))
        })?;
        let mut package = CodePackage::default();
        package.op_code = Value::Numeric(NumericValue::new(op_code));
        package.size = instruction.mode.imm_sz;
        package.max_size = package.size;

        let post_byte = match instruction.mnemonic {
            "PSHS" | "PULS" | "PSHU" | "PULU" => Self::stack_post_byte(operand_string)?,
            "EXG" | "TFR" => Self::transfer_post_byte(instruction, operand_string)?,
            _ => 0x00,
        };
        package.post_byte = Value::Numeric(NumericValue::with_size_hint(u16::from(post_byte), 2));
        Ok(package)
    }

    fn stack_post_byte(operand_string: &str) -> Result<u8, OperandTypeError> {
        if operand_string.is_empty() {
            return Err(OperandTypeError(
                "one or more registers must be specified".to_string(),
            ));
        }
        let mut post_byte = 0x00u8;
        for name in operand_string.split(',') {
            let register: StackRegister = name.parse().map_err(|_| {
                OperandTypeError(format!("[{}] unknown register", name))
            })?;
            post_byte |= enum_to_u8(register);
        }
        Ok(post_byte)
    }

    fn transfer_post_byte(
        instruction: &Instruction,
        operand_string: &str,
    ) -> Result<u8, OperandTypeError> {
        let names: Vec<&str> = operand_string.split(',').collect();
        if names.len() != 2 {
            return Err(OperandTypeError(format!(
                "[{}] requires exactly 2 registers",
                instruction.mnemonic
            )));
        }
        let source: InterRegister = names[0].parse().map_err(|_| {
            OperandTypeError(format!("[{}] unknown register", names[0]))
        })?;
        let destination: InterRegister = names[1].parse().map_err(|_| {
            OperandTypeError(format!("[{}] unknown register", names[1]))
        })?;
        let source_nibble = enum_to_u8(source);
        let destination_nibble = enum_to_u8(destination);
        // Transfers are only legal inside one register-width group.
        if (source_nibble >= 0x8) != (destination_nibble >= 0x8) {
            return Err(OperandTypeError(format!(
                "[{}] of [{}] to [{}] not allowed",
                instruction.mnemonic, names[0], names[1]
            )));
        }
        Ok((source_nibble << 4) | destination_nibble)
    }

    fn indexed_op_code(
        instruction: &Instruction,
    ) -> Result<(u16, usize), OperandTypeError> {
        let op_code = instruction.mode.ind.ok_or_else(|| {
            OperandTypeError(format!(
                "Instruction [{}] does not support indexed addressing",
                instruction.mnemonic
            ))
        })?;
        Ok((op_code, instruction.mode.ind_sz))
    }

    fn translate_indexed(
        instruction: &Instruction,
        left: &IndexedOffset,
        right: &str,
        indirect: bool,
        operand_string: &str,
    ) -> Result<CodePackage, OperandTypeError> {
        let (op_code, base_size) = Self::indexed_op_code(instruction)?;
        let mut package = CodePackage::default();
        package.op_code = Value::Numeric(NumericValue::new(op_code));
        package.size = base_size;
        package.max_size = base_size;
        let indirect_bit: u8 = if indirect { 0x10 } else { 0x00 };

        if right == "PCR" {
            return Self::translate_pcr(package, left, indirect_bit, operand_string);
        }

        // Auto-increment and auto-decrement forms.
        if right.ends_with('+') || right.starts_with('-') {
            let (name, bits, single) = if let Some(name) = right.strip_suffix("++") {
                (name, 0x01u8, false)
            } else if let Some(name) = right.strip_suffix('+') {
                (name, 0x00u8, true)
            } else if let Some(name) = right.strip_prefix("--") {
                (name, 0x03u8, false)
            } else {
                (right.trim_start_matches('-'), 0x02u8, true)
            };
            if !matches!(left, IndexedOffset::None) {
                return Err(OperandTypeError(format!(
                    "[{}] invalid indexed expression",
                    operand_string
                )));
            }
            if single && indirect {
                return Err(OperandTypeError(format!(
                    "[{}] not allowed as an extended indirect value",
                    right
                )));
            }
            let register = Self::index_register(name)?;
            let post = 0x80 | (enum_to_u8(register) << 5) | bits | indirect_bit;
            package.post_byte = Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
            return Ok(package);
        }

        let register = Self::index_register(right)?;
        let register_bits = enum_to_u8(register) << 5;
        match left {
            IndexedOffset::None => {
                let post = 0x84 | register_bits | indirect_bit;
                package.post_byte =
                    Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
            }
            IndexedOffset::Accumulator(accumulator) => {
                let bits = match accumulator {
                    Accumulator::A => 0x86,
                    Accumulator::B => 0x85,
                    Accumulator::D => 0x8B,
                };
                let post = bits | register_bits | indirect_bit;
                package.post_byte =
                    Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
            }
            IndexedOffset::Value(Value::Numeric(numeric)) => {
                if !indirect && numeric.byte_len() <= 1 && numeric.int() <= 15 {
                    // 5-bit offset folds into the post-byte itself.
                    let post = register_bits | (numeric.int() as u8);
                    package.post_byte =
                        Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
                } else if numeric.byte_len() <= 1 {
                    let post = 0x88 | register_bits | indirect_bit;
                    package.post_byte =
                        Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
                    package.additional =
                        Value::Numeric(NumericValue::with_size_hint(numeric.int(), 2));
                    package.size += 1;
                    package.max_size = package.size;
                } else {
                    let post = 0x89 | register_bits | indirect_bit;
                    package.post_byte =
                        Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
                    package.additional =
                        Value::Numeric(NumericValue::with_size_hint(numeric.int(), 4));
                    package.size += 2;
                    package.max_size = package.size;
                }
            }
            IndexedOffset::Value(Value::Address(address)) => {
                // A label offset from a hardware register is the label's
                // absolute address, always a 16-bit word.
                let post = 0x89 | register_bits | indirect_bit;
                package.post_byte =
                    Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
                package.additional =
                    Value::Address(AddressValue::with_size_hint(address.index(), 4));
                package.additional_needs_resolution = true;
                package.size += 2;
                package.max_size = package.size;
            }
            IndexedOffset::Value(Value::Expression(_)) => {
                let post = 0x89 | register_bits | indirect_bit;
                package.post_byte =
                    Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
                package.additional_needs_resolution = true;
                package.size += 2;
                package.max_size = package.size;
            }
            IndexedOffset::Value(other) => {
                return Err(OperandTypeError(format!(
                    "[{}] invalid indexed expression",
                    other.hex(0)
                )));
            }
        }
        Ok(package)
    }

    /// PCR operands with a known numeric offset pick their width from the
    /// literal immediately; symbolic offsets record the candidate post-bytes
    /// and leave the width to the sizing fixpoint.
    fn translate_pcr(
        mut package: CodePackage,
        left: &IndexedOffset,
        indirect_bit: u8,
        operand_string: &str,
    ) -> Result<CodePackage, OperandTypeError> {
        let value = match left {
            IndexedOffset::Value(value) => value,
            _ => {
                return Err(OperandTypeError(format!(
                    "[{}] invalid indexed expression",
                    operand_string
                )))
            }
        };
        match value {
            Value::Numeric(numeric) => {
                if numeric.byte_len() <= 1 {
                    let post = 0x8C | indirect_bit;
                    package.post_byte =
                        Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
                    package.additional =
                        Value::Numeric(NumericValue::with_size_hint(numeric.int(), 2));
                    package.size += 1;
                } else {
                    let post = 0x8D | indirect_bit;
                    package.post_byte =
                        Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
                    package.additional =
                        Value::Numeric(NumericValue::with_size_hint(numeric.int(), 4));
                    package.size += 2;
                }
                package.max_size = package.size;
            }
            Value::Address(address) => {
                let post = 0x80 | indirect_bit;
                package.post_byte =
                    Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
                package.additional = Value::Address(AddressValue::new(address.index()));
                package.additional_needs_resolution = true;
                package.post_byte_choices = Some((0x0C, 0x0D));
                package.max_size = package.size + 2;
            }
            Value::Expression(expression) if expression.address_index().is_some() => {
                let post = 0x80 | indirect_bit;
                package.post_byte =
                    Value::Numeric(NumericValue::with_size_hint(u16::from(post), 2));
                package.additional_needs_resolution = true;
                package.post_byte_choices = Some((0x0C, 0x0D));
                package.max_size = package.size + 2;
            }
            other => {
                return Err(OperandTypeError(format!(
                    "[{}] invalid indexed expression",
                    other.hex(0)
                )))
            }
        }
        Ok(package)
    }

    fn translate_indirect_address(
        instruction: &Instruction,
        value: &Value,
    ) -> Result<CodePackage, OperandTypeError> {
        let (op_code, base_size) = Self::indexed_op_code(instruction)?;
        let mut package = CodePackage::default();
        package.op_code = Value::Numeric(NumericValue::new(op_code));
        package.post_byte = Value::Numeric(NumericValue::with_size_hint(0x9F, 2));
        package.size = base_size + 2;
        package.max_size = package.size;
        Self::attach_additional(&mut package, value, 4)?;
        Ok(package)
    }

    fn index_register(name: &str) -> Result<IndexRegister, OperandTypeError> {
        name.parse()
            .map_err(|_| OperandTypeError(format!("[{}] unknown register", name)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instructions::instruction_named;

    fn indexed(operand: &str) -> CodePackage {
        let instruction = instruction_named("STX").unwrap();
        Operand::parse(operand, instruction)
            .unwrap()
            .resolve_symbols(&SymbolTable::new())
            .unwrap()
            .translate(instruction)
            .unwrap()
    }

    fn indexed_err(operand: &str) -> OperandTypeError {
        let instruction = instruction_named("STX").unwrap();
        Operand::parse(operand, instruction)
            .unwrap()
            .resolve_symbols(&SymbolTable::new())
            .unwrap()
            .translate(instruction)
            .unwrap_err()
    }

    #[test]
    fn indexed_no_offset() {
        for (operand, post) in &[(",X", "84"), (",Y", "A4"), (",U", "C4"), (",S", "E4")] {
            let package = indexed(operand);
            assert_eq!("AF", package.op_code.hex(0));
            assert_eq!(*post, package.post_byte.hex(0));
            assert_eq!(2, package.size);
        }
    }

    #[test]
    fn indexed_accumulator_offsets() {
        assert_eq!("86", indexed("A,X").post_byte.hex(0));
        assert_eq!("A6", indexed("A,Y").post_byte.hex(0));
        assert_eq!("85", indexed("B,X").post_byte.hex(0));
        assert_eq!("E5", indexed("B,S").post_byte.hex(0));
        assert_eq!("8B", indexed("D,X").post_byte.hex(0));
        assert_eq!("CB", indexed("D,U").post_byte.hex(0));
    }

    #[test]
    fn indexed_auto_increments() {
        assert_eq!("80", indexed(",X+").post_byte.hex(0));
        assert_eq!("81", indexed(",X++").post_byte.hex(0));
        assert_eq!("82", indexed(",-X").post_byte.hex(0));
        assert_eq!("83", indexed(",--X").post_byte.hex(0));
    }

    #[test]
    fn indexed_offset_with_auto_increment_is_rejected() {
        let err = indexed_err("$1F,X+");
        assert_eq!("[$1F,X+] invalid indexed expression", err.0);
    }

    #[test]
    fn indexed_five_bit_offset() {
        let package = indexed("$F,X");
        assert_eq!("0F", package.post_byte.hex(0));
        assert_eq!(2, package.size);
        assert_eq!("2F", indexed("$F,Y").post_byte.hex(0));
    }

    #[test]
    fn indexed_eight_bit_offset() {
        let package = indexed("$20,X");
        assert_eq!("88", package.post_byte.hex(0));
        assert_eq!("20", package.additional.hex(0));
        assert_eq!(3, package.size);
    }

    #[test]
    fn indexed_sixteen_bit_offset() {
        let package = indexed("$2000,X");
        assert_eq!("89", package.post_byte.hex(0));
        assert_eq!("2000", package.additional.hex(0));
        assert_eq!(4, package.size);
    }

    #[test]
    fn indexed_pcr_widths_follow_literal() {
        let eight = indexed("$20,PCR");
        assert_eq!("8C", eight.post_byte.hex(0));
        assert_eq!(3, eight.size);
        let sixteen = indexed("$2000,PCR");
        assert_eq!("8D", sixteen.post_byte.hex(0));
        assert_eq!(4, sixteen.size);
    }

    #[test]
    fn extended_indirect_forms() {
        assert_eq!("94", indexed("[,X]").post_byte.hex(0));
        assert_eq!("F4", indexed("[,S]").post_byte.hex(0));
        assert_eq!("96", indexed("[A,X]").post_byte.hex(0));
        assert_eq!("9B", indexed("[D,X]").post_byte.hex(0));
        assert_eq!("91", indexed("[,X++]").post_byte.hex(0));
        assert_eq!("93", indexed("[,--X]").post_byte.hex(0));
    }

    #[test]
    fn extended_indirect_single_step_rejected() {
        assert_eq!(
            "[X+] not allowed as an extended indirect value",
            indexed_err("[,X+]").0
        );
        assert_eq!(
            "[-X] not allowed as an extended indirect value",
            indexed_err("[,-X]").0
        );
    }

    #[test]
    fn extended_indirect_has_no_five_bit_form() {
        let package = indexed("[$1F,X]");
        assert_eq!("98", package.post_byte.hex(0));
        assert_eq!("1F", package.additional.hex(0));
        assert_eq!(3, package.size);
    }

    #[test]
    fn extended_indirect_pcr() {
        assert_eq!("9C", indexed("[$20,PCR]").post_byte.hex(0));
        assert_eq!("9D", indexed("[$2000,PCR]").post_byte.hex(0));
    }

    #[test]
    fn bare_indirect_address() {
        let package = indexed("[$2000]");
        assert_eq!("9F", package.post_byte.hex(0));
        assert_eq!("2000", package.additional.hex(0));
        assert_eq!(4, package.size);
    }

    #[test]
    fn stack_post_bytes() {
        let instruction = instruction_named("PSHS").unwrap();
        for (registers, expected) in &[
            ("D", 0x06u16),
            ("CC", 0x01),
            ("A", 0x02),
            ("B", 0x04),
            ("DP", 0x08),
            ("X", 0x10),
            ("Y", 0x20),
            ("U", 0x40),
            ("PC", 0x80),
            ("CC,D,X,Y", 0x37),
        ] {
            let package = Operand::parse(registers, instruction)
                .unwrap()
                .translate(instruction)
                .unwrap();
            assert_eq!(*expected, package.post_byte.numeric().unwrap().int());
        }
    }

    #[test]
    fn stack_rejects_unknown_register() {
        let instruction = instruction_named("PSHS").unwrap();
        let err = Operand::parse("not_a_register", instruction)
            .unwrap()
            .translate(instruction)
            .unwrap_err();
        assert_eq!("[not_a_register] unknown register", err.0);
    }

    #[test]
    fn transfer_same_width_pairs() {
        let instruction = instruction_named("EXG").unwrap();
        for (registers, expected) in &[
            ("A,A", 0x88u16),
            ("B,B", 0x99),
            ("CC,CC", 0xAA),
            ("DP,DP", 0xBB),
            ("D,D", 0x00),
            ("X,Y", 0x12),
            ("U,S", 0x34),
            ("PC,PC", 0x55),
        ] {
            let package = Operand::parse(registers, instruction)
                .unwrap()
                .translate(instruction)
                .unwrap();
            assert_eq!(*expected, package.post_byte.numeric().unwrap().int());
        }
    }

    #[test]
    fn transfer_across_widths_is_rejected() {
        let instruction = instruction_named("EXG").unwrap();
        let err = Operand::parse("A,D", instruction)
            .unwrap()
            .translate(instruction)
            .unwrap_err();
        assert_eq!("[EXG] of [A] to [D] not allowed", err.0);
    }

    #[test]
    fn transfer_requires_two_registers() {
        let instruction = instruction_named("TFR").unwrap();
        let err = Operand::parse("A,B,X", instruction)
            .unwrap()
            .translate(instruction)
            .unwrap_err();
        assert_eq!("[TFR] requires exactly 2 registers", err.0);
    }

    #[test]
    fn unknown_reclassifies_on_width() {
        let instruction = instruction_named("SUBA").unwrap();
        let mut table = SymbolTable::new();
        table.insert(
            "NARROW".to_string(),
            Value::Numeric(NumericValue::parse("$FF").unwrap()),
        );
        table.insert(
            "WIDE".to_string(),
            Value::Numeric(NumericValue::parse("$FFFF").unwrap()),
        );
        let narrow = Operand::parse("NARROW", instruction)
            .unwrap()
            .resolve_symbols(&table)
            .unwrap();
        assert!(matches!(narrow, Operand::Direct { .. }));
        let wide = Operand::parse("WIDE", instruction)
            .unwrap()
            .resolve_symbols(&table)
            .unwrap();
        assert!(matches!(wide, Operand::Extended { .. }));
    }

    #[test]
    fn address_symbols_become_extended() {
        let instruction = instruction_named("SUBA").unwrap();
        let mut table = SymbolTable::new();
        table.insert("LOOP".to_string(), Value::Address(AddressValue::new(2)));
        let operand = Operand::parse("LOOP", instruction)
            .unwrap()
            .resolve_symbols(&table)
            .unwrap();
        assert!(matches!(operand, Operand::Extended { .. }));
    }

    #[test]
    fn garbage_is_an_unknown_operand_type() {
        let instruction = instruction_named("STX").unwrap();
        let err = Operand::parse(",blah,", instruction).unwrap_err();
        assert_eq!("[,blah,] unknown operand type", err.0);
    }

    #[test]
    fn immediate_character_literal() {
        let instruction = instruction_named("CMPA").unwrap();
        let package = Operand::parse("#'>", instruction)
            .unwrap()
            .translate(instruction)
            .unwrap();
        assert_eq!(62, package.additional.numeric().unwrap().int());
    }
}
