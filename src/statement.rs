//! A single line of assembly source and everything that happens to it:
//! parsing into fields, translation to a code package, PC-relative sizing,
//! and the final address fixups.
//!
//! Statements read each other during sizing and fixup. Those routines take
//! the full statement slice plus this statement's index and return the
//! update to apply, so no statement ever holds a pointer at another.

use crate::error::{ParseError, TranslationError};
use crate::instructions::{instruction_named, CodePackage, Instruction, MACRO_CALL_INSTRUCTION};
use crate::macros::MACRO_OPERAND_COUNT;
use crate::operands::Operand;
use crate::values::{NumericValue, SymbolTable, Value};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref BLANK_LINE_REGEX: Regex = Regex::new(r"^\s*$").unwrap();
    static ref COMMENT_LINE_REGEX: Regex = Regex::new(r"^\s*;\s*(?P<comment>.*)$").unwrap();
    static ref MACRO_DEF_LINE_REGEX: Regex =
        Regex::new(r"^(?P<label>\w*)\s+MACRO\s*;*(?P<comment>.*)$").unwrap();
    static ref MACRO_END_LINE_REGEX: Regex =
        Regex::new(r"^\s+ENDM\s*;*(?P<comment>.*)$").unwrap();
    static ref ASM_LINE_REGEX: Regex = Regex::new(
        r#"^(?P<label>[\w@\\.]*)\s+(?P<mnemonic>\w+)(?:\s+(?P<operands>[\w\[\]><'"@:,.#?$%^&*()=!+\-/\\]*))?\s*;*(?P<comment>.*)$"#
    )
    .unwrap();
    static ref MACRO_CALL_REGEX: Regex = Regex::new(
        r#"^(?P<label>[\w@\\.]*)\s+(?P<name>\w+)(?:\s+(?P<operands>[\w\[\]><'"@:.#?$%^&*()=!+\-/\\,]*))?\s*$"#
    )
    .unwrap();
}

/// A committed PCR displacement width, produced by [`Statement::pcr_size_plan`].
#[derive(Clone, Copy, Debug)]
pub struct PcrSizeCommit {
    extra_bytes: usize,
    size_hint: usize,
    post_byte_bits: u8,
}

#[derive(Clone, Debug)]
pub struct Statement {
    original_line: String,
    is_empty: bool,
    is_comment_only: bool,
    label: String,
    mnemonic: String,
    instruction: Option<&'static Instruction>,
    operand: Operand,
    original_operand: String,
    comment: String,
    macro_name: String,
    macro_operands: Vec<String>,
    pub code_pkg: CodePackage,
    fixed_size: bool,
    pcr_size_hint: usize,
    line_length: usize,
}

impl Statement {
    fn blank(line: &str) -> Statement {
        Statement {
            original_line: line.to_string(),
            is_empty: true,
            is_comment_only: false,
            label: String::new(),
            mnemonic: String::new(),
            instruction: None,
            operand: Operand::Inherent,
            original_operand: String::new(),
            comment: String::new(),
            macro_name: String::new(),
            macro_operands: Vec::new(),
            code_pkg: CodePackage::default(),
            fixed_size: true,
            pcr_size_hint: 2,
            line_length: 0,
        }
    }

    /// Parses one line of source. Patterns are tried in order: blank,
    /// comment-only, macro definition, macro end, full instruction line.
    /// A full line whose mnemonic is unknown is re-matched as a macro call.
    pub fn parse(line: &str) -> Result<Statement, ParseError> {
        let mut statement = Statement::blank(line);

        if BLANK_LINE_REGEX.is_match(line) {
            return Ok(statement);
        }

        if let Some(caps) = COMMENT_LINE_REGEX.captures(line) {
            statement.is_empty = false;
            statement.is_comment_only = true;
            statement.comment = caps["comment"].trim().to_string();
            return Ok(statement);
        }

        if let Some(caps) = MACRO_DEF_LINE_REGEX.captures(line) {
            let label = caps["label"].to_string();
            if label.is_empty() {
                return Err(ParseError::new("Macro definition must have a label", line));
            }
            statement.is_empty = false;
            statement.label = label;
            statement.mnemonic = "MACRO".to_string();
            statement.instruction = instruction_named("MACRO");
            statement.comment = caps["comment"].trim().to_string();
            return Ok(statement);
        }

        if let Some(caps) = MACRO_END_LINE_REGEX.captures(line) {
            statement.is_empty = false;
            statement.mnemonic = "ENDM".to_string();
            statement.instruction = instruction_named("ENDM");
            statement.comment = caps["comment"].trim().to_string();
            return Ok(statement);
        }

        if let Some(caps) = ASM_LINE_REGEX.captures(line) {
            statement.label = caps["label"].to_string();
            statement.mnemonic = caps["mnemonic"].to_uppercase();
            let instruction = match instruction_named(&statement.mnemonic) {
                Some(instruction) => instruction,
                None => return Statement::parse_macro_call(line, &statement.mnemonic),
            };
            statement.instruction = Some(instruction);
            statement.is_empty = false;

            if instruction.is_string_define {
                return Statement::parse_string_define(line, statement, &caps, instruction);
            }

            let operand_text = caps.name("operands").map(|m| m.as_str()).unwrap_or("");
            let operand = Operand::parse(operand_text, instruction)
                .map_err(|err| ParseError::new(err.0, line))?;
            statement.original_operand = operand.operand_string().to_string();
            statement.operand = operand;
            statement.comment = caps["comment"].trim().to_string();
            return Ok(statement);
        }

        Err(ParseError::new("Could not parse line", line))
    }

    /// The operand of a string define runs from its first character to the
    /// next occurrence of that character, whitespace included; the rest of
    /// the line is the comment.
    fn parse_string_define(
        line: &str,
        mut statement: Statement,
        caps: &regex::Captures,
        instruction: &'static Instruction,
    ) -> Result<Statement, ParseError> {
        let start = match caps.name("operands").filter(|m| !m.as_str().is_empty()) {
            Some(m) => m.start(),
            None => {
                return Err(ParseError::new(
                    "string must begin and end with same delimiter",
                    line,
                ))
            }
        };
        let delimiter = line[start..].chars().next().unwrap();
        let closing = line[start + delimiter.len_utf8()..]
            .find(delimiter)
            .map(|offset| start + delimiter.len_utf8() + offset)
            .ok_or_else(|| {
                ParseError::new("string must begin and end with same delimiter", line)
            })?;
        let operand_text = &line[start..=closing];
        let operand = Operand::parse(operand_text, instruction)
            .map_err(|err| ParseError::new(err.0, line))?;
        statement.original_operand = operand.operand_string().to_string();
        statement.operand = operand;
        let comment = line[closing + 1..].trim();
        statement.comment = comment
            .trim_start_matches(';')
            .trim_start()
            .to_string();
        Ok(statement)
    }

    fn parse_macro_call(line: &str, mnemonic: &str) -> Result<Statement, ParseError> {
        let caps = MACRO_CALL_REGEX.captures(line).ok_or_else(|| {
            ParseError::new(format!("[{}] invalid mnemonic", mnemonic), line)
        })?;
        let mut statement = Statement::blank(line);
        statement.is_empty = false;
        statement.label = caps["label"].to_string();
        statement.macro_name = caps["name"].to_string();
        statement.instruction = Some(&*MACRO_CALL_INSTRUCTION);
        let mut operands: Vec<String> = match caps.name("operands") {
            Some(m) if !m.as_str().is_empty() => {
                m.as_str().split(',').map(str::to_string).collect()
            }
            _ => Vec::new(),
        };
        if operands.len() > MACRO_OPERAND_COUNT {
            return Err(ParseError::new(
                format!("[{}] invalid mnemonic", mnemonic),
                line,
            ));
        }
        operands.resize(MACRO_OPERAND_COUNT, String::new());
        statement.macro_operands = operands;
        Ok(statement)
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn is_comment_only(&self) -> bool {
        self.is_comment_only
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    pub fn original_line(&self) -> &str {
        &self.original_line
    }

    pub fn macro_name(&self) -> &str {
        &self.macro_name
    }

    pub fn macro_operands(&self) -> &[String] {
        &self.macro_operands
    }

    pub fn fixed_size(&self) -> bool {
        self.fixed_size
    }

    pub fn set_line_length(&mut self, line_length: usize) {
        self.line_length = line_length;
    }

    fn flag(&self, check: impl Fn(&Instruction) -> bool) -> bool {
        self.instruction.map(check).unwrap_or(false)
    }

    pub fn is_include(&self) -> bool {
        self.flag(|i| i.is_include)
    }

    pub fn is_start_macro(&self) -> bool {
        self.flag(|i| i.is_start_macro)
    }

    pub fn is_end_macro(&self) -> bool {
        self.flag(|i| i.is_end_macro)
    }

    pub fn is_macro_call(&self) -> bool {
        self.flag(|i| i.is_macro_call)
    }

    pub fn is_pseudo_define(&self) -> bool {
        self.flag(|i| i.is_pseudo_define)
    }

    pub fn is_origin(&self) -> bool {
        self.flag(|i| i.is_origin)
    }

    pub fn is_end(&self) -> bool {
        self.flag(|i| i.is_end)
    }

    pub fn is_name(&self) -> bool {
        self.flag(|i| i.is_name)
    }

    pub fn is_short_branch(&self) -> bool {
        self.flag(|i| i.is_short_branch)
    }

    /// The file named by an INCLUDE statement.
    pub fn include_filename(&self) -> Option<&str> {
        if self.is_include() {
            Some(self.operand.operand_string())
        } else {
            None
        }
    }

    /// Sets the statement's address unless one is already present (an ORG
    /// statement carries its own); returns the address in effect.
    pub fn set_address(&mut self, address: u16) -> u16 {
        if let Some(existing) = self.code_pkg.address.numeric() {
            return existing.int();
        }
        self.code_pkg.address = Value::Numeric(NumericValue::new(address));
        address
    }

    fn address_int(&self) -> u16 {
        self.code_pkg
            .address
            .numeric()
            .map(|numeric| numeric.int())
            .unwrap_or(0)
    }

    /// Resolves the operand's symbols against the table.
    pub fn resolve_symbols(&mut self, symbol_table: &SymbolTable) -> Result<(), TranslationError> {
        let operand = std::mem::replace(&mut self.operand, Operand::Inherent);
        match operand.resolve_symbols(symbol_table) {
            Ok(resolved) => {
                self.operand = resolved;
                Ok(())
            }
            Err(err) => Err(TranslationError::new(err.0, self.listing())),
        }
    }

    /// Translates the statement's operand into its code package. Statements
    /// whose PCR width is still open stay unsized for the fixpoint.
    pub fn translate(&mut self) -> Result<(), TranslationError> {
        let instruction = match self.instruction {
            Some(instruction) => instruction,
            None => return Ok(()),
        };
        match self.operand.translate(instruction) {
            Ok(package) => {
                self.fixed_size = package.post_byte_choices.is_none();
                self.code_pkg = package;
                Ok(())
            }
            Err(err) => Err(TranslationError::new(err.0, self.listing())),
        }
    }

    /// Decides the displacement width of an unsized PCR statement, when the
    /// bounds of the intervening statements already agree. Returns `None`
    /// while both widths are still possible.
    pub fn pcr_size_plan(
        &self,
        statements: &[Statement],
        this_index: usize,
    ) -> Option<PcrSizeCommit> {
        let choices = self.code_pkg.post_byte_choices?;
        let target = self.operand.pcr_target_index()?;
        if target > statements.len() {
            return None;
        }
        let forward = target >= this_index;
        let range = if forward {
            this_index..target
        } else {
            target..this_index
        };

        let mut min_size = 2usize;
        let mut max_size = 2usize;
        for statement in &statements[range] {
            min_size += statement.code_pkg.size;
            max_size += statement.code_pkg.max_size;
        }

        // Backward displacements tolerate one extra byte, matching the
        // original assembler's window.
        let limit = if forward { 127 } else { 128 };
        if min_size <= limit && max_size <= limit {
            Some(PcrSizeCommit {
                extra_bytes: 1,
                size_hint: 2,
                post_byte_bits: choices.0,
            })
        } else if min_size > limit && max_size > limit {
            Some(PcrSizeCommit {
                extra_bytes: 2,
                size_hint: 4,
                post_byte_bits: choices.1,
            })
        } else {
            None
        }
    }

    /// Applies a committed PCR width.
    pub fn commit_pcr_size(&mut self, commit: PcrSizeCommit) {
        self.code_pkg.size += commit.extra_bytes;
        self.code_pkg.max_size = self.code_pkg.size;
        self.pcr_size_hint = commit.size_hint;
        self.fixed_size = true;
        let post_byte = self
            .code_pkg
            .post_byte
            .numeric()
            .map(|numeric| numeric.int())
            .unwrap_or(0);
        self.code_pkg.post_byte = Value::Numeric(NumericValue::with_size_hint(
            post_byte | u16::from(commit.post_byte_bits),
            2,
        ));
    }

    /// Computes the statement's final operand bytes once every address is
    /// known: branch displacements, PCR displacements, and absolute
    /// addresses standing in for statement indices. Returns the replacement
    /// for `code_pkg.additional`, or `None` when nothing needs fixing.
    pub fn address_fixup(
        &self,
        statements: &[Statement],
        this_index: usize,
    ) -> Result<Option<Value>, TranslationError> {
        if self.operand.is_relative() {
            return self.relative_fixup(statements, this_index);
        }

        if let Some(expression) = self.operand.indexed_expression() {
            let size_hint = if self.operand.pcr_offset().is_some() {
                self.pcr_size_hint
            } else {
                4
            };
            let value = expression
                .evaluate_with_addresses(&|index| statements[index].address_int())
                .map_err(|err| TranslationError::new(err.0, self.listing()))?;
            return Ok(Some(Value::Numeric(NumericValue::with_size_hint(
                value, size_hint,
            ))));
        }

        if let Value::Address(address) = &self.code_pkg.additional {
            let target = statements
                .get(address.index())
                .ok_or_else(|| {
                    TranslationError::new(
                        format!(
                            "[{}] references a statement outside the program",
                            self.original_operand
                        ),
                        self.listing(),
                    )
                })?
                .address_int();
            if self.operand.pcr_offset().is_some() {
                let start = self.address_int();
                let jump = i32::from(target) - i32::from(start) - self.code_pkg.size as i32;
                return Ok(Some(Value::Numeric(NumericValue::from_i32(
                    jump,
                    Some(self.pcr_size_hint),
                ))));
            }
            let size_hint = address.size_hint().unwrap_or(4);
            return Ok(Some(Value::Numeric(NumericValue::with_size_hint(
                target, size_hint,
            ))));
        }

        Ok(None)
    }

    /// Branch displacements count the statements between the branch and its
    /// target; backward branches fold the distance into the mode's base the
    /// way the original assembler did.
    fn relative_fixup(
        &self,
        statements: &[Statement],
        this_index: usize,
    ) -> Result<Option<Value>, TranslationError> {
        let address = match self.code_pkg.additional.address() {
            Some(address) => *address,
            None => return Ok(None),
        };
        let branch_index = address.index();
        if branch_index >= statements.len() {
            return Err(TranslationError::new(
                format!(
                    "[{}] references a statement outside the program",
                    self.original_operand
                ),
                self.listing(),
            ));
        }
        let short = self.is_short_branch();
        let (base, size_hint): (i64, usize) = if short { (0x101, 2) } else { (0x10001, 4) };

        if branch_index < this_index {
            let mut length: i64 = 1;
            for statement in &statements[branch_index..=this_index] {
                length += statement.code_pkg.size as i64;
            }
            if short && length - 1 > 128 {
                return Err(TranslationError::new(
                    "short relative branch cannot be less than -128 bytes",
                    self.listing(),
                ));
            }
            Ok(Some(Value::Numeric(NumericValue::from_i32(
                (base - length) as i32,
                Some(size_hint),
            ))))
        } else {
            let mut length: i64 = 0;
            for statement in &statements[this_index + 1..branch_index] {
                length += statement.code_pkg.size as i64;
            }
            if short && length > 127 {
                return Err(TranslationError::new(
                    "short relative branch cannot be more than 127 bytes",
                    self.listing(),
                ));
            }
            Ok(Some(Value::Numeric(NumericValue::from_i32(
                length as i32,
                Some(size_hint),
            ))))
        }
    }

    /// The listing form of the statement: address, emitted bytes, label,
    /// mnemonic, operand and comment in fixed-width columns.
    pub fn listing(&self) -> String {
        let mut op_code_string = String::new();
        op_code_string.push_str(&self.code_pkg.op_code.hex(0));
        op_code_string.push_str(&self.code_pkg.post_byte.hex(0));
        op_code_string.push_str(&self.code_pkg.additional.hex(0));
        let address = self.code_pkg.address.hex(4);

        let result = format!(
            "${} {:<10.10} {:>10} {:>5} {:<30} ; {:<40}",
            address, op_code_string, self.label, self.mnemonic, self.original_operand, self.comment
        );
        if self.line_length > 0 {
            result.chars().take(self.line_length).collect()
        } else {
            result
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.listing())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blank_line_is_empty() {
        let statement = Statement::parse("   ").unwrap();
        assert!(statement.is_empty());
    }

    #[test]
    fn comment_line_keeps_comment() {
        let statement = Statement::parse("; a comment here").unwrap();
        assert!(statement.is_comment_only());
        assert_eq!("a comment here", statement.comment);
    }

    #[test]
    fn full_line_splits_fields() {
        let statement = Statement::parse("START  LDA  #$01  ; load accumulator").unwrap();
        assert_eq!("START", statement.label());
        assert_eq!("LDA", statement.mnemonic());
        assert_eq!("#$01", statement.original_operand);
        assert_eq!("load accumulator", statement.comment);
    }

    #[test]
    fn bare_mnemonic_parses_without_trailing_whitespace() {
        let statement = Statement::parse("Z    RTS").unwrap();
        assert_eq!("Z", statement.label());
        assert_eq!("RTS", statement.mnemonic());
    }

    #[test]
    fn unknown_mnemonic_is_a_parse_error() {
        let err = Statement::parse("LABEL BADOP $FF,$FE,$FD ; error").unwrap_err();
        assert_eq!("[BADOP] invalid mnemonic", err.message);
    }

    #[test]
    fn unknown_mnemonic_matches_macro_call() {
        let statement = Statement::parse("  LOADER #$00,#$03,#$0000,#$FFFF").unwrap();
        assert!(statement.is_macro_call());
        assert_eq!("LOADER", statement.macro_name());
        assert_eq!("#$00", statement.macro_operands()[0]);
        assert_eq!("#$FFFF", statement.macro_operands()[3]);
        assert_eq!("", statement.macro_operands()[4]);
    }

    #[test]
    fn macro_definition_requires_label() {
        let err = Statement::parse("   MACRO").unwrap_err();
        assert_eq!("Macro definition must have a label", err.message);
        let statement = Statement::parse("LOADER MACRO").unwrap();
        assert!(statement.is_start_macro());
        assert_eq!("LOADER", statement.label());
    }

    #[test]
    fn fcc_operand_keeps_embedded_whitespace() {
        let statement = Statement::parse("  FCC \"AB  CD\" ; trailing note").unwrap();
        assert_eq!("\"AB  CD\"", statement.original_operand);
        assert_eq!("trailing note", statement.comment);
    }

    #[test]
    fn fcc_without_closing_delimiter_fails() {
        let err = Statement::parse("  FCC 'unterminated").unwrap_err();
        assert_eq!("string must begin and end with same delimiter", err.message);
    }

    #[test]
    fn macro_template_lines_parse() {
        let statement = Statement::parse(r"\.B     LDY \3").unwrap();
        assert_eq!(r"\.B", statement.label());
        assert_eq!("LDY", statement.mnemonic());
    }

    #[test]
    fn set_address_respects_org() {
        let mut statement = Statement::parse("  ORG $0600").unwrap();
        statement.translate().unwrap();
        assert_eq!(0x0600, statement.set_address(0x0000));
    }

    #[test]
    fn listing_pads_columns() {
        let mut statement = Statement::parse("LABEL JMP $FFFF ; comment").unwrap();
        statement.set_line_length(0);
        assert_eq!(
            "$                 LABEL   JMP $FFFF                          ; comment                                 ",
            statement.listing()
        );
    }
}
