//! Typed values as they appear in operand fields: numeric literals, strings,
//! symbol references, statement addresses, and two-term expressions.
//!
//! Addresses are late-bound: an [`AddressValue`] holds the *index* of the
//! statement that defines the label, and is only exchanged for the concrete
//! address once the whole program has been sized. Expressions resolve their
//! sides first and then collapse; arithmetic against an address operates on
//! the statement index so that `R+1` names the statement after `R`.

use crate::error::ValueTypeError;
use crate::instructions::Instruction;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

lazy_static! {
    static ref CHAR_REGEX: Regex =
        Regex::new(r#"^'(?P<value>[a-zA-Z0-9><'";:,.#?$%^&*()=!+\-/])$"#).unwrap();
    static ref HEX_REGEX: Regex = Regex::new(r"^\$(?P<value>[0-9a-fA-F]+)$").unwrap();
    static ref BINARY_REGEX: Regex = Regex::new(r"^%(?P<value>[01]+)$").unwrap();
    static ref INT_REGEX: Regex = Regex::new(r"^(?P<value>\d+)$").unwrap();
    static ref SYMBOL_REGEX: Regex = Regex::new(r"^(?P<value>[a-zA-Z0-9@]+)$").unwrap();
    static ref EXPRESSION_REGEX: Regex =
        Regex::new(r"^(?P<left>[$%]?\w+)(?P<operation>[+\-*/])(?P<right>[$%]?\w+)$").unwrap();
}

/// Labels resolve through the symbol table, either to a constant (EQU) or to
/// the index of the statement that carries the label.
pub type SymbolTable = HashMap<String, Value>;

fn round_even(len: usize) -> usize {
    len + len % 2
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    None,
    Numeric(NumericValue),
    String(StringValue),
    Symbol(SymbolValue),
    Address(AddressValue),
    Expression(Box<ExpressionValue>),
}

impl Value {
    /// Parses an operand sub-field. Numeric literals are tried first, then a
    /// delimited string (only when the instruction is a string define), then
    /// a symbol, then a two-term expression.
    pub fn parse(text: &str, instruction: Option<&Instruction>) -> Result<Value, ValueTypeError> {
        if let Ok(numeric) = NumericValue::parse(text) {
            return Ok(Value::Numeric(numeric));
        }
        if let Some(instruction) = instruction {
            if instruction.is_string_define {
                if let Ok(string) = StringValue::parse(text) {
                    return Ok(Value::String(string));
                }
            }
        }
        if let Ok(symbol) = SymbolValue::parse(text) {
            return Ok(Value::Symbol(symbol));
        }
        if let Ok(expression) = ExpressionValue::parse(text) {
            return Ok(Value::Expression(Box::new(expression)));
        }
        Err(ValueTypeError(format!("[{}] is an invalid value", text)))
    }

    /// Resolves symbols against the table and collapses expressions. Numeric
    /// and address values pass through untouched.
    pub fn resolve(&self, symbol_table: &SymbolTable) -> Result<Value, ValueTypeError> {
        match self {
            Value::Symbol(symbol) => lookup_symbol(&symbol.name, symbol_table),
            Value::Expression(expression) => expression.resolve(symbol_table)?.collapse(),
            other => Ok(other.clone()),
        }
    }

    /// The hex rendering of the value. A width hint captured at parse time
    /// wins over `size`; `size` of zero means the natural even-padded width.
    pub fn hex(&self, size: usize) -> String {
        match self {
            Value::None => String::new(),
            Value::Numeric(numeric) => numeric.hex(size),
            Value::String(string) => string.hex(),
            Value::Symbol(_) => String::new(),
            Value::Address(address) => address.hex(size),
            Value::Expression(_) => String::new(),
        }
    }

    pub fn hex_len(&self) -> usize {
        match self {
            Value::Numeric(numeric) => numeric.hex_len(),
            Value::String(string) => string.hex_len(),
            Value::Address(address) => address.hex_len(),
            _ => 0,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.hex_len() / 2
    }

    /// The emitted form of the value, high byte first.
    pub fn bytes(&self) -> Vec<u8> {
        let hex = self.hex(0);
        hex.as_bytes()
            .chunks(2)
            .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
            .collect()
    }

    pub fn high_byte(&self) -> u8 {
        if self.hex_len() <= 2 {
            return 0x00;
        }
        self.bytes()[0]
    }

    pub fn low_byte(&self) -> u8 {
        if self.hex_len() == 0 {
            return 0x00;
        }
        *self.bytes().last().unwrap()
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Numeric(_))
    }

    pub fn is_address(&self) -> bool {
        matches!(self, Value::Address(_))
    }

    /// True for an expression that still carries an address on one side.
    pub fn is_address_expression(&self) -> bool {
        match self {
            Value::Expression(expression) => {
                expression.left.is_address() || expression.right.is_address()
            }
            _ => false,
        }
    }

    pub fn numeric(&self) -> Option<&NumericValue> {
        match self {
            Value::Numeric(numeric) => Some(numeric),
            _ => None,
        }
    }

    pub fn address(&self) -> Option<&AddressValue> {
        match self {
            Value::Address(address) => Some(address),
            _ => None,
        }
    }

    pub fn expression(&self) -> Option<&ExpressionValue> {
        match self {
            Value::Expression(expression) => Some(expression),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.hex(0))
    }
}

fn lookup_symbol(name: &str, symbol_table: &SymbolTable) -> Result<Value, ValueTypeError> {
    symbol_table
        .get(name)
        .cloned()
        .ok_or_else(|| ValueTypeError(format!("[{}] not in symbol table", name)))
}

/// A 16-bit integer parsed from decimal, `$` hex, `%` binary or a `'c`
/// character literal. Hex and binary literals remember how wide they were
/// written, so `$0001` renders four digits and `$01` renders two.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NumericValue {
    int: u16,
    size_hint: Option<usize>,
}

impl NumericValue {
    pub fn new(int: u16) -> NumericValue {
        NumericValue {
            int,
            size_hint: None,
        }
    }

    /// A numeric pinned to a rendering width. The value is masked to that
    /// width, so a negative displacement under an 8-bit hint emits its low
    /// byte.
    pub fn with_size_hint(int: u16, size_hint: usize) -> NumericValue {
        let mask = if size_hint <= 2 { 0xFF } else { 0xFFFF };
        NumericValue {
            int: int & mask,
            size_hint: Some(size_hint),
        }
    }

    /// Builds a numeric from signed arithmetic, masked to 16 bits or to the
    /// hinted width.
    pub fn from_i32(value: i32, size_hint: Option<usize>) -> NumericValue {
        let int = (value & 0xFFFF) as u16;
        match size_hint {
            Some(hint) => NumericValue::with_size_hint(int, hint),
            None => NumericValue::new(int),
        }
    }

    pub fn parse(text: &str) -> Result<NumericValue, ValueTypeError> {
        if let Some(caps) = CHAR_REGEX.captures(text) {
            let ch = caps["value"].chars().next().unwrap();
            return Ok(NumericValue::new(ch as u16));
        }
        if let Some(caps) = HEX_REGEX.captures(text) {
            let digits = &caps["value"];
            if digits.len() > 4 {
                return Err(ValueTypeError(
                    "hex value length cannot exceed 4 characters".to_string(),
                ));
            }
            let int = u16::from_str_radix(digits, 16).unwrap();
            return Ok(NumericValue::with_size_hint(int, round_even(digits.len())));
        }
        if let Some(caps) = BINARY_REGEX.captures(text) {
            let digits = &caps["value"];
            let int = u32::from_str_radix(digits, 2)
                .map_err(|_| ValueTypeError("integer value cannot exceed 65535".to_string()))?;
            if int > 65535 {
                return Err(ValueTypeError(
                    "integer value cannot exceed 65535".to_string(),
                ));
            }
            let hint = round_even((digits.len() + 3) / 4);
            return Ok(NumericValue::with_size_hint(int as u16, hint));
        }
        if let Some(caps) = INT_REGEX.captures(text) {
            let int: u64 = caps["value"].parse().map_err(|_| {
                ValueTypeError("integer value cannot exceed 65535".to_string())
            })?;
            if int > 65535 {
                return Err(ValueTypeError(
                    "integer value cannot exceed 65535".to_string(),
                ));
            }
            return Ok(NumericValue::new(int as u16));
        }
        Err(ValueTypeError(format!(
            "[{}] is not valid integer, character literal, or hex value",
            text
        )))
    }

    pub fn int(&self) -> u16 {
        self.int
    }

    pub fn size_hint(&self) -> Option<usize> {
        self.size_hint
    }

    fn natural_len(&self) -> usize {
        round_even(format!("{:X}", self.int).len())
    }

    pub fn hex(&self, size: usize) -> String {
        let width = match self.size_hint {
            Some(hint) => hint,
            None if size == 0 => self.natural_len(),
            None => size,
        };
        format!("{:0>width$X}", self.int, width = width)
    }

    pub fn hex_len(&self) -> usize {
        self.size_hint.unwrap_or_else(|| self.natural_len())
    }

    pub fn byte_len(&self) -> usize {
        self.hex_len() / 2
    }
}

/// Raw bytes taken from a delimited string literal, as written for FCC.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StringValue {
    original: String,
    bytes: Vec<u8>,
}

impl StringValue {
    pub fn parse(text: &str) -> Result<StringValue, ValueTypeError> {
        let delimiter = match text.chars().next() {
            Some(ch) => ch,
            None => {
                return Err(ValueTypeError(
                    "string must begin and end with same delimiter".to_string(),
                ))
            }
        };
        if text.len() < 2 || !text.ends_with(delimiter) {
            return Err(ValueTypeError(
                "string must begin and end with same delimiter".to_string(),
            ));
        }
        let inner = &text[delimiter.len_utf8()..text.len() - delimiter.len_utf8()];
        Ok(StringValue {
            original: inner.to_string(),
            bytes: inner.bytes().collect(),
        })
    }

    /// A run of zeroed bytes, used for storage reserved with RMB.
    pub fn zeroes(count: usize) -> StringValue {
        StringValue {
            original: String::new(),
            bytes: vec![0; count],
        }
    }

    pub fn ascii(&self) -> &str {
        &self.original
    }

    pub fn hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02X}", b)).collect()
    }

    pub fn hex_len(&self) -> usize {
        self.bytes.len() * 2
    }
}

/// An unresolved label reference.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolValue {
    name: String,
}

impl SymbolValue {
    pub fn parse(text: &str) -> Result<SymbolValue, ValueTypeError> {
        if !SYMBOL_REGEX.is_match(text) {
            return Err(ValueTypeError(format!("[{}] is not a valid symbol", text)));
        }
        Ok(SymbolValue {
            name: text.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The index of the statement a label is attached to. Exchanged for the
/// statement's concrete address once address assignment has run; the size
/// hint records how wide that final rendering must be.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddressValue {
    index: usize,
    size_hint: Option<usize>,
}

impl AddressValue {
    pub fn new(index: usize) -> AddressValue {
        AddressValue {
            index,
            size_hint: None,
        }
    }

    pub fn with_size_hint(index: usize, size_hint: usize) -> AddressValue {
        AddressValue {
            index,
            size_hint: Some(size_hint),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size_hint(&self) -> Option<usize> {
        self.size_hint
    }

    pub fn hex(&self, size: usize) -> String {
        let natural = round_even(format!("{:X}", self.index).len());
        let width = if size == 0 { natural } else { size };
        format!("{:0>width$X}", self.index, width = width)
    }

    pub fn hex_len(&self) -> usize {
        round_even(format!("{:X}", self.index).len())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    fn from_str(text: &str) -> Operation {
        match text {
            "+" => Operation::Add,
            "-" => Operation::Subtract,
            "*" => Operation::Multiply,
            _ => Operation::Divide,
        }
    }

    fn apply(&self, left: i32, right: i32) -> Result<i32, ValueTypeError> {
        Ok(match self {
            Operation::Add => left + right,
            Operation::Subtract => left - right,
            Operation::Multiply => left * right,
            Operation::Divide => {
                if right == 0 {
                    return Err(ValueTypeError("expression divides by zero".to_string()));
                }
                left / right
            }
        })
    }
}

/// A two-term expression. Terms are numeric literals or symbols; symbols may
/// resolve to addresses, in which case the arithmetic happens on statement
/// indices until the final address-based evaluation during fixup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExpressionValue {
    original: String,
    pub left: Value,
    pub operation: Operation,
    pub right: Value,
}

impl ExpressionValue {
    pub fn parse(text: &str) -> Result<ExpressionValue, ValueTypeError> {
        let caps = EXPRESSION_REGEX
            .captures(text)
            .ok_or_else(|| ValueTypeError(format!("[{}] is not a valid expression", text)))?;
        let left = Self::parse_term(&caps["left"])?;
        let right = Self::parse_term(&caps["right"])?;
        Ok(ExpressionValue {
            original: text.to_string(),
            left,
            operation: Operation::from_str(&caps["operation"]),
            right,
        })
    }

    fn parse_term(text: &str) -> Result<Value, ValueTypeError> {
        if let Ok(numeric) = NumericValue::parse(text) {
            return Ok(Value::Numeric(numeric));
        }
        if let Ok(symbol) = SymbolValue::parse(text) {
            return Ok(Value::Symbol(symbol));
        }
        Err(ValueTypeError(format!(
            "[{}] is not a valid expression",
            text
        )))
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// Resolves both sides against the symbol table without collapsing, so
    /// that address-bearing expressions can be sized before addresses exist.
    pub fn resolve(&self, symbol_table: &SymbolTable) -> Result<ExpressionValue, ValueTypeError> {
        let left = self.left.resolve(symbol_table)?;
        let right = self.right.resolve(symbol_table)?;
        Ok(ExpressionValue {
            original: self.original.clone(),
            left,
            operation: self.operation,
            right,
        })
    }

    /// Collapses a resolved expression to a single value. Numeric pairs fold
    /// to a numeric that keeps the wider operand's rendering width; a numeric
    /// against an address folds on the statement index; two addresses cannot
    /// be combined.
    pub fn collapse(&self) -> Result<Value, ValueTypeError> {
        match (&self.left, &self.right) {
            (Value::Numeric(left), Value::Numeric(right)) => {
                let result = self
                    .operation
                    .apply(i32::from(left.int()), i32::from(right.int()))?;
                let hint = round_even(left.hex_len().max(right.hex_len()));
                Ok(Value::Numeric(NumericValue::from_i32(result, Some(hint))))
            }
            (Value::Address(address), Value::Numeric(numeric)) => {
                let result = self
                    .operation
                    .apply(address.index() as i32, i32::from(numeric.int()))?;
                Self::index_value(result, &self.original)
            }
            (Value::Numeric(numeric), Value::Address(address)) => {
                let result = self
                    .operation
                    .apply(i32::from(numeric.int()), address.index() as i32)?;
                Self::index_value(result, &self.original)
            }
            _ => Err(ValueTypeError(format!(
                "[{}] unresolved expression",
                self.original
            ))),
        }
    }

    fn index_value(result: i32, original: &str) -> Result<Value, ValueTypeError> {
        if result < 0 {
            return Err(ValueTypeError(format!(
                "[{}] unresolved expression",
                original
            )));
        }
        Ok(Value::Address(AddressValue::new(result as usize)))
    }

    /// The statement index referenced by the address side, used to size a
    /// PCR displacement before any address is known.
    pub fn address_index(&self) -> Option<usize> {
        if let Value::Address(address) = &self.left {
            return Some(address.index());
        }
        if let Value::Address(address) = &self.right {
            return Some(address.index());
        }
        None
    }

    /// Evaluates the expression once addresses are assigned, reading the
    /// address side from the referenced statement.
    pub fn evaluate_with_addresses(
        &self,
        addresses: &dyn Fn(usize) -> u16,
    ) -> Result<u16, ValueTypeError> {
        let left = Self::term_int(&self.left, addresses, &self.original)?;
        let right = Self::term_int(&self.right, addresses, &self.original)?;
        let result = self.operation.apply(left, right)?;
        Ok((result & 0xFFFF) as u16)
    }

    fn term_int(
        value: &Value,
        addresses: &dyn Fn(usize) -> u16,
        original: &str,
    ) -> Result<i32, ValueTypeError> {
        match value {
            Value::Numeric(numeric) => Ok(i32::from(numeric.int())),
            Value::Address(address) => Ok(i32::from(addresses(address.index()))),
            _ => Err(ValueTypeError(format!(
                "[{}] unresolved expression",
                original
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn numeric_recognizes_hex() {
        let value = NumericValue::parse("$FF").unwrap();
        assert_eq!(255, value.int());
        assert_eq!("FF", value.hex(0));
    }

    #[test]
    fn numeric_recognizes_decimal() {
        let value = NumericValue::parse("255").unwrap();
        assert_eq!(255, value.int());
    }

    #[test]
    fn numeric_recognizes_binary() {
        let value = NumericValue::parse("%10101010").unwrap();
        assert_eq!(0xAA, value.int());
        assert_eq!("AA", value.hex(0));
    }

    #[test]
    fn numeric_recognizes_character_literal() {
        let value = NumericValue::parse("'C").unwrap();
        assert_eq!(0x43, value.int());
    }

    #[test]
    fn numeric_rejects_long_hex() {
        let err = NumericValue::parse("$12345").unwrap_err();
        assert_eq!("hex value length cannot exceed 4 characters", err.0);
    }

    #[test]
    fn numeric_rejects_large_integer() {
        let err = NumericValue::parse("65536").unwrap_err();
        assert_eq!("integer value cannot exceed 65535", err.0);
    }

    #[test]
    fn numeric_keeps_literal_width() {
        let narrow = NumericValue::parse("$01").unwrap();
        let wide = NumericValue::parse("$0001").unwrap();
        assert_eq!(2, narrow.hex_len());
        assert_eq!(4, wide.hex_len());
        assert_eq!("0001", wide.hex(0));
    }

    #[test]
    fn numeric_hex_pads_to_caller_size() {
        let value = NumericValue::new(5);
        assert_eq!("0005", value.hex(4));
        assert_eq!("05", value.hex(0));
    }

    #[test]
    fn string_requires_matching_delimiters() {
        let err = StringValue::parse("\"hello'").unwrap_err();
        assert_eq!("string must begin and end with same delimiter", err.0);
    }

    #[test]
    fn string_hex_is_ascii_bytes() {
        let value = StringValue::parse("\"hello\"").unwrap();
        assert_eq!("68656C6C6F", value.hex());
        assert_eq!("hello", value.ascii());
    }

    #[test]
    fn symbol_rejects_bad_characters() {
        assert!(SymbolValue::parse("\\bad").is_err());
        assert!(SymbolValue::parse("X@").is_ok());
    }

    #[test]
    fn expression_collapses_numeric_sides() {
        let mut table = SymbolTable::new();
        table.insert(
            "VAR".to_string(),
            Value::Numeric(NumericValue::parse("$02").unwrap()),
        );
        let value = Value::parse("VAR+1", None).unwrap();
        let resolved = value.resolve(&table).unwrap();
        assert_eq!(3, resolved.numeric().unwrap().int());
    }

    #[test]
    fn expression_keeps_wide_operand_width() {
        let mut table = SymbolTable::new();
        table.insert(
            "TEMP".to_string(),
            Value::Numeric(NumericValue::parse("$0001").unwrap()),
        );
        let value = Value::parse("1+TEMP", None).unwrap();
        let resolved = value.resolve(&table).unwrap();
        assert_eq!(4, resolved.hex_len());
    }

    #[test]
    fn expression_address_side_folds_on_index() {
        let mut table = SymbolTable::new();
        table.insert("R".to_string(), Value::Address(AddressValue::new(2)));
        let value = Value::parse("R+1", None).unwrap();
        let resolved = value.resolve(&table).unwrap();
        assert_eq!(3, resolved.address().unwrap().index());
    }

    #[test]
    fn expression_with_two_addresses_fails() {
        let mut table = SymbolTable::new();
        table.insert("A1".to_string(), Value::Address(AddressValue::new(1)));
        table.insert("B1".to_string(), Value::Address(AddressValue::new(2)));
        let value = Value::parse("A1+B1", None).unwrap();
        let err = value.resolve(&table).unwrap_err();
        assert_eq!("[A1+B1] unresolved expression", err.0);
    }

    #[test]
    fn unresolved_symbol_reports_name() {
        let value = Value::parse("MISSING", None).unwrap();
        let err = value.resolve(&SymbolTable::new()).unwrap_err();
        assert_eq!("[MISSING] not in symbol table", err.0);
    }

    #[test]
    fn bytes_render_high_byte_first() {
        let value = Value::Numeric(NumericValue::parse("$0E04").unwrap());
        assert_eq!(vec![0x0E, 0x04], value.bytes());
        assert_eq!(0x0E, value.high_byte());
        assert_eq!(0x04, value.low_byte());
    }
}
