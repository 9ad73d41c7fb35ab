//! The top-level driver: include splicing, macro extraction and expansion,
//! symbol table construction, translation, the PCR sizing fixpoint, address
//! assignment, branch fixup, and emission.
//!
//! Each stage walks the statement list in index order; nothing here runs
//! concurrently, and the symbol table is only mutated again at the very end
//! when address-typed entries are rewritten to concrete addresses.

use crate::error::{AssemblerError, MacroError, TranslationError};
use crate::macros::{local_label, MACRO_LABEL_STRINGS, MACRO_VALUE_STRINGS};
use crate::statement::Statement;
use crate::values::{AddressValue, SymbolTable, Value};
use log::debug;
use matches::debug_assert_matches;
use std::collections::{HashMap, HashSet};

/// Supplies the contents of files named by INCLUDE statements. The core
/// never touches the filesystem itself.
pub trait SourceReader {
    fn read_source(&self, filename: &str) -> Result<Vec<String>, AssemblerError>;
}

/// A reader for programs that must not pull in any include files.
pub struct NoIncludes;

impl SourceReader for NoIncludes {
    fn read_source(&self, filename: &str) -> Result<Vec<String>, AssemblerError> {
        Err(AssemblerError::Io(format!("[{}] file not found", filename)))
    }
}

#[derive(Debug)]
pub struct Program {
    statements: Vec<Statement>,
    symbol_table: SymbolTable,
    symbol_order: Vec<String>,
    macros: HashMap<String, Vec<Statement>>,
    origin: Value,
    exec_address: Option<Value>,
    name: Option<String>,
    line_length: usize,
}

impl Default for Program {
    fn default() -> Program {
        Program::new()
    }
}

impl Program {
    pub fn new() -> Program {
        Program {
            statements: Vec::new(),
            symbol_table: SymbolTable::new(),
            symbol_order: Vec::new(),
            macros: HashMap::new(),
            origin: Value::None,
            exec_address: None,
            name: None,
            line_length: 0,
        }
    }

    /// Assembles the given source lines. `line_length` truncates listing
    /// output; zero leaves lines untruncated.
    pub fn process<S: AsRef<str>>(
        &mut self,
        contents: &[S],
        reader: &dyn SourceReader,
        line_length: usize,
    ) -> Result<(), AssemblerError> {
        self.line_length = line_length;
        self.statements = Self::parse(contents, line_length)?;
        self.translate_statements(reader)
    }

    /// Parses source lines into statements, dropping blank and comment-only
    /// lines.
    pub fn parse<S: AsRef<str>>(
        contents: &[S],
        line_length: usize,
    ) -> Result<Vec<Statement>, AssemblerError> {
        let mut statements = Vec::new();
        for line in contents {
            let mut statement = Statement::parse(line.as_ref())?;
            if !statement.is_empty() && !statement.is_comment_only() {
                statement.set_line_length(line_length);
                statements.push(statement);
            }
        }
        Ok(statements)
    }

    /// Splices include files in place and excises macro bodies into the
    /// macro table. Macros found inside included files merge into the
    /// surrounding table. Include cycles are not detected.
    fn process_mnemonics(
        statements: Vec<Statement>,
        reader: &dyn SourceReader,
        line_length: usize,
    ) -> Result<(Vec<Statement>, HashMap<String, Vec<Statement>>), AssemblerError> {
        let mut spliced = Vec::new();
        let mut macros = HashMap::new();

        for statement in statements {
            let filename = statement.include_filename().map(str::to_string);
            match filename {
                Some(filename) => {
                    debug!("splicing include file {}", filename);
                    let contents = reader.read_source(&filename)?;
                    let parsed = Self::parse(&contents, line_length)?;
                    let (included, included_macros) =
                        Self::process_mnemonics(parsed, reader, line_length)?;
                    spliced.extend(included);
                    macros.extend(included_macros);
                }
                None => spliced.push(statement),
            }
        }

        let mut final_statements = Vec::new();
        let mut in_macro_definition = false;
        let mut macro_label = String::new();

        for statement in spliced {
            if statement.is_start_macro() && in_macro_definition {
                return Err(MacroError(format!(
                    "Nested macro definition detected in macro [{}]",
                    macro_label
                ))
                .into());
            } else if statement.is_start_macro() {
                in_macro_definition = true;
                macro_label = statement.label().to_string();
                if macros.contains_key(&macro_label) {
                    return Err(MacroError(format!(
                        "Macro [{}] has multiple definitions",
                        macro_label
                    ))
                    .into());
                }
                macros.insert(macro_label.clone(), Vec::new());
            } else if statement.is_end_macro() {
                in_macro_definition = false;
                macro_label.clear();
            } else if in_macro_definition {
                macros.get_mut(&macro_label).unwrap().push(statement);
            } else {
                final_statements.push(statement);
            }
        }

        if in_macro_definition {
            return Err(MacroError(format!(
                "Macro defined but ENDM not found when parsing macro [{}]",
                macro_label
            ))
            .into());
        }

        Ok((final_statements, macros))
    }

    /// Rewrites one macro call into its expanded statements. Positional
    /// markers take the call's operands verbatim; local-label markers take a
    /// generated name from the per-letter counters, which bump once for
    /// every call that mentions the letter.
    fn expand_macro_call(
        call: &Statement,
        macros: &HashMap<String, Vec<Statement>>,
        counts: &mut HashMap<&'static str, usize>,
        line_length: usize,
    ) -> Result<Vec<Statement>, AssemblerError> {
        let body = macros.get(call.macro_name()).ok_or_else(|| {
            MacroError(format!(
                "No macro named [{}] has been defined",
                call.macro_name()
            ))
        })?;

        let mut observed: HashSet<&'static str> = HashSet::new();
        let mut expanded = Vec::new();
        for template in body {
            let mut line = template.original_line().to_string();
            for (index, marker) in MACRO_VALUE_STRINGS.iter().copied().enumerate() {
                if line.contains(marker) {
                    line = line.replace(marker, &call.macro_operands()[index]);
                }
            }
            for marker in MACRO_LABEL_STRINGS.iter().copied() {
                if line.contains(marker) {
                    observed.insert(marker);
                    line = line.replace(marker, &local_label(marker, counts[marker]));
                }
            }
            let mut statement = Statement::parse(&line)?;
            if !statement.is_empty() && !statement.is_comment_only() {
                statement.set_line_length(line_length);
                expanded.push(statement);
            }
        }
        for marker in observed {
            *counts.get_mut(marker).unwrap() += 1;
        }
        Ok(expanded)
    }

    /// Binds a statement's label: EQU and SET bind the operand's value, any
    /// other statement binds the statement's index.
    fn save_symbol(&mut self, index: usize) -> Result<(), AssemblerError> {
        let statement = &self.statements[index];
        if statement.label().is_empty() {
            return Ok(());
        }
        let label = statement.label().to_string();
        if self.symbol_table.contains_key(&label) {
            return Err(TranslationError::new(
                format!("Label [{}] redefined", label),
                statement.listing(),
            )
            .into());
        }
        let value = if statement.is_pseudo_define() {
            statement.operand().value().cloned().unwrap_or(Value::None)
        } else {
            Value::Address(AddressValue::new(index))
        };
        self.symbol_table.insert(label.clone(), value);
        self.symbol_order.push(label);
        Ok(())
    }

    /// Runs every pass after initial parsing, in order.
    pub fn translate_statements(
        &mut self,
        reader: &dyn SourceReader,
    ) -> Result<(), AssemblerError> {
        let statements = std::mem::take(&mut self.statements);
        let (processed, macros) = Self::process_mnemonics(statements, reader, self.line_length)?;
        self.macros = macros;

        debug!(
            "expanding macro calls across {} statements",
            processed.len()
        );
        let mut counts: HashMap<&'static str, usize> = MACRO_LABEL_STRINGS
            .iter()
            .map(|marker| (*marker, 0))
            .collect();
        let mut expanded = Vec::new();
        for statement in processed {
            if statement.is_macro_call() {
                expanded.extend(Self::expand_macro_call(
                    &statement,
                    &self.macros,
                    &mut counts,
                    self.line_length,
                )?);
            } else {
                expanded.push(statement);
            }
        }
        self.statements = expanded;

        debug!("building symbol table");
        for index in 0..self.statements.len() {
            self.save_symbol(index)?;
        }

        debug!("resolving operands");
        let symbol_table = &self.symbol_table;
        for statement in self.statements.iter_mut() {
            statement.resolve_symbols(symbol_table)?;
        }

        debug!("translating statements");
        for statement in self.statements.iter_mut() {
            statement.translate()?;
        }

        debug!("sizing PCR displacements");
        while !self.all_sizes_fixed() {
            let mut changed = false;
            for index in 0..self.statements.len() {
                if self.statements[index].fixed_size() {
                    continue;
                }
                if let Some(commit) = self.statements[index].pcr_size_plan(&self.statements, index)
                {
                    self.statements[index].commit_pcr_size(commit);
                    changed = true;
                }
            }
            if !changed {
                let listing = self
                    .statements
                    .iter()
                    .find(|statement| !statement.fixed_size())
                    .map(Statement::listing)
                    .unwrap_or_default();
                return Err(TranslationError::new(
                    "unable to resolve program counter relative sizes",
                    listing,
                )
                .into());
            }
        }

        debug!("assigning addresses");
        let mut address: u16 = 0;
        for statement in self.statements.iter_mut() {
            address = statement.set_address(address);
            address = address.wrapping_add(statement.code_pkg.size as u16);
        }

        debug!("fixing branch and PCR displacements");
        for index in 0..self.statements.len() {
            let update = self.statements[index].address_fixup(&self.statements, index)?;
            if let Some(value) = update {
                self.statements[index].code_pkg.additional = value;
            }
        }

        // Exchange address-typed symbols for the concrete addresses.
        let rewrites: Vec<(String, Value)> = self
            .symbol_table
            .iter()
            .filter_map(|(name, value)| {
                value.address().map(|address| {
                    debug_assert_matches!(
                        self.statements[address.index()].code_pkg.address,
                        Value::Numeric(_)
                    );
                    (
                        name.clone(),
                        self.statements[address.index()].code_pkg.address.clone(),
                    )
                })
            })
            .collect();
        for (name, value) in rewrites {
            self.symbol_table.insert(name, value);
        }

        for statement in &self.statements {
            if statement.is_origin() {
                self.origin = statement.code_pkg.address.clone();
                if self.exec_address.is_none() {
                    self.exec_address = Some(statement.code_pkg.address.clone());
                }
            }
            if statement.is_name() {
                self.name = Some(statement.operand().operand_string().to_string());
            }
            if statement.is_end() {
                let target = statement.operand().operand_string();
                if !target.is_empty() {
                    if let Some(value) = self.symbol_table.get(target) {
                        if value.is_numeric() {
                            self.exec_address = Some(value.clone());
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn all_sizes_fixed(&self) -> bool {
        self.statements.iter().all(Statement::fixed_size)
    }

    /// The emitted machine code for the whole program.
    pub fn binary_array(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for statement in &self.statements {
            if statement.is_empty() || statement.is_comment_only() {
                continue;
            }
            bytes.extend(statement.code_pkg.bytes());
        }
        bytes
    }

    /// One line per symbol, in definition order.
    pub fn symbol_table_listing(&self) -> Vec<String> {
        self.symbol_order
            .iter()
            .map(|name| format!("${:<4} {}", self.symbol_table[name].hex(0), name))
            .collect()
    }

    /// One listing line per assembled statement.
    pub fn statement_listing(&self) -> Vec<String> {
        self.statements.iter().map(Statement::listing).collect()
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbol_table
    }

    pub fn origin(&self) -> &Value {
        &self.origin
    }

    pub fn exec_address(&self) -> Option<&Value> {
        self.exec_address.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
