//! Cross-assembler for the Motorola 6809 as shipped in the Tandy Color
//! Computer family.
//!
//! The assembler is strictly staged: source lines parse into
//! [`Statement`](statement::Statement)s, include files splice in, macro
//! definitions are excised and their calls expanded, labels bind in the
//! symbol table, operands resolve, every statement translates to a code
//! package, PC-relative displacement widths settle through an iterative
//! fixpoint, addresses are assigned from the most recent ORG, branch and PCR
//! displacements are fixed, and the byte stream is emitted.
//!
//! Source statements have the form:
//!
//! ```text
//! LABEL   MNEMONIC   OPERAND   ; COMMENT
//! ```
//!
//! Alongside the 6809 instruction set the assembler understands the
//! directives `END`, `ORG`, `EQU`, `SET`, `RMB`, `FCB`, `FDB`, `FCC`,
//! `SETDP`, `INCLUDE`, `NAM`, and `MACRO`/`ENDM` definitions whose calls may
//! pass up to 36 positional arguments (`\0`-`\9`, `\A`-`\Z`) and use
//! hygienic local labels (`\.A`-`\.Z`).

pub mod error;
pub mod instructions;
pub mod macros;
pub mod operands;
pub mod program;
pub mod statement;
pub mod values;

#[cfg(test)]
mod test;

pub use crate::error::AssemblerError;
pub use crate::program::{NoIncludes, Program, SourceReader};

/// Assembles a complete source text with no include resolution. The main
/// entry point for callers that already hold the whole program in memory.
pub fn assemble(source: &str) -> Result<Program, AssemblerError> {
    let lines: Vec<&str> = source.lines().collect();
    let mut program = Program::new();
    program.process(&lines, &NoIncludes, 0)?;
    Ok(program)
}
