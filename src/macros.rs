//! Marker strings recognised inside macro bodies.
//!
//! `\0`-`\9` and `\A`-`\Z` are positional argument slots, replaced verbatim
//! by the call's operands. `\.A`-`\.Z` are macro-local labels, rewritten to a
//! generated `<letter>NNNNN` name so that repeated expansions of the same
//! macro never collide in the symbol table.

/// Positional argument markers, in substitution order. A macro call may
/// supply up to 36 operands.
pub const MACRO_VALUE_STRINGS: [&str; 36] = [
    r"\0", r"\1", r"\2", r"\3", r"\4", r"\5", r"\6", r"\7", r"\8", r"\9",
    r"\A", r"\B", r"\C", r"\D", r"\E", r"\F", r"\G", r"\H", r"\I", r"\J",
    r"\K", r"\L", r"\M", r"\N", r"\O", r"\P", r"\Q", r"\R", r"\S", r"\T",
    r"\U", r"\V", r"\W", r"\X", r"\Y", r"\Z",
];

/// Local label markers. Each letter keeps its own counter, bumped once per
/// macro call that mentions it.
pub const MACRO_LABEL_STRINGS: [&str; 26] = [
    r"\.A", r"\.B", r"\.C", r"\.D", r"\.E", r"\.F", r"\.G", r"\.H", r"\.I",
    r"\.J", r"\.K", r"\.L", r"\.M", r"\.N", r"\.O", r"\.P", r"\.Q", r"\.R",
    r"\.S", r"\.T", r"\.U", r"\.V", r"\.W", r"\.X", r"\.Y", r"\.Z",
];

/// The label generated for a local marker: the marker's letter followed by a
/// five-digit expansion counter.
pub fn local_label(marker: &str, count: usize) -> String {
    format!("{}{:05}", marker.trim_start_matches(r"\."), count)
}

/// The maximum number of operands a macro call accepts.
pub const MACRO_OPERAND_COUNT: usize = 36;
