use crate::assemble;
use crate::error::AssemblerError;
use crate::program::{Program, SourceReader};
use std::collections::HashMap;

fn assemble_lines(lines: &[&str]) -> Program {
    let mut program = Program::new();
    program
        .process(lines, &crate::NoIncludes, 0)
        .expect("assembly failed");
    program
}

fn assemble_error(lines: &[&str]) -> AssemblerError {
    let mut program = Program::new();
    program.process(lines, &crate::NoIncludes, 0).unwrap_err()
}

#[test]
fn expression_addition_with_address_on_left() {
    let program = assemble_lines(&[
        "     ORG $0E00",
        "V    STX R+1",
        "R    FCB 0",
        "     FCB 0",
    ]);
    assert_eq!(vec![0xBF, 0x0E, 0x04, 0x00, 0x00], program.binary_array());
}

#[test]
fn expression_subtraction_with_address_on_left() {
    let program = assemble_lines(&[
        "     ORG $0E00",
        "V    STX R-1",
        "     FCB 0",
        "R    FCB 0",
    ]);
    assert_eq!(vec![0xBF, 0x0E, 0x03, 0x00, 0x00], program.binary_array());
}

#[test]
fn program_counter_relative_8_bit_offset_reverse() {
    let program = assemble_lines(&[
        "     ORG $0600",
        "V    FCB 0",
        "B    LDA $FF",
        "     STY V,PCR",
        "     END B",
    ]);
    assert_eq!(
        vec![0x00, 0x96, 0xFF, 0x10, 0xAF, 0x8C, 0xF9],
        program.binary_array()
    );
}

#[test]
fn program_counter_relative_8_bit_offset_forward() {
    let program = assemble_lines(&[
        "     ORG $0600",
        "B    LDA $FF",
        "     STY V,PCR",
        "     INCA",
        "V    FCB 0",
        "     END B",
    ]);
    assert_eq!(
        vec![0x96, 0xFF, 0x10, 0xAF, 0x8C, 0x01, 0x4C, 0x00],
        program.binary_array()
    );
}

#[test]
fn program_counter_relative_indirect_8_bit_offset_reverse() {
    let program = assemble_lines(&[
        "     ORG $0600",
        "V    FCB 0",
        "B    LDA $FF",
        "     STY [V,PCR]",
        "     END B",
    ]);
    assert_eq!(
        vec![0x00, 0x96, 0xFF, 0x10, 0xAF, 0x9C, 0xF9],
        program.binary_array()
    );
}

#[test]
fn load_effective_address_pcr_picks_8_bit() {
    let program = assemble_lines(&[
        "     ORG $0600",
        "B    LEAX Z,PCR",
        "     LDA $FF",
        "Z    RTS",
        "     END B",
    ]);
    assert_eq!(
        vec![0x30, 0x8C, 0x02, 0x96, 0xFF, 0x39],
        program.binary_array()
    );
}

#[test]
fn program_counter_relative_forces_16_bit_over_long_spans() {
    let mut lines = vec!["     ORG $0600".to_string(), "B    LDX Z,PCR".to_string()];
    for _ in 0..255 {
        lines.push("     NOP".to_string());
    }
    lines.push("Z    RTS".to_string());
    lines.push("     END B".to_string());

    let mut program = Program::new();
    program
        .process(&lines, &crate::NoIncludes, 0)
        .expect("assembly failed");
    let bytes = program.binary_array();
    assert_eq!(&[0xAE, 0x8D, 0x00, 0xFF], &bytes[..4]);
    assert_eq!(0x39, *bytes.last().unwrap());
    assert_eq!(4 + 255 + 1, bytes.len());
}

#[test]
fn pcr_literal_widths_follow_the_literal() {
    assert_eq!(
        vec![0xAF, 0x8C, 0x01],
        assemble("     STX 1,PCR").unwrap().binary_array()
    );
    assert_eq!(
        vec![0xAF, 0x8D, 0x01, 0x02],
        assemble("     STX 258,PCR").unwrap().binary_array()
    );
    assert_eq!(
        vec![0xAF, 0x9D, 0x01, 0x02],
        assemble("     STX [$0102,PCR]").unwrap().binary_array()
    );
}

#[test]
fn pcr_expression_width_follows_the_symbol_width() {
    let narrow = assemble_lines(&["TEMP  EQU $01", "START STX 1+TEMP,PCR"]);
    assert_eq!(vec![0xAF, 0x8C, 0x02], narrow.binary_array());

    let wide = assemble_lines(&["TEMP  EQU $0001", "START STX 1+TEMP,PCR"]);
    assert_eq!(vec![0xAF, 0x8D, 0x00, 0x02], wide.binary_array());
}

#[test]
fn pcr_expression_with_address_writes_resolved_value() {
    let program = assemble_lines(&["       STX 1+ADDR,PCR", "ADDR   NOP"]);
    assert_eq!(vec![0xAF, 0x8C, 0x04, 0x12], program.binary_array());

    let indirect = assemble_lines(&["       STX [1+ADDR,PCR]", "ADDR   NOP"]);
    assert_eq!(vec![0xAF, 0x9C, 0x04, 0x12], indirect.binary_array());
}

#[test]
fn stack_and_transfer_post_bytes() {
    assert_eq!(
        vec![0x34, 0x37],
        assemble("  PSHS CC,D,X,Y").unwrap().binary_array()
    );
    assert_eq!(
        vec![0x1F, 0x12],
        assemble("  TFR X,Y").unwrap().binary_array()
    );
}

#[test]
fn exchange_across_register_widths_fails() {
    let err = assemble("  EXG A,D").unwrap_err();
    assert_eq!("[EXG] of [A] to [D] not allowed", err.to_string());
}

#[test]
fn macro_expansion_with_arguments_and_local_label() {
    let program = assemble_lines(&[
        r"LOADER MACRO",
        r"       LDA \0",
        r"       LDB \1",
        r"       CMPA #$02",
        r"       BEQ \.B",
        r"       LDX \2",
        r"\.B    LDY \3",
        r"       ENDM",
        r"       LOADER #$00,#$03,#$0000,#$FFFF",
    ]);
    assert_eq!(
        vec![
            0x86, 0x00, 0xC6, 0x03, 0x81, 0x02, 0x27, 0x03, 0x8E, 0x00, 0x00, 0x10, 0x8E, 0xFF,
            0xFF
        ],
        program.binary_array()
    );
}

#[test]
fn macro_local_labels_number_per_expansion() {
    let program = assemble_lines(&[
        "        ORG $0600",
        "MYMACRO MACRO",
        r"\.A    LDA #$FF",
        r"       JMP \.A",
        "        ENDM",
        "        MYMACRO",
        "        MYMACRO",
    ]);
    let listing = program.statement_listing();
    assert_eq!(
        "$0600 86FF           A00000   LDA #$FF                           ;                                         ",
        listing[1]
    );
    assert_eq!(
        "$0602 7E0600                  JMP A00000                         ;                                         ",
        listing[2]
    );
    assert_eq!(
        "$0605 86FF           A00001   LDA #$FF                           ;                                         ",
        listing[3]
    );
    assert_eq!(
        "$0607 7E0605                  JMP A00001                         ;                                         ",
        listing[4]
    );
}

#[test]
fn macro_without_endm_fails() {
    let err = assemble_error(&["MYMACRO MACRO"]);
    assert_eq!(
        "Macro defined but ENDM not found when parsing macro [MYMACRO]",
        err.to_string()
    );
}

#[test]
fn macro_redefinition_fails() {
    let err = assemble_error(&[
        "MYMACRO MACRO",
        "        ENDM",
        "MYMACRO MACRO",
        "        ENDM",
    ]);
    assert_eq!(
        "Macro [MYMACRO] has multiple definitions",
        err.to_string()
    );
}

#[test]
fn nested_macro_definition_fails() {
    let err = assemble_error(&[
        "MYMACRO1 MACRO",
        "NEWMACRO MACRO",
        "         ENDM",
        "         ENDM",
    ]);
    assert_eq!(
        "Nested macro definition detected in macro [MYMACRO1]",
        err.to_string()
    );
}

#[test]
fn undefined_macro_call_fails() {
    let err = assemble_error(&["   NOSUCH #$01"]);
    assert_eq!(
        "No macro named [NOSUCH] has been defined",
        err.to_string()
    );
}

#[test]
fn duplicate_label_fails() {
    let err = assemble_error(&["X    NOP", "X    NOP"]);
    assert_eq!("Label [X] redefined", err.to_string());
}

#[test]
fn short_branch_backward_range_is_checked() {
    let mut lines = vec!["  ORG $0600".to_string(), "START LDA #$01".to_string()];
    for _ in 0..400 {
        lines.push("    LDA #$01".to_string());
    }
    lines.push("  BRA START".to_string());
    let mut program = Program::new();
    let err = program.process(&lines, &crate::NoIncludes, 0).unwrap_err();
    assert_eq!(
        "short relative branch cannot be less than -128 bytes",
        err.to_string()
    );
}

#[test]
fn short_branch_forward_range_is_checked() {
    let mut lines = vec!["  ORG $0600".to_string(), "START BRA THEEND".to_string()];
    for _ in 0..400 {
        lines.push("    LDA #$01".to_string());
    }
    lines.push("THEEND  LDA #$01".to_string());
    let mut program = Program::new();
    let err = program.process(&lines, &crate::NoIncludes, 0).unwrap_err();
    assert_eq!(
        "short relative branch cannot be more than 127 bytes",
        err.to_string()
    );
}

#[test]
fn long_branch_reaches_past_the_short_window() {
    let mut lines = vec!["  ORG $0600".to_string(), "START LDA #$01".to_string()];
    for _ in 0..400 {
        lines.push("    LDA #$01".to_string());
    }
    lines.push("  LBRA START".to_string());
    let mut program = Program::new();
    program.process(&lines, &crate::NoIncludes, 0).unwrap();
    let bytes = program.binary_array();
    // 802 statement bytes back to the target, the branch itself, plus one.
    assert_eq!(&[0x16, 0xFC, 0xDB], &bytes[bytes.len() - 3..]);
}

#[test]
fn end_with_symbol_sets_exec_address() {
    let program = assemble_lines(&[
        "  NAM EXECADDR",
        "  ORG $0600",
        "  FCB $01",
        "START LDA #$00",
        "  END START",
    ]);
    assert_eq!(Some("EXECADDR"), program.name());
    assert_eq!(
        0x0601,
        program.exec_address().unwrap().numeric().unwrap().int()
    );
}

#[test]
fn end_without_symbol_leaves_exec_at_origin() {
    let program = assemble_lines(&[
        "  ORG $0600",
        "  FCB $01",
        "START LDA #$00",
        "  END",
    ]);
    assert_eq!(
        0x0600,
        program.exec_address().unwrap().numeric().unwrap().int()
    );
    assert_eq!(0x0600, program.origin().numeric().unwrap().int());
}

#[test]
fn character_and_binary_literals() {
    let program = assemble_lines(&[
        "  ORG $0600",
        "START LDA #'C",
        "  LDB #%10101010",
        "  END START",
    ]);
    assert_eq!(vec![0x86, 0x43, 0xC6, 0xAA], program.binary_array());
}

#[test]
fn string_definition_emits_ascii() {
    let program = assemble_lines(&["         FCC \"PRESS S TO RESTART,\""]);
    assert_eq!(
        vec![
            0x50, 0x52, 0x45, 0x53, 0x53, 0x20, 0x53, 0x20, 0x54, 0x4F, 0x20, 0x52, 0x45, 0x53,
            0x54, 0x41, 0x52, 0x54, 0x2C
        ],
        program.binary_array()
    );
}

#[test]
fn storage_directives_reserve_and_define() {
    let program = assemble_lines(&[
        "  ORG $0600",
        "  RMB 4",
        "  FDB $FFCC",
        "  FCB $0A",
        "START LDA #$01",
        "  END START",
    ]);
    assert_eq!(
        vec![0x00, 0x00, 0x00, 0x00, 0xFF, 0xCC, 0x0A, 0x86, 0x01],
        program.binary_array()
    );
    assert_eq!(
        0x0607,
        program.exec_address().unwrap().numeric().unwrap().int()
    );
}

#[test]
fn explicit_direct_and_extended_prefixes() {
    assert_eq!(
        vec![0x96, 0x01],
        assemble("START    LDA <$01").unwrap().binary_array()
    );
    assert_eq!(
        vec![0xB6, 0x00, 0x01],
        assemble("START    LDA >$0001").unwrap().binary_array()
    );
    assert_eq!(
        vec![0x9E, 0x88],
        assemble("      LDX <$88").unwrap().binary_array()
    );
}

#[test]
fn immediate_symbol_expression() {
    let program = assemble_lines(&[
        "VAR      EQU $01",
        "         ORG $0100",
        "         LDA #VAR+1",
    ]);
    assert_eq!(vec![0x86, 0x02], program.binary_array());
}

#[test]
fn sixteen_bit_immediate_pads_to_the_mode_width() {
    let program = assemble_lines(&["VAR      EQU $002", "         LDD #VAR+1"]);
    assert_eq!(vec![0xCC, 0x00, 0x03], program.binary_array());
}

#[test]
fn labels_with_at_signs_resolve() {
    let program = assemble_lines(&[
        "         ORG $0100",
        "START    LDA #$01",
        "         LDA X@",
        "X@       FCB 0",
    ]);
    assert_eq!(
        vec![0x86, 0x01, 0xB6, 0x01, 0x05, 0x00],
        program.binary_array()
    );
}

#[test]
fn forward_label_resolves_to_same_address_as_definition() {
    let program = assemble_lines(&[
        "     ORG $0600",
        "     LDX TABLE",
        "TABLE FDB $1234",
    ]);
    assert_eq!(
        vec![0xBE, 0x06, 0x03, 0x12, 0x34],
        program.binary_array()
    );
    assert_eq!(
        0x0603,
        program.symbol_table()["TABLE"].numeric().unwrap().int()
    );
}

#[test]
fn org_restarts_the_address_counter() {
    let program = assemble_lines(&[
        "     ORG $0600",
        "A1   NOP",
        "     ORG $0700",
        "A2   NOP",
    ]);
    assert_eq!(0x0600, program.symbol_table()["A1"].numeric().unwrap().int());
    assert_eq!(0x0700, program.symbol_table()["A2"].numeric().unwrap().int());
}

#[test]
fn symbol_table_listing_shows_final_addresses() {
    let program = assemble_lines(&[
        "VAR  EQU $1F",
        "     ORG $0600",
        "START LDA #VAR",
        "     END START",
    ]);
    assert_eq!(
        vec!["$1F   VAR".to_string(), "$0600 START".to_string()],
        program.symbol_table_listing()
    );
}

#[test]
fn listing_truncates_to_the_configured_width() {
    let mut program = Program::new();
    program
        .process(
            &[
                "  NAM EXECADDR",
                "  ORG $0600",
                "  FCB $01",
                "START LDA #$00",
                "  END START",
            ],
            &crate::NoIncludes,
            35,
        )
        .unwrap();
    assert_eq!(
        vec![
            "$0000                         NAM E",
            "$0600                         ORG $",
            "$0600 01                      FCB $",
            "$0601 8600            START   LDA #",
            "$0603                         END S",
        ],
        program.statement_listing()
    );
}

struct MapReader(HashMap<String, Vec<String>>);

impl SourceReader for MapReader {
    fn read_source(&self, filename: &str) -> Result<Vec<String>, AssemblerError> {
        self.0
            .get(filename)
            .cloned()
            .ok_or_else(|| AssemblerError::Io(format!("[{}] file not found", filename)))
    }
}

#[test]
fn include_files_splice_in_place() {
    let mut files = HashMap::new();
    files.insert(
        "global.asm".to_string(),
        vec!["VAR  EQU $1F".to_string()],
    );
    let reader = MapReader(files);
    let mut program = Program::new();
    program
        .process(
            &["  INCLUDE global.asm", "  ORG $0600", "  LDA #VAR"],
            &reader,
            0,
        )
        .unwrap();
    assert_eq!(vec![0x86, 0x1F], program.binary_array());
}

#[test]
fn macros_inside_includes_merge_into_the_program() {
    let mut files = HashMap::new();
    files.insert(
        "macros.asm".to_string(),
        vec![
            "TWICE MACRO".to_string(),
            r"      LDA \0".to_string(),
            r"      LDA \0".to_string(),
            "      ENDM".to_string(),
        ],
    );
    let reader = MapReader(files);
    let mut program = Program::new();
    program
        .process(
            &["  INCLUDE macros.asm", "  ORG $0600", "  TWICE #$05"],
            &reader,
            0,
        )
        .unwrap();
    assert_eq!(vec![0x86, 0x05, 0x86, 0x05], program.binary_array());
}

#[test]
fn missing_include_reports_the_filename() {
    let mut program = Program::new();
    let err = program
        .process(&["  INCLUDE missing.asm"], &crate::NoIncludes, 0)
        .unwrap_err();
    assert_eq!("[missing.asm] file not found", err.to_string());
}

#[test]
fn total_emission_matches_statement_sizes() {
    let program = assemble_lines(&[
        "     ORG $0600",
        "START LDA #$01",
        "     LDX TABLE",
        "     BRA START",
        "TABLE FDB $0000",
        "     END START",
    ]);
    let total: usize = program
        .statements()
        .iter()
        .map(|statement| statement.code_pkg.size)
        .sum();
    assert_eq!(total, program.binary_array().len());
}
