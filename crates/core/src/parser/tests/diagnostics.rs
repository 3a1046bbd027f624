use super::*;

fn error_for(source: &str) -> Diagnostic {
    parse(SourceId(0), source).expect_err("expected a syntax error")
}

#[test]
fn unclosed_block_points_at_opening_brace() {
    let err = error_for(".scope s {\n nop\n");
    assert_eq!(err.message, "unclosed block");
    assert_eq!(err.labels.len(), 1);
    assert_eq!(err.labels[0].span.start, 9);
}

#[test]
fn stray_else() {
    let err = error_for(".else {\n}\n");
    assert!(err.message.contains(".else without"));
}

#[test]
fn unknown_map_attribute() {
    let err = error_for(".map identifier=1 banks=1, 2\n");
    assert!(err.message.contains("unknown mapping attribute 'banks'"));
}

#[test]
fn incomplete_map() {
    let err = error_for(".map identifier=1 mask=0x8000\n");
    assert!(err.message.contains("missing bank_range, addr_range"), "{}", err.message);
}

#[test]
fn unknown_struct_field_type() {
    let err = error_for(".struct s {\n dword x\n}\n");
    assert!(err.message.contains("unknown field type 'dword'"));
    assert!(err.help().is_some());
}

#[test]
fn bare_identifier_suggests_label() {
    let err = error_for("start\n nop\n");
    assert!(err.help().is_some_and(|help| help.contains("':'")));
}

#[test]
fn mismatched_parenthesis() {
    let err = error_for(".db (1 + 2\n");
    assert!(err.message.contains("mismatched parenthesis"), "{}", err.message);
}

#[test]
fn scan_errors_surface_from_parse() {
    let err = error_for("lda $10\n");
    assert!(err.message.contains("unexpected character '$'"));
}

#[test]
fn double_quoted_strings_are_rejected() {
    let err = error_for(".ascii \"ab\"\n");
    assert!(err.message.starts_with("unexpected character"), "{}", err.message);
    assert_eq!(err.primary.start, 7);
}
