use super::*;

#[test]
fn labels_and_instructions_on_one_line() {
    let block = parse_ok("loop: dex\n bne loop\n");
    assert_eq!(block.len(), 3);
    assert_eq!(block[0].node, Stmt::Label("loop".to_string()));
    assert!(matches!(&block[2].node, Stmt::Opcode(op) if op.mnemonic == "bne"));
}

#[test]
fn assignments_with_both_operators() {
    let Stmt::Assign { name, value } = only_stmt("speed = 0x10\n") else {
        panic!("expected assignment");
    };
    assert_eq!(name, "speed");
    assert_eq!(value.items.len(), 1);

    assert!(matches!(only_stmt("x_pos := speed * 2\n"), Stmt::Assign { .. }));
}

#[test]
fn code_position_and_relocation() {
    assert!(matches!(only_stmt("*=0x008000\n"), Stmt::CodePosition(_)));
    assert!(matches!(only_stmt("@=0x7EFFFF\n"), Stmt::Relocation(_)));
}

#[test]
fn macro_definition_and_application() {
    let block = parse_ok(".macro load(value, body) {\n lda #value\n {{body}}\n}\nload(3, { nop })\n");
    assert_eq!(block.len(), 2);

    let Stmt::MacroDef { name, params, body } = &block[0].node else {
        panic!("expected macro definition");
    };
    assert_eq!(name, "load");
    assert_eq!(params, &["value", "body"]);
    assert_eq!(body.len(), 2);
    assert_eq!(body[1].node, Stmt::CodeLookup("body".to_string()));

    let Stmt::MacroApply { name, args } = &block[1].node else {
        panic!("expected macro application");
    };
    assert_eq!(name, "load");
    assert!(matches!(args[0], MacroArg::Expr(_)));
    assert!(matches!(&args[1], MacroArg::Block(code) if code.len() == 1));
}

#[test]
fn macro_without_parameters() {
    let block = parse_ok(".macro init() {\n sei\n}\ninit()\n");
    assert!(matches!(&block[0].node, Stmt::MacroDef { params, .. } if params.is_empty()));
    assert!(matches!(&block[1].node, Stmt::MacroApply { args, .. } if args.is_empty()));
}

#[test]
fn named_and_anonymous_scopes() {
    let block = parse_ok(".scope player {\n hp = 3\n}\n{\n nop\n}\n");
    assert!(matches!(&block[0].node, Stmt::NamedScope { name, body } if name == "player" && body.len() == 1));
    assert!(matches!(&block[1].node, Stmt::Compound(body) if body.len() == 1));
}

#[test]
fn conditional_with_else() {
    let Stmt::If {
        then_block,
        else_block,
        ..
    } = only_stmt(".if DEBUG {\n brk\n} .else {\n nop\n nop\n}\n")
    else {
        panic!("expected .if");
    };
    assert_eq!(then_block.len(), 1);
    assert_eq!(else_block.map(|block| block.len()), Some(2));
}

#[test]
fn for_loop() {
    let Stmt::For { var, body, .. } = only_stmt(".for k := 1, 128 {\n .dw k\n}\n") else {
        panic!("expected .for");
    };
    assert_eq!(var, "k");
    assert_eq!(body.len(), 1);
}

#[test]
fn struct_fields() {
    let Stmt::Struct { name, fields } = only_stmt(".struct actor {\n byte x\n word hp\n long ptr\n}\n")
    else {
        panic!("expected .struct");
    };
    assert_eq!(name, "actor");
    let widths: Vec<_> = fields.iter().map(|field| field.width).collect();
    assert_eq!(widths, vec![DataWidth::Byte, DataWidth::Word, DataWidth::Long]);
    assert_eq!(fields[2].name, "ptr");
}

#[test]
fn map_directive_collects_attributes() {
    let Stmt::Map(args) = only_stmt(
        ".map identifier=1 bank_range=0x00, 0x6f addr_range=0x8000, 0xffff mask=0x8000 mirror_bank_range=0x80, 0xcf\n",
    ) else {
        panic!("expected .map");
    };
    assert_eq!(args.identifier.as_deref(), Some("1"));
    assert_eq!(args.bank_range, Some((0x00, 0x6f)));
    assert_eq!(args.address_range, Some((0x8000, 0xffff)));
    assert_eq!(args.mask, Some(0x8000));
    assert_eq!(args.mirror_bank_range, Some((0x80, 0xcf)));
    assert!(!args.writable);
}

#[test]
fn map_directive_stops_at_end_of_line() {
    let block = parse_ok(
        ".map identifier=ram bank_range=0x7e, 0x7f addr_range=0, 0xffff mask=0x10000 writable=1\nlabel:\n",
    );
    assert_eq!(block.len(), 2);
    assert!(matches!(&block[0].node, Stmt::Map(args) if args.writable));
}

#[test]
fn code_lookup_statement() {
    assert_eq!(only_stmt("{{payload}}\n"), Stmt::CodeLookup("payload".to_string()));
}
