use a816_assets::MemoryFS;

use super::*;

fn assemble_with(source: &str, options: &AssembleOptions, fs: &MemoryFS) -> Result<Assembly, AssembleError> {
    assemble_source_with_fs("main.s", source, options, fs)
}

fn assemble(source: &str) -> Assembly {
    match assemble_with(source, &AssembleOptions::default(), &MemoryFS::new()) {
        Ok(assembly) => assembly,
        Err(error) => panic!("assembly failed:\n{}", error.rendered),
    }
}

fn emit(source: &str) -> (Assembly, Vec<Block>) {
    let mut assembly = assemble(source);
    let blocks = match assembly.emit_blocks() {
        Ok(blocks) => blocks,
        Err(error) => panic!("emit failed:\n{}", error.rendered),
    };
    (assembly, blocks)
}

fn first_error(source: &str) -> String {
    let fs = MemoryFS::new();
    let error = match assemble_with(source, &AssembleOptions::default(), &fs) {
        Ok(mut assembly) => assembly.emit_blocks().expect_err("expected an error"),
        Err(error) => error,
    };
    error.diagnostics[0].message.clone()
}

#[test]
fn short_backward_branch() {
    let (_, blocks) = emit("my_label:\n lda #0x0000\n bra my_label\n");
    assert_eq!(blocks[0].bytes[3..], [0x80, 0xFB]);
}

#[test]
fn long_data() {
    let (_, blocks) = emit(".dl 0xf01ac5\n");
    assert_eq!(blocks, vec![Block::new(0, vec![0xC5, 0x1A, 0xF0])]);
}

#[test]
fn code_position_in_another_bank() {
    let (assembly, blocks) = emit("*=0x038000\nlabel:\n.pointer label\n");
    assert_eq!(Some(blocks[0].address), assembly.physical_address(0x038000));
    assert_eq!(blocks[0].bytes, [0x00, 0x80, 0x03]);
}

#[test]
fn code_position_across_bank_boundary() {
    let (assembly, blocks) = emit("*=0x03FFFF\nlabel:\n.pointer label\nlabel2:\n");
    assert_eq!(blocks[0].address, 0x1FFFF);
    assert_eq!(blocks[0].bytes, [0xFF, 0xFF, 0x03]);
    assert_eq!(assembly.symbol("label2"), Some(SymbolValue::Int(0x048002)));
}

#[test]
fn relocation_across_ram_bank_boundary() {
    let (assembly, blocks) = emit("*=0x008000\n@=0x7effff\nlabel:\n.pointer label\nlabel2:\n");
    assert_eq!(blocks, vec![Block::new(0, vec![0xFF, 0xFF, 0x7E])]);
    assert_eq!(assembly.symbol("label2"), Some(SymbolValue::Int(0x7F0002)));
}

#[test]
fn relocation_with_custom_maps() {
    let (_, blocks) = emit(
        "\
.map identifier=1 bank_range=0x00, 0x6f addr_range=0x8000, 0xffff mask=0x8000 mirror_bank_range=0x80, 0xcf
.map identifier=2 bank_range=0x7e, 0x7f addr_range=0x0000, 0xffff mask=0x10000 writable=0

*=0x208000
@=0x7e4000
label:
.pointer label
",
    );
    assert_eq!(blocks, vec![Block::new(0x100000, vec![0x00, 0x40, 0x7E])]);
}

#[test]
fn macro_arguments_see_later_named_scopes() {
    let (assembly, blocks) = emit(
        "\
*=0x008000
.macro test(pointer) {
    .pointer pointer
}
test(newgame.label)
.db 0
.scope newgame {
    label:
}
",
    );
    assert_eq!(blocks, vec![Block::new(0, vec![0x04, 0x80, 0x00, 0x00])]);
    assert_eq!(assembly.symbol("newgame.label"), Some(SymbolValue::Int(0x008004)));
}

#[test]
fn named_scope_symbols_are_qualified_in_the_parent() {
    let (assembly, blocks) = emit(
        "\
.db menu.cursor
.scope menu {
    cursor = 4
    .db cursor
}
.db menu.cursor
",
    );
    assert_eq!(blocks[0].bytes, [0x04, 0x04, 0x04]);
    assert_eq!(assembly.symbol("menu.cursor"), Some(SymbolValue::Int(4)));
    assert_eq!(assembly.symbol("cursor"), None);
}

#[test]
fn anonymous_scopes_hide_their_symbols() {
    let message = first_error("{\n hidden = 1\n}\n.db hidden\n");
    assert!(message.contains("symbol 'hidden' is not defined"), "{message}");
}

#[test]
fn shifted_word_table() {
    let (_, blocks) = emit(".for k := 0, 8 {\n .dw 1 << k\n}\n");
    let words: Vec<u16> = blocks[0]
        .bytes
        .chunks(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    assert_eq!(words, [1, 2, 4, 8, 16, 32, 64, 128]);
}

#[test]
fn direct_page_indexed_indirect() {
    let (_, blocks) = emit("eor (0x12,x)\n");
    assert_eq!(blocks[0].bytes, [0x41, 0x12]);
}

#[test]
fn block_moves_take_source_then_destination_banks() {
    let (_, blocks) = emit("buffer = 0x7e2000\nmvn buffer >> 16, 0x01\nmvp 0x00, 0x7f\n");
    assert_eq!(blocks[0].bytes, [0x54, 0x01, 0x7E, 0x44, 0x7F, 0x00]);
    assert_eq!(
        first_error("mvn 0x7e2000, 0x01\n"),
        "bank 0x7e2000 does not fit in a byte"
    );
}

#[test]
fn stack_relative_indirect_indexed() {
    let (_, blocks) = emit("lda (0x03, s), y\nlda 0x05, s\n");
    assert_eq!(blocks[0].bytes, [0xB3, 0x03, 0xA3, 0x05]);
}

#[test]
fn immediate_width_follows_the_literal() {
    let (_, blocks) = emit("lda #0x1234\nlda #0x12\nldx.w #1\n");
    assert_eq!(blocks[0].bytes, [0xA9, 0x34, 0x12, 0xA9, 0x12, 0xA2, 0x01, 0x00]);
}

#[test]
fn ascii_text() {
    let (_, blocks) = emit(".ascii 'Final Fantasy VI    '\n");
    assert_eq!(blocks[0].bytes, b"Final Fantasy VI    ");
}

#[test]
fn text_through_a_table() {
    let fs = MemoryFS::new()
        .with_file("font.tbl", "80=F\n81=i\n82=n\n83=al\n84=a\n");
    let mut assembly = assemble_with(".table 'font.tbl'\n.text 'Final'\n", &AssembleOptions::default(), &fs)
        .expect("assemble");
    let blocks = assembly.emit_blocks().expect("emit");
    assert_eq!(blocks[0].bytes, [0x80, 0x81, 0x82, 0x83]);
}

#[test]
fn includes_resolve_next_to_the_including_file() {
    let fs = MemoryFS::new()
        .with_file("src/lib/macros.s", ".include 'consts.s'\n.macro clear() {\n lda #ZERO\n}\n")
        .with_file("src/lib/consts.s", "ZERO = 0x00\n");
    let mut assembly = assemble_source_with_fs(
        "src/main.s",
        ".include 'lib/macros.s'\nclear()\n",
        &AssembleOptions::default(),
        &fs,
    )
    .expect("assemble");
    assert_eq!(assembly.source_map.len(), 3);
    let blocks = assembly.emit_blocks().expect("emit");
    assert_eq!(blocks[0].bytes, [0xA9, 0x00]);
}

#[test]
fn include_cycles_are_reported() {
    let fs = MemoryFS::new()
        .with_file("a.s", ".include 'b.s'\n")
        .with_file("b.s", ".include 'a.s'\n");
    let error = assemble_source_with_fs("a.s", ".include 'b.s'\n", &AssembleOptions::default(), &fs)
        .expect_err("cycle");
    assert!(error.diagnostics[0].message.contains("already being included"));
}

#[test]
fn binary_includes_bind_base_and_size() {
    let fs = MemoryFS::new().with_file("gfx/tiles.bin", vec![1, 2, 3, 4]);
    let mut assembly = assemble_with(
        "jmp.w after\n.incbin 'gfx/tiles.bin'\nafter:\n.dw gfx_tiles_bin__size\n",
        &AssembleOptions::default(),
        &fs,
    )
    .expect("assemble");
    assert_eq!(assembly.symbol("gfx_tiles_bin"), Some(SymbolValue::Int(0x008003)));
    let blocks = assembly.emit_blocks().expect("emit");
    assert_eq!(blocks[0].bytes, [0x4C, 0x07, 0x80, 1, 2, 3, 4, 0x04, 0x00]);
}

#[test]
fn included_patches_are_replayed() {
    let fs = MemoryFS::new().with_file("old.ips", b"PATCH\x00\x00\x10\x00\x02\xAA\xBBEOF".to_vec());
    let mut assembly = assemble_with("nop\n.include_ips 'old.ips', 0x100\nnop\n", &AssembleOptions::default(), &fs)
        .expect("assemble");
    let blocks = assembly.emit_blocks().expect("emit");
    assert_eq!(
        blocks,
        vec![
            Block::new(0, vec![0xEA]),
            Block::new(0x110, vec![0xAA, 0xBB]),
            Block::new(1, vec![0xEA]),
        ]
    );
}

#[test]
fn defines_seed_the_root_scope() {
    let options = AssembleOptions {
        defines: vec![
            ("LIVES".to_string(), "0x05".to_string()),
            ("REGION".to_string(), "pal".to_string()),
        ],
        ..AssembleOptions::default()
    };
    let mut assembly = assemble_with(".db LIVES\n.if REGION {\n .db 1\n}\n", &options, &MemoryFS::new())
        .expect("assemble");
    let blocks = assembly.emit_blocks().expect("emit");
    assert_eq!(blocks[0].bytes, [0x05, 0x01]);
}

#[test]
fn high_rom_mapping() {
    let options = AssembleOptions {
        mapping: MappingMode::High,
        ..AssembleOptions::default()
    };
    let mut assembly = assemble_with("start:\n nop\n*=0x008000\n jml start\n", &options, &MemoryFS::new())
        .expect("assemble");
    assert_eq!(assembly.symbol("start"), Some(SymbolValue::Int(0xC00000)));
    let blocks = assembly.emit_blocks().expect("emit");
    assert_eq!(
        blocks,
        vec![
            Block::new(0, vec![0xEA]),
            Block::new(0x8000, vec![0x5C, 0x00, 0x00, 0xC0]),
        ]
    );
}

#[test]
fn fatal_node_errors() {
    for (source, expected) in [
        ("nop #0x00\n", "addressing mode (immediate) for opcode (nop) is not defined"),
        ("lda.l 0x000000, y\n", "lda does not support size (l)"),
        ("lda.l undefined_symbol\n", "symbol 'undefined_symbol' is not defined"),
        ("lda.l #0x123456\n", "lda does not support size (l)"),
        ("*=0x001000\nlda #0x12\n", "address 0x001000 has no physical backing"),
    ] {
        let message = first_error(source);
        assert!(message.contains(expected), "{source:?}: {message}");
    }
}

#[test]
fn data_wider_than_its_directive_is_rejected() {
    let fs = MemoryFS::new();
    let mut assembly = assemble_with("*=0x018000\nfar:\n.dw far\n", &AssembleOptions::default(), &fs)
        .expect("labels");
    let error = assembly.emit_blocks().expect_err("too wide");
    let diagnostic = &error.diagnostics[0];
    assert_eq!(diagnostic.message, "value 0x18000 does not fit in 2 byte(s)");
    assert!(diagnostic.help().is_some_and(|help| help.contains("& 0xffff")));
}

#[test]
fn rendered_errors_carry_location() {
    let error = assemble_with("nop\nnop #0x00\n", &AssembleOptions::default(), &MemoryFS::new())
        .expect_err("bad operand");
    assert!(error.rendered.contains("main.s"), "{}", error.rendered);
    assert!(error.rendered.contains("not defined"));
}

#[test]
fn symbol_dump_lists_scopes() {
    let (assembly, _) = emit("lives = 3\nstart:\n.scope menu {\n cursor = 1\n}\n.for i := 0, 2 {\n nop\n}\n");
    let dump = assembly.dump_symbols();
    assert!(dump.contains("scope root"));
    assert!(dump.contains("scope menu"));
    assert!(dump.contains("menu.cursor"));
    assert!(dump.contains("0x008000"));
    assert!(!dump.contains("  i "));
}

#[test]
fn symbol_dump_layout() {
    let (assembly, _) = emit("lives = 3\nstart:\n nop\n");
    let expected = format!("scope root\n  {:<32} 0x03\n  {:<32} 0x008000\n", "lives", "start");
    similar_asserts::assert_eq!(assembly.dump_symbols(), expected);
}
