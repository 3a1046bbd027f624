use super::*;

#[test]
fn implied_instruction_has_no_operand() {
    let op = opcode("nop\n");
    assert_eq!(op.mnemonic, "nop");
    assert_eq!(op.mode, AddressingMode::None);
    assert!(op.operand.is_none());
}

#[test]
fn accumulator_form_without_operand() {
    let op = opcode("asl\n");
    assert_eq!(op.mode, AddressingMode::None);
}

#[test]
fn immediate_with_size_suffix() {
    let op = opcode("lda.w #0x1234\n");
    assert_eq!(op.mode, AddressingMode::Immediate);
    assert_eq!(op.size, Some(OperandSize::Word));
}

#[test]
fn direct_indexed_by_x() {
    let op = opcode("lda 0x12, x\n");
    assert_eq!(op.mode, AddressingMode::DirectIndexed);
    assert_eq!(op.index, Some(IndexRegister::X));
}

#[test]
fn stack_relative_uses_s_index() {
    let op = opcode("lda 0x03, s\n");
    assert_eq!(op.mode, AddressingMode::DirectIndexed);
    assert_eq!(op.index, Some(IndexRegister::S));
}

#[test]
fn indirect_forms() {
    assert_eq!(opcode("jmp (0x1234)\n").mode, AddressingMode::Indirect);
    assert_eq!(opcode("lda [0x12]\n").mode, AddressingMode::IndirectLong);

    let op = opcode("lda [0x12], y\n");
    assert_eq!(op.mode, AddressingMode::IndirectIndexedLong);
    assert_eq!(op.index, Some(IndexRegister::Y));

    let op = opcode("lda (0x12), y\n");
    assert_eq!(op.mode, AddressingMode::IndirectIndexed);
    assert_eq!(op.index, Some(IndexRegister::Y));
}

#[test]
fn indexed_indirect_and_stack_indirect_indexed() {
    let op = opcode("eor (0x12, x)\n");
    assert_eq!(op.mode, AddressingMode::DpOrSrIndirectIndexed);
    assert_eq!(op.index, Some(IndexRegister::X));
    assert_eq!(op.inner_index, None);

    let op = opcode("lda (0x03, s), y\n");
    assert_eq!(op.mode, AddressingMode::StackIndexedIndirectIndexed);
    assert_eq!(op.inner_index, Some(IndexRegister::S));
    assert_eq!(op.index, Some(IndexRegister::Y));
}

#[test]
fn grouping_parentheses_are_not_indirection() {
    let op = opcode("lda (label + 1) * 2, x\n");
    assert_eq!(op.mode, AddressingMode::DirectIndexed);
    let operand = op.operand.expect("operand");
    assert_eq!(operand.items.first().map(|item| &item.node), Some(&ExprItem::LParen));
}

#[test]
fn block_move_takes_two_banks() {
    let op = opcode("mvp src >> 16, 0x7e\n");
    assert_eq!(op.mode, AddressingMode::BlockMove);
    assert_eq!(op.operand.expect("source").items.len(), 3);
    let destination = op.destination.expect("destination");
    assert_eq!(destination.items.len(), 1);

    let err = parse(SourceId(0), "mvn 0x7e\n").expect_err("one bank");
    assert!(err.message.contains("source and destination"), "{}", err.message);
}

#[test]
fn immediate_cannot_be_indexed() {
    let err = parse(SourceId(0), "lda #1, x\n").expect_err("indexed immediate");
    assert!(err.message.contains("cannot be indexed"), "{}", err.message);
}
