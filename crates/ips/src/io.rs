use super::*;

pub fn write_patch(path: &std::path::Path, blocks: &[Block], copier_header: bool) -> Result<()> {
    let offset = if copier_header { COPIER_HEADER_LEN } else { 0 };
    let bytes = encode_patch(blocks, offset)?;
    std::fs::write(path, bytes).with_context(|| format!("failed to write '{}'", path.display()))
}

pub fn read_patch(path: &std::path::Path) -> Result<Vec<Block>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    decode_patch(&bytes).with_context(|| format!("failed to decode '{}'", path.display()))
}
