use super::*;

/// Serializes blocks as an IPS patch. `address_offset` is added to every
/// record address, e.g. [`COPIER_HEADER_LEN`] for headered images.
pub fn encode_patch(blocks: &[Block], address_offset: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(IPS_HEADER);
    for block in blocks {
        write_records(&mut out, block.address + address_offset, &block.bytes)?;
    }
    out.extend_from_slice(IPS_FOOTER);
    Ok(out)
}

/// Appends one record per chunk of at most [`MAX_RECORD_LEN`] bytes.
pub(crate) fn write_records(out: &mut Vec<u8>, address: u32, bytes: &[u8]) -> Result<()> {
    let mut address = address;
    for chunk in bytes.chunks(MAX_RECORD_LEN) {
        if address > 0xFF_FFFF {
            bail!("address {address:#08x} does not fit in an IPS record");
        }
        if address.to_be_bytes()[1..] == IPS_FOOTER[..] {
            bail!("address {address:#08x} collides with the IPS end marker");
        }
        write_u24_be(out, address);
        write_u16_be(out, chunk.len() as u16);
        out.extend_from_slice(chunk);
        address += chunk.len() as u32;
    }
    Ok(())
}

pub fn decode_patch(bytes: &[u8]) -> Result<Vec<Block>> {
    let mut rd = Reader::new(bytes);
    let header = rd.read_exact(IPS_HEADER.len()).context("missing PATCH header")?;
    if header != IPS_HEADER {
        bail!("missing \"PATCH\" header");
    }

    let mut blocks = Vec::new();
    loop {
        if rd.peek(IPS_FOOTER.len()) == Some(&IPS_FOOTER[..]) {
            break;
        }
        let address = rd.read_u24_be().context("truncated record address")?;
        let len = rd.read_u16_be().context("truncated record length")?;
        if len == 0 {
            bail!("run-length records are not supported (record at {address:#08x})");
        }
        let payload = rd
            .read_exact(usize::from(len))
            .with_context(|| format!("truncated record at {address:#08x}"))?;
        blocks.push(Block::new(address, payload));
    }
    Ok(blocks)
}

fn write_u24_be(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes()[1..]);
}

fn write_u16_be(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn peek(&self, len: usize) -> Option<&'a [u8]> {
        self.bytes.get(self.pos..self.pos.saturating_add(len))
    }

    fn read_u16_be(&mut self) -> Result<u16> {
        let bytes = self.read_exact(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u24_be(&mut self) -> Result<u32> {
        let bytes = self.read_exact(3)?;
        Ok(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.saturating_add(len);
        if end > self.bytes.len() {
            bail!("unexpected EOF");
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}
