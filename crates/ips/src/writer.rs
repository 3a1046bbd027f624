use super::*;

/// Sink for the (address, bytes) blocks produced by the emit pass.
pub trait BlockWriter {
    fn begin(&mut self) -> Result<()>;
    fn write_block(&mut self, block: &Block) -> Result<()>;
    fn end(&mut self) -> Result<()>;
}

pub fn write_blocks(writer: &mut dyn BlockWriter, blocks: &[Block]) -> Result<()> {
    writer.begin()?;
    for block in blocks {
        writer.write_block(block)?;
    }
    writer.end()
}

/// Streams blocks as IPS records.
pub struct IpsWriter<W: Write> {
    out: W,
    address_offset: u32,
}

impl<W: Write> IpsWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            address_offset: 0,
        }
    }

    /// Shifts every record past a copier header.
    pub fn with_copier_header(mut self, enabled: bool) -> Self {
        self.address_offset = if enabled { COPIER_HEADER_LEN } else { 0 };
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> BlockWriter for IpsWriter<W> {
    fn begin(&mut self) -> Result<()> {
        self.out
            .write_all(IPS_HEADER)
            .context("failed to write IPS header")
    }

    fn write_block(&mut self, block: &Block) -> Result<()> {
        let mut record = Vec::with_capacity(block.bytes.len() + 5);
        codec::write_records(&mut record, block.address + self.address_offset, &block.bytes)?;
        self.out
            .write_all(&record)
            .with_context(|| format!("failed to write block at {:#08x}", block.address))
    }

    fn end(&mut self) -> Result<()> {
        self.out
            .write_all(IPS_FOOTER)
            .context("failed to write IPS footer")?;
        self.out.flush().context("failed to flush IPS output")
    }
}

/// Writes blocks straight into a ROM image at their physical address.
pub struct SfcWriter<W: Write + Seek> {
    out: W,
    address_offset: u32,
}

impl<W: Write + Seek> SfcWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            address_offset: 0,
        }
    }

    pub fn with_copier_header(mut self, enabled: bool) -> Self {
        self.address_offset = if enabled { COPIER_HEADER_LEN } else { 0 };
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Seek> BlockWriter for SfcWriter<W> {
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_block(&mut self, block: &Block) -> Result<()> {
        let address = u64::from(block.address + self.address_offset);
        self.out
            .seek(SeekFrom::Start(address))
            .with_context(|| format!("failed to seek to {address:#08x}"))?;
        self.out
            .write_all(&block.bytes)
            .with_context(|| format!("failed to write block at {address:#08x}"))
    }

    fn end(&mut self) -> Result<()> {
        self.out.flush().context("failed to flush image output")
    }
}
