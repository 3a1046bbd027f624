/// Contiguous run of bytes at a physical (file) address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub address: u32,
    pub bytes: Vec<u8>,
}

impl Block {
    pub fn new(address: u32, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            bytes: bytes.into(),
        }
    }

    pub fn end(&self) -> u32 {
        self.address + self.bytes.len() as u32
    }

    /// Moves the block by a signed delta.
    pub fn shifted(&self, delta: i64) -> Option<Self> {
        let address = u32::try_from(i64::from(self.address) + delta).ok()?;
        Some(Self {
            address,
            bytes: self.bytes.clone(),
        })
    }
}
