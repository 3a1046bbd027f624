//! IPS patch encoding and the block writers used by the assembler's emit
//! pass.

use std::io::{Seek, SeekFrom, Write};

use anyhow::{Context, Result, bail};

mod codec;
mod io;
mod model;
mod writer;

pub use codec::{decode_patch, encode_patch};
pub use io::{read_patch, write_patch};
pub use model::Block;
pub use writer::{BlockWriter, IpsWriter, SfcWriter, write_blocks};

pub const IPS_HEADER: &[u8; 5] = b"PATCH";
pub const IPS_FOOTER: &[u8; 3] = b"EOF";
/// Largest payload a single record can carry.
pub const MAX_RECORD_LEN: usize = 0xFFFF;
/// Size of the header some copier devices prepend to ROM images.
pub const COPIER_HEADER_LEN: u32 = 0x200;

#[cfg(test)]
mod tests;
