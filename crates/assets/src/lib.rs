mod table;
mod traits;

pub use crate::table::TextTable;
pub use crate::traits::{AssetError, AssetFS, MemoryFS, StdAssetFS};
