pub mod ast;
pub mod bus;
pub mod codegen;
pub mod diag;
pub mod driver;
pub mod expr;
pub mod lexer;
pub mod nodes;
pub mod parser;
pub mod resolver;
pub mod scope;
pub mod span;

pub use a816_ips::Block;
pub use bus::MappingMode;
pub use diag::RenderOptions;
pub use driver::{AssembleError, AssembleOptions, Assembly, assemble_source, assemble_source_with_fs};
pub use scope::SymbolValue;
