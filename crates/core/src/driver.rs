use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use a816_assets::{AssetFS, StdAssetFS};
use a816_ips::Block;
use thiserror::Error;
use tracing::{debug, info};

use crate::bus::{Bus, MappingMode};
use crate::codegen::CodeGenerator;
use crate::diag::{Diagnostic, RenderOptions, render_diagnostics_with_options};
use crate::nodes::{NodeError, NodeList};
use crate::parser::{SourceLoader, parse_with_loader};
use crate::resolver::Resolver;
use crate::scope::{ROOT_SCOPE, ScopeSymbols, ScopeTree, SymbolValue};
use crate::span::{SourceId, SourceMap};

#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    pub mapping: MappingMode,
    /// `-D KEY=VALUE` definitions, bound in the root scope as text.
    pub defines: Vec<(String, String)>,
    pub render: RenderOptions,
}

/// A program whose labels are all placed, ready to emit.
#[derive(Debug)]
pub struct Assembly {
    pub source_map: SourceMap,
    pub scopes: ScopeTree,
    pub bus: Bus,
    pub nodes: NodeList,
    pub origin: i64,
    render: RenderOptions,
}

#[derive(Debug, Error)]
#[error("assembly failed")]
pub struct AssembleError {
    pub diagnostics: Vec<Diagnostic>,
    pub rendered: String,
}

pub fn assemble_source(
    source_name: &str,
    source_text: &str,
    options: &AssembleOptions,
) -> Result<Assembly, AssembleError> {
    assemble_source_with_fs(source_name, source_text, options, &StdAssetFS)
}

pub fn assemble_source_with_fs(
    source_name: &str,
    source_text: &str,
    options: &AssembleOptions,
    fs: &dyn AssetFS,
) -> Result<Assembly, AssembleError> {
    let mut source_map = SourceMap::default();
    let source_id = source_map.add_source(source_name, source_text);

    let mut loader = IncludeLoader::new(&mut source_map, fs, source_id, Path::new(source_name));
    let parsed = parse_with_loader(source_id, source_text, &mut loader);
    let program = parsed.map_err(|diagnostic| fail(&source_map, vec![diagnostic], options.render))?;
    debug!(statements = program.len(), sources = source_map.len(), "parsed");

    let mut scopes = ScopeTree::new();
    for (name, value) in &options.defines {
        scopes.add_symbol(name.clone(), SymbolValue::Str(value.clone()));
    }
    let mut bus = Bus::preset(options.mapping);
    let nodes = CodeGenerator::new(&mut scopes, &mut bus, fs, &source_map)
        .generate(&program)
        .map_err(|error| fail_nodes(&source_map, vec![error], options.render))?;

    let origin = options.mapping.origin();
    Resolver::new(&nodes, &mut scopes, &bus, origin)
        .resolve_labels()
        .map_err(|errors| fail_nodes(&source_map, errors, options.render))?;
    info!(mapping = %options.mapping, nodes = nodes.len(), "labels resolved");

    Ok(Assembly {
        source_map,
        scopes,
        bus,
        nodes,
        origin,
        render: options.render,
    })
}

impl Assembly {
    /// Emits the program as physical-address blocks in source order.
    pub fn emit_blocks(&mut self) -> Result<Vec<Block>, AssembleError> {
        let blocks = Resolver::new(&self.nodes, &mut self.scopes, &self.bus, self.origin)
            .emit_blocks()
            .map_err(|errors| fail_nodes(&self.source_map, errors, self.render))?;
        info!(
            blocks = blocks.len(),
            bytes = blocks.iter().map(|block| block.bytes.len()).sum::<usize>(),
            "emitted"
        );
        Ok(blocks)
    }

    /// Value of a symbol or label visible from the root scope.
    pub fn symbol(&self, name: &str) -> Option<SymbolValue> {
        self.scopes.value_from(ROOT_SCOPE, name)
    }

    pub fn physical_address(&self, address: i64) -> Option<u32> {
        self.bus.physical(address)
    }

    pub fn symbol_tables(&self) -> Vec<ScopeSymbols> {
        self.scopes.symbol_tables()
    }

    /// Text listing of every non-internal scope's symbols and labels.
    pub fn dump_symbols(&self) -> String {
        let mut out = String::new();
        for table in self.symbol_tables() {
            let _ = writeln!(out, "scope {}", table.scope);
            for (name, value) in &table.symbols {
                let value = match value {
                    SymbolValue::Int(value) => format!("{value:#04x}"),
                    SymbolValue::Str(text) => format!("{text:?}"),
                };
                let _ = writeln!(out, "  {name:<32} {value}");
            }
            for (name, address) in &table.labels {
                let _ = writeln!(out, "  {name:<32} {address:#08x}");
            }
        }
        out
    }
}

fn fail(source_map: &SourceMap, diagnostics: Vec<Diagnostic>, render: RenderOptions) -> AssembleError {
    let rendered = render_diagnostics_with_options(source_map, &diagnostics, render);
    AssembleError {
        diagnostics,
        rendered,
    }
}

fn fail_nodes(source_map: &SourceMap, errors: Vec<NodeError>, render: RenderOptions) -> AssembleError {
    fail(source_map, errors.into_iter().map(Diagnostic::from).collect(), render)
}

/// Reads `.include`d files through the asset store, relative to the file
/// that includes them, refusing files that are already being included.
struct IncludeLoader<'a> {
    sources: &'a mut SourceMap,
    fs: &'a dyn AssetFS,
    active: Vec<(SourceId, PathBuf)>,
}

impl<'a> IncludeLoader<'a> {
    fn new(sources: &'a mut SourceMap, fs: &'a dyn AssetFS, root: SourceId, root_path: &Path) -> Self {
        let active = vec![(root, fs.canonicalize(root_path))];
        Self { sources, fs, active }
    }
}

impl SourceLoader for IncludeLoader<'_> {
    fn load(&mut self, from: SourceId, path: &str) -> Result<(SourceId, String), String> {
        let resolved = self.sources.resolve_relative(from, path);
        let canonical = self.fs.canonicalize(&resolved);
        if self.active.iter().any(|(_, active)| *active == canonical) {
            return Err(format!("'{}' is already being included", resolved.display()));
        }
        let text = self
            .fs
            .read_to_string(&resolved)
            .map_err(|error| error.to_string())?;
        let id = self.sources.add_source(resolved.display().to_string(), text.clone());
        debug!(path = %resolved.display(), "including source");
        self.active.push((id, canonical));
        Ok((id, text))
    }

    fn finish(&mut self, id: SourceId) {
        if let Some(position) = self.active.iter().rposition(|(active, _)| *active == id) {
            self.active.truncate(position);
        }
    }
}

#[cfg(test)]
mod tests;
