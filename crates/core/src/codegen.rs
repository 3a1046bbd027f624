//! Lowers the syntax tree to the flat node list, expanding macros, loops,
//! conditionals and code blocks, and loading every asset up front.

use std::path::PathBuf;
use std::rc::Rc;

use a816_assets::{AssetFS, TextTable};
use a816_ips::decode_patch;
use a816_isa65816::{AddressingMode, IndexRegister, select};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::ast::{Block, Expr, MacroArg, MapArgs, OpcodeStmt, Stmt, StructField};
use crate::bus::{Bus, Mapping};
use crate::expr::{EvalError, evaluate};
use crate::lexer::parse_number;
use crate::nodes::{Node, NodeError, NodeList, OpcodeNode};
use crate::scope::{ScopeKind, ScopeTree, SymbolValue};
use crate::span::{SourceMap, Span, Spanned};

const MAX_EXPANSION_DEPTH: usize = 64;
const MAX_LOOP_ITERATIONS: i64 = 0x10000;

#[derive(Debug)]
struct MacroDef {
    params: Vec<String>,
    body: Block,
}

pub struct CodeGenerator<'a> {
    scopes: &'a mut ScopeTree,
    bus: &'a mut Bus,
    fs: &'a dyn AssetFS,
    sources: &'a SourceMap,
    macros: FxHashMap<String, Rc<MacroDef>>,
    nodes: NodeList,
    depth: usize,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        scopes: &'a mut ScopeTree,
        bus: &'a mut Bus,
        fs: &'a dyn AssetFS,
        sources: &'a SourceMap,
    ) -> Self {
        Self {
            scopes,
            bus,
            fs,
            sources,
            macros: FxHashMap::default(),
            nodes: NodeList::new(),
            depth: 0,
        }
    }

    /// Generates nodes for `program` and freezes the bus layout.
    pub fn generate(mut self, program: &Block) -> Result<NodeList, NodeError> {
        self.block(program)?;
        self.bus.freeze();
        debug!(nodes = self.nodes.len(), scopes = self.scopes.scopes().count(), "code generated");
        Ok(self.nodes)
    }

    fn push(&mut self, node: Node, span: Span) {
        self.nodes.push(Spanned::new(node, span));
    }

    fn block(&mut self, block: &Block) -> Result<(), NodeError> {
        block.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &Spanned<Stmt>) -> Result<(), NodeError> {
        let span = stmt.span;
        match &stmt.node {
            Stmt::Label(name) => self.push(Node::Label(name.clone()), span),
            Stmt::Opcode(opcode) => self.opcode(opcode, span)?,
            Stmt::Assign { name, value } => {
                if let Some(result) = self.try_evaluate(value)? {
                    self.scopes.add_symbol(name.clone(), SymbolValue::Int(result));
                }
                self.push(
                    Node::SymbolBinding {
                        name: name.clone(),
                        value: value.clone(),
                        from_parent: false,
                    },
                    span,
                );
            }
            Stmt::MacroDef { name, params, body } => {
                let definition = MacroDef {
                    params: params.clone(),
                    body: body.clone(),
                };
                if self.macros.insert(name.clone(), Rc::new(definition)).is_some() {
                    debug!(name = %name, "macro redefined");
                }
            }
            Stmt::MacroApply { name, args } => self.apply_macro(name, args, span)?,
            Stmt::NamedScope { name, body } => {
                self.enter_scope(ScopeKind::Named(name.clone()), span)?;
                self.block(body)?;
                self.leave_scope(true, span)?;
            }
            Stmt::Compound(body) => {
                self.enter_scope(ScopeKind::Anonymous, span)?;
                self.block(body)?;
                self.leave_scope(false, span)?;
            }
            Stmt::If {
                condition,
                then_block,
                else_block,
            } => {
                if self.condition_holds(condition)? {
                    self.block(then_block)?;
                } else if let Some(else_block) = else_block {
                    self.block(else_block)?;
                }
            }
            Stmt::For {
                var,
                start,
                end,
                body,
            } => self.unroll(var, start, end, body, span)?,
            Stmt::Data { width, values } => {
                for value in values {
                    self.push(
                        Node::Data {
                            width: *width,
                            value: value.clone(),
                        },
                        value.span,
                    );
                }
            }
            Stmt::Text(text) => {
                let Some(table) = self.scopes.table() else {
                    return Err(NodeError::new("no text table is bound in this scope", span)
                        .with_help("load one with .table 'file.tbl' before using .text"));
                };
                self.push(Node::Bytes(table.encode(text)), span);
            }
            Stmt::Ascii(text) => self.push(Node::Bytes(text.as_bytes().to_vec()), span),
            Stmt::Table(path) => {
                let path = self.resolve(path, span);
                let source = self
                    .fs
                    .read_to_string(&path)
                    .map_err(|error| NodeError::new(error.to_string(), span))?;
                let table = TextTable::parse(&source).map_err(|error| {
                    NodeError::new(format!("{}: {error}", path.display()), span)
                })?;
                debug!(path = %path.display(), entries = table.len(), "text table loaded");
                self.scopes.set_table(Rc::new(table));
            }
            Stmt::IncludeBinary(written) => {
                let path = self.resolve(written, span);
                let bytes = self
                    .fs
                    .read(&path)
                    .map_err(|error| NodeError::new(error.to_string(), span))?;
                let base = written.replace(['/', '.'], "_");
                debug!(path = %path.display(), len = bytes.len(), symbol = %base, "binary included");
                self.push(Node::BinaryInclude { base, bytes }, span);
            }
            Stmt::IncludeIps { path, delta } => self.include_patch(path, delta.as_ref(), span)?,
            Stmt::CodePosition(value) => self.push(Node::CodePosition(value.clone()), span),
            Stmt::Relocation(value) => self.push(Node::RelocationAddress(value.clone()), span),
            Stmt::Map(args) => {
                let mapping = mapping_from(args).map_err(|message| NodeError::new(message, span))?;
                debug!(identifier = %mapping.identifier, "mapping declared");
                self.bus
                    .map(mapping)
                    .map_err(|error| NodeError::bus(error, span))?;
            }
            Stmt::Struct { name, fields } => self.declare_struct(name, fields),
            Stmt::CodeLookup(name) => {
                let Some(block) = self.scopes.code_for(name).cloned() else {
                    return Err(NodeError::new(format!("no code block named '{name}'"), span)
                        .with_help("code blocks are passed to macros as '{ ... }' arguments"));
                };
                self.nested(span, |generator| generator.block(&block))?;
            }
        }
        Ok(())
    }

    fn opcode(&mut self, opcode: &OpcodeStmt, span: Span) -> Result<(), NodeError> {
        if opcode.mode == AddressingMode::StackIndexedIndirectIndexed
            && opcode.inner_index != Some(IndexRegister::S)
        {
            return Err(NodeError::new(
                "indirect indexed operands take ', s' inside the parentheses",
                span,
            )
            .with_help("write '(offset, s), y'"));
        }
        let instruction = select(&opcode.mnemonic, opcode.mode, opcode.index)
            .map_err(|error| NodeError::encode(error, span))?;

        let node = OpcodeNode {
            instruction,
            size: opcode.size,
            operand: opcode.operand.clone(),
            destination: opcode.destination.clone(),
        };
        // Widths fixed in the source are checked right away.
        let written = node
            .size
            .or_else(|| node.operand.as_ref().and_then(Expr::literal_width));
        if let Some(size) = written
            && instruction.is_sized()
        {
            instruction
                .len(size)
                .map_err(|error| NodeError::encode(error, span))?;
        }
        trace!(mnemonic = instruction.mnemonic, mode = %instruction.mode, "instruction");
        self.push(Node::Opcode(node), span);
        Ok(())
    }

    fn apply_macro(&mut self, name: &str, args: &[MacroArg], span: Span) -> Result<(), NodeError> {
        let Some(definition) = self.macros.get(name).cloned() else {
            return Err(NodeError::new(format!("macro '{name}' is not defined"), span)
                .with_help("macros must be defined with .macro before they are applied"));
        };
        if args.len() != definition.params.len() {
            return Err(NodeError::new(
                format!(
                    "macro '{name}' takes {} argument(s) but {} were given",
                    definition.params.len(),
                    args.len()
                ),
                span,
            ));
        }
        debug!(name, depth = self.depth, "expanding macro");

        let caller = self.scopes.current();
        self.enter_scope(ScopeKind::Anonymous, span)?;
        for (param, arg) in definition.params.iter().zip(args) {
            match arg {
                MacroArg::Block(block) => self.scopes.add_code_symbol(param.clone(), block.clone()),
                MacroArg::Expr(expr) => match evaluate(expr, &self.scopes.view(caller)) {
                    Ok(value) => self.scopes.add_symbol(param.clone(), SymbolValue::Int(value)),
                    Err(EvalError::Undefined { .. }) => self.push(
                        Node::SymbolBinding {
                            name: param.clone(),
                            value: expr.clone(),
                            from_parent: true,
                        },
                        expr.span,
                    ),
                    Err(error) => return Err(error.into()),
                },
            }
        }
        self.nested(span, |generator| generator.block(&definition.body))?;
        self.leave_scope(false, span)
    }

    fn unroll(
        &mut self,
        var: &str,
        start: &Expr,
        end: &Expr,
        body: &Block,
        span: Span,
    ) -> Result<(), NodeError> {
        let bound = |generator: &Self, expr: &Expr| {
            evaluate(expr, &*generator.scopes).map_err(|error| {
                NodeError::from(error)
                    .with_help("loop bounds must be known before any label is placed")
            })
        };
        let first = bound(self, start)?;
        let last = bound(self, end)?;
        if last.saturating_sub(first) > MAX_LOOP_ITERATIONS {
            return Err(NodeError::new(
                format!("loop over {first}..{last} exceeds {MAX_LOOP_ITERATIONS} iterations"),
                span,
            ));
        }
        for value in first..last {
            self.enter_scope(ScopeKind::Internal, span)?;
            self.scopes.add_symbol(var, SymbolValue::Int(value));
            self.push(
                Node::SymbolBinding {
                    name: var.to_string(),
                    value: Expr::number(value, span),
                    from_parent: false,
                },
                span,
            );
            self.block(body)?;
            self.leave_scope(false, span)?;
        }
        Ok(())
    }

    fn include_patch(&mut self, path: &str, delta: Option<&Expr>, span: Span) -> Result<(), NodeError> {
        let delta = match delta {
            Some(expr) => evaluate(expr, &*self.scopes)?,
            None => 0,
        };
        let resolved = self.resolve(path, span);
        let bytes = self
            .fs
            .read(&resolved)
            .map_err(|error| NodeError::new(error.to_string(), span))?;
        let blocks = decode_patch(&bytes)
            .map_err(|error| NodeError::new(format!("{}: {error:#}", resolved.display()), span))?
            .iter()
            .map(|block| {
                block.shifted(delta).ok_or_else(|| {
                    NodeError::new(
                        format!("record at {:#08x} moved by {delta} leaves the image", block.address),
                        span,
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(path = %resolved.display(), records = blocks.len(), delta, "patch included");
        self.push(Node::IncludePatch { blocks }, span);
        Ok(())
    }

    /// Binds `name.field` offsets and `name.__size`.
    fn declare_struct(&mut self, name: &str, fields: &[StructField]) {
        let mut offset = 0;
        for field in fields {
            self.scopes
                .add_symbol(format!("{name}.{}", field.name), SymbolValue::Int(offset));
            offset += field.width.byte_len() as i64;
        }
        self.scopes
            .add_symbol(format!("{name}.__size"), SymbolValue::Int(offset));
    }

    // Undefined symbols count as false; non-numeric text is true when
    // non-empty.
    fn condition_holds(&self, condition: &Expr) -> Result<bool, NodeError> {
        if let Some(name) = condition.as_symbol()
            && let Some(SymbolValue::Str(text)) = self.scopes.value_for(name)
            && parse_number(&text).is_none()
        {
            return Ok(!text.is_empty());
        }
        Ok(self.try_evaluate(condition)?.is_some_and(|value| value != 0))
    }

    /// Evaluates `expr` now, or `None` when it still names unknown symbols.
    fn try_evaluate(&self, expr: &Expr) -> Result<Option<i64>, NodeError> {
        match evaluate(expr, &*self.scopes) {
            Ok(value) => Ok(Some(value)),
            Err(EvalError::Undefined { .. }) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn enter_scope(&mut self, kind: ScopeKind, span: Span) -> Result<(), NodeError> {
        self.scopes.append_scope(kind);
        self.scopes
            .use_next_scope()
            .map_err(|error| NodeError::scope(error, span))?;
        self.push(Node::ScopeEnter, span);
        Ok(())
    }

    fn leave_scope(&mut self, exports: bool, span: Span) -> Result<(), NodeError> {
        self.push(Node::ScopeExit, span);
        self.scopes
            .restore_scope(exports)
            .map_err(|error| NodeError::scope(error, span))
    }

    fn nested(
        &mut self,
        span: Span,
        expand: impl FnOnce(&mut Self) -> Result<(), NodeError>,
    ) -> Result<(), NodeError> {
        if self.depth >= MAX_EXPANSION_DEPTH {
            return Err(NodeError::new(
                format!("expansion nested deeper than {MAX_EXPANSION_DEPTH} levels"),
                span,
            )
            .with_help("check for a macro or code block that expands itself"));
        }
        self.depth += 1;
        let result = expand(self);
        self.depth -= 1;
        result
    }

    fn resolve(&self, path: &str, span: Span) -> PathBuf {
        self.sources.resolve_relative(span.source_id, path)
    }
}

fn mapping_from(args: &MapArgs) -> Result<Mapping, String> {
    let identifier = args.identifier.clone().unwrap_or_default();
    let banks = |name: &str, (start, end): (i64, i64)| -> Result<std::ops::RangeInclusive<u8>, String> {
        let bank = |value: i64| {
            u8::try_from(value).map_err(|_| format!("{name} value {value:#x} is not a bank number"))
        };
        Ok(bank(start)?..=bank(end)?)
    };
    let (start, end) = args.bank_range.ok_or(".map needs a bank_range")?;
    let bank_range = banks("bank_range", (start, end))?;
    let (low, high) = args.address_range.ok_or(".map needs an addr_range")?;
    let offset = |value: i64| {
        u32::try_from(value).map_err(|_| format!("addr_range value {value:#x} is negative"))
    };
    let address_range = offset(low)?..=offset(high)?;
    let mask = args.mask.ok_or(".map needs a mask")?;
    let mask = u32::try_from(mask).map_err(|_| format!("mask {mask:#x} is negative"))?;

    let mut mapping = Mapping::rom(identifier, bank_range, address_range, mask);
    if let Some(mirror) = args.mirror_bank_range {
        mapping = mapping.with_mirror(banks("mirror_bank_range", mirror)?);
    }
    if args.writable {
        mapping = mapping.writable();
    }
    Ok(mapping)
}
