//! Three walks over the node list: place labels, confirm every width,
//! then emit bytes grouped into contiguous blocks.

use std::fmt;

use a816_ips::Block;
use a816_isa65816::OperandSize;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::ast::Expr;
use crate::bus::{Bus, BusError};
use crate::expr::{EvalError, evaluate};
use crate::nodes::{Node, NodeError, OpcodeNode};
use crate::scope::{ScopeId, ScopeTree, SymbolValue};
use crate::span::{Span, Spanned};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Binds labels, guessing widths that depend on unknown symbols.
    Size,
    /// Re-walks with every symbol known and checks labels stayed put.
    Labels,
    Emit,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Size => "size",
            Self::Labels => "labels",
            Self::Emit => "emit",
        })
    }
}

/// Cursor threaded through a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverState {
    pub pass: Pass,
    /// Output offset bytes are written to; `None` outside ROM.
    pub pc: Option<u32>,
    /// Logical address labels bind to.
    pub reloc: i64,
    /// The output position was set inside RAM.
    pub in_ram: bool,
}

impl ResolverState {
    pub fn new(pass: Pass, bus: &Bus, origin: i64) -> Self {
        Self {
            pass,
            pc: bus.physical(origin),
            reloc: origin,
            in_ram: bus.is_writable(origin),
        }
    }

    /// `*=`: moves both the output position and the logical address.
    pub fn set_position(&mut self, bus: &Bus, address: i64) {
        self.reloc = address;
        self.pc = bus.physical(address);
        self.in_ram = bus.is_writable(address);
    }

    /// `@=`: moves only the logical address.
    pub fn relocate(&mut self, address: i64) {
        self.reloc = address;
    }

    pub fn advance(&mut self, bus: &Bus, count: usize) -> Result<(), BusError> {
        let count = count as i64;
        self.reloc = bus.advance(self.reloc, count)?;
        self.pc = self.pc.and_then(|pc| u32::try_from(i64::from(pc) + count).ok());
        Ok(())
    }
}

struct Deferred<'n> {
    target: ScopeId,
    lookup: ScopeId,
    name: &'n str,
    value: &'n Expr,
}

pub struct Resolver<'a> {
    nodes: &'a [Spanned<Node>],
    scopes: &'a mut ScopeTree,
    bus: &'a Bus,
    origin: i64,
}

type PassResult<T> = Result<T, Vec<NodeError>>;

impl<'a> Resolver<'a> {
    pub fn new(nodes: &'a [Spanned<Node>], scopes: &'a mut ScopeTree, bus: &'a Bus, origin: i64) -> Self {
        Self {
            nodes,
            scopes,
            bus,
            origin,
        }
    }

    /// Runs the size and label passes, leaving every label bound.
    pub fn resolve_labels(&mut self) -> PassResult<()> {
        let positions = self.size_pass()?;
        self.label_pass(&positions)
    }

    fn size_pass(&mut self) -> PassResult<FxHashMap<usize, i64>> {
        let mut state = ResolverState::new(Pass::Size, self.bus, self.origin);
        let mut positions = FxHashMap::default();
        let mut deferred = Vec::new();
        self.scopes.reset();

        let nodes = self.nodes;
        for (index, node) in nodes.iter().enumerate() {
            let span = node.span;
            match &node.node {
                Node::Label(name) => {
                    trace!(label = %name, address = state.reloc, "label placed");
                    self.scopes.add_label(name.clone(), state.reloc);
                    positions.insert(index, state.reloc);
                }
                Node::SymbolBinding {
                    name,
                    value,
                    from_parent,
                } => {
                    let target = self.scopes.current();
                    let lookup = self.binding_scope(*from_parent);
                    match evaluate(value, &self.scopes.view(lookup)) {
                        Ok(result) => self.scopes.set_symbol(target, name.clone(), SymbolValue::Int(result)),
                        Err(EvalError::Undefined { .. }) => deferred.push(Deferred {
                            target,
                            lookup,
                            name,
                            value,
                        }),
                        Err(error) => return Err(vec![error.into()]),
                    }
                }
                Node::BinaryInclude { base, bytes } => {
                    self.scopes.add_label(base.clone(), state.reloc);
                    let target = self.scopes.current();
                    self.scopes.set_symbol(
                        target,
                        format!("{base}__size"),
                        SymbolValue::Int(bytes.len() as i64),
                    );
                    self.advance(&mut state, bytes.len(), span).map_err(|error| vec![error])?;
                }
                Node::Opcode(opcode) => {
                    let len = self.estimated_len(opcode, &state);
                    self.advance(&mut state, len, span).map_err(|error| vec![error])?;
                }
                _ => self.walk_common(&node.node, &mut state, span).map_err(|error| vec![error])?,
            }
        }

        self.settle(deferred);
        debug!(labels = positions.len(), end = state.reloc, "size pass done");
        Ok(positions)
    }

    // Binds deferred symbols until no more can be resolved. What remains
    // is reported by the label pass.
    fn settle(&mut self, mut deferred: Vec<Deferred<'_>>) {
        loop {
            let before = deferred.len();
            deferred.retain(|binding| {
                match evaluate(binding.value, &self.scopes.view(binding.lookup)) {
                    Ok(result) => {
                        self.scopes
                            .set_symbol(binding.target, binding.name, SymbolValue::Int(result));
                        false
                    }
                    Err(_) => true,
                }
            });
            if deferred.is_empty() || deferred.len() == before {
                break;
            }
        }
        if !deferred.is_empty() {
            debug!(unresolved = deferred.len(), "bindings left after size pass");
        }
    }

    fn label_pass(&mut self, positions: &FxHashMap<usize, i64>) -> PassResult<()> {
        let mut state = ResolverState::new(Pass::Labels, self.bus, self.origin);
        let mut errors = Vec::new();
        self.scopes.reset();

        let nodes = self.nodes;
        for (index, node) in nodes.iter().enumerate() {
            let span = node.span;
            match &node.node {
                Node::Label(name) => {
                    let placed = positions.get(&index).copied().unwrap_or(state.reloc);
                    if placed != state.reloc {
                        errors.push(
                            NodeError::new(
                                format!(
                                    "label '{name}' moved from {placed:#08x} to {:#08x} once symbols were known",
                                    state.reloc
                                ),
                                span,
                            )
                            .with_help(
                                "an operand width before this label changed; fix it with a .b, .w or .l suffix",
                            ),
                        );
                    }
                }
                Node::SymbolBinding {
                    name,
                    value,
                    from_parent,
                } => {
                    if let Err(error) = self.bind(name, value, *from_parent) {
                        errors.push(error);
                    }
                }
                Node::BinaryInclude { bytes, .. } => {
                    self.advance(&mut state, bytes.len(), span).map_err(|error| vec![error])?;
                }
                Node::Opcode(opcode) => {
                    let len = match self.checked_len(opcode, span) {
                        Ok(len) => len,
                        Err(error) => {
                            errors.push(error);
                            self.estimated_len(opcode, &state)
                        }
                    };
                    self.advance(&mut state, len, span).map_err(|error| vec![error])?;
                }
                _ => self.walk_common(&node.node, &mut state, span).map_err(|error| vec![error])?,
            }
        }

        debug!(errors = errors.len(), "label pass done");
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Emits bytes, one block per contiguous run of output.
    pub fn emit_blocks(&mut self) -> PassResult<Vec<Block>> {
        let mut state = ResolverState::new(Pass::Emit, self.bus, self.origin);
        let mut emitter = Emitter::default();
        let mut errors = Vec::new();
        let mut unbacked_reported = false;
        self.scopes.reset();

        let nodes = self.nodes;
        for node in nodes {
            let span = node.span;
            let bytes = match &node.node {
                Node::Label(_) => continue,
                Node::SymbolBinding {
                    name,
                    value,
                    from_parent,
                } => {
                    if let Err(error) = self.bind(name, value, *from_parent) {
                        errors.push(error);
                    }
                    continue;
                }
                Node::Opcode(opcode) => match self.encode(opcode, &state, span) {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        errors.push(error);
                        vec![0; self.estimated_len(opcode, &state)]
                    }
                },
                Node::Data { width, value } => {
                    let encoded = evaluate(value, &*self.scopes)
                        .map_err(NodeError::from)
                        .and_then(|result| {
                            width.encode(result).ok_or_else(|| {
                                NodeError::new(
                                    format!("value {result:#x} does not fit in {} byte(s)", width.byte_len()),
                                    span,
                                )
                                .with_help(format!(
                                    "mask the value to keep its low bytes, e.g. `{} & {:#x}`",
                                    value.as_symbol().unwrap_or("value"),
                                    width.mask()
                                ))
                            })
                        });
                    match encoded {
                        Ok(bytes) => bytes,
                        Err(error) => {
                            errors.push(error);
                            vec![0; width.byte_len()]
                        }
                    }
                }
                Node::Bytes(bytes) | Node::BinaryInclude { bytes, .. } => bytes.clone(),
                Node::IncludePatch { blocks } => {
                    emitter.flush();
                    emitter.blocks.extend(blocks.iter().cloned());
                    continue;
                }
                Node::CodePosition(_) | Node::RelocationAddress(_) => {
                    emitter.flush();
                    unbacked_reported = false;
                    self.walk_common(&node.node, &mut state, span).map_err(|error| vec![error])?;
                    continue;
                }
                Node::ScopeEnter | Node::ScopeExit => {
                    self.walk_common(&node.node, &mut state, span).map_err(|error| vec![error])?;
                    continue;
                }
            };

            match state.pc {
                Some(pc) => emitter.write(pc, &bytes),
                None if state.in_ram || bytes.is_empty() => debug!(
                    len = bytes.len(),
                    address = state.reloc,
                    "RAM position, bytes dropped"
                ),
                None if unbacked_reported => {}
                None => {
                    unbacked_reported = true;
                    errors.push(
                        NodeError::new(
                            format!("address {:#08x} has no physical backing", state.reloc),
                            span,
                        )
                        .with_help("move the code into ROM with *=, or declare the region with .map"),
                    );
                }
            }
            self.advance(&mut state, bytes.len(), span).map_err(|error| vec![error])?;
        }

        emitter.flush();
        debug!(blocks = emitter.blocks.len(), errors = errors.len(), "emit pass done");
        if errors.is_empty() {
            Ok(emitter.blocks)
        } else {
            Err(errors)
        }
    }

    // Nodes that behave the same in every pass.
    fn walk_common(&mut self, node: &Node, state: &mut ResolverState, span: Span) -> Result<(), NodeError> {
        match node {
            Node::Data { width, .. } => self.advance(state, width.byte_len(), span),
            Node::Bytes(bytes) => self.advance(state, bytes.len(), span),
            Node::ScopeEnter => self
                .scopes
                .use_next_scope()
                .map(|_| ())
                .map_err(|error| NodeError::scope(error, span)),
            Node::ScopeExit => self
                .scopes
                .restore_scope(state.pass != Pass::Emit)
                .map_err(|error| NodeError::scope(error, span)),
            Node::CodePosition(value) => {
                let address = evaluate(value, &*self.scopes)?;
                state.set_position(self.bus, address);
                trace!(pass = %state.pass, address, pc = ?state.pc, "code position");
                Ok(())
            }
            Node::RelocationAddress(value) => {
                let address = evaluate(value, &*self.scopes)?;
                state.relocate(address);
                trace!(pass = %state.pass, address, "relocated");
                Ok(())
            }
            Node::IncludePatch { .. } => Ok(()),
            Node::Label(_) | Node::SymbolBinding { .. } | Node::BinaryInclude { .. } | Node::Opcode(_) => {
                Ok(())
            }
        }
    }

    fn binding_scope(&self, from_parent: bool) -> ScopeId {
        let current = self.scopes.current();
        if from_parent {
            self.scopes.parent_of(current).unwrap_or(current)
        } else {
            current
        }
    }

    fn bind(&mut self, name: &str, value: &Expr, from_parent: bool) -> Result<(), NodeError> {
        let lookup = self.binding_scope(from_parent);
        let result = evaluate(value, &self.scopes.view(lookup))?;
        let target = self.scopes.current();
        self.scopes.set_symbol(target, name, SymbolValue::Int(result));
        Ok(())
    }

    fn advance(&self, state: &mut ResolverState, count: usize, span: Span) -> Result<(), NodeError> {
        state
            .advance(self.bus, count)
            .map_err(|error| NodeError::bus(error, span))
    }

    // Unknown operands take the current address as a stand-in, assuming
    // forward references usually land in the same bank.
    fn estimated_len(&self, opcode: &OpcodeNode, state: &ResolverState) -> usize {
        if opcode.instruction.is_relative() {
            return opcode.relative_len() as usize;
        }
        let proxy = opcode
            .operand
            .as_ref()
            .and_then(|expr| evaluate(expr, &*self.scopes).ok())
            .unwrap_or(state.reloc);
        opcode.estimated_len(proxy)
    }

    fn checked_len(&self, opcode: &OpcodeNode, span: Span) -> Result<usize, NodeError> {
        if opcode.instruction.is_relative() {
            return Ok(opcode.relative_len() as usize);
        }
        let value = self.operand_value(opcode, span)?;
        opcode.len(value).map_err(|error| NodeError::encode(error, span))
    }

    fn operand_value(&self, opcode: &OpcodeNode, span: Span) -> Result<i64, NodeError> {
        let value = match &opcode.operand {
            Some(expr) => evaluate(expr, &*self.scopes)?,
            None => 0,
        };
        let Some(destination) = &opcode.destination else {
            return Ok(value);
        };
        let destination = evaluate(destination, &*self.scopes)?;
        let bank = |value: i64| {
            u8::try_from(value).map(i64::from).map_err(|_| {
                NodeError::new(format!("bank {value:#x} does not fit in a byte"), span)
                    .with_help("block moves take bank numbers, e.g. `label >> 16`")
            })
        };
        Ok((bank(value)? << 8) | bank(destination)?)
    }

    fn encode(&self, opcode: &OpcodeNode, state: &ResolverState, span: Span) -> Result<Vec<u8>, NodeError> {
        let value = self.operand_value(opcode, span)?;
        let instruction = &opcode.instruction;
        if !instruction.is_relative() {
            return instruction
                .encode(opcode.operand_size(value), value)
                .map_err(|error| NodeError::encode(error, span));
        }

        let unmapped = |address: i64| {
            NodeError::new(format!("{address:#08x} has no physical address"), span)
                .with_help("relative branches only work between ROM addresses")
        };
        let target = self.bus.physical(value).ok_or_else(|| unmapped(value))?;
        let here = self.bus.physical(state.reloc).ok_or_else(|| unmapped(state.reloc))?;
        let displacement = i64::from(target) - i64::from(here) - opcode.relative_len();
        instruction
            .encode(OperandSize::Byte, displacement)
            .map_err(|error| NodeError::encode(error, span))
    }
}

#[derive(Debug, Default)]
struct Emitter {
    current: Option<Block>,
    blocks: Vec<Block>,
}

impl Emitter {
    fn write(&mut self, pc: u32, bytes: &[u8]) {
        if let Some(block) = &self.current
            && block.end() != pc
        {
            self.flush();
        }
        self.current
            .get_or_insert_with(|| Block::new(pc, Vec::new()))
            .bytes
            .extend_from_slice(bytes);
    }

    fn flush(&mut self) {
        if let Some(block) = self.current.take()
            && !block.bytes.is_empty()
        {
            self.blocks.push(block);
        }
    }
}
