// Copyright 2026 the IR Bytecode Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory IR: a context of uniqued attributes/types/names and a module
//! arena of operations, blocks, and regions.
//!
//! Everything is id-indexed. Attributes and types are interned in a
//! [`Context`] and compared by id; operations, blocks, and regions live in
//! a [`Module`] arena so the reader can discard partially built IR by
//! truncating to a [`Watermark`] on failure.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use hashbrown::HashMap;

/// A dialect handle registered in a [`Context`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dialect(pub u32);

/// An interned operation name (`"<dialect>.<local>"`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OpName(pub u32);

/// An interned attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Attribute(pub u32);

/// An interned type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Type(pub u32);

/// An operation in a [`Module`] arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OpId(pub u32);

/// A block in a [`Module`] arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// A region in a [`Module`] arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegionId(pub u32);

/// An SSA value: an operation result or a block argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    /// The `index`th result of `op`.
    OpResult {
        /// Defining operation.
        op: OpId,
        /// Result index.
        index: u32,
    },
    /// The `index`th argument of `block`.
    BlockArg {
        /// Owning block.
        block: BlockId,
        /// Argument index.
        index: u32,
    },
}

/// Interned attribute payloads (builtin dialect).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AttrData {
    /// The unit attribute.
    Unit,
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Integer(i64),
    /// A UTF-8 string.
    String(String),
    /// An ordered list of attributes.
    Array(Vec<Attribute>),
    /// A dictionary with sorted, unique keys.
    Dictionary(Vec<(String, Attribute)>),
    /// A type wrapped as an attribute.
    Type(Type),
    /// An unknown source location.
    UnknownLoc,
    /// A file-line-column source location.
    FileLineColLoc {
        /// File name.
        file: String,
        /// Line number.
        line: u32,
        /// Column number.
        column: u32,
    },
    /// A named source location wrapping a child location.
    NameLoc {
        /// The name.
        name: String,
        /// The child location attribute.
        child: Attribute,
    },
}

/// Interned type payloads (builtin dialect).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeData {
    /// The unit/none type.
    None,
    /// The platform-width index type.
    Index,
    /// An integer type of the given bit width.
    Integer {
        /// Bit width.
        width: u32,
    },
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// A function type.
    Function {
        /// Input types.
        inputs: Vec<Type>,
        /// Result types.
        results: Vec<Type>,
    },
}

#[derive(Clone, Debug)]
struct DialectEntry {
    name: String,
    registered: bool,
}

#[derive(Clone, Debug)]
struct OpNameEntry {
    dialect: Dialect,
    name: String,
}

/// The IR context: dialect registry plus uniqued attributes, types, and
/// operation names.
#[derive(Debug, Default)]
pub struct Context {
    dialects: Vec<DialectEntry>,
    dialect_ids: HashMap<String, Dialect>,
    op_names: Vec<OpNameEntry>,
    op_name_ids: HashMap<String, OpName>,
    attrs: Vec<AttrData>,
    attr_ids: HashMap<AttrData, Attribute>,
    types: Vec<TypeData>,
    type_ids: HashMap<TypeData, Type>,
    allow_unregistered: bool,
}

impl Context {
    /// Creates a context with the builtin dialect registered.
    #[must_use]
    pub fn new() -> Self {
        let mut ctx = Self::default();
        ctx.register_dialect("builtin");
        ctx
    }

    /// Registers a dialect by name, returning its handle. Registering an
    /// existing dialect marks it registered and returns the same handle.
    pub fn register_dialect(&mut self, name: &str) -> Dialect {
        if let Some(&d) = self.dialect_ids.get(name) {
            self.dialects[d.0 as usize].registered = true;
            return d;
        }
        let d = Dialect(self.dialects.len() as u32);
        self.dialects.push(DialectEntry {
            name: name.to_string(),
            registered: true,
        });
        self.dialect_ids.insert(name.to_string(), d);
        d
    }

    /// Controls whether unregistered dialects may be created on demand.
    pub fn allow_unregistered_dialects(&mut self, allow: bool) {
        self.allow_unregistered = allow;
    }

    /// Returns true if unregistered dialects may be created on demand.
    #[must_use]
    pub fn allows_unregistered_dialects(&self) -> bool {
        self.allow_unregistered
    }

    /// Returns the dialect named `name`, creating an unregistered entry if
    /// the context allows it. Returns `None` for an unknown dialect when
    /// unregistered dialects are disallowed.
    pub fn get_or_load_dialect(&mut self, name: &str) -> Option<Dialect> {
        if let Some(&d) = self.dialect_ids.get(name) {
            return Some(d);
        }
        if !self.allow_unregistered {
            return None;
        }
        let d = Dialect(self.dialects.len() as u32);
        self.dialects.push(DialectEntry {
            name: name.to_string(),
            registered: false,
        });
        self.dialect_ids.insert(name.to_string(), d);
        Some(d)
    }

    /// Returns the name of `dialect`.
    #[must_use]
    pub fn dialect_name(&self, dialect: Dialect) -> &str {
        &self.dialects[dialect.0 as usize].name
    }

    /// Returns true if `dialect` was registered (rather than created on
    /// demand as unregistered).
    #[must_use]
    pub fn is_registered(&self, dialect: Dialect) -> bool {
        self.dialects[dialect.0 as usize].registered
    }

    /// Interns the qualified operation name `full_name` owned by `dialect`.
    pub fn op_name(&mut self, dialect: Dialect, full_name: &str) -> OpName {
        if let Some(&n) = self.op_name_ids.get(full_name) {
            return n;
        }
        let n = OpName(self.op_names.len() as u32);
        self.op_names.push(OpNameEntry {
            dialect,
            name: full_name.to_string(),
        });
        self.op_name_ids.insert(full_name.to_string(), n);
        n
    }

    /// Returns the qualified string of `name`.
    #[must_use]
    pub fn op_name_str(&self, name: OpName) -> &str {
        &self.op_names[name.0 as usize].name
    }

    /// Returns the dialect owning `name`.
    #[must_use]
    pub fn op_name_dialect(&self, name: OpName) -> Dialect {
        self.op_names[name.0 as usize].dialect
    }

    /// Interns an attribute payload.
    pub fn intern_attr(&mut self, data: AttrData) -> Attribute {
        if let Some(&a) = self.attr_ids.get(&data) {
            return a;
        }
        let a = Attribute(self.attrs.len() as u32);
        self.attrs.push(data.clone());
        self.attr_ids.insert(data, a);
        a
    }

    /// Returns the payload of `attr`.
    #[must_use]
    pub fn attr_data(&self, attr: Attribute) -> &AttrData {
        &self.attrs[attr.0 as usize]
    }

    /// Interns a type payload.
    pub fn intern_type(&mut self, data: TypeData) -> Type {
        if let Some(&t) = self.type_ids.get(&data) {
            return t;
        }
        let t = Type(self.types.len() as u32);
        self.types.push(data.clone());
        self.type_ids.insert(data, t);
        t
    }

    /// Returns the payload of `ty`.
    #[must_use]
    pub fn type_data(&self, ty: Type) -> &TypeData {
        &self.types[ty.0 as usize]
    }

    /// The unknown location attribute.
    pub fn unknown_loc(&mut self) -> Attribute {
        self.intern_attr(AttrData::UnknownLoc)
    }

    /// A file-line-column location attribute.
    pub fn file_line_col_loc(&mut self, file: &str, line: u32, column: u32) -> Attribute {
        self.intern_attr(AttrData::FileLineColLoc {
            file: file.to_string(),
            line,
            column,
        })
    }

    /// The none type.
    pub fn none_type(&mut self) -> Type {
        self.intern_type(TypeData::None)
    }

    /// An integer type of bit width `width`.
    pub fn integer_type(&mut self, width: u32) -> Type {
        self.intern_type(TypeData::Integer { width })
    }

    /// Returns true if `attr` is a location kind.
    #[must_use]
    pub fn is_location(&self, attr: Attribute) -> bool {
        matches!(
            self.attr_data(attr),
            AttrData::UnknownLoc | AttrData::FileLineColLoc { .. } | AttrData::NameLoc { .. }
        )
    }

    /// Returns the entries of `attr` if it is a dictionary.
    #[must_use]
    pub fn as_dictionary(&self, attr: Attribute) -> Option<&[(String, Attribute)]> {
        match self.attr_data(attr) {
            AttrData::Dictionary(entries) => Some(entries),
            _ => None,
        }
    }

    /// Renders `attr` in the textual assembly format.
    #[must_use]
    pub fn attr_string(&self, attr: Attribute) -> String {
        match self.attr_data(attr) {
            AttrData::Unit => "unit".to_string(),
            AttrData::Bool(b) => b.to_string(),
            AttrData::Integer(v) => v.to_string(),
            AttrData::String(s) => format!("\"{}\"", escape(s)),
            AttrData::Array(elems) => {
                let inner: Vec<String> = elems.iter().map(|&a| self.attr_string(a)).collect();
                format!("[{}]", inner.join(", "))
            }
            AttrData::Dictionary(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{k} = {}", self.attr_string(*v)))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            AttrData::Type(t) => self.type_string(*t),
            AttrData::UnknownLoc => "loc(unknown)".to_string(),
            AttrData::FileLineColLoc { file, line, column } => {
                format!("loc(\"{}\":{line}:{column})", escape(file))
            }
            AttrData::NameLoc { name, child } => match self.attr_data(*child) {
                AttrData::UnknownLoc => format!("loc(\"{}\")", escape(name)),
                _ => format!("loc(\"{}\"({}))", escape(name), self.loc_payload_string(*child)),
            },
        }
    }

    fn loc_payload_string(&self, loc: Attribute) -> String {
        // A location rendered without the `loc(...)` wrapper.
        let s = self.attr_string(loc);
        s.strip_prefix("loc(")
            .and_then(|s| s.strip_suffix(')'))
            .map_or(s.clone(), ToString::to_string)
    }

    /// Renders `ty` in the textual assembly format.
    #[must_use]
    pub fn type_string(&self, ty: Type) -> String {
        match self.type_data(ty) {
            TypeData::None => "none".to_string(),
            TypeData::Index => "index".to_string(),
            TypeData::Integer { width } => format!("i{width}"),
            TypeData::F32 => "f32".to_string(),
            TypeData::F64 => "f64".to_string(),
            TypeData::Function { inputs, results } => {
                let ins: Vec<String> = inputs.iter().map(|&t| self.type_string(t)).collect();
                let outs: Vec<String> = results.iter().map(|&t| self.type_string(t)).collect();
                format!("({}) -> ({})", ins.join(", "), outs.join(", "))
            }
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// The state used to build an operation.
#[derive(Clone, Debug)]
pub struct OperationState {
    /// Operation name.
    pub name: OpName,
    /// Location attribute.
    pub loc: Attribute,
    /// Optional attribute dictionary.
    pub attrs: Option<Attribute>,
    /// Result types.
    pub result_types: Vec<Type>,
    /// Operand values.
    pub operands: Vec<Value>,
    /// Successor blocks.
    pub successors: Vec<BlockId>,
    /// Number of (empty) regions to allocate.
    pub num_regions: usize,
}

impl OperationState {
    /// Creates a state for `name` at `loc` with no other components.
    #[must_use]
    pub fn new(name: OpName, loc: Attribute) -> Self {
        Self {
            name,
            loc,
            attrs: None,
            result_types: Vec::new(),
            operands: Vec::new(),
            successors: Vec::new(),
            num_regions: 0,
        }
    }
}

/// An operation stored in a [`Module`].
#[derive(Clone, Debug)]
pub struct OpData {
    /// Operation name.
    pub name: OpName,
    /// Location attribute.
    pub loc: Attribute,
    /// Optional attribute dictionary.
    pub attrs: Option<Attribute>,
    /// Result types.
    pub result_types: Vec<Type>,
    /// Operand values.
    pub operands: Vec<Value>,
    /// Successor blocks.
    pub successors: Vec<BlockId>,
    /// Owned regions.
    pub regions: Vec<RegionId>,
    /// The block holding this operation, if attached.
    pub parent: Option<BlockId>,
}

/// A block stored in a [`Module`].
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    /// Block arguments as `(type, location)` pairs.
    pub args: Vec<(Type, Attribute)>,
    /// Operations in order.
    pub ops: Vec<OpId>,
    /// The region holding this block, if attached.
    pub parent: Option<RegionId>,
}

/// A region stored in a [`Module`].
#[derive(Clone, Debug, Default)]
pub struct RegionData {
    /// Blocks in order.
    pub blocks: Vec<BlockId>,
}

/// A use site: an operand slot of an operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UseSite {
    /// The using operation.
    pub op: OpId,
    /// The operand index.
    pub index: u32,
}

/// An arena size snapshot, used to discard everything created after it.
#[derive(Copy, Clone, Debug)]
pub struct Watermark {
    ops: usize,
    blocks: usize,
    regions: usize,
}

/// An arena of operations, blocks, and regions with per-value use lists.
#[derive(Debug, Default)]
pub struct Module {
    ops: Vec<Option<OpData>>,
    blocks: Vec<Option<BlockData>>,
    regions: Vec<Option<RegionData>>,
    uses: HashMap<Value, Vec<UseSite>>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots the current arena sizes.
    #[must_use]
    pub fn watermark(&self) -> Watermark {
        Watermark {
            ops: self.ops.len(),
            blocks: self.blocks.len(),
            regions: self.regions.len(),
        }
    }

    /// Discards every op, block, and region created after `watermark`,
    /// along with use-list entries that touch them.
    pub fn truncate(&mut self, watermark: Watermark) {
        self.ops.truncate(watermark.ops);
        self.blocks.truncate(watermark.blocks);
        self.regions.truncate(watermark.regions);
        self.uses.retain(|value, sites| {
            sites.retain(|s| (s.op.0 as usize) < watermark.ops);
            match *value {
                Value::OpResult { op, .. } => (op.0 as usize) < watermark.ops,
                Value::BlockArg { block, .. } => (block.0 as usize) < watermark.blocks,
            }
        });
    }

    /// Creates a detached empty block.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(BlockData::default()));
        id
    }

    /// Creates a detached operation from `state`, allocating
    /// `state.num_regions` empty regions and registering operand uses.
    pub fn create_op(&mut self, state: OperationState) -> OpId {
        let id = OpId(self.ops.len() as u32);
        let mut regions = Vec::with_capacity(state.num_regions);
        for _ in 0..state.num_regions {
            let r = RegionId(self.regions.len() as u32);
            self.regions.push(Some(RegionData::default()));
            regions.push(r);
        }
        for (i, &operand) in state.operands.iter().enumerate() {
            self.uses.entry(operand).or_default().push(UseSite {
                op: id,
                index: i as u32,
            });
        }
        self.ops.push(Some(OpData {
            name: state.name,
            loc: state.loc,
            attrs: state.attrs,
            result_types: state.result_types,
            operands: state.operands,
            successors: state.successors,
            regions,
            parent: None,
        }));
        id
    }

    /// Returns the data of `op`.
    #[must_use]
    pub fn op(&self, op: OpId) -> &OpData {
        self.ops[op.0 as usize].as_ref().expect("erased op")
    }

    fn op_mut(&mut self, op: OpId) -> &mut OpData {
        self.ops[op.0 as usize].as_mut().expect("erased op")
    }

    /// Returns the data of `block`.
    #[must_use]
    pub fn block(&self, block: BlockId) -> &BlockData {
        self.blocks[block.0 as usize].as_ref().expect("erased block")
    }

    fn block_mut(&mut self, block: BlockId) -> &mut BlockData {
        self.blocks[block.0 as usize].as_mut().expect("erased block")
    }

    /// Returns the data of `region`.
    #[must_use]
    pub fn region(&self, region: RegionId) -> &RegionData {
        self.regions[region.0 as usize]
            .as_ref()
            .expect("erased region")
    }

    /// Returns the `index`th result of `op` as a value.
    #[must_use]
    pub fn op_result(&self, op: OpId, index: u32) -> Value {
        debug_assert!((index as usize) < self.op(op).result_types.len());
        Value::OpResult { op, index }
    }

    /// Appends `block` to `region`.
    pub fn region_append_block(&mut self, region: RegionId, block: BlockId) {
        self.regions[region.0 as usize]
            .as_mut()
            .expect("erased region")
            .blocks
            .push(block);
        self.block_mut(block).parent = Some(region);
    }

    /// Appends `op` to the end of `block`.
    pub fn append_op(&mut self, block: BlockId, op: OpId) {
        self.block_mut(block).ops.push(op);
        self.op_mut(op).parent = Some(block);
    }

    /// Appends arguments to `block`, returning their values in order.
    pub fn add_block_args(&mut self, block: BlockId, args: &[(Type, Attribute)]) -> Vec<Value> {
        let data = self.block_mut(block);
        let first = data.args.len() as u32;
        data.args.extend_from_slice(args);
        (0..args.len() as u32)
            .map(|i| Value::BlockArg {
                block,
                index: first + i,
            })
            .collect()
    }

    /// Rewrites every use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: Value, new: Value) {
        let sites = self.uses.remove(&old).unwrap_or_default();
        for site in &sites {
            self.op_mut(site.op).operands[site.index as usize] = new;
        }
        if !sites.is_empty() {
            self.uses.entry(new).or_default().extend(sites);
        }
    }

    /// Returns the use sites of `value`.
    #[must_use]
    pub fn uses_of(&self, value: Value) -> &[UseSite] {
        self.uses.get(&value).map_or(&[], Vec::as_slice)
    }

    /// Erases a detached operation. The operation's results must have no
    /// remaining uses.
    pub fn erase_op(&mut self, op: OpId) {
        let data = self.ops[op.0 as usize].take().expect("erased op");
        debug_assert!(data.parent.is_none());
        for (i, operand) in data.operands.iter().enumerate() {
            if let Some(sites) = self.uses.get_mut(operand) {
                sites.retain(|s| !(s.op == op && s.index as usize == i));
            }
        }
        for index in 0..data.result_types.len() as u32 {
            let result = Value::OpResult { op, index };
            debug_assert!(self.uses_of(result).is_empty());
            self.uses.remove(&result);
        }
    }

    /// Erases a block, detaching it from its parent region. It must hold
    /// no operations.
    pub fn erase_block(&mut self, block: BlockId) {
        let data = self.blocks[block.0 as usize].take().expect("erased block");
        debug_assert!(data.ops.is_empty());
        if let Some(region) = data.parent {
            self.regions[region.0 as usize]
                .as_mut()
                .expect("erased region")
                .blocks
                .retain(|&b| b != block);
        }
    }

    /// Erases a region. It must hold no blocks.
    pub fn erase_region(&mut self, region: RegionId) {
        let data = self.regions[region.0 as usize]
            .take()
            .expect("erased region");
        debug_assert!(data.blocks.is_empty());
    }

    /// Detaches all operations of `from` in order and inserts them into
    /// `to`, before the final operation of `to` when one exists (the
    /// terminator slot), otherwise at the end.
    pub fn splice_block_ops(&mut self, from: BlockId, to: BlockId) {
        let moved = core::mem::take(&mut self.block_mut(from).ops);
        for &op in &moved {
            self.op_mut(op).parent = Some(to);
        }
        let dest = self.block_mut(to);
        let at = dest.ops.len().saturating_sub(1);
        if dest.ops.is_empty() {
            dest.ops = moved;
        } else {
            dest.ops.splice(at..at, moved);
        }
    }
}
