// Copyright 2026 the IR Bytecode Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The bytecode reader: reconstructs a module from its binary encoding.
//!
//! A file is `magic || varint(version) || cstring(producer)` followed by
//! five uniquely-tagged sections. Sections are gathered first and then
//! processed in dependency order: strings, dialects, the attribute/type
//! index, and finally the IR itself. Attribute and type entries are
//! materialized lazily the first time the IR references them.
//!
//! Regions are traversed iteratively over a stack of [`RegionReadState`]
//! frames, so deeply nested input cannot overflow the native stack.
//! Operands may reference values before their definition has been read;
//! such forward references are modeled as detached placeholder operations
//! whose result is substituted once the real definition appears.

use alloc::format;
use alloc::string::ToString;
use alloc::vec;
use alloc::vec::Vec;

use crate::asm;
use crate::diag::{Diagnostic, FileLoc};
use crate::encoding::{self, SectionId, op_encoding};
use crate::format::Reader;
use crate::ir::{
    Attribute, BlockId, Context, Dialect, Module, OpId, OpName, OperationState, Type, Value,
};
use crate::verifier;

/// Configuration for bytecode parsing.
#[derive(Clone, Debug)]
pub struct ParserConfig {
    /// Whether to run the structural verifier over the parsed module
    /// before handing it back.
    pub verify_after_parse: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            verify_after_parse: true,
        }
    }
}

/// An input buffer paired with an identifier used for error locations.
#[derive(Copy, Clone, Debug)]
pub struct SourceBuffer<'a> {
    /// The raw bytes.
    pub data: &'a [u8],
    /// The buffer identifier (typically a file path).
    pub identifier: &'a str,
}

/// Returns true if `data` starts with the bytecode magic number.
#[must_use]
pub fn is_bytecode(data: &[u8]) -> bool {
    data.starts_with(&encoding::MAGIC)
}

/// Reads the bytecode in `buffer` and appends the parsed top-level
/// operations into `block` (before its terminator when the block is
/// non-empty).
///
/// On failure `block` is left untouched, everything created during the
/// parse is discarded from `module`, and the returned diagnostic carries
/// the buffer's location (plus a version/producer note for errors past the
/// header).
pub fn read_bytecode_file(
    buffer: &SourceBuffer<'_>,
    ctx: &mut Context,
    module: &mut Module,
    block: BlockId,
    config: &ParserConfig,
) -> Result<(), Diagnostic> {
    let source_file_loc = FileLoc::new(buffer.identifier);
    if !is_bytecode(buffer.data) {
        return Err(Diagnostic::error(
            &source_file_loc,
            "input buffer is not an MLIR bytecode file",
        ));
    }

    let watermark = module.watermark();
    let mut reader = BytecodeReader::new(&source_file_loc, config, ctx, module);
    let result = reader.read(buffer.data, block);
    if result.is_err() {
        module.truncate(watermark);
    }
    result
}

fn parse_count(r: &mut Reader<'_>) -> Result<usize, Diagnostic> {
    let value = r.parse_varint()?;
    usize::try_from(value)
        .map_err(|_| r.emit_error(format!("count {value} exceeds the host address space")))
}

/// Parses a varint index and resolves it against a table of `num_entries`.
fn parse_entry_index(
    r: &mut Reader<'_>,
    num_entries: usize,
    entry_kind: &str,
) -> Result<usize, Diagnostic> {
    let index = r.parse_varint()?;
    if index >= num_entries as u64 {
        return Err(r.emit_error(format!("invalid {entry_kind} index: {index}")));
    }
    Ok(index as usize)
}

/// Parses a section header and its payload.
fn parse_section<'a>(r: &mut Reader<'a>) -> Result<(SectionId, &'a [u8]), Diagnostic> {
    let id_byte = r.parse_byte()?;
    let length = r.parse_varint()?;
    let Some(id) = SectionId::from_byte(id_byte) else {
        return Err(r.emit_error(format!("invalid section ID: {id_byte}")));
    };
    let length = usize::try_from(length).map_err(|_| {
        r.emit_error(format!(
            "attempting to parse {length} bytes when only {} remain",
            r.size()
        ))
    })?;
    let data = r.parse_bytes(length)?;
    Ok((id, data))
}

/// A dialect referenced by the bytecode, loaded lazily on first use.
#[derive(Debug)]
struct BytecodeDialect<'a> {
    name: &'a str,
    /// The load outcome; `None` until the first use.
    dialect: Option<Dialect>,
}

/// An operation name referenced by the bytecode.
#[derive(Debug)]
struct BytecodeOpName<'a> {
    /// Index of the owning dialect.
    dialect: usize,
    /// The name without the dialect prefix.
    name: &'a str,
    /// The qualified name, memoized on first use.
    op_name: Option<OpName>,
}

/// A lazily materialized attribute entry.
#[derive(Debug)]
struct AttrEntry<'a> {
    data: &'a [u8],
    dialect: usize,
    has_custom_encoding: bool,
    resolved: Option<Attribute>,
}

/// A lazily materialized type entry.
#[derive(Debug)]
struct TypeEntry<'a> {
    data: &'a [u8],
    dialect: usize,
    has_custom_encoding: bool,
    resolved: Option<Type>,
}

struct RawAttrTypeEntry<'a> {
    data: &'a [u8],
    dialect: usize,
    has_custom_encoding: bool,
}

/// Parses the entries of one dialect-grouped list from the offset section,
/// assigning each entry its contiguous byte range within `section`.
fn parse_offset_entries<'a>(
    r: &mut Reader<'a>,
    num_entries: usize,
    num_dialects: usize,
    section: &'a [u8],
    current_offset: &mut usize,
) -> Result<Vec<RawAttrTypeEntry<'a>>, Diagnostic> {
    let mut entries = Vec::with_capacity(num_entries);
    while entries.len() != num_entries {
        let dialect = parse_entry_index(r, num_dialects, "dialect")?;
        let group_size = r.parse_varint()?;
        for _ in 0..group_size {
            if entries.len() == num_entries {
                return Err(
                    r.emit_error("too many Attribute or Type entries in the offset section")
                );
            }
            let (entry_size, has_custom_encoding) = r.parse_varint_with_flag()?;
            let entry_size = usize::try_from(entry_size).unwrap_or(usize::MAX);
            let end = current_offset
                .checked_add(entry_size)
                .filter(|&end| end <= section.len())
                .ok_or_else(|| {
                    r.emit_error("Attribute or Type entry offset points past the end of section")
                })?;
            entries.push(RawAttrTypeEntry {
                data: &section[*current_offset..end],
                dialect,
                has_custom_encoding,
            });
            *current_offset = end;
        }
    }
    Ok(entries)
}

/// The read state for the regions of one operation, kept on an explicit
/// stack rather than the native one.
#[derive(Debug)]
struct RegionReadState {
    /// The operation owning the regions.
    op: OpId,
    /// The next region of `op` to read.
    cur_region: usize,
    /// One past the last region of `op`.
    end_region: usize,
    /// The number of values defined directly within the current region.
    num_values: usize,
    /// The blocks of the current region.
    cur_blocks: Vec<BlockId>,
    /// Index of the block being read, or `None` before the region header
    /// has been parsed.
    cur_block: Option<usize>,
    /// Operations left to read in the current block.
    num_ops_remaining: u64,
    /// Whether these regions are isolated from above.
    is_isolated_from_above: bool,
}

impl RegionReadState {
    fn new(op: OpId, num_regions: usize, is_isolated_from_above: bool) -> Self {
        Self {
            op,
            cur_region: 0,
            end_region: num_regions,
            num_values: 0,
            cur_blocks: Vec::new(),
            cur_block: None,
            num_ops_remaining: 0,
            is_isolated_from_above,
        }
    }
}

/// One SSA value scope, delimited by isolated-from-above regions.
#[derive(Debug, Default)]
struct ValueScope {
    /// Value slots, densely indexed; unset slots have not been defined
    /// (and may hold a forward reference once first used).
    values: Vec<Option<Value>>,
    /// The next value id to assign, one entry per in-flight region.
    next_value_ids: Vec<usize>,
}

impl ValueScope {
    fn push_region(&mut self, num_values: usize) {
        self.next_value_ids.push(self.values.len());
        self.values.resize(self.values.len() + num_values, None);
    }

    fn pop_region(&mut self, num_values: usize) {
        let new_len = self.values.len() - num_values;
        self.values.truncate(new_len);
        self.next_value_ids.pop();
    }
}

/// The bytecode reader state for a single buffer.
struct BytecodeReader<'a, 'c, 'm> {
    config: &'a ParserConfig,
    file_loc: &'a FileLoc,
    ctx: &'c mut Context,
    module: &'m mut Module,

    /// The version of the bytecode being read.
    version: u64,
    /// The producer recorded in the header.
    producer: &'a str,

    dialects: Vec<BytecodeDialect<'a>>,
    op_names: Vec<BytecodeOpName<'a>>,
    strings: Vec<&'a str>,
    attrs: Vec<AttrEntry<'a>>,
    types: Vec<TypeEntry<'a>>,

    value_scopes: Vec<ValueScope>,
    /// Placeholder operations currently standing in for a referenced but
    /// not-yet-defined value.
    forward_ref_ops: Vec<OpId>,
    /// Resolved placeholders available for reuse.
    open_forward_ref_ops: Vec<OpId>,

    module_op_name: OpName,
    forward_ref_op_name: OpName,
    forward_ref_result_type: Type,
    unknown_loc: Attribute,
}

impl<'a, 'c, 'm> BytecodeReader<'a, 'c, 'm> {
    fn new(
        file_loc: &'a FileLoc,
        config: &'a ParserConfig,
        ctx: &'c mut Context,
        module: &'m mut Module,
    ) -> Self {
        let builtin = ctx.register_dialect("builtin");
        let module_op_name = ctx.op_name(builtin, "builtin.module");
        // Forward references are represented by the builtin unrealized
        // conversion cast, with a single none-typed result.
        let forward_ref_op_name = ctx.op_name(builtin, "builtin.unrealized_conversion_cast");
        let forward_ref_result_type = ctx.none_type();
        let unknown_loc = ctx.unknown_loc();
        Self {
            config,
            file_loc,
            ctx,
            module,
            version: 0,
            producer: "",
            dialects: Vec::new(),
            op_names: Vec::new(),
            strings: Vec::new(),
            attrs: Vec::new(),
            types: Vec::new(),
            value_scopes: Vec::new(),
            forward_ref_ops: Vec::new(),
            open_forward_ref_ops: Vec::new(),
            module_op_name,
            forward_ref_op_name,
            forward_ref_result_type,
            unknown_loc,
        }
    }

    fn read(&mut self, data: &'a [u8], block: BlockId) -> Result<(), Diagnostic> {
        let mut reader = Reader::new(data, self.file_loc);

        // The magic number has already been checked by the entry point.
        reader.skip_bytes(encoding::MAGIC.len())?;
        self.parse_version(&mut reader)?;
        self.producer = reader.parse_null_terminated_string()?;

        // Every error raised from here on carries a note naming the
        // version and producer of the file.
        self.read_sections(&mut reader, block).map_err(|diag| {
            diag.with_note(format!(
                "in bytecode version {} produced by: {}",
                self.version, self.producer
            ))
        })
    }

    fn parse_version(&mut self, reader: &mut Reader<'a>) -> Result<(), Diagnostic> {
        self.version = reader.parse_varint()?;
        let current_version = encoding::VERSION;
        if self.version < current_version {
            return Err(reader.emit_error(format!(
                "bytecode version {} is older than the current version of {current_version}, \
                 and upgrade is not supported",
                self.version
            )));
        }
        if self.version > current_version {
            return Err(reader.emit_error(format!(
                "bytecode version {} is newer than the current version {current_version}",
                self.version
            )));
        }
        Ok(())
    }

    fn read_sections(&mut self, reader: &mut Reader<'a>, block: BlockId) -> Result<(), Diagnostic> {
        // Gather the raw data for each of the top-level sections.
        let mut section_datas: [Option<&'a [u8]>; encoding::NUM_SECTIONS] =
            [None; encoding::NUM_SECTIONS];
        while !reader.empty() {
            let (section_id, section_data) = parse_section(reader)?;
            let slot = &mut section_datas[section_id as usize];
            if slot.is_some() {
                return Err(
                    reader.emit_error(format!("duplicate top-level section: {section_id}"))
                );
            }
            *slot = Some(section_data);
        }
        for id in SectionId::ALL {
            if section_datas[id as usize].is_none() {
                return Err(
                    reader.emit_error(format!("missing data for top-level section: {id}"))
                );
            }
        }
        let section = |id: SectionId| section_datas[id as usize].unwrap_or(&[]);

        self.parse_string_section(section(SectionId::String))?;
        self.parse_dialect_section(section(SectionId::Dialect))?;
        self.parse_attr_type_sections(
            section(SectionId::AttrType),
            section(SectionId::AttrTypeOffset),
        )?;
        self.parse_ir_section(section(SectionId::Ir), block)
    }

    //===------------------------------------------------------------===//
    // String section

    fn parse_string_section(&mut self, data: &'a [u8]) -> Result<(), Diagnostic> {
        let mut r = Reader::new(data, self.file_loc);
        let num_strings = parse_count(&mut r)?;
        self.strings = vec![""; num_strings];

        // The size list is in reverse index order: the first size belongs
        // to the last string, which is packed at the very end of the
        // section.
        let mut string_data_end = data.len();
        let mut total_size = 0usize;
        for index in (0..num_strings).rev() {
            let size = usize::try_from(r.parse_varint()?).unwrap_or(usize::MAX);
            if string_data_end < size {
                return Err(r.emit_error("string size exceeds the available data size"));
            }
            if size == 0 {
                return Err(r.emit_error("malformed string entry with zero size"));
            }
            let offset = string_data_end - size;
            // The stored size includes the trailing null byte.
            let bytes = &data[offset..offset + size - 1];
            self.strings[index] = core::str::from_utf8(bytes)
                .map_err(|_| r.emit_error("string is not valid UTF-8"))?;
            string_data_end = offset;
            total_size += size;
        }

        if r.size() != total_size {
            return Err(r.emit_error(
                "unexpected trailing data between the offsets for strings and their data",
            ));
        }
        Ok(())
    }

    fn parse_shared_string(&self, r: &mut Reader<'a>) -> Result<&'a str, Diagnostic> {
        let index = parse_entry_index(r, self.strings.len(), "string")?;
        Ok(self.strings[index])
    }

    //===------------------------------------------------------------===//
    // Dialect section

    fn parse_dialect_section(&mut self, data: &'a [u8]) -> Result<(), Diagnostic> {
        let mut r = Reader::new(data, self.file_loc);
        let num_dialects = parse_count(&mut r)?;
        self.dialects = Vec::with_capacity(num_dialects);
        for _ in 0..num_dialects {
            let name = self.parse_shared_string(&mut r)?;
            self.dialects.push(BytecodeDialect {
                name,
                dialect: None,
            });
        }

        // Operation names are grouped by dialect.
        while !r.empty() {
            let dialect = parse_entry_index(&mut r, self.dialects.len(), "dialect")?;
            let num_entries = r.parse_varint()?;
            for _ in 0..num_entries {
                let name = self.parse_shared_string(&mut r)?;
                self.op_names.push(BytecodeOpName {
                    dialect,
                    name,
                    op_name: None,
                });
            }
        }
        Ok(())
    }

    /// Loads the dialect at `index` through the context if this is its
    /// first use, recording the outcome.
    fn load_dialect(&mut self, r: &Reader<'a>, index: usize) -> Result<Dialect, Diagnostic> {
        if let Some(dialect) = self.dialects[index].dialect {
            return Ok(dialect);
        }
        let name = self.dialects[index].name;
        let Some(dialect) = self.ctx.get_or_load_dialect(name) else {
            return Err(r.emit_error(format!(
                "dialect '{name}' is unknown. If this is intended, please call \
                 allow_unregistered_dialects() on the Context before parsing"
            )));
        };
        self.dialects[index].dialect = Some(dialect);
        Ok(dialect)
    }

    fn parse_op_name(&mut self, r: &mut Reader<'a>) -> Result<OpName, Diagnostic> {
        let index = parse_entry_index(r, self.op_names.len(), "operation name")?;
        if let Some(op_name) = self.op_names[index].op_name {
            return Ok(op_name);
        }
        let dialect_index = self.op_names[index].dialect;
        let dialect = self.load_dialect(r, dialect_index)?;
        let qualified = format!(
            "{}.{}",
            self.dialects[dialect_index].name, self.op_names[index].name
        );
        let op_name = self.ctx.op_name(dialect, &qualified);
        self.op_names[index].op_name = Some(op_name);
        Ok(op_name)
    }

    //===------------------------------------------------------------===//
    // Attribute/Type sections

    fn parse_attr_type_sections(
        &mut self,
        attr_type_data: &'a [u8],
        offset_data: &'a [u8],
    ) -> Result<(), Diagnostic> {
        let mut r = Reader::new(offset_data, self.file_loc);
        let num_attrs = parse_count(&mut r)?;
        let num_types = parse_count(&mut r)?;

        // Entry offsets are implicit: attributes then types are laid out
        // contiguously in the entry section, in offset-section order.
        let mut current_offset = 0usize;
        let raw_attrs = parse_offset_entries(
            &mut r,
            num_attrs,
            self.dialects.len(),
            attr_type_data,
            &mut current_offset,
        )?;
        let raw_types = parse_offset_entries(
            &mut r,
            num_types,
            self.dialects.len(),
            attr_type_data,
            &mut current_offset,
        )?;
        if !r.empty() {
            return Err(r.emit_error("unexpected trailing data in the Attribute/Type offset section"));
        }

        self.attrs = raw_attrs
            .into_iter()
            .map(|raw| AttrEntry {
                data: raw.data,
                dialect: raw.dialect,
                has_custom_encoding: raw.has_custom_encoding,
                resolved: None,
            })
            .collect();
        self.types = raw_types
            .into_iter()
            .map(|raw| TypeEntry {
                data: raw.data,
                dialect: raw.dialect,
                has_custom_encoding: raw.has_custom_encoding,
                resolved: None,
            })
            .collect();
        Ok(())
    }

    fn resolve_attribute(&mut self, index: u64) -> Result<Attribute, Diagnostic> {
        if index >= self.attrs.len() as u64 {
            return Err(Diagnostic::error(
                self.file_loc,
                format!("invalid Attribute index: {index}"),
            ));
        }
        let index = index as usize;
        if let Some(attr) = self.attrs[index].resolved {
            return Ok(attr);
        }
        let data = self.attrs[index].data;
        let has_custom_encoding = self.attrs[index].has_custom_encoding;

        let mut r = Reader::new(data, self.file_loc);
        if has_custom_encoding {
            return Err(r.emit_error("unexpected Attribute encoding"));
        }
        // Fallback: the entry carries the textual assembly format.
        let text = r.parse_null_terminated_string()?;
        let (attr, consumed) = asm::parse_attribute(text, self.ctx).map_err(|e| {
            Diagnostic::error(
                self.file_loc,
                format!("failed to parse Attribute assembly format: {e}"),
            )
        })?;
        if consumed != text.len() {
            return Err(r.emit_error(format!(
                "trailing characters found after Attribute assembly format: {}",
                &text[consumed..]
            )));
        }
        if !r.empty() {
            return Err(r.emit_error("unexpected trailing bytes after Attribute entry"));
        }
        self.attrs[index].resolved = Some(attr);
        Ok(attr)
    }

    fn resolve_type(&mut self, index: u64) -> Result<Type, Diagnostic> {
        if index >= self.types.len() as u64 {
            return Err(Diagnostic::error(
                self.file_loc,
                format!("invalid Type index: {index}"),
            ));
        }
        let index = index as usize;
        if let Some(ty) = self.types[index].resolved {
            return Ok(ty);
        }
        let data = self.types[index].data;
        let has_custom_encoding = self.types[index].has_custom_encoding;

        let mut r = Reader::new(data, self.file_loc);
        if has_custom_encoding {
            return Err(r.emit_error("unexpected Type encoding"));
        }
        let text = r.parse_null_terminated_string()?;
        let (ty, consumed) = asm::parse_type(text, self.ctx).map_err(|e| {
            Diagnostic::error(
                self.file_loc,
                format!("failed to parse Type assembly format: {e}"),
            )
        })?;
        if consumed != text.len() {
            return Err(r.emit_error(format!(
                "trailing characters found after Type assembly format: {}",
                &text[consumed..]
            )));
        }
        if !r.empty() {
            return Err(r.emit_error("unexpected trailing bytes after Type entry"));
        }
        self.types[index].resolved = Some(ty);
        Ok(ty)
    }

    fn parse_attribute(&mut self, r: &mut Reader<'a>) -> Result<Attribute, Diagnostic> {
        let index = r.parse_varint()?;
        self.resolve_attribute(index)
    }

    fn parse_type(&mut self, r: &mut Reader<'a>) -> Result<Type, Diagnostic> {
        let index = r.parse_varint()?;
        self.resolve_type(index)
    }

    fn parse_location_attr(&mut self, r: &mut Reader<'a>) -> Result<Attribute, Diagnostic> {
        let attr = self.parse_attribute(r)?;
        if !self.ctx.is_location(attr) {
            return Err(r.emit_error(format!(
                "expected attribute of type: Location, but got: {}",
                self.ctx.attr_string(attr)
            )));
        }
        Ok(attr)
    }

    fn parse_dictionary_attr(&mut self, r: &mut Reader<'a>) -> Result<Attribute, Diagnostic> {
        let attr = self.parse_attribute(r)?;
        if self.ctx.as_dictionary(attr).is_none() {
            return Err(r.emit_error(format!(
                "expected attribute of type: Dictionary, but got: {}",
                self.ctx.attr_string(attr)
            )));
        }
        Ok(attr)
    }

    //===------------------------------------------------------------===//
    // IR section

    fn parse_ir_section(&mut self, data: &'a [u8], block: BlockId) -> Result<(), Diagnostic> {
        let mut r = Reader::new(data, self.file_loc);

        // The top level is parsed into the body of a scratch module
        // operation and spliced over only once the whole read succeeds.
        let module_loc = self.ctx.file_line_col_loc(
            &self.file_loc.file,
            self.file_loc.line,
            self.file_loc.column,
        );
        let mut module_state = OperationState::new(self.module_op_name, module_loc);
        module_state.num_regions = 1;
        let module_op = self.module.create_op(module_state);
        let body = self.module.create_block();
        let module_region = self.module.op(module_op).regions[0];
        self.module.region_append_block(module_region, body);

        let mut init_state = RegionReadState::new(module_op, 1, true);
        init_state.cur_blocks.push(body);
        init_state.cur_block = Some(0);

        self.value_scopes.push(ValueScope::default());
        let scope = self.value_scopes.len() - 1;
        self.value_scopes[scope].push_region(0);
        self.parse_block_header(&mut r, &mut init_state, body)?;

        // Iteratively parse regions until everything has been resolved.
        let mut region_stack: Vec<RegionReadState> = vec![init_state];
        while let Some(mut state) = region_stack.pop() {
            if let Some(child) = self.parse_regions(&mut r, &mut state)? {
                region_stack.push(state);
                region_stack.push(child);
            }
        }

        if !self.forward_ref_ops.is_empty() {
            return Err(r.emit_error("not all forward unresolved forward operand references"));
        }

        if self.config.verify_after_parse {
            verifier::verify_op_tree(self.module, module_op)
                .map_err(|e| Diagnostic::error(self.file_loc, e.to_string()))?;
        }

        // Hand the parsed operations over and drop the scratch structures.
        self.module.splice_block_ops(body, block);
        for op in self.open_forward_ref_ops.drain(..) {
            self.module.erase_op(op);
        }
        self.module.erase_block(body);
        self.module.erase_region(module_region);
        self.module.erase_op(module_op);
        Ok(())
    }

    /// Drives the top region frame forward. Returns a child frame when an
    /// operation with regions was read; returns `None` when the frame has
    /// been fully parsed (value scopes are popped as needed).
    fn parse_regions(
        &mut self,
        r: &mut Reader<'a>,
        state: &mut RegionReadState,
    ) -> Result<Option<RegionReadState>, Diagnostic> {
        while state.cur_region != state.end_region {
            // Parse the region header the first time the region is
            // visited.
            if state.cur_block.is_none() {
                if !self.parse_region_header(r, state)? {
                    // The region is empty.
                    state.cur_region += 1;
                    continue;
                }
            }

            loop {
                let Some(cur_block_index) = state.cur_block else {
                    break;
                };
                let block = state.cur_blocks[cur_block_index];
                while state.num_ops_remaining > 0 {
                    state.num_ops_remaining -= 1;
                    let (op, is_isolated_from_above) =
                        self.parse_op_without_regions(r, state, block)?;

                    // If the op has regions, process them before resuming
                    // this frame.
                    let num_regions = self.module.op(op).regions.len();
                    if num_regions != 0 {
                        let child = RegionReadState::new(op, num_regions, is_isolated_from_above);
                        if is_isolated_from_above {
                            self.value_scopes.push(ValueScope::default());
                        }
                        return Ok(Some(child));
                    }
                }

                // Move to the next block of the region.
                let next = cur_block_index + 1;
                if next == state.cur_blocks.len() {
                    break;
                }
                state.cur_block = Some(next);
                let next_block = state.cur_blocks[next];
                self.parse_block_header(r, state, next_block)?;
            }

            // Release the values reserved for this region.
            state.cur_block = None;
            let scope = self.value_scopes.len() - 1;
            self.value_scopes[scope].pop_region(state.num_values);
            state.cur_region += 1;
        }

        if state.is_isolated_from_above {
            self.value_scopes.pop();
        }
        Ok(None)
    }

    /// Parses a region header, allocating its blocks and reserving its
    /// value slots. Returns false if the region is empty.
    fn parse_region_header(
        &mut self,
        r: &mut Reader<'a>,
        state: &mut RegionReadState,
    ) -> Result<bool, Diagnostic> {
        let num_blocks = parse_count(r)?;
        if num_blocks == 0 {
            return Ok(false);
        }

        let num_values = parse_count(r)?;
        state.num_values = num_values;

        // Create the blocks up front so that successor references can be
        // resolved while parsing operations.
        let region = self.module.op(state.op).regions[state.cur_region];
        state.cur_blocks.clear();
        state.cur_blocks.reserve(num_blocks);
        for _ in 0..num_blocks {
            let new_block = self.module.create_block();
            self.module.region_append_block(region, new_block);
            state.cur_blocks.push(new_block);
        }

        let scope = self.value_scopes.len() - 1;
        self.value_scopes[scope].push_region(num_values);

        state.cur_block = Some(0);
        let entry_block = state.cur_blocks[0];
        self.parse_block_header(r, state, entry_block)?;
        Ok(true)
    }

    fn parse_block_header(
        &mut self,
        r: &mut Reader<'a>,
        state: &mut RegionReadState,
        block: BlockId,
    ) -> Result<(), Diagnostic> {
        let (num_ops, has_args) = r.parse_varint_with_flag()?;
        state.num_ops_remaining = num_ops;
        if has_args {
            self.parse_block_arguments(r, block)?;
        }
        Ok(())
    }

    fn parse_block_arguments(
        &mut self,
        r: &mut Reader<'a>,
        block: BlockId,
    ) -> Result<(), Diagnostic> {
        let num_args = parse_count(r)?;
        let mut args = Vec::with_capacity(num_args);
        for _ in 0..num_args {
            let arg_type = self.parse_type(r)?;
            let arg_loc = self.parse_location_attr(r)?;
            args.push((arg_type, arg_loc));
        }
        let values = self.module.add_block_args(block, &args);
        self.define_values(r, &values)
    }

    /// Parses one operation, excluding the contents of its regions.
    fn parse_op_without_regions(
        &mut self,
        r: &mut Reader<'a>,
        state: &RegionReadState,
        block: BlockId,
    ) -> Result<(OpId, bool), Diagnostic> {
        let name = self.parse_op_name(r)?;

        // The mask byte says which components follow.
        let op_mask = r.parse_byte()?;

        let loc = self.parse_location_attr(r)?;
        let mut op_state = OperationState::new(name, loc);

        if op_mask & op_encoding::HAS_ATTRS != 0 {
            op_state.attrs = Some(self.parse_dictionary_attr(r)?);
        }

        if op_mask & op_encoding::HAS_RESULTS != 0 {
            let num_results = parse_count(r)?;
            op_state.result_types.reserve(num_results);
            for _ in 0..num_results {
                op_state.result_types.push(self.parse_type(r)?);
            }
        }

        if op_mask & op_encoding::HAS_OPERANDS != 0 {
            let num_operands = parse_count(r)?;
            op_state.operands.reserve(num_operands);
            for _ in 0..num_operands {
                op_state.operands.push(self.parse_operand(r)?);
            }
        }

        if op_mask & op_encoding::HAS_SUCCESSORS != 0 {
            let num_successors = parse_count(r)?;
            op_state.successors.reserve(num_successors);
            for _ in 0..num_successors {
                let index = parse_entry_index(r, state.cur_blocks.len(), "successor")?;
                op_state.successors.push(state.cur_blocks[index]);
            }
        }

        let mut is_isolated_from_above = false;
        if op_mask & op_encoding::HAS_INLINE_REGIONS != 0 {
            let (num_regions, isolated) = r.parse_varint_with_flag()?;
            op_state.num_regions = usize::try_from(num_regions).unwrap_or(usize::MAX);
            is_isolated_from_above = isolated;
        }

        let op = self.module.create_op(op_state);
        self.module.append_op(block, op);

        // Results become the next sequentially assigned values.
        let num_results = self.module.op(op).result_types.len();
        if num_results != 0 {
            let results: Vec<Value> = (0..num_results as u32)
                .map(|i| self.module.op_result(op, i))
                .collect();
            self.define_values(r, &results)?;
        }
        Ok((op, is_isolated_from_above))
    }

    //===------------------------------------------------------------===//
    // Value processing

    fn parse_operand(&mut self, r: &mut Reader<'a>) -> Result<Value, Diagnostic> {
        let scope = self.value_scopes.len() - 1;
        let index = parse_entry_index(r, self.value_scopes[scope].values.len(), "value")?;
        if let Some(value) = self.value_scopes[scope].values[index] {
            return Ok(value);
        }
        // First use before definition: stand in a placeholder.
        let value = self.create_forward_ref();
        self.value_scopes[scope].values[index] = Some(value);
        Ok(value)
    }

    /// Assigns `new_values` the next ids of the current region, resolving
    /// any placeholders already occupying those slots.
    fn define_values(&mut self, r: &Reader<'a>, new_values: &[Value]) -> Result<(), Diagnostic> {
        let scope = self.value_scopes.len() - 1;
        let id_index = self.value_scopes[scope].next_value_ids.len() - 1;
        let value_id = self.value_scopes[scope].next_value_ids[id_index];
        let value_id_end = value_id + new_values.len();
        let num_slots = self.value_scopes[scope].values.len();
        if value_id_end > num_slots {
            return Err(r.emit_error(format!(
                "value index range was outside of the expected range for the parent region, \
                 got [{value_id}, {value_id_end}), but the maximum index was {}",
                (num_slots as u64).wrapping_sub(1)
            )));
        }

        for (i, &new_value) in new_values.iter().enumerate() {
            let old = self.value_scopes[scope].values[value_id + i].replace(new_value);
            if let Some(old_value) = old {
                // The slot held a placeholder; rewrite its uses and
                // recycle it.
                self.module.replace_all_uses(old_value, new_value);
                if let Value::OpResult { op: forward_op, .. } = old_value
                    && let Some(pos) = self.forward_ref_ops.iter().position(|&o| o == forward_op)
                {
                    self.forward_ref_ops.swap_remove(pos);
                    self.open_forward_ref_ops.push(forward_op);
                }
            }
        }
        self.value_scopes[scope].next_value_ids[id_index] = value_id_end;
        Ok(())
    }

    fn create_forward_ref(&mut self) -> Value {
        let op = match self.open_forward_ref_ops.pop() {
            Some(op) => op,
            None => {
                let mut op_state =
                    OperationState::new(self.forward_ref_op_name, self.unknown_loc);
                op_state.result_types = vec![self.forward_ref_result_type];
                self.module.create_op(op_state)
            }
        };
        self.forward_ref_ops.push(op);
        self.module.op_result(op, 0)
    }
}
