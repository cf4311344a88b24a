// Copyright 2026 the IR Bytecode Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "integration test crate")]

use ir_bytecode::diag::Diagnostic;
use ir_bytecode::encoding::{MAGIC, SectionId, VERSION, op_encoding};
use ir_bytecode::format::Writer;
use ir_bytecode::ir::{AttrData, BlockId, Context, Module, OpId, Value};
use ir_bytecode::reader::{ParserConfig, SourceBuffer, is_bytecode, read_bytecode_file};

/// Builds wire-format fixture files section by section.
#[derive(Default)]
struct FileBuilder {
    producer: String,
    strings: Vec<String>,
    dialects: Vec<usize>,
    op_names: Vec<(usize, usize)>,
    attr_entries: Vec<(usize, bool, Vec<u8>)>,
    type_entries: Vec<(usize, bool, Vec<u8>)>,
    ir: Writer,
}

impl FileBuilder {
    fn new() -> Self {
        Self {
            producer: "conformance".to_string(),
            ..Self::default()
        }
    }

    fn string(&mut self, s: &str) -> usize {
        if let Some(i) = self.strings.iter().position(|existing| existing == s) {
            return i;
        }
        self.strings.push(s.to_string());
        self.strings.len() - 1
    }

    fn dialect(&mut self, name: &str) -> usize {
        let string_index = self.string(name);
        if let Some(i) = self.dialects.iter().position(|&s| s == string_index) {
            return i;
        }
        self.dialects.push(string_index);
        self.dialects.len() - 1
    }

    /// Declares an operation name, returning its table index.
    fn op_name(&mut self, dialect: &str, local: &str) -> u64 {
        let dialect_index = self.dialect(dialect);
        let string_index = self.string(local);
        self.op_names.push((dialect_index, string_index));
        (self.op_names.len() - 1) as u64
    }

    /// Declares a textual attribute entry, returning its table index.
    fn text_attr(&mut self, text: &str) -> u64 {
        let dialect_index = self.dialect("builtin");
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.attr_entries.push((dialect_index, false, bytes));
        (self.attr_entries.len() - 1) as u64
    }

    /// Declares an attribute entry flagged as custom-encoded.
    fn custom_attr(&mut self, bytes: &[u8]) -> u64 {
        let dialect_index = self.dialect("builtin");
        self.attr_entries.push((dialect_index, true, bytes.to_vec()));
        (self.attr_entries.len() - 1) as u64
    }

    /// Declares a raw attribute entry (textual flag, arbitrary bytes).
    fn raw_attr(&mut self, bytes: &[u8]) -> u64 {
        let dialect_index = self.dialect("builtin");
        self.attr_entries.push((dialect_index, false, bytes.to_vec()));
        (self.attr_entries.len() - 1) as u64
    }

    /// Declares a textual type entry, returning its table index.
    fn text_type(&mut self, text: &str) -> u64 {
        let dialect_index = self.dialect("builtin");
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.type_entries.push((dialect_index, false, bytes));
        (self.type_entries.len() - 1) as u64
    }

    fn ir_block_header(&mut self, num_ops: u64, has_args: bool) {
        self.ir.write_varint_with_flag(num_ops, has_args);
    }

    /// Writes an operation with no optional components.
    fn ir_plain_op(&mut self, name: u64, loc: u64) {
        self.ir.write_varint(name);
        self.ir.write_byte(0);
        self.ir.write_varint(loc);
    }

    fn build(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_bytes(&MAGIC);
        w.write_varint(VERSION);
        w.write_null_terminated_string(&self.producer);

        // String section: sizes in reverse index order, data packed
        // forward at the tail.
        let mut payload = Writer::new();
        payload.write_varint(self.strings.len() as u64);
        for s in self.strings.iter().rev() {
            payload.write_varint(s.len() as u64 + 1);
        }
        for s in &self.strings {
            payload.write_null_terminated_string(s);
        }
        write_section(&mut w, SectionId::String, payload.as_slice());

        // Dialect section: names, then op names grouped per dialect.
        let mut payload = Writer::new();
        payload.write_varint(self.dialects.len() as u64);
        for &string_index in &self.dialects {
            payload.write_varint(string_index as u64);
        }
        for &(dialect_index, string_index) in &self.op_names {
            payload.write_varint(dialect_index as u64);
            payload.write_varint(1);
            payload.write_varint(string_index as u64);
        }
        write_section(&mut w, SectionId::Dialect, payload.as_slice());

        // Attribute/type entry payloads, attributes first.
        let mut payload = Writer::new();
        for (_, _, bytes) in self.attr_entries.iter().chain(&self.type_entries) {
            payload.write_bytes(bytes);
        }
        write_section(&mut w, SectionId::AttrType, payload.as_slice());

        // Offset section: counts, then one grouping per entry.
        let mut payload = Writer::new();
        payload.write_varint(self.attr_entries.len() as u64);
        payload.write_varint(self.type_entries.len() as u64);
        for (dialect_index, custom, bytes) in self.attr_entries.iter().chain(&self.type_entries) {
            payload.write_varint(*dialect_index as u64);
            payload.write_varint(1);
            payload.write_varint_with_flag(bytes.len() as u64, *custom);
        }
        write_section(&mut w, SectionId::AttrTypeOffset, payload.as_slice());

        write_section(&mut w, SectionId::Ir, self.ir.as_slice());
        w.into_vec()
    }
}

fn write_section(w: &mut Writer, id: SectionId, payload: &[u8]) {
    w.write_byte(id as u8);
    w.write_varint(payload.len() as u64);
    w.write_bytes(payload);
}

fn read(bytes: &[u8]) -> Result<(Context, Module, BlockId), Diagnostic> {
    let mut ctx = Context::new();
    ctx.allow_unregistered_dialects(true);
    read_with_context(bytes, ctx)
}

fn read_with_context(
    bytes: &[u8],
    mut ctx: Context,
) -> Result<(Context, Module, BlockId), Diagnostic> {
    let mut module = Module::new();
    let block = module.create_block();
    let buffer = SourceBuffer {
        data: bytes,
        identifier: "conformance.mlirbc",
    };
    read_bytecode_file(
        &buffer,
        &mut ctx,
        &mut module,
        block,
        &ParserConfig::default(),
    )?;
    Ok((ctx, module, block))
}

#[test]
fn golden_empty_module_bytes() {
    let mut f = FileBuilder::new();
    f.producer = "test".to_string();
    f.ir_block_header(0, false);
    let bytes = f.build();

    // Locks in the container encoding of the smallest valid file as a
    // regression signal for format changes.
    #[rustfmt::skip]
    let expected: &[u8] = &[
        // magic "ML\xefR"
        0x4D, 0x4C, 0xEF, 0x52,
        // version 0
        0x01,
        // producer "test"
        b't', b'e', b's', b't', 0x00,
        // string section: tag=0, len=1, [count=0]
        0x00, 0x03, 0x01,
        // dialect section: tag=1, len=1, [count=0]
        0x01, 0x03, 0x01,
        // attr/type section: tag=2, len=0
        0x02, 0x01,
        // offset section: tag=3, len=2, [attrs=0, types=0]
        0x03, 0x05, 0x01, 0x01,
        // IR section: tag=4, len=1, [ops=0|args=false]
        0x04, 0x03, 0x01,
    ];
    assert_eq!(bytes, expected);

    let (_ctx, module, block) = read(&bytes).unwrap();
    assert!(module.block(block).ops.is_empty());
}

#[test]
fn magic_rejection() {
    assert!(!is_bytecode(b"MLIR"));
    let err = read(b"MLIR").unwrap_err();
    assert_eq!(err.message(), "input buffer is not an MLIR bytecode file");
}

#[test]
fn version_mismatch() {
    let mut w = Writer::new();
    w.write_bytes(&MAGIC);
    w.write_varint(VERSION + 1);
    w.write_null_terminated_string("future");
    let err = read(w.as_slice()).unwrap_err();
    assert_eq!(
        err.message(),
        "bytecode version 1 is newer than the current version 0"
    );
}

#[test]
fn reads_op_with_attrs_results_and_operands() {
    let mut f = FileBuilder::new();
    let wrapper = f.op_name("test", "wrapper");
    let def = f.op_name("test", "def");
    let use_op = f.op_name("test", "use");
    let loc = f.text_attr("loc(unknown)");
    let dict = f.text_attr("{tag = 7}");
    let i64_type = f.text_type("i64");

    f.ir_block_header(1, false);
    // The wrapper holds one region so its body can define values.
    f.ir.write_varint(wrapper);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    // Region: one block, two values.
    f.ir.write_varint(1);
    f.ir.write_varint(2);
    f.ir_block_header(2, false);
    // %0, %1 = test.def {tag = 7} : i64, i64
    f.ir.write_varint(def);
    f.ir
        .write_byte(op_encoding::HAS_ATTRS | op_encoding::HAS_RESULTS);
    f.ir.write_varint(loc);
    f.ir.write_varint(dict);
    f.ir.write_varint(2);
    f.ir.write_varint(i64_type);
    f.ir.write_varint(i64_type);
    // test.use %1, %0
    f.ir.write_varint(use_op);
    f.ir.write_byte(op_encoding::HAS_OPERANDS);
    f.ir.write_varint(loc);
    f.ir.write_varint(2);
    f.ir.write_varint(1);
    f.ir.write_varint(0);

    let (ctx, module, block) = read(&f.build()).unwrap();
    let ops = &module.block(block).ops;
    assert_eq!(ops.len(), 1);
    let wrapper_op = module.op(ops[0]);
    assert_eq!(ctx.op_name_str(wrapper_op.name), "test.wrapper");

    let body = module.region(wrapper_op.regions[0]).blocks[0];
    let body_ops = &module.block(body).ops;
    assert_eq!(body_ops.len(), 2);

    let def_data = module.op(body_ops[0]);
    assert_eq!(ctx.op_name_str(def_data.name), "test.def");
    assert_eq!(def_data.result_types.len(), 2);
    assert_eq!(ctx.type_string(def_data.result_types[0]), "i64");
    let dict_attr = def_data.attrs.expect("dictionary attr");
    let entries = ctx.as_dictionary(dict_attr).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "tag");
    assert_eq!(ctx.attr_data(entries[0].1), &AttrData::Integer(7));

    let use_data = module.op(body_ops[1]);
    assert_eq!(
        use_data.operands,
        vec![
            module.op_result(body_ops[0], 1),
            module.op_result(body_ops[0], 0)
        ]
    );
}

#[test]
fn forward_reference_resolves_to_later_definition() {
    let mut f = FileBuilder::new();
    let wrapper = f.op_name("test", "wrapper");
    let def = f.op_name("test", "def");
    let use_op = f.op_name("test", "use");
    let loc = f.text_attr("loc(unknown)");
    let i64_type = f.text_type("i64");

    f.ir_block_header(1, false);
    f.ir.write_varint(wrapper);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    f.ir.write_varint(1);
    f.ir.write_varint(1);
    f.ir_block_header(2, false);
    // Operation 0 uses value 0 before operation 1 defines it.
    f.ir.write_varint(use_op);
    f.ir.write_byte(op_encoding::HAS_OPERANDS);
    f.ir.write_varint(loc);
    f.ir.write_varint(1);
    f.ir.write_varint(0);
    f.ir.write_varint(def);
    f.ir.write_byte(op_encoding::HAS_RESULTS);
    f.ir.write_varint(loc);
    f.ir.write_varint(1);
    f.ir.write_varint(i64_type);

    let (_ctx, module, block) = read(&f.build()).unwrap();
    let wrapper_op = module.op(module.block(block).ops[0]);
    let body = module.region(wrapper_op.regions[0]).blocks[0];
    let body_ops = &module.block(body).ops;

    // The placeholder is gone: the user's operand is the later result.
    let defined = module.op_result(body_ops[1], 0);
    assert_eq!(module.op(body_ops[0]).operands, vec![defined]);
    let uses = module.uses_of(defined);
    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0].op, body_ops[0]);
}

#[test]
fn forward_reference_across_blocks_and_successors() {
    let mut f = FileBuilder::new();
    let wrapper = f.op_name("test", "wrapper");
    let br = f.op_name("test", "br");
    let loc = f.text_attr("loc(unknown)");
    let i64_type = f.text_type("i64");

    f.ir_block_header(1, false);
    f.ir.write_varint(wrapper);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    // Region: two blocks, one value (the second block's argument).
    f.ir.write_varint(2);
    f.ir.write_varint(1);
    // Block 0: a branch referencing block 1 and its argument, before
    // block 1 has been read.
    f.ir_block_header(1, false);
    f.ir.write_varint(br);
    f.ir
        .write_byte(op_encoding::HAS_OPERANDS | op_encoding::HAS_SUCCESSORS);
    f.ir.write_varint(loc);
    f.ir.write_varint(1);
    f.ir.write_varint(0); // operand: value 0
    f.ir.write_varint(1);
    f.ir.write_varint(1); // successor: block 1
    // Block 1: one argument, no operations.
    f.ir_block_header(0, true);
    f.ir.write_varint(1);
    f.ir.write_varint(i64_type);
    f.ir.write_varint(loc);

    let (_ctx, module, block) = read(&f.build()).unwrap();
    let wrapper_op = module.op(module.block(block).ops[0]);
    let blocks = &module.region(wrapper_op.regions[0]).blocks;
    assert_eq!(blocks.len(), 2);
    let br_op = module.op(module.block(blocks[0]).ops[0]);
    assert_eq!(br_op.successors, vec![blocks[1]]);
    assert_eq!(
        br_op.operands,
        vec![Value::BlockArg {
            block: blocks[1],
            index: 0
        }]
    );
}

#[test]
fn unresolved_forward_reference_fails_and_leaves_target_untouched() {
    let mut f = FileBuilder::new();
    let wrapper = f.op_name("test", "wrapper");
    let use_op = f.op_name("test", "use");
    let loc = f.text_attr("loc(unknown)");

    f.ir_block_header(1, false);
    f.ir.write_varint(wrapper);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    f.ir.write_varint(1);
    f.ir.write_varint(1);
    f.ir_block_header(1, false);
    // Value 0 is referenced but never defined.
    f.ir.write_varint(use_op);
    f.ir.write_byte(op_encoding::HAS_OPERANDS);
    f.ir.write_varint(loc);
    f.ir.write_varint(1);
    f.ir.write_varint(0);

    let mut ctx = Context::new();
    ctx.allow_unregistered_dialects(true);
    let mut module = Module::new();
    let block = module.create_block();
    let watermark_probe = module.create_op(ir_bytecode::ir::OperationState::new(
        {
            let d = ctx.register_dialect("host");
            ctx.op_name(d, "host.existing")
        },
        ctx.unknown_loc(),
    ));
    module.append_op(block, watermark_probe);

    let bytes = f.build();
    let buffer = SourceBuffer {
        data: &bytes,
        identifier: "conformance.mlirbc",
    };
    let err = read_bytecode_file(
        &buffer,
        &mut ctx,
        &mut module,
        block,
        &ParserConfig::default(),
    )
    .unwrap_err();
    assert_eq!(
        err.message(),
        "not all forward unresolved forward operand references"
    );
    assert_eq!(
        err.notes(),
        ["in bytecode version 0 produced by: conformance"]
    );
    // The target block still holds exactly the pre-existing operation.
    assert_eq!(module.block(block).ops, vec![watermark_probe]);
}

#[test]
fn non_isolated_region_shares_the_value_scope() {
    let mut f = FileBuilder::new();
    let wrapper = f.op_name("test", "wrapper");
    let def = f.op_name("test", "def");
    let inner = f.op_name("test", "inner");
    let use_op = f.op_name("test", "use");
    let loc = f.text_attr("loc(unknown)");
    let i64_type = f.text_type("i64");

    f.ir_block_header(1, false);
    f.ir.write_varint(wrapper);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    f.ir.write_varint(1);
    f.ir.write_varint(1);
    f.ir_block_header(2, false);
    // %0 = test.def : i64
    f.ir.write_varint(def);
    f.ir.write_byte(op_encoding::HAS_RESULTS);
    f.ir.write_varint(loc);
    f.ir.write_varint(1);
    f.ir.write_varint(i64_type);
    // test.inner { test.use %0 } (region not isolated from above)
    f.ir.write_varint(inner);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    f.ir.write_varint(1);
    f.ir.write_varint(0);
    f.ir_block_header(1, false);
    f.ir.write_varint(use_op);
    f.ir.write_byte(op_encoding::HAS_OPERANDS);
    f.ir.write_varint(loc);
    f.ir.write_varint(1);
    f.ir.write_varint(0);

    let (_ctx, module, block) = read(&f.build()).unwrap();
    let wrapper_op = module.op(module.block(block).ops[0]);
    let body = module.region(wrapper_op.regions[0]).blocks[0];
    let body_ops = &module.block(body).ops;
    let inner_body = module.region(module.op(body_ops[1]).regions[0]).blocks[0];
    let inner_use = module.op(module.block(inner_body).ops[0]);
    assert_eq!(inner_use.operands, vec![module.op_result(body_ops[0], 0)]);
}

#[test]
fn isolated_region_cannot_reference_outer_values() {
    let mut f = FileBuilder::new();
    let wrapper = f.op_name("test", "wrapper");
    let def = f.op_name("test", "def");
    let iso = f.op_name("test", "iso");
    let use_op = f.op_name("test", "use");
    let loc = f.text_attr("loc(unknown)");
    let i64_type = f.text_type("i64");

    f.ir_block_header(1, false);
    f.ir.write_varint(wrapper);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    f.ir.write_varint(1);
    f.ir.write_varint(1);
    f.ir_block_header(2, false);
    f.ir.write_varint(def);
    f.ir.write_byte(op_encoding::HAS_RESULTS);
    f.ir.write_varint(loc);
    f.ir.write_varint(1);
    f.ir.write_varint(i64_type);
    // test.iso { test.use %outer }: isolated, so the reference is out of
    // range for the fresh scope.
    f.ir.write_varint(iso);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, true);
    f.ir.write_varint(1);
    f.ir.write_varint(0);
    f.ir_block_header(1, false);
    f.ir.write_varint(use_op);
    f.ir.write_byte(op_encoding::HAS_OPERANDS);
    f.ir.write_varint(loc);
    f.ir.write_varint(1);
    f.ir.write_varint(0);

    let err = read(&f.build()).unwrap_err();
    assert_eq!(err.message(), "invalid value index: 0");
}

#[test]
fn unknown_dialect_is_rejected_without_unregistered_fallback() {
    let mut f = FileBuilder::new();
    let op = f.op_name("test", "op");
    let loc = f.text_attr("loc(unknown)");
    f.ir_block_header(1, false);
    f.ir_plain_op(op, loc);

    // Unregistered dialects are disallowed by default.
    let err = read_with_context(&f.build(), Context::new()).unwrap_err();
    assert!(
        err.message().contains("dialect 'test' is unknown"),
        "unexpected message: {}",
        err.message()
    );

    // Registering the dialect makes the same file readable.
    let mut ctx = Context::new();
    ctx.register_dialect("test");
    let (ctx, module, block) = read_with_context(&f.build(), ctx).unwrap();
    let op_data = module.op(module.block(block).ops[0]);
    assert_eq!(ctx.op_name_str(op_data.name), "test.op");
}

#[test]
fn custom_encoding_is_rejected() {
    let mut f = FileBuilder::new();
    let op = f.op_name("test", "op");
    let loc = f.custom_attr(&[0xAB, 0xCD]);
    f.ir_block_header(1, false);
    f.ir_plain_op(op, loc);
    let err = read(&f.build()).unwrap_err();
    assert_eq!(err.message(), "unexpected Attribute encoding");
}

#[test]
fn attribute_with_trailing_characters_is_rejected() {
    let mut f = FileBuilder::new();
    let op = f.op_name("test", "op");
    let loc = f.text_attr("loc(unknown) junk");
    f.ir_block_header(1, false);
    f.ir_plain_op(op, loc);
    let err = read(&f.build()).unwrap_err();
    assert_eq!(
        err.message(),
        "trailing characters found after Attribute assembly format: junk"
    );
}

#[test]
fn attribute_entry_with_trailing_bytes_is_rejected() {
    let mut f = FileBuilder::new();
    let op = f.op_name("test", "op");
    let loc = f.raw_attr(b"loc(unknown)\0X");
    f.ir_block_header(1, false);
    f.ir_plain_op(op, loc);
    let err = read(&f.build()).unwrap_err();
    assert_eq!(err.message(), "unexpected trailing bytes after Attribute entry");
}

#[test]
fn location_kind_is_checked() {
    let mut f = FileBuilder::new();
    let op = f.op_name("test", "op");
    let not_a_loc = f.text_attr("7");
    f.ir_block_header(1, false);
    f.ir_plain_op(op, not_a_loc);
    let err = read(&f.build()).unwrap_err();
    assert_eq!(
        err.message(),
        "expected attribute of type: Location, but got: 7"
    );
}

#[test]
fn dictionary_kind_is_checked() {
    let mut f = FileBuilder::new();
    let op = f.op_name("test", "op");
    let loc = f.text_attr("loc(unknown)");
    let not_a_dict = f.text_attr("[1]");
    f.ir_block_header(1, false);
    f.ir.write_varint(op);
    f.ir.write_byte(op_encoding::HAS_ATTRS);
    f.ir.write_varint(loc);
    f.ir.write_varint(not_a_dict);
    let err = read(&f.build()).unwrap_err();
    assert_eq!(
        err.message(),
        "expected attribute of type: Dictionary, but got: [1]"
    );
}

#[test]
fn result_definition_outside_region_range_is_rejected() {
    let mut f = FileBuilder::new();
    let wrapper = f.op_name("test", "wrapper");
    let def = f.op_name("test", "def");
    let loc = f.text_attr("loc(unknown)");
    let i64_type = f.text_type("i64");

    f.ir_block_header(1, false);
    f.ir.write_varint(wrapper);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    // The region declares one value but the op defines two.
    f.ir.write_varint(1);
    f.ir.write_varint(1);
    f.ir_block_header(1, false);
    f.ir.write_varint(def);
    f.ir.write_byte(op_encoding::HAS_RESULTS);
    f.ir.write_varint(loc);
    f.ir.write_varint(2);
    f.ir.write_varint(i64_type);
    f.ir.write_varint(i64_type);

    let err = read(&f.build()).unwrap_err();
    assert_eq!(
        err.message(),
        "value index range was outside of the expected range for the parent region, \
         got [0, 2), but the maximum index was 0"
    );
}

#[test]
fn empty_regions_and_empty_blocks_are_valid() {
    let mut f = FileBuilder::new();
    let holder = f.op_name("test", "holder");
    let wrapper = f.op_name("test", "wrapper");
    let loc = f.text_attr("loc(unknown)");

    f.ir_block_header(2, false);
    // test.holder with one empty region.
    f.ir.write_varint(holder);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    f.ir.write_varint(0); // zero blocks
    // test.wrapper with a region holding a single empty block.
    f.ir.write_varint(wrapper);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    f.ir.write_varint(1);
    f.ir.write_varint(0);
    f.ir_block_header(0, false);

    let (_ctx, module, block) = read(&f.build()).unwrap();
    let ops = &module.block(block).ops;
    assert_eq!(ops.len(), 2);
    assert!(module.region(module.op(ops[0]).regions[0]).blocks.is_empty());
    let wrapper_region = module.region(module.op(ops[1]).regions[0]);
    assert_eq!(wrapper_region.blocks.len(), 1);
    assert!(module.block(wrapper_region.blocks[0]).ops.is_empty());
}

#[test]
fn deeply_nested_regions_do_not_recurse() {
    const DEPTH: usize = 512;
    let mut f = FileBuilder::new();
    let wrap = f.op_name("test", "wrap");
    let leaf = f.op_name("test", "leaf");
    let loc = f.text_attr("loc(unknown)");

    let mut body = Writer::new();
    body.write_varint(leaf);
    body.write_byte(0);
    body.write_varint(loc);
    let mut bytes = body.into_vec();
    for _ in 0..DEPTH {
        let mut w = Writer::new();
        w.write_varint(wrap);
        w.write_byte(op_encoding::HAS_INLINE_REGIONS);
        w.write_varint(loc);
        w.write_varint_with_flag(1, false);
        w.write_varint(1); // one block
        w.write_varint(0); // no values
        w.write_varint_with_flag(1, false); // one op
        w.write_bytes(&bytes);
        bytes = w.into_vec();
    }
    f.ir_block_header(1, false);
    f.ir.write_bytes(&bytes);

    let (ctx, module, block) = read(&f.build()).unwrap();
    let mut depth = 0;
    let mut op: OpId = module.block(block).ops[0];
    while !module.op(op).regions.is_empty() {
        depth += 1;
        let inner = module.region(module.op(op).regions[0]).blocks[0];
        op = module.block(inner).ops[0];
    }
    assert_eq!(depth, DEPTH);
    assert_eq!(ctx.op_name_str(module.op(op).name), "test.leaf");
}

#[test]
fn parsed_ops_are_spliced_before_the_terminator() {
    let mut f = FileBuilder::new();
    let op = f.op_name("test", "op");
    let loc = f.text_attr("loc(unknown)");
    f.ir_block_header(1, false);
    f.ir_plain_op(op, loc);

    let mut ctx = Context::new();
    ctx.allow_unregistered_dialects(true);
    let mut module = Module::new();
    let block = module.create_block();
    let host = ctx.register_dialect("host");
    let terminator_name = ctx.op_name(host, "host.return");
    let loc_attr = ctx.unknown_loc();
    let terminator = module.create_op(ir_bytecode::ir::OperationState::new(
        terminator_name,
        loc_attr,
    ));
    module.append_op(block, terminator);

    let bytes = f.build();
    let buffer = SourceBuffer {
        data: &bytes,
        identifier: "conformance.mlirbc",
    };
    read_bytecode_file(
        &buffer,
        &mut ctx,
        &mut module,
        block,
        &ParserConfig::default(),
    )
    .unwrap();
    let ops = &module.block(block).ops;
    assert_eq!(ops.len(), 2);
    assert_eq!(ctx.op_name_str(module.op(ops[0]).name), "test.op");
    assert_eq!(ops[1], terminator);
}

#[test]
fn parsing_is_deterministic() {
    let mut f = FileBuilder::new();
    let wrapper = f.op_name("test", "wrapper");
    let def = f.op_name("test", "def");
    let loc = f.text_attr("loc(\"file.x\":1:2)");
    let i64_type = f.text_type("i64");
    f.ir_block_header(1, false);
    f.ir.write_varint(wrapper);
    f.ir.write_byte(op_encoding::HAS_INLINE_REGIONS);
    f.ir.write_varint(loc);
    f.ir.write_varint_with_flag(1, false);
    f.ir.write_varint(1);
    f.ir.write_varint(1);
    f.ir_block_header(1, false);
    f.ir.write_varint(def);
    f.ir.write_byte(op_encoding::HAS_RESULTS);
    f.ir.write_varint(loc);
    f.ir.write_varint(1);
    f.ir.write_varint(i64_type);
    let bytes = f.build();

    let render = |bytes: &[u8]| -> Vec<String> {
        let (ctx, module, block) = read(bytes).unwrap();
        let mut out = Vec::new();
        let mut worklist: Vec<OpId> = module.block(block).ops.clone();
        while let Some(op) = worklist.pop() {
            let data = module.op(op);
            out.push(format!(
                "{} results={} loc={}",
                ctx.op_name_str(data.name),
                data.result_types.len(),
                ctx.attr_string(data.loc)
            ));
            for &region in &data.regions {
                for &b in &module.region(region).blocks {
                    worklist.extend(module.block(b).ops.iter().copied());
                }
            }
        }
        out
    };
    assert_eq!(render(&bytes), render(&bytes));
}
