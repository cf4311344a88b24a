// Copyright 2026 the IR Bytecode Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `ir_bytecode`: a reader for the self-describing binary encoding of IR
//! modules.
//!
//! The reader consumes a sectioned, varint-encoded buffer and rebuilds the
//! in-memory IR: operations with nested regions and blocks, typed
//! operand/result values, attributes, and source locations. Attribute and
//! type entries are materialized lazily, region nesting is traversed
//! without native-stack recursion, and operands may reference values
//! defined later in the stream.
//!
//! ## Example
//!
//! ```
//! use ir_bytecode::encoding::{MAGIC, SectionId, VERSION};
//! use ir_bytecode::format::Writer;
//! use ir_bytecode::ir::{Context, Module};
//! use ir_bytecode::reader::{ParserConfig, SourceBuffer, read_bytecode_file};
//!
//! // The smallest well-formed file: an empty module.
//! let mut w = Writer::new();
//! w.write_bytes(&MAGIC);
//! w.write_varint(VERSION);
//! w.write_null_terminated_string("example");
//! for id in SectionId::ALL {
//!     let mut payload = Writer::new();
//!     match id {
//!         SectionId::String | SectionId::Dialect => payload.write_varint(0),
//!         SectionId::AttrType => {}
//!         SectionId::AttrTypeOffset => {
//!             payload.write_varint(0);
//!             payload.write_varint(0);
//!         }
//!         SectionId::Ir => payload.write_varint_with_flag(0, false),
//!     }
//!     w.write_byte(id as u8);
//!     w.write_varint(payload.as_slice().len() as u64);
//!     w.write_bytes(payload.as_slice());
//! }
//! let bytes = w.into_vec();
//!
//! let mut ctx = Context::new();
//! let mut module = Module::new();
//! let block = module.create_block();
//! let buffer = SourceBuffer {
//!     data: &bytes,
//!     identifier: "example.mlirbc",
//! };
//! read_bytecode_file(&buffer, &mut ctx, &mut module, block, &ParserConfig::default())?;
//! assert!(module.block(block).ops.is_empty());
//! # Ok::<(), ir_bytecode::diag::Diagnostic>(())
//! ```

#![no_std]

extern crate alloc;

pub mod asm;
pub mod diag;
pub mod encoding;
pub mod format;
pub mod ir;
pub mod reader;
pub mod verifier;
