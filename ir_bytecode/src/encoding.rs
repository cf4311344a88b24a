// Copyright 2026 the IR Bytecode Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire-format constants shared by the reader and by fixture builders.

use core::fmt;

/// The four magic bytes opening every bytecode file (`"ML\xefR"`).
pub const MAGIC: [u8; 4] = [0x4D, 0x4C, 0xEF, 0x52];

/// The single bytecode version understood by this reader.
pub const VERSION: u64 = 0;

/// The number of top-level section kinds.
pub const NUM_SECTIONS: usize = 5;

/// A top-level section identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SectionId {
    /// The string table.
    String = 0,
    /// Dialect names and grouped operation names.
    Dialect = 1,
    /// Concatenated attribute/type entry payloads.
    AttrType = 2,
    /// The attribute/type entry index.
    AttrTypeOffset = 3,
    /// The IR itself.
    Ir = 4,
}

impl SectionId {
    /// All section ids in index order.
    pub const ALL: [Self; NUM_SECTIONS] = [
        Self::String,
        Self::Dialect,
        Self::AttrType,
        Self::AttrTypeOffset,
        Self::Ir,
    ];

    /// Parses a section id byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::String),
            1 => Some(Self::Dialect),
            2 => Some(Self::AttrType),
            3 => Some(Self::AttrTypeOffset),
            4 => Some(Self::Ir),
            _ => None,
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "String (0)"),
            Self::Dialect => write!(f, "Dialect (1)"),
            Self::AttrType => write!(f, "AttrType (2)"),
            Self::AttrTypeOffset => write!(f, "AttrTypeOffset (3)"),
            Self::Ir => write!(f, "IR (4)"),
        }
    }
}

/// Flag bits of the per-operation component mask byte.
pub mod op_encoding {
    /// The operation has an attribute dictionary.
    pub const HAS_ATTRS: u8 = 0x01;
    /// The operation has results.
    pub const HAS_RESULTS: u8 = 0x02;
    /// The operation has operands.
    pub const HAS_OPERANDS: u8 = 0x04;
    /// The operation has successors.
    pub const HAS_SUCCESSORS: u8 = 0x08;
    /// The operation has inline regions.
    pub const HAS_INLINE_REGIONS: u8 = 0x10;
}
