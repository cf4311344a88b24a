// Copyright 2026 the IR Bytecode Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Textual assembly format for attributes and types.
//!
//! Bytecode attribute/type entries without a custom encoding carry their
//! assembly form as a null-terminated string; this module parses that
//! subset. Both entry points report the number of bytes consumed so the
//! caller can reject trailing characters.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::ir::{AttrData, Attribute, Context, Type, TypeData};

/// An assembly parsing error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsmError {
    /// A construct was expected at the given byte offset.
    Expected {
        /// What was expected.
        what: &'static str,
        /// Byte offset into the input.
        offset: usize,
    },
    /// An identifier did not name a known attribute or type.
    UnknownKeyword {
        /// The identifier.
        keyword: String,
        /// Byte offset into the input.
        offset: usize,
    },
    /// An integer literal did not fit its target width.
    IntegerOutOfRange {
        /// Byte offset into the input.
        offset: usize,
    },
    /// An integer type had a zero or unparsable width.
    InvalidIntegerWidth {
        /// Byte offset into the input.
        offset: usize,
    },
    /// A string literal had an invalid escape sequence.
    InvalidEscape {
        /// Byte offset into the input.
        offset: usize,
    },
    /// A string literal was not terminated.
    UnterminatedString {
        /// Byte offset into the input.
        offset: usize,
    },
    /// A dictionary repeated a key.
    DuplicateKey {
        /// The repeated key.
        key: String,
        /// Byte offset into the input.
        offset: usize,
    },
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected { what, offset } => {
                write!(f, "expected {what} at offset {offset}")
            }
            Self::UnknownKeyword { keyword, offset } => {
                write!(f, "unknown keyword '{keyword}' at offset {offset}")
            }
            Self::IntegerOutOfRange { offset } => {
                write!(f, "integer literal out of range at offset {offset}")
            }
            Self::InvalidIntegerWidth { offset } => {
                write!(f, "invalid integer type width at offset {offset}")
            }
            Self::InvalidEscape { offset } => {
                write!(f, "invalid escape sequence at offset {offset}")
            }
            Self::UnterminatedString { offset } => {
                write!(f, "unterminated string literal at offset {offset}")
            }
            Self::DuplicateKey { key, offset } => {
                write!(f, "duplicate dictionary key '{key}' at offset {offset}")
            }
        }
    }
}

impl core::error::Error for AsmError {}

/// Parses one attribute from the start of `text`.
///
/// Returns the attribute and the number of bytes consumed (including any
/// trailing whitespace).
pub fn parse_attribute(text: &str, ctx: &mut Context) -> Result<(Attribute, usize), AsmError> {
    let mut p = Parser { text, pos: 0 };
    let attr = p.parse_attr(ctx)?;
    p.skip_ws();
    Ok((attr, p.pos))
}

/// Parses one type from the start of `text`.
///
/// Returns the type and the number of bytes consumed (including any
/// trailing whitespace).
pub fn parse_type(text: &str, ctx: &mut Context) -> Result<(Type, usize), AsmError> {
    let mut p = Parser { text, pos: 0 };
    let ty = p.parse_ty(ctx)?;
    p.skip_ws();
    Ok((ty, p.pos))
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8, what: &'static str) -> Result<(), AsmError> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(AsmError::Expected {
                what,
                offset: self.pos,
            })
        }
    }

    fn ident(&mut self) -> &str {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    fn parse_attr(&mut self, ctx: &mut Context) -> Result<Attribute, AsmError> {
        self.skip_ws();
        match self.peek() {
            Some(b'"') => {
                let s = self.parse_string_literal()?;
                Ok(ctx.intern_attr(AttrData::String(s)))
            }
            Some(b'[') => self.parse_array(ctx),
            Some(b'{') => self.parse_dictionary(ctx),
            Some(b'-' | b'0'..=b'9') => {
                let offset = self.pos;
                let value = self.parse_int(offset)?;
                Ok(ctx.intern_attr(AttrData::Integer(value)))
            }
            Some(b'(') => {
                let ty = self.parse_ty(ctx)?;
                Ok(ctx.intern_attr(AttrData::Type(ty)))
            }
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
                let offset = self.pos;
                let ident = self.ident().to_string();
                match ident.as_str() {
                    "unit" => Ok(ctx.intern_attr(AttrData::Unit)),
                    "true" => Ok(ctx.intern_attr(AttrData::Bool(true))),
                    "false" => Ok(ctx.intern_attr(AttrData::Bool(false))),
                    "loc" => {
                        self.expect(b'(', "'(' after 'loc'")?;
                        let loc = self.parse_loc_payload(ctx)?;
                        self.skip_ws();
                        self.expect(b')', "')' closing location")?;
                        Ok(loc)
                    }
                    _ => {
                        let ty = self.keyword_type(&ident, offset, ctx)?;
                        Ok(ctx.intern_attr(AttrData::Type(ty)))
                    }
                }
            }
            _ => Err(AsmError::Expected {
                what: "attribute",
                offset: self.pos,
            }),
        }
    }

    fn parse_array(&mut self, ctx: &mut Context) -> Result<Attribute, AsmError> {
        self.expect(b'[', "'['")?;
        let mut elems = Vec::new();
        self.skip_ws();
        if !self.eat(b']') {
            loop {
                elems.push(self.parse_attr(ctx)?);
                self.skip_ws();
                if self.eat(b']') {
                    break;
                }
                self.expect(b',', "',' or ']' in array")?;
            }
        }
        Ok(ctx.intern_attr(AttrData::Array(elems)))
    }

    fn parse_dictionary(&mut self, ctx: &mut Context) -> Result<Attribute, AsmError> {
        let dict_offset = self.pos;
        self.expect(b'{', "'{'")?;
        let mut entries: Vec<(String, Attribute)> = Vec::new();
        self.skip_ws();
        if !self.eat(b'}') {
            loop {
                self.skip_ws();
                let key = match self.peek() {
                    Some(b'"') => self.parse_string_literal()?,
                    Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.ident().to_string(),
                    _ => {
                        return Err(AsmError::Expected {
                            what: "dictionary key",
                            offset: self.pos,
                        });
                    }
                };
                self.skip_ws();
                self.expect(b'=', "'=' after dictionary key")?;
                let value = self.parse_attr(ctx)?;
                entries.push((key, value));
                self.skip_ws();
                if self.eat(b'}') {
                    break;
                }
                self.expect(b',', "',' or '}' in dictionary")?;
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for pair in entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(AsmError::DuplicateKey {
                    key: pair[0].0.clone(),
                    offset: dict_offset,
                });
            }
        }
        Ok(ctx.intern_attr(AttrData::Dictionary(entries)))
    }

    fn parse_loc_payload(&mut self, ctx: &mut Context) -> Result<Attribute, AsmError> {
        self.skip_ws();
        match self.peek() {
            Some(b'"') => {
                let name = self.parse_string_literal()?;
                self.skip_ws();
                if self.eat(b':') {
                    let line = self.parse_u32()?;
                    self.expect(b':', "':' before column number")?;
                    let column = self.parse_u32()?;
                    Ok(ctx.intern_attr(AttrData::FileLineColLoc {
                        file: name,
                        line,
                        column,
                    }))
                } else if self.eat(b'(') {
                    let child = self.parse_loc_payload(ctx)?;
                    self.skip_ws();
                    self.expect(b')', "')' closing nested location")?;
                    Ok(ctx.intern_attr(AttrData::NameLoc { name, child }))
                } else {
                    let child = ctx.unknown_loc();
                    Ok(ctx.intern_attr(AttrData::NameLoc { name, child }))
                }
            }
            Some(b) if b.is_ascii_alphabetic() => {
                let offset = self.pos;
                let ident = self.ident().to_string();
                if ident == "unknown" {
                    Ok(ctx.unknown_loc())
                } else {
                    Err(AsmError::UnknownKeyword {
                        keyword: ident,
                        offset,
                    })
                }
            }
            _ => Err(AsmError::Expected {
                what: "location",
                offset: self.pos,
            }),
        }
    }

    fn parse_ty(&mut self, ctx: &mut Context) -> Result<Type, AsmError> {
        self.skip_ws();
        if self.peek() == Some(b'(') {
            return self.parse_function_type(ctx);
        }
        let offset = self.pos;
        let ident = self.ident().to_string();
        if ident.is_empty() {
            return Err(AsmError::Expected {
                what: "type",
                offset,
            });
        }
        self.keyword_type(&ident, offset, ctx)
    }

    fn keyword_type(
        &mut self,
        ident: &str,
        offset: usize,
        ctx: &mut Context,
    ) -> Result<Type, AsmError> {
        match ident {
            "none" => Ok(ctx.intern_type(TypeData::None)),
            "index" => Ok(ctx.intern_type(TypeData::Index)),
            "f32" => Ok(ctx.intern_type(TypeData::F32)),
            "f64" => Ok(ctx.intern_type(TypeData::F64)),
            _ => {
                if let Some(width) = ident.strip_prefix('i')
                    && !width.is_empty()
                    && width.bytes().all(|b| b.is_ascii_digit())
                {
                    let width: u32 = width
                        .parse()
                        .map_err(|_| AsmError::InvalidIntegerWidth { offset })?;
                    if width == 0 {
                        return Err(AsmError::InvalidIntegerWidth { offset });
                    }
                    return Ok(ctx.intern_type(TypeData::Integer { width }));
                }
                Err(AsmError::UnknownKeyword {
                    keyword: ident.to_string(),
                    offset,
                })
            }
        }
    }

    fn parse_function_type(&mut self, ctx: &mut Context) -> Result<Type, AsmError> {
        self.expect(b'(', "'('")?;
        let inputs = self.parse_type_list(ctx)?;
        self.skip_ws();
        self.expect(b'-', "'->' after function inputs")?;
        self.expect(b'>', "'->' after function inputs")?;
        self.skip_ws();
        let results = if self.peek() == Some(b'(') {
            self.pos += 1;
            self.parse_type_list(ctx)?
        } else {
            let mut results = Vec::with_capacity(1);
            results.push(self.parse_ty(ctx)?);
            results
        };
        Ok(ctx.intern_type(TypeData::Function { inputs, results }))
    }

    /// Parses a comma-separated type list up to and including `)`. The
    /// opening parenthesis has already been consumed.
    fn parse_type_list(&mut self, ctx: &mut Context) -> Result<Vec<Type>, AsmError> {
        let mut types = Vec::new();
        self.skip_ws();
        if self.eat(b')') {
            return Ok(types);
        }
        loop {
            types.push(self.parse_ty(ctx)?);
            self.skip_ws();
            if self.eat(b')') {
                return Ok(types);
            }
            self.expect(b',', "',' or ')' in type list")?;
        }
    }

    fn parse_string_literal(&mut self) -> Result<String, AsmError> {
        let start = self.pos;
        self.expect(b'"', "'\"'")?;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(AsmError::UnterminatedString { offset: start }),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    let escape_offset = self.pos;
                    match self.text.as_bytes().get(self.pos + 1) {
                        Some(b'"') => out.push('"'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        _ => {
                            return Err(AsmError::InvalidEscape {
                                offset: escape_offset,
                            });
                        }
                    }
                    self.pos += 2;
                }
                Some(_) => {
                    let rest = &self.text[self.pos..];
                    let Some(ch) = rest.chars().next() else {
                        return Err(AsmError::UnterminatedString { offset: start });
                    };
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn parse_int(&mut self, offset: usize) -> Result<i64, AsmError> {
        let negative = self.eat(b'-');
        let digits_start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(AsmError::Expected {
                what: "integer literal",
                offset: self.pos,
            });
        }
        let mut value: i64 = 0;
        for &b in self.text.as_bytes()[digits_start..self.pos].iter() {
            let digit = i64::from(b - b'0');
            value = value
                .checked_mul(10)
                .and_then(|v| {
                    if negative {
                        v.checked_sub(digit)
                    } else {
                        v.checked_add(digit)
                    }
                })
                .ok_or(AsmError::IntegerOutOfRange { offset })?;
        }
        Ok(value)
    }

    fn parse_u32(&mut self) -> Result<u32, AsmError> {
        let offset = self.pos;
        self.skip_ws();
        let value = self.parse_int(offset)?;
        u32::try_from(value).map_err(|_| AsmError::IntegerOutOfRange { offset })
    }
}
