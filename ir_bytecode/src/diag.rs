// Copyright 2026 the IR Bytecode Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostics for bytecode reading.
//!
//! Errors are plain values: every parsing primitive returns
//! `Result<_, Diagnostic>` and failures propagate unmodified to the entry
//! point. The top-level reader attaches a note recording the bytecode
//! version and producer to any diagnostic raised after the file header has
//! been read.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// A source location naming the input buffer.
///
/// Bytecode buffers are located by their identifier at line 0, column 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileLoc {
    /// The buffer identifier (typically a file path).
    pub file: String,
    /// Line number.
    pub line: u32,
    /// Column number.
    pub column: u32,
}

impl FileLoc {
    /// Creates a location for `file` at line 0, column 0.
    #[must_use]
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for FileLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// An error diagnostic with a location and optional notes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    location: FileLoc,
    message: String,
    notes: Vec<String>,
}

impl Diagnostic {
    /// Creates an error diagnostic at `location`.
    #[must_use]
    pub fn error(location: &FileLoc, message: impl Into<String>) -> Self {
        Self {
            location: location.clone(),
            message: message.into(),
            notes: Vec::new(),
        }
    }

    /// Returns the location this diagnostic was emitted at.
    #[must_use]
    pub fn location(&self) -> &FileLoc {
        &self.location
    }

    /// Returns the primary message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the attached notes.
    #[must_use]
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Attaches a note and returns the diagnostic.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)?;
        for note in &self.notes {
            write!(f, "\nnote: {note}")?;
        }
        Ok(())
    }
}

impl core::error::Error for Diagnostic {}
