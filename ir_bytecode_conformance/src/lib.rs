// Copyright 2026 the IR Bytecode Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conformance tests for the `ir_bytecode` wire format live in `tests/`.
