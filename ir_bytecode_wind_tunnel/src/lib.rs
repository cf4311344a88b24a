// Copyright 2026 the IR Bytecode Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `ir_bytecode` live in `benches/`.
