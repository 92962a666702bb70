//
// lib.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

//! Shared types for the ijkernel kernel, its execution engines and its test clients.

/// Jupyter channel and execution state types
pub mod jupyter_message;

/// Kernel info reply types
pub mod kernel_info;

/// Wire protocol version selection
pub mod protocol_version;

/// Messages exchanged with the execution engine
pub mod engine_message;
