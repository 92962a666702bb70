//
// lib.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

//! A Jupyter kernel for JavaScript. The kernel speaks the Jupyter messaging
//! protocol (4.x or 5.x) over ZeroMQ and delegates evaluation to an external
//! execution engine.

#![allow(missing_docs)]

pub mod builtin_docs;
pub mod connection_file;
pub mod error;
pub mod execution_queue;
pub mod execution_session;
pub mod expression;
pub mod handlers;
pub mod heartbeat;
pub mod jupyter_messages;
pub mod kernel;
pub mod kernel_config;
pub mod kernel_connection;
pub mod kernel_state;
pub mod outbox;
pub mod wire_message;
pub mod wire_message_header;
