/*
 * kernel_info.rs
 *
 * Copyright (C) 2024 Posit Software, PBC. All rights reserved.
 *
 */

use serde::Deserialize;
use serde::Serialize;

/// Represents a help link in a Jupyter message
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HelpLink {
    /// The text to display for the link
    pub text: String,

    /// The location (URL) of the help link
    pub url: String,
}

/// Represents information about the language that the kernel implements
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LanguageInfo {
    /// The name of the programming language the kernel implements
    pub name: String,

    /// The version of the language
    pub version: String,

    /// The MIME type for script files in the language
    pub mimetype: String,

    /// The file extension for script files in the language
    pub file_extension: String,

    /// Pygments lexer (for highlighting), if different than `name`
    pub pygments_lexer: Option<String>,

    /// Codemirror mode (for editing), if different than `name`
    pub codemirror_mode: Option<String>,
}

/// Represents a reply to a kernel_info_request (protocol 5.x)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelInfoReply {
    /// The execution status ("ok" or "error")
    pub status: String,

    /// Version of messaging protocol
    pub protocol_version: String,

    /// The name of the kernel implementation
    pub implementation: String,

    /// The version of the kernel implementation
    pub implementation_version: String,

    /// Information about the language the kernel supports
    pub language_info: LanguageInfo,

    /// A startup banner
    pub banner: String,

    /// A list of help links
    pub help_links: Vec<HelpLink>,
}

/// Represents a reply to a kernel_info_request (protocol 4.x).
///
/// Versions are sent as arrays of integers, e.g. `[4, 1]`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelInfoReplyV4 {
    /// The name of the language
    pub language: String,

    /// The version of the language
    pub language_version: Vec<u32>,

    /// Version of messaging protocol
    pub protocol_version: Vec<u32>,
}
