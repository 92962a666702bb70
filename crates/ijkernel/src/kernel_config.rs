//
// kernel_config.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use std::path::{Path, PathBuf};

/// Options that shape how the kernel answers requests; fixed for the
/// lifetime of the kernel.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// The Jupyter protocol version to speak, e.g. "5.0" or "4.1"
    pub protocol_version: String,

    /// Whether to suppress results that are just `undefined`
    pub hide_undefined: bool,

    /// The language version reported in kernel_info replies
    pub language_version: String,

    /// A startup script, or a directory of them, run whenever the engine
    /// starts
    pub startup_script: Option<PathBuf>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            protocol_version: String::from("5.0"),
            hide_undefined: false,
            language_version: String::new(),
            startup_script: None,
        }
    }
}

/// Expand a leading `~` in a path to the user's home directory.
pub fn expand_path(path: &Path) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
