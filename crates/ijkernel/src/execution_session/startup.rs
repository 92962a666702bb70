//
// startup.rs
//
// Copyright (C) 2024-2025 Posit Software, PBC. All rights reserved.
// Licensed under the Elastic License 2.0. See LICENSE.txt for license information.
//
//

//! Startup scripts, run in the engine whenever it (re)starts.

use std::fs;
use std::path::{Path, PathBuf};

/// The extension of script files picked up from a startup directory.
const SCRIPT_EXTENSION: &str = "js";

/// Resolve the configured startup script path into the list of scripts to
/// run. A file is run as is; a directory contributes its script files in
/// file-name order.
pub fn discover_scripts(path: &Path) -> Result<Vec<PathBuf>, anyhow::Error> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut scripts: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext == SCRIPT_EXTENSION)
                    .unwrap_or(false)
        })
        .collect();
    scripts.sort();
    Ok(scripts)
}

/// Read the code of each startup script, skipping (and logging) any that
/// can't be read.
pub fn read_scripts(scripts: &[PathBuf]) -> Vec<(PathBuf, String)> {
    scripts
        .iter()
        .filter_map(|script| match fs::read_to_string(script) {
            Ok(code) => Some((script.clone(), code)),
            Err(err) => {
                log::warn!(
                    "Failed to read startup script {}: {}",
                    script.display(),
                    err
                );
                None
            }
        })
        .collect()
}
