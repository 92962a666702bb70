//
// protocol_version.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use std::fmt;
use std::str::FromStr;

/// The family of the Jupyter messaging protocol spoken by the kernel.
///
/// Protocol 4.x and 5.x share the same control flow but differ in message
/// type names (`pyin` vs `execute_input`) and content shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V4,
    V5,
}

impl FromStr for ProtocolVersion {
    type Err = String;

    /// Parses a version string such as `"5.0"` or `"4.1"`. Any major version
    /// of 4 or lower selects the 4.x protocol.
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let major = version
            .split('.')
            .next()
            .and_then(|major| major.trim().parse::<u32>().ok())
            .ok_or_else(|| format!("Invalid protocol version '{}'", version))?;
        if major <= 4 {
            Ok(ProtocolVersion::V4)
        } else {
            Ok(ProtocolVersion::V5)
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolVersion::V4 => write!(f, "4.x"),
            ProtocolVersion::V5 => write!(f, "5.x"),
        }
    }
}

/// Splits a dotted version string into its numeric components, as used by the
/// 4.x `kernel_info_reply`. Non-numeric components end the list.
///
/// Example: `"18.19.0"` => `[18, 19, 0]`
pub fn version_numbers(version: &str) -> Vec<u32> {
    version
        .trim_start_matches('v')
        .split('.')
        .map_while(|part| part.parse::<u32>().ok())
        .collect()
}
