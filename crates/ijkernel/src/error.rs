//
// error.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use std::fmt;

use log::error;

#[derive(Debug)]
pub enum KernelError {
    /// No `<IDS|MSG>` delimiter was found among the frames
    MissingDelimiter(usize),

    /// Fewer than five frames follow the delimiter
    TooFewFrames(usize),

    /// The signature did not verify against the signed frames
    InvalidSignature,

    /// A JSON frame could not be parsed
    InvalidJson(String, serde_json::Error),

    /// The connection file names a signature scheme we can't compute
    UnsupportedSignatureScheme(String),

    /// The HMAC key could not be used
    InvalidKey(String),

    /// The execution engine could not be started
    EngineLaunchFailed(anyhow::Error),

    /// The execution engine could not be reached
    EngineUnavailable(String),

    /// A task was discarded before it produced a result
    TaskAbandoned,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error KE-{}: ", self.code())?;
        match self {
            KernelError::MissingDelimiter(frames) => {
                write!(f, "No message delimiter found among {} frames", frames)
            }
            KernelError::TooFewFrames(frames) => {
                write!(
                    f,
                    "Expected at least 5 frames after the delimiter, found {}",
                    frames
                )
            }
            KernelError::InvalidSignature => {
                write!(f, "Message signature is invalid")
            }
            KernelError::InvalidJson(frame, err) => {
                write!(f, "Invalid JSON in {} frame: {}", frame, err)
            }
            KernelError::UnsupportedSignatureScheme(scheme) => {
                write!(f, "Unsupported signature scheme '{}'", scheme)
            }
            KernelError::InvalidKey(reason) => {
                write!(f, "Invalid signing key: {}", reason)
            }
            KernelError::EngineLaunchFailed(err) => {
                write!(f, "Failed to launch the execution engine: {:#}", err)
            }
            KernelError::EngineUnavailable(reason) => {
                write!(f, "The execution engine is not available: {}", reason)
            }
            KernelError::TaskAbandoned => {
                write!(f, "The task was abandoned before it completed")
            }
        }
    }
}

impl std::error::Error for KernelError {}

impl KernelError {
    /// A stable numeric code for the error, used in log lines.
    pub fn code(&self) -> u8 {
        match self {
            KernelError::MissingDelimiter(_) => 1,
            KernelError::TooFewFrames(_) => 2,
            KernelError::InvalidSignature => 3,
            KernelError::InvalidJson(_, _) => 4,
            KernelError::UnsupportedSignatureScheme(_) => 5,
            KernelError::InvalidKey(_) => 6,
            KernelError::EngineLaunchFailed(_) => 7,
            KernelError::EngineUnavailable(_) => 8,
            KernelError::TaskAbandoned => 9,
        }
    }

    /// Whether the error describes a malformed or unverifiable message on
    /// the wire (as opposed to a kernel-side failure).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            KernelError::MissingDelimiter(_)
                | KernelError::TooFewFrames(_)
                | KernelError::InvalidSignature
                | KernelError::InvalidJson(_, _)
        )
    }

    pub fn log(&self) {
        error!("{}", self);
    }
}
