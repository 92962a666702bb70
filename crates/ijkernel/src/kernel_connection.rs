//
// kernel_connection.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use std::fmt;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use ijshared::protocol_version::ProtocolVersion;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::connection_file::ConnectionFile;
use crate::error::KernelError;

/// Computes and verifies message signatures for one of the `hmac-<algo>`
/// schemes a connection file may name.
#[derive(Clone)]
pub enum MessageSigner {
    /// No key was supplied; messages carry an empty signature
    Unsigned,
    Sha224(Hmac<Sha224>),
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
    Sha512(Hmac<Sha512>),
}

fn keyed<M: KeyInit>(key: &str) -> Result<M, KernelError> {
    <M as KeyInit>::new_from_slice(key.as_bytes())
        .map_err(|e| KernelError::InvalidKey(e.to_string()))
}

fn digest<M: Mac + Clone>(mac: &M, parts: &[&[u8]]) -> M {
    let mut mac = mac.clone();
    for part in parts {
        mac.update(part);
    }
    mac
}

fn sign_with<M: Mac + Clone>(mac: &M, parts: &[&[u8]]) -> String {
    hex::encode(digest(mac, parts).finalize().into_bytes())
}

/// Signatures are compared byte for byte against what `sign_with` produces,
/// so only lowercase hex can match.
fn verify_with<M: Mac + Clone>(mac: &M, signature: &[u8], parts: &[&[u8]]) -> bool {
    if !signature
        .iter()
        .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(byte))
    {
        return false;
    }
    match hex::decode(signature) {
        Ok(tag) => digest(mac, parts).verify_slice(&tag).is_ok(),
        Err(_) => false,
    }
}

impl MessageSigner {
    /// Create a signer from a scheme name (e.g. `hmac-sha256`) and key. An
    /// empty key disables signing regardless of the scheme.
    pub fn new(scheme: &str, key: &str) -> Result<Self, KernelError> {
        if key.is_empty() {
            return Ok(MessageSigner::Unsigned);
        }
        match scheme {
            "hmac-sha224" => Ok(MessageSigner::Sha224(keyed(key)?)),
            "hmac-sha256" => Ok(MessageSigner::Sha256(keyed(key)?)),
            "hmac-sha384" => Ok(MessageSigner::Sha384(keyed(key)?)),
            "hmac-sha512" => Ok(MessageSigner::Sha512(keyed(key)?)),
            other => Err(KernelError::UnsupportedSignatureScheme(other.to_string())),
        }
    }

    /// Sign the given frames, fed to the HMAC one after another. Returns the
    /// lowercase hex digest, or an empty string when unsigned.
    pub fn sign(&self, parts: &[&[u8]]) -> String {
        match self {
            MessageSigner::Unsigned => String::new(),
            MessageSigner::Sha224(mac) => sign_with(mac, parts),
            MessageSigner::Sha256(mac) => sign_with(mac, parts),
            MessageSigner::Sha384(mac) => sign_with(mac, parts),
            MessageSigner::Sha512(mac) => sign_with(mac, parts),
        }
    }

    /// Check a signature frame against the given frames. When unsigned, only
    /// an empty signature is accepted.
    pub fn verify(&self, signature: &[u8], parts: &[&[u8]]) -> bool {
        match self {
            MessageSigner::Unsigned => signature.is_empty(),
            MessageSigner::Sha224(mac) => verify_with(mac, signature, parts),
            MessageSigner::Sha256(mac) => verify_with(mac, signature, parts),
            MessageSigner::Sha384(mac) => verify_with(mac, signature, parts),
            MessageSigner::Sha512(mac) => verify_with(mac, signature, parts),
        }
    }
}

impl fmt::Debug for MessageSigner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let scheme = match self {
            MessageSigner::Unsigned => "unsigned",
            MessageSigner::Sha224(_) => "hmac-sha224",
            MessageSigner::Sha256(_) => "hmac-sha256",
            MessageSigner::Sha384(_) => "hmac-sha384",
            MessageSigner::Sha512(_) => "hmac-sha512",
        };
        write!(f, "MessageSigner({})", scheme)
    }
}

/// Everything needed to sign and address messages sent by this kernel.
#[derive(Debug, Clone)]
pub struct KernelConnection {
    /// The ID of the kernel session; used in headers of unsolicited messages
    pub session_id: String,

    /// The username used in headers of unsolicited messages
    pub username: String,

    /// The Jupyter protocol version, as given on the command line
    pub protocol_version: String,

    /// The protocol family selected by `protocol_version`
    pub protocol: ProtocolVersion,

    /// Signs and verifies messages
    pub signer: MessageSigner,
}

impl KernelConnection {
    pub fn new(
        connection_file: &ConnectionFile,
        protocol_version: &str,
    ) -> Result<Self, anyhow::Error> {
        let protocol = protocol_version
            .parse::<ProtocolVersion>()
            .map_err(|e| anyhow::anyhow!(e))?;
        let signer = MessageSigner::new(&connection_file.signature_scheme, &connection_file.key)?;
        Ok(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            username: String::from("kernel"),
            protocol_version: protocol_version.to_string(),
            protocol,
            signer,
        })
    }
}
