//
// wire_message.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use bytes::Bytes;
use ijshared::protocol_version::ProtocolVersion;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use zeromq::ZmqMessage;

use crate::error::KernelError;
use crate::kernel_connection::{KernelConnection, MessageSigner};
use crate::wire_message_header::WireMessageHeader;

/// The frame separating routing identities from the message body.
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

/// A Jupyter message in the form it takes on a ZeroMQ socket:
///
/// `idents* <IDS|MSG> signature header parent_header metadata content buffers*`
#[derive(Debug, Clone)]
pub struct WireMessage {
    /// The routing identities preceding the delimiter
    pub idents: Vec<Bytes>,

    /// The message header
    pub header: WireMessageHeader,

    /// The header of the message that caused this one, or an empty object
    pub parent_header: serde_json::Value,

    /// The message metadata
    pub metadata: serde_json::Value,

    /// The message payload
    pub content: serde_json::Value,

    /// Binary buffers following the content frame
    pub buffers: Vec<Bytes>,

    /// The header exactly as it was received, for messages read off the
    /// wire; replies carry it as their parent header
    pub raw_header: Option<serde_json::Value>,
}

fn parse_frame<T: DeserializeOwned>(name: &str, frame: &[u8]) -> Result<T, KernelError> {
    serde_json::from_slice(frame).map_err(|e| KernelError::InvalidJson(name.to_string(), e))
}

impl WireMessage {
    /// Create a new message with no parent and no routing identities.
    pub fn new(header: WireMessageHeader, content: serde_json::Value) -> Self {
        Self {
            idents: vec![],
            header,
            parent_header: serde_json::Value::Object(serde_json::Map::new()),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            content,
            buffers: vec![],
            raw_header: None,
        }
    }

    /// Create a message that isn't a response to any request (e.g. output
    /// from the execution engine that arrives before any code has run).
    pub fn unsolicited(
        connection: &KernelConnection,
        msg_type: &str,
        content: serde_json::Value,
    ) -> Self {
        let header = WireMessageHeader::new(
            msg_type,
            connection.username.clone(),
            connection.session_id.clone(),
            header_version(connection),
        );
        Self::new(header, content)
    }

    /// Create a message caused by this one. The new message reuses this
    /// message's routing identities, username and session, and carries this
    /// message's header as its parent header (verbatim, if it was received).
    pub fn reply(
        &self,
        connection: &KernelConnection,
        msg_type: &str,
        content: serde_json::Value,
    ) -> Result<Self, anyhow::Error> {
        let header = WireMessageHeader::new(
            msg_type,
            self.header.username.clone(),
            self.header.session.clone(),
            header_version(connection),
        );
        let parent_header = match &self.raw_header {
            Some(raw) => raw.clone(),
            None => serde_json::to_value(&self.header)?,
        };
        Ok(Self {
            idents: self.idents.clone(),
            header,
            parent_header,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            content,
            buffers: vec![],
            raw_header: None,
        })
    }

    /// Parse a message from raw frames, verifying its signature.
    ///
    /// Fails if the delimiter is missing, if fewer than five frames follow
    /// it, if the signature does not verify, or if any JSON frame is invalid.
    pub fn from_frames(frames: Vec<Bytes>, signer: &MessageSigner) -> Result<Self, KernelError> {
        let mut idents = frames;
        let delimiter = idents
            .iter()
            .position(|frame| frame.as_ref() == DELIMITER)
            .ok_or(KernelError::MissingDelimiter(idents.len()))?;

        // Everything from the delimiter on is the message body
        let mut body = idents.split_off(delimiter);
        if body.len() < 6 {
            return Err(KernelError::TooFewFrames(body.len() - 1));
        }
        let buffers = body.split_off(6);

        let signed = [
            body[2].as_ref(),
            body[3].as_ref(),
            body[4].as_ref(),
            body[5].as_ref(),
        ];
        if !signer.verify(body[1].as_ref(), &signed) {
            return Err(KernelError::InvalidSignature);
        }

        let raw_header: serde_json::Value = parse_frame("header", &body[2])?;
        let header = WireMessageHeader::deserialize(&raw_header)
            .map_err(|e| KernelError::InvalidJson(String::from("header"), e))?;
        Ok(Self {
            idents,
            header,
            parent_header: parse_frame("parent_header", &body[3])?,
            metadata: parse_frame("metadata", &body[4])?,
            content: parse_frame("content", &body[5])?,
            buffers,
            raw_header: Some(raw_header),
        })
    }

    /// Parse a message received from a ZeroMQ socket.
    pub fn from_zmq(message: ZmqMessage, signer: &MessageSigner) -> Result<Self, KernelError> {
        Self::from_frames(message.into_vec(), signer)
    }

    /// Serialize and sign the message, producing the frames to send.
    pub fn to_frames(&self, signer: &MessageSigner) -> Result<Vec<Bytes>, anyhow::Error> {
        let header = serde_json::to_vec(&self.header)?;
        let parent_header = serde_json::to_vec(&self.parent_header)?;
        let metadata = serde_json::to_vec(&self.metadata)?;
        let content = serde_json::to_vec(&self.content)?;

        // Compute the HMAC signature from the JSON parts
        let signature = signer.sign(&[
            header.as_slice(),
            parent_header.as_slice(),
            metadata.as_slice(),
            content.as_slice(),
        ]);

        let mut frames: Vec<Bytes> = self.idents.clone();
        frames.push(Bytes::from_static(DELIMITER));
        frames.push(Bytes::from(signature));
        frames.push(Bytes::from(header));
        frames.push(Bytes::from(parent_header));
        frames.push(Bytes::from(metadata));
        frames.push(Bytes::from(content));
        frames.extend(self.buffers.iter().cloned());
        Ok(frames)
    }

    /// Serialize and sign the message as a ZeroMQ multipart message.
    pub fn to_zmq(&self, signer: &MessageSigner) -> Result<ZmqMessage, anyhow::Error> {
        let frames = self.to_frames(signer)?;
        ZmqMessage::try_from(frames).map_err(|e| anyhow::anyhow!("{}", e))
    }

    /// The message's type
    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }
}

fn header_version(connection: &KernelConnection) -> Option<String> {
    match connection.protocol {
        ProtocolVersion::V4 => None,
        ProtocolVersion::V5 => Some(connection.protocol_version.clone()),
    }
}
