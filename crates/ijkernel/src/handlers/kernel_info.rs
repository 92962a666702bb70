//
// kernel_info.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use ijshared::jupyter_message::JupyterChannel;
use ijshared::kernel_info::{HelpLink, KernelInfoReply, KernelInfoReplyV4, LanguageInfo};
use ijshared::protocol_version::{version_numbers, ProtocolVersion};

use super::{HandlerContext, HandlerFlow};
use crate::wire_message::WireMessage;

const LANGUAGE: &str = "javascript";

fn help_links() -> Vec<HelpLink> {
    vec![
        HelpLink {
            text: String::from("JavaScript Reference"),
            url: String::from("https://developer.mozilla.org/en-US/docs/Web/JavaScript/Reference"),
        },
        HelpLink {
            text: String::from("Jupyter Messaging"),
            url: String::from("https://jupyter-client.readthedocs.io/en/latest/messaging.html"),
        },
    ]
}

/// Describe the kernel. Doesn't involve the engine.
pub async fn handle(
    ctx: &HandlerContext,
    message: &WireMessage,
) -> Result<HandlerFlow, anyhow::Error> {
    let connection = ctx.outbox.connection();
    let content = match connection.protocol {
        ProtocolVersion::V4 => serde_json::to_value(KernelInfoReplyV4 {
            language: String::from(LANGUAGE),
            language_version: version_numbers(&ctx.config.language_version),
            protocol_version: version_numbers(&connection.protocol_version),
        })?,
        ProtocolVersion::V5 => {
            let implementation_version = env!("CARGO_PKG_VERSION");
            serde_json::to_value(KernelInfoReply {
                status: String::from("ok"),
                protocol_version: connection.protocol_version.clone(),
                implementation: String::from("ijkernel"),
                implementation_version: String::from(implementation_version),
                language_info: LanguageInfo {
                    name: String::from(LANGUAGE),
                    version: ctx.config.language_version.clone(),
                    mimetype: String::from("application/javascript"),
                    file_extension: String::from(".js"),
                    pygments_lexer: None,
                    codemirror_mode: None,
                },
                banner: format!("ijkernel v{}\n", implementation_version),
                help_links: help_links(),
            })?
        }
    };

    ctx.outbox
        .reply(JupyterChannel::Shell, message, "kernel_info_reply", content)
        .await?;
    Ok(HandlerFlow::Continue)
}
