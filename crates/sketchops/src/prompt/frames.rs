use crate::filter::SENTINELS;
use crate::models::{format_timestamp, Message};

use super::{escape_braces, render, PromptError};

const CHAT_FRAME: &str = "

Chat Room: {room_name}
Force processing: {force}
Messages:
{messages}

If this is regular chat with no security indicators, write back \"{sentinel}\".
When force processing is yes, always convert the messages into at least one event.
Your response should either be valid JSON lines or \"{sentinel}\".
";

const EVIDENCE_FRAME: &str = "

File Type: {file_type}
Investigation: {room_name}
Observer: {uploader}
Content:
{content}

Note: If a file does not appear to contain any security content, respond with \"{sentinel}\".

Your response should either be valid JSON lines or \"{sentinel}\".
";

pub struct ChatPromptContext<'a> {
    pub room_name: &'a str,
    pub messages: &'a [Message],
    pub force: bool,
}

pub struct EvidencePromptContext<'a> {
    pub file_type: &'a str,
    pub room_name: &'a str,
    pub uploader: &'a str,
    pub content: &'a str,
}

/// One line per message: `username (timestamp): content`.
fn message_lines(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{} ({}): {}", m.author, format_timestamp(&m.created_at), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn chat_prompt(template: &str, ctx: &ChatPromptContext<'_>) -> Result<String, PromptError> {
    let frame = format!("{}{}", escape_braces(template.trim()), CHAT_FRAME);
    let messages = message_lines(ctx.messages);
    render(
        &frame,
        &[
            ("room_name", ctx.room_name),
            ("force", if ctx.force { "yes" } else { "no" }),
            ("messages", messages.as_str()),
            ("sentinel", SENTINELS[0]),
        ],
    )
}

pub fn evidence_prompt(
    template: &str,
    ctx: &EvidencePromptContext<'_>,
) -> Result<String, PromptError> {
    let frame = format!("{}{}", escape_braces(template.trim()), EVIDENCE_FRAME);
    render(
        &frame,
        &[
            ("file_type", ctx.file_type),
            ("room_name", ctx.room_name),
            ("uploader", ctx.uploader),
            ("content", ctx.content),
            ("sentinel", SENTINELS[1]),
        ],
    )
}
