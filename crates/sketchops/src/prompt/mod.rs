//! Prompt assembly.
//!
//! Operator templates are free text and routinely contain JSON examples, so
//! every literal brace in them is escaped before the source-specific frame
//! appends its `{placeholder}` fields. Substituted values are inserted
//! verbatim and never re-scanned.

pub mod frames;
pub mod template;

pub use frames::{chat_prompt, evidence_prompt, ChatPromptContext, EvidencePromptContext};
pub use template::{escape_braces, render};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("missing value for placeholder '{{{name}}}'")]
    MissingParameter { name: String },

    #[error("unbalanced '{brace}' at byte {position}")]
    UnbalancedBrace { brace: char, position: usize },

    #[error("invalid placeholder '{{{name}}}' at byte {position}")]
    InvalidPlaceholder { name: String, position: usize },
}
