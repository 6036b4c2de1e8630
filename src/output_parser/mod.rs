//! # LLM Output Parser
//!
//! Extracts the JSON document from a model response. The grammar is small
//! and explicit:
//!
//! 1. the whole (trimmed) response is a JSON document, or
//! 2. the first `` ```json `` fenced block is, or
//! 3. the first fenced block of any language is;
//! 4. otherwise the response is rejected.
//!
//! No repair, bracket scanning, or truncation recovery is attempted.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`parse_json_document`] | Untyped JSON document |
//! | [`parse_json`] | Typed JSON via serde |
//! | [`extract_code_block`] | First fenced block and its language hint |
//! | [`extract_code_block_for`] | First fenced block in a given language |

pub mod error;
pub mod extract;
pub mod json;

pub use error::ParseError;
pub use extract::{extract_code_block, extract_code_block_for};
pub use json::{parse_json, parse_json_document};
