//! Reasoning layer: batch change proposals from an LLM, parsed into a strict
//! schema and filtered before anything touches a card file.

mod extract;
mod proposer;
mod validator;

pub use extract::extract_json;
pub use proposer::{
    build_user_prompt, parse_response, ChangeProposer, ParsedResponse, ProposalInput,
    ProposerError, SYSTEM_PROMPT,
};
pub use validator::{validate, RejectReason, Rejection, Validation};

#[cfg(feature = "http")]
mod claude;
#[cfg(feature = "http")]
pub use claude::ClaudeProposer;
