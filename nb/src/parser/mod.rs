//! Natural-language task parsing
//!
//! [`ParserService`] listens for inbound message events and publishes
//! drafts; [`parse_task`] is the underlying grammar.

mod nl;
mod service;

pub use nl::{ParseError, ParsedTask, parse_task};
pub use service::ParserService;
