//! These models represent the objects passed around by the agent
//!
//! There are several related formats we need to interact with:
//! - openai-style messages/tools, sent from the agent to the serving endpoint
//! - catalog function metadata, read from the function registry
//! - vector search results, read from the index query endpoint
//!
//! These all overlap to varying degrees. We always immediately convert those data
//! models into the internal structs using to/from helpers, so the internal models
//! are not an exact match to any one wire format.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
