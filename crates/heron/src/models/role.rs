use serde::{Deserialize, Serialize};

/// The speaker of a message in the conversation.
///
/// Tool results are carried as content inside a follow up [`Role::User`]
/// message, and the system prompt is passed to the provider out of band, so
/// neither needs its own role here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}
