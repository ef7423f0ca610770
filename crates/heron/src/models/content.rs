use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataContent {
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// A piece of a tool result: either plain text or a structured value
/// (e.g. one retrieved row from a vector search index).
pub enum Content {
    Text(TextContent),
    Data(DataContent),
}

impl Content {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Content::Text(TextContent { text: text.into() })
    }

    pub fn data(value: Value) -> Self {
        Content::Data(DataContent { value })
    }

    /// Get the text content if this is a Text variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    /// Get the structured value if this is a Data variant
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Content::Data(data) => Some(&data.value),
            _ => None,
        }
    }

    /// Render the content as the string that is sent to the model.
    pub fn render(&self) -> String {
        match self {
            Content::Text(text) => text.text.clone(),
            Content::Data(data) => data.value.to_string(),
        }
    }
}
