use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::chart::ChartConfiguration;

pub const TURN_ERROR_REPLY: &str = "I'm sorry, I encountered an error while processing your request. Please try again with clear data or a different file.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

/// Binary payload handed to the model as an inline part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFile {
    pub mime_type: String,
    pub data: String,
}

/// An uploaded file. The base64 payload lives on the message so a reloaded
/// project can replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: String) -> Self {
        let mime_type = mime_type.into();
        let kind = if mime_type.starts_with("image/") {
            AttachmentKind::Image
        } else {
            AttachmentKind::File
        };
        Self {
            kind,
            name: name.into(),
            mime_type,
            data,
        }
    }

    pub fn inline_file(&self) -> InlineFile {
        InlineFile {
            mime_type: self.mime_type.clone(),
            data: self.data.clone(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_config: Option<ChartConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<Map<String, Value>>,
}

impl Message {
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::User,
            content: content.into(),
            attachments,
            chart_config: None,
            extracted_data: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::Assistant,
            content: content.into(),
            attachments: Vec::new(),
            chart_config: None,
            extracted_data: None,
        }
    }

    pub fn assistant_with_chart(
        content: impl Into<String>,
        chart_config: ChartConfiguration,
        extracted_data: Map<String, Value>,
    ) -> Self {
        let mut message = Self::assistant(content);
        message.chart_config = Some(chart_config);
        message.extracted_data = Some(extracted_data);
        message
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use crate::chart::ChartConfiguration;

    use super::{Attachment, AttachmentKind, Message, Role};

    #[test]
    fn attachment_kind_follows_mime_type() {
        let image = Attachment::new("plot.png", "image/png", "aGk=".to_string());
        let sheet = Attachment::new("data.csv", "text/csv", "YSxi".to_string());
        assert_eq!(image.kind, AttachmentKind::Image);
        assert_eq!(sheet.kind, AttachmentKind::File);
        assert_eq!(image.data_url(), "data:image/png;base64,aGk=");
        assert_eq!(sheet.inline_file().mime_type, "text/csv");
    }

    #[test]
    fn message_wire_format_is_camel_case() -> anyhow::Result<()> {
        let message = Message::assistant_with_chart("done", ChartConfiguration::empty(), Map::new());
        let value = serde_json::to_value(&message)?;
        assert_eq!(value["role"], json!("assistant"));
        assert_eq!(value["chartConfig"]["type"], json!("bar"));
        assert_eq!(value["extractedData"], json!({}));
        assert!(value.get("attachments").is_none());

        let user = Message::user(
            "from file",
            vec![Attachment::new("a.png", "image/png", "AA==".to_string())],
        );
        let restored: Message = serde_json::from_value(serde_json::to_value(&user)?)?;
        assert_eq!(restored.role, Role::User);
        assert_eq!(restored.attachments[0].kind, AttachmentKind::Image);
        assert_eq!(restored.attachments[0].data, "AA==");
        assert_ne!(message.id, user.id);
        Ok(())
    }
}
