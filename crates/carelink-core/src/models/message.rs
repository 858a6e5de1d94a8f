use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    #[serde(default)]
    pub participant_name: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct NewMessage<'a> {
    pub content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conversation_defaults() {
        let json = r#"{"id":4,"updatedAt":"2024-03-02T08:00:00.000Z"}"#;
        let conv: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conv.unread_count, 0);
        assert!(conv.participant_name.is_none());
    }
}
