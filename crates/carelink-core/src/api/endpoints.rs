//! Typed access to the healthcare endpoints.
//!
//! All calls go through [`AuthenticatedClient::send`], so they share the
//! bearer token handling and the refresh-and-retry behaviour.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::client::AuthenticatedClient;
use super::error::Result;
use crate::models::{Appointment, Conversation, MedicalRecord, Message, NewMessage, Role};

/// List payloads come either as a bare array or wrapped in an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(
            alias = "appointments",
            alias = "records",
            alias = "conversations",
            alias = "messages"
        )]
        data: Vec<T>,
    },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) => items,
            Listing::Wrapped { data } => data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Single<T> {
    Bare(T),
    Wrapped {
        #[serde(alias = "message")]
        data: T,
    },
}

impl AuthenticatedClient {
    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let listing: Listing<T> = self.get_json(path).await?;
        Ok(listing.into_vec())
    }

    /// Appointments visible to a role, e.g. `/api/patient/appointments`.
    pub async fn fetch_appointments(&self, role: Role) -> Result<Vec<Appointment>> {
        let path = format!("/api/{}/appointments", role.path_segment());
        let mut appointments: Vec<Appointment> = self.get_list(&path).await?;
        appointments.sort_by_key(|a| a.date_time);
        Ok(appointments)
    }

    /// Medical records of the signed-in user.
    pub async fn fetch_records(&self) -> Result<Vec<MedicalRecord>> {
        let mut records: Vec<MedicalRecord> = self.get_list("/api/records").await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> =
            self.get_list("/api/messages/conversations").await?;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    /// Messages of a conversation, oldest first.
    pub async fn fetch_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        let path = format!("/api/messages/conversations/{}/messages", conversation_id);
        let mut messages: Vec<Message> = self.get_list(&path).await?;
        messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(messages)
    }

    pub async fn send_message(&self, conversation_id: i64, content: &str) -> Result<Message> {
        let path = format!("/api/messages/conversations/{}/messages", conversation_id);
        let sent: Single<Message> = self.post_json(&path, &NewMessage { content }).await?;
        Ok(match sent {
            Single::Bare(message) => message,
            Single::Wrapped { data } => data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_shapes() {
        let bare: Listing<i64> = serde_json::from_str("[1,2,3]").unwrap();
        assert_eq!(bare.into_vec(), vec![1, 2, 3]);

        let wrapped: Listing<i64> = serde_json::from_str(r#"{"appointments":[4,5]}"#).unwrap();
        assert_eq!(wrapped.into_vec(), vec![4, 5]);

        let data: Listing<i64> = serde_json::from_str(r#"{"data":[6],"total":1}"#).unwrap();
        assert_eq!(data.into_vec(), vec![6]);
    }

    #[test]
    fn test_single_shapes() {
        let bare: Single<i64> = serde_json::from_str("7").unwrap();
        assert!(matches!(bare, Single::Bare(7)));

        let wrapped: Single<i64> = serde_json::from_str(r#"{"message":8}"#).unwrap();
        assert!(matches!(wrapped, Single::Wrapped { data: 8 }));
    }
}
