use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub id: i64,
    pub patient_id: i64,
    #[serde(default)]
    pub doctor_id: Option<i64>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub treatment: Option<String>,
    #[serde(default)]
    pub prescription: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MedicalRecord {
    /// One-line summary for list views.
    pub fn summary(&self) -> String {
        self.diagnosis
            .as_deref()
            .or(self.treatment.as_deref())
            .or(self.notes.as_deref())
            .unwrap_or("(no details)")
            .to_string()
    }
}
