use std::fmt;

use serde::{Deserialize, Serialize};

/// Account role; decides which part of the API a user may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    /// Path segment used by role-scoped routes, e.g. `/api/patient/...`
    pub fn path_segment(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Patient => "Patient",
            Role::Doctor => "Doctor",
            Role::Admin => "Admin",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub role: Role,
}

impl User {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    /// Absent when the server does not rotate refresh tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response() {
        let json = r#"{"user":{"id":7,"email":"ana@example.com","firstName":"Ana","lastName":"Diaz","role":"patient","createdAt":"2024-01-05T10:00:00.000Z"},"accessToken":"a1","refreshToken":"r1"}"#;

        let resp: LoginResponse = serde_json::from_str(json).expect("Failed to parse login JSON");
        assert_eq!(resp.access_token, "a1");
        assert_eq!(resp.refresh_token, "r1");
        assert_eq!(resp.user.role, Role::Patient);
        assert_eq!(resp.user.display_name(), "Ana Diaz");
    }

    #[test]
    fn test_parse_refresh_response_without_rotation() {
        let resp: RefreshResponse = serde_json::from_str(r#"{"accessToken":"new"}"#).unwrap();
        assert_eq!(resp.access_token, "new");
        assert!(resp.refresh_token.is_none());
    }

    #[test]
    fn test_refresh_request_wire_format() {
        let body = serde_json::to_value(RefreshRequest { refresh_token: "r1" }).unwrap();
        assert_eq!(body, serde_json::json!({ "refreshToken": "r1" }));
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let user = User {
            id: 1,
            email: "dr@example.com".to_string(),
            first_name: None,
            last_name: None,
            role: Role::Doctor,
        };
        assert_eq!(user.display_name(), "dr@example.com");
        assert_eq!(user.role.path_segment(), "doctor");
    }
}
