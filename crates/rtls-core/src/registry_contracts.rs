use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReaderCreate {
    pub reader_id: String,
    pub location_name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReaderRecord {
    pub reader_id: String,
    pub location_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagCreate {
    pub tag_id: String,
    pub equipment_name: String,
    pub equipment_type: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagRecord {
    pub tag_id: String,
    pub equipment_name: String,
    pub equipment_type: String,
    pub serial_number: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Staff,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Staff => "staff",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "admin" => Ok(UserRole::Admin),
            "staff" => Ok(UserRole::Staff),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserCreate {
    pub username: String,
    pub display_name: String,
    pub role: String,
    #[serde(default)]
    pub department: Option<String>,
    pub password: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

// No password material on the way out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("Admin".parse::<UserRole>(), Ok(UserRole::Admin));
        assert_eq!(" staff ".parse::<UserRole>(), Ok(UserRole::Staff));
        assert!("guest".parse::<UserRole>().is_err());
    }

    #[test]
    fn create_bodies_default_to_active() {
        let reader: ReaderCreate = serde_json::from_value(json!({
            "reader_id": "M501",
            "location_name": "M501호"
        }))
        .expect("parse reader");
        assert!(reader.is_active);

        let tag: TagCreate = serde_json::from_value(json!({
            "tag_id": "T1",
            "equipment_name": "infusion pump",
            "equipment_type": "pump"
        }))
        .expect("parse tag");
        assert!(tag.is_active);
        assert_eq!(tag.serial_number, None);
    }
}
