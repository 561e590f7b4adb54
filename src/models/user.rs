use serde::{Deserialize, Serialize};

/// Captured user data. All fields are optional until the conversation has
/// collected and validated them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub name: Option<String>,
    pub email: Option<String>,
    pub income: Option<String>,
}

impl UserData {
    /// True when no field has been collected yet
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.income.is_none()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "name" => self.name.as_deref(),
            "email" => self.email.as_deref(),
            "income" => self.income.as_deref(),
            _ => None,
        }
    }

    pub fn set_field(&mut self, name: &str, value: String) {
        match name {
            "name" => self.name = Some(value),
            "email" => self.email = Some(value),
            "income" => self.income = Some(value),
            _ => {}
        }
    }

    pub fn clear_field(&mut self, name: &str) {
        match name {
            "name" => self.name = None,
            "email" => self.email = None,
            "income" => self.income = None,
            _ => {}
        }
    }
}

/// A user data row as returned by the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub income: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_roundtrip() {
        let mut data = UserData::default();
        assert!(data.is_empty());

        data.set_field("name", "Alice".to_string());
        data.set_field("income", "$100,000".to_string());
        assert_eq!(data.field("name"), Some("Alice"));
        assert_eq!(data.field("email"), None);
        assert_eq!(data.field("income"), Some("$100,000"));
        assert!(!data.is_empty());

        data.clear_field("name");
        assert_eq!(data.field("name"), None);
    }

    #[test]
    fn test_unknown_field_is_ignored() {
        let mut data = UserData::default();
        data.set_field("phone", "555".to_string());
        assert!(data.is_empty());
    }

    #[test]
    fn test_serializes_missing_fields_as_null() {
        let data = UserData {
            name: Some("Bob".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["name"], "Bob");
        assert!(json["email"].is_null());
    }
}
