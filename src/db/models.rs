use crate::error::SessionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbPatient {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub gender: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when registering a patient; `id` and `created_at` are generated by storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientCreate {
    pub name: String,
    pub age: i64,
    pub gender: String,
    pub address: String,
}

impl PatientCreate {
    /// Rejects a registration with a blank field or a negative age.
    pub fn validate(&self) -> Result<(), SessionError> {
        for (field, value) in [
            ("name", &self.name),
            ("gender", &self.gender),
            ("address", &self.address),
        ] {
            if value.trim().is_empty() {
                return Err(SessionError::InvalidInput(format!("{field} is required")));
            }
        }
        if self.age < 0 {
            return Err(SessionError::InvalidInput(format!(
                "age must be non-negative, got {}",
                self.age
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PatientCreate {
        PatientCreate {
            name: "Ada".to_string(),
            age: 36,
            gender: "female".to_string(),
            address: "12 Analytical Row".to_string(),
        }
    }

    #[test]
    fn complete_registration_is_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut p = sample();
        p.address = "   ".to_string();
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("address"));
    }

    #[test]
    fn negative_age_is_rejected() {
        let mut p = sample();
        p.age = -1;
        assert!(matches!(p.validate(), Err(SessionError::InvalidInput(_))));
    }
}
