//! Customer profile domain model

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_COUNTRY: &str = "Tajikistan";

/// Personal details of a bank customer, linked to a login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub date_of_birth: NaiveDate,
    pub email: String,
    pub phone_number: String,
    /// Unique across customers
    pub passport_number: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn full_name(&self) -> String {
        match self.middle_name.as_deref().map(str::trim) {
            Some(middle) if !middle.is_empty() => {
                format!("{} {} {}", self.first_name, middle, self.last_name)
            }
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }

    /// Age in whole years on the given date
    pub fn age_on(&self, date: NaiveDate) -> u32 {
        let dob = self.date_of_birth;
        if date < dob {
            return 0;
        }
        let mut age = date.year() - dob.year();
        if (date.month(), date.day()) < (dob.month(), dob.day()) {
            age -= 1;
        }
        age.max(0) as u32
    }
}
