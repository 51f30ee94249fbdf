use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageRef {
    pub public_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawMethod {
    pub bank_name: String,
    pub account_holder: String,
    pub account_number: String,
}

/// Authoritative rider profile. Orders embed a full copy of this record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub address: String,
    pub phone_number: String,
    pub car_number: String,
    pub license_number: Option<String>,
    pub is_available: bool,
    pub withdraw_method: Option<WithdrawMethod>,
    pub avatar: Option<ImageRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
