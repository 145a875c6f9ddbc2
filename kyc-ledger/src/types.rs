//! Core types for the record ledger
//!
//! The customer record field names are part of the persisted wire format and
//! must not change. Mapping fields use `BTreeMap` so that encoding is
//! deterministic (sorted keys).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form category → text mapping (education, employment, ...)
pub type Attributes = BTreeMap<String, String>;

/// Postal address of a customer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Street line
    #[serde(default)]
    pub address_line: String,

    /// City
    #[serde(default)]
    pub city: String,
}

/// Customer KYC record
///
/// Keyed in the store by `national_id`. `national_id` and `tax_id` are
/// immutable once the record exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Full name
    #[serde(default)]
    pub name: String,

    /// Gender
    #[serde(default)]
    pub gender: String,

    /// Date of birth (free text)
    #[serde(default)]
    pub dob: String,

    /// National ID number (Aadhaar), also the store key
    #[serde(rename = "aadhar_no", default)]
    pub national_id: String,

    /// Postal address
    #[serde(default)]
    pub address: Address,

    /// Tax ID (PAN)
    #[serde(rename = "pan_no", default)]
    pub tax_id: String,

    /// Credit score
    #[serde(rename = "cibil_score", default)]
    pub score: i32,

    /// Marital status
    #[serde(default)]
    pub marital_status: String,

    /// Education details
    #[serde(default, deserialize_with = "null_as_empty")]
    pub education: Attributes,

    /// Employment details
    #[serde(rename = "employement", default, deserialize_with = "null_as_empty")]
    pub employment: Attributes,

    /// Health details
    #[serde(default, deserialize_with = "null_as_empty")]
    pub health: Attributes,

    /// Possessions
    #[serde(rename = "possesions", default, deserialize_with = "null_as_empty")]
    pub possessions: Attributes,
}

impl Customer {
    /// Store key for this record
    pub fn key(&self) -> &str {
        &self.national_id
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Attributes, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Attributes>::deserialize(deserializer)?.unwrap_or_default())
}

/// One historical value of a key, as recorded by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Per-key sequence number (0-based, dense)
    pub seq: u64,

    /// Transaction that wrote this value (UUIDv7)
    pub tx_id: String,

    /// Commit timestamp
    pub timestamp: DateTime<Utc>,

    /// Value written; empty for a delete tombstone
    #[serde(with = "value_as_text")]
    pub value: Vec<u8>,

    /// Whether this entry records a delete
    pub is_delete: bool,
}

/// A bounded slice of a key's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Key whose history this is
    pub key: String,

    /// Entries in store order
    pub entries: Vec<HistoryEntry>,

    /// Cursor to pass for the next page; `None` when exhausted
    pub next_cursor: Option<u64>,
}

/// Outcome of a committed Move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Debited entity
    pub from: String,

    /// Balance of `from` after the move
    pub from_balance: i64,

    /// Credited entity
    pub to: String,

    /// Balance of `to` after the move
    pub to_balance: i64,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {}, {} = {}",
            self.from, self.from_balance, self.to, self.to_balance
        )
    }
}

/// Values are rendered as UTF-8 text (lossy) in JSON, as the legacy history
/// payload does.
mod value_as_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(String::deserialize(deserializer)?.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_wire_names() {
        let mut customer = Customer {
            national_id: "N1".to_string(),
            tax_id: "T1".to_string(),
            score: 720,
            ..Default::default()
        };
        customer
            .employment
            .insert("employer".to_string(), "Acme".to_string());

        let json = serde_json::to_value(&customer).unwrap();
        assert_eq!(json["aadhar_no"], "N1");
        assert_eq!(json["pan_no"], "T1");
        assert_eq!(json["cibil_score"], 720);
        assert_eq!(json["employement"]["employer"], "Acme");
        assert!(json["possesions"].is_object());
    }

    #[test]
    fn test_null_maps_decode_as_empty() {
        let json = r#"{"aadhar_no":"N1","pan_no":"T1","health":null}"#;
        let customer: Customer = serde_json::from_str(json).unwrap();
        assert!(customer.health.is_empty());
        assert_eq!(customer.key(), "N1");
    }

    #[test]
    fn test_absent_identifiers_decode_as_empty() {
        let customer: Customer = serde_json::from_str(r#"{"aadhar_no":"N1"}"#).unwrap();
        assert_eq!(customer.national_id, "N1");
        assert_eq!(customer.tax_id, "");

        let customer: Customer = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
        assert_eq!(customer.key(), "");
    }

    #[test]
    fn test_transfer_display() {
        let transfer = Transfer {
            from: "alice".to_string(),
            from_balance: 50,
            to: "bob".to_string(),
            to_balance: 250,
        };
        assert_eq!(transfer.to_string(), "alice = 50, bob = 250");
    }
}
