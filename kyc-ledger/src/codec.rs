//! Record codec
//!
//! Pure transforms between domain values and the bytes held by the store:
//!
//! - Customer records are JSON with fixed field names (see [`Customer`])
//! - Entity balances are decimal strings (`"100"`, `"-5"`)
//! - History payloads are JSON (legacy value array, or a [`HistoryPage`])

use crate::{
    error::{Error, Result},
    types::{Customer, HistoryEntry, HistoryPage},
};

/// Decode a customer record
///
/// Fails with [`Error::MalformedRecord`] if the bytes are not a JSON object
/// or a field has the wrong type. Absent fields decode as empty.
pub fn decode_customer(bytes: &[u8]) -> Result<Customer> {
    serde_json::from_slice(bytes).map_err(|e| Error::MalformedRecord(e.to_string()))
}

/// Encode a customer record in its canonical form
pub fn encode_customer(customer: &Customer) -> Vec<u8> {
    // Only string keys and plain values: serialization cannot fail
    serde_json::to_vec(customer).unwrap_or_default()
}

/// Decode a stored entity balance
pub fn decode_balance(bytes: &[u8]) -> Result<i64> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::MalformedRecord("balance is not valid UTF-8".to_string()))?;
    text.parse::<i64>()
        .map_err(|_| Error::MalformedRecord(format!("balance {:?} is not an integer", text)))
}

/// Encode an entity balance
pub fn encode_balance(balance: i64) -> Vec<u8> {
    balance.to_string().into_bytes()
}

/// Parse a seed amount argument
pub fn parse_amount(arg: &str) -> Result<i64> {
    arg.parse::<i64>()
        .map_err(|_| Error::NotAnInteger(arg.to_string()))
}

/// Parse a transfer amount argument
pub fn parse_transfer_amount(arg: &str) -> Result<i64> {
    arg.parse::<i64>().map_err(|_| {
        Error::InvalidAmount(format!("expecting an integer value, got {:?}", arg))
    })
}

/// Encode history as a JSON array of value strings
///
/// Delete tombstones appear as `""`; a key without history is `[]`.
pub fn encode_history_values(entries: &[HistoryEntry]) -> Result<Vec<u8>> {
    let values: Vec<String> = entries
        .iter()
        .map(|entry| String::from_utf8_lossy(&entry.value).into_owned())
        .collect();
    Ok(serde_json::to_vec(&values)?)
}

/// Encode a history page with entry metadata and the next cursor
pub fn encode_history_page(page: &HistoryPage) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(page)?)
}
