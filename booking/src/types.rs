//! Wire types for the booking flow.
//!
//! ```text
//! POST body ──► BookingSubmission ──validate──► BookingRequest
//!                                                    │ + CorrelationId
//!                                                    ▼
//!                                               StartEvent ──► bookingStarted
//!
//! paymentCompleted ──► CompletionEvent ──► caller (unchanged)
//! ```
//!
//! All payloads are JSON with camelCase field names.

use booking_relay_core::CorrelationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Card data forwarded to the payment process.
///
/// Opaque: never validated or stored. `Debug` output is redacted.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    /// Card number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    /// Expiry, e.g. `12/25`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    /// Card verification value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvv: Option<String>,
}

impl PaymentDetails {
    fn masked_card_number(&self) -> Option<String> {
        self.card_number.as_deref().map(|number| {
            let chars: Vec<char> = number.chars().collect();
            let visible = chars.len().saturating_sub(4);
            let last_four: String = chars[visible..].iter().collect();
            format!("****{last_four}")
        })
    }
}

impl fmt::Debug for PaymentDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("PaymentDetails")
            .field("card_number", &self.masked_card_number())
            .field("expiry", &redact(&self.expiry))
            .field("cvv", &redact(&self.cvv))
            .finish()
    }
}

/// Raw booking body as received over HTTP.
///
/// Every field is optional so that missing required fields can be reported as a
/// validation failure rather than a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSubmission {
    /// Room being booked
    #[serde(default)]
    pub room_id: Option<String>,
    /// RFC 3339 timestamp of the booking
    #[serde(default)]
    pub date: Option<String>,
    /// Optional price
    #[serde(default)]
    pub price: Option<f64>,
    /// Card data
    #[serde(flatten)]
    pub payment_details: PaymentDetails,
}

/// Why a [`BookingSubmission`] was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidBooking {
    /// `roomId` or `date` absent or empty
    #[error("roomId and date are required")]
    MissingFields,

    /// `date` is not an RFC 3339 timestamp
    #[error("date must be an RFC 3339 timestamp, got '{0}'")]
    InvalidDate(String),
}

impl BookingSubmission {
    /// Check required fields and parse the date.
    ///
    /// # Errors
    ///
    /// - [`InvalidBooking::MissingFields`] if `roomId` or `date` is absent or blank
    /// - [`InvalidBooking::InvalidDate`] if `date` does not parse
    pub fn validate(self) -> Result<BookingRequest, InvalidBooking> {
        let room_id = self.room_id.filter(|room| !room.trim().is_empty());
        let date = self.date.filter(|date| !date.trim().is_empty());

        let (Some(room_id), Some(date)) = (room_id, date) else {
            return Err(InvalidBooking::MissingFields);
        };

        let date = DateTime::parse_from_rfc3339(date.trim())
            .map_err(|_| InvalidBooking::InvalidDate(date.clone()))?
            .with_timezone(&Utc);

        Ok(BookingRequest {
            room_id,
            date,
            price: self.price,
            payment_details: self.payment_details,
        })
    }
}

/// A validated booking. Transient; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    /// Room being booked
    pub room_id: String,
    /// When the booking is for
    pub date: DateTime<Utc>,
    /// Optional price
    pub price: Option<f64>,
    /// Card data, forwarded untouched
    pub payment_details: PaymentDetails,
}

/// Message published on `bookingStarted`.
///
/// ```json
/// {"correlationId":"…","roomId":"101","date":"2025-12-11T10:00:00Z","price":100.0,
///  "cardNumber":"4111111111111111","expiry":"12/25","cvv":"123"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEvent {
    /// Key the payment process must echo back
    pub correlation_id: CorrelationId,
    /// Room being booked
    pub room_id: String,
    /// When the booking is for
    pub date: DateTime<Utc>,
    /// Optional price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Card data
    #[serde(flatten)]
    pub payment_details: PaymentDetails,
}

impl StartEvent {
    /// Build the start event for `request`, tagged with `correlation_id`.
    #[must_use]
    pub fn new(correlation_id: CorrelationId, request: BookingRequest) -> Self {
        Self {
            correlation_id,
            room_id: request.room_id,
            date: request.date,
            price: request.price,
            payment_details: request.payment_details,
        }
    }
}

/// Outcome reported by the payment process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    /// `completed`
    Completed,
    /// `failed`
    Failed,
    /// Any other status string, kept verbatim
    Other(String),
}

impl From<String> for PaymentStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Other(status),
        }
    }
}

impl From<PaymentStatus> for String {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Completed => "completed".to_string(),
            PaymentStatus::Failed => "failed".to_string(),
            PaymentStatus::Other(other) => other,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

/// Message received on `paymentCompleted`, returned to the caller unchanged.
///
/// Only `status` and `data` are typed. Every other top-level field, `correlationId`
/// included, is kept verbatim in `extra`, and an absent `data` stays absent, so
/// re-serializing yields the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    /// Payment outcome
    pub status: PaymentStatus,
    /// Opaque payload from the payment process; `Some(Value::Null)` for an explicit `null`
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
    /// Any other top-level fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wrap whatever was sent, so an explicit `null` is told apart from a missing field.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl CompletionEvent {
    /// The payment process payload, `null` when none was sent.
    #[must_use]
    pub fn payload(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.data.as_ref().unwrap_or(&NULL)
    }

    /// Top-level `correlationId`, if present and well-formed.
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.extra
            .get("correlationId")
            .and_then(|raw| CorrelationId::deserialize(raw).ok())
    }

    /// Whether this event answers the request tagged with `id`.
    ///
    /// Looks at the top-level `correlationId` first, then at `data.correlationId`.
    #[must_use]
    pub fn correlates_with(&self, id: &CorrelationId) -> bool {
        let tagged = |raw: &Value| {
            raw.as_str()
                .is_some_and(|own| own.eq_ignore_ascii_case(&id.to_string()))
        };

        match self.extra.get("correlationId") {
            Some(top) => tagged(top),
            None => self.payload().get("correlationId").is_some_and(tagged),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn submission() -> BookingSubmission {
        serde_json::from_value(json!({
            "roomId": "101",
            "date": "2025-12-11T10:00:00Z",
            "price": 100,
            "cardNumber": "4111111111111111",
            "expiry": "12/25",
            "cvv": "123"
        }))
        .unwrap()
    }

    #[test]
    fn validate_accepts_complete_submission() {
        let request = submission().validate().unwrap();

        assert_eq!(request.room_id, "101");
        assert_eq!(request.date.to_rfc3339(), "2025-12-11T10:00:00+00:00");
        assert_eq!(request.price, Some(100.0));
        assert_eq!(
            request.payment_details.card_number.as_deref(),
            Some("4111111111111111")
        );
    }

    #[test]
    fn validate_rejects_missing_room_or_date() {
        let mut no_room = submission();
        no_room.room_id = None;
        assert_eq!(no_room.validate(), Err(InvalidBooking::MissingFields));

        let mut blank_date = submission();
        blank_date.date = Some("  ".to_string());
        assert_eq!(blank_date.validate(), Err(InvalidBooking::MissingFields));
    }

    #[test]
    fn validate_rejects_unparseable_date() {
        let mut bad = submission();
        bad.date = Some("next tuesday".to_string());
        assert_eq!(
            bad.validate(),
            Err(InvalidBooking::InvalidDate("next tuesday".to_string()))
        );
    }

    #[test]
    fn start_event_wire_format() {
        let id = CorrelationId::from_uuid(uuid::Uuid::nil());
        let event = StartEvent::new(id, submission().validate().unwrap());

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "correlationId": "00000000-0000-0000-0000-000000000000",
                "roomId": "101",
                "date": "2025-12-11T10:00:00Z",
                "price": 100.0,
                "cardNumber": "4111111111111111",
                "expiry": "12/25",
                "cvv": "123"
            })
        );
    }

    #[test]
    fn start_event_omits_absent_optionals() {
        let request = BookingRequest {
            room_id: "7".to_string(),
            date: DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            price: None,
            payment_details: PaymentDetails::default(),
        };
        let value = serde_json::to_value(StartEvent::new(CorrelationId::new(), request)).unwrap();
        let object = value.as_object().unwrap();

        assert!(!object.contains_key("price"));
        assert!(!object.contains_key("cardNumber"));
        assert!(!object.contains_key("cvv"));
    }

    #[test]
    fn debug_never_prints_card_data() {
        let details = submission().payment_details;
        let printed = format!("{details:?}");

        assert!(printed.contains("****1111"));
        assert!(!printed.contains("4111111111111111"));
        assert!(!printed.contains("12/25"));
        assert!(!printed.contains("123\""));
    }

    #[test]
    fn completion_event_is_passed_through_unchanged() {
        let raw = json!({
            "status": "completed",
            "data": { "transactionId": "tx-9", "amount": 100 },
            "gateway": "stripe"
        });

        let event: CompletionEvent = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(event.status, PaymentStatus::Completed);
        assert_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn completion_event_correlation_sources() {
        let id = CorrelationId::new();

        let top: CompletionEvent = serde_json::from_value(json!({
            "status": "completed", "data": {}, "correlationId": id.to_string()
        }))
        .unwrap();
        assert!(top.correlates_with(&id));
        assert!(!top.correlates_with(&CorrelationId::new()));

        let nested: CompletionEvent = serde_json::from_value(json!({
            "status": "failed", "data": { "correlationId": id.to_string() }
        }))
        .unwrap();
        assert!(nested.correlates_with(&id));

        let untagged: CompletionEvent =
            serde_json::from_value(json!({ "status": "completed" })).unwrap();
        assert!(!untagged.correlates_with(&id));
        assert_eq!(untagged.correlation_id(), None);
    }

    #[test]
    fn completion_event_keeps_missing_and_null_data_apart() {
        let bare = json!({ "status": "completed" });
        let event: CompletionEvent = serde_json::from_value(bare.clone()).unwrap();
        assert_eq!(event.data, None);
        assert_eq!(event.payload(), &Value::Null);
        assert_eq!(serde_json::to_value(&event).unwrap(), bare);

        let explicit = json!({ "status": "completed", "data": null });
        let event: CompletionEvent = serde_json::from_value(explicit.clone()).unwrap();
        assert_eq!(event.data, Some(Value::Null));
        assert_eq!(serde_json::to_value(&event).unwrap(), explicit);
    }

    #[test]
    fn completion_event_keeps_correlation_id_verbatim() {
        let id = CorrelationId::new();
        let upper = id.to_string().to_uppercase();
        let raw = json!({ "status": "completed", "correlationId": upper, "data": {} });

        let event: CompletionEvent = serde_json::from_value(raw.clone()).unwrap();
        assert!(event.correlates_with(&id));
        assert_eq!(event.correlation_id(), Some(id));
        assert_eq!(serde_json::to_value(&event).unwrap(), raw);

        let malformed = json!({ "status": "completed", "correlationId": 42 });
        let event: CompletionEvent = serde_json::from_value(malformed.clone()).unwrap();
        assert_eq!(event.correlation_id(), None);
        assert!(!event.correlates_with(&id));
        assert_eq!(serde_json::to_value(&event).unwrap(), malformed);
    }

    fn status_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("completed".to_string()),
            Just("failed".to_string()),
            "[a-z_]{1,16}",
        ]
    }

    proptest! {
        #[test]
        fn payment_status_string_is_preserved(status in status_strategy()) {
            let parsed = PaymentStatus::from(status.clone());
            prop_assert_eq!(String::from(parsed.clone()), status.clone());
            prop_assert_eq!(parsed.to_string(), status);
        }

        #[test]
        fn masked_card_keeps_at_most_last_four(number in "[0-9]{0,19}") {
            let details = PaymentDetails {
                card_number: Some(number.clone()),
                ..PaymentDetails::default()
            };
            let masked = details.masked_card_number().unwrap();
            let tail = &number[number.len().saturating_sub(4)..];
            prop_assert_eq!(masked, format!("****{tail}"));
        }

        #[test]
        fn completion_data_survives_decoding(
            status in status_strategy(),
            key in "[a-zA-Z]{1,8}",
            amount in any::<i64>(),
        ) {
            let raw = json!({ "status": status, "data": { key: amount } });
            let event: CompletionEvent = serde_json::from_value(raw.clone()).unwrap();
            prop_assert_eq!(serde_json::to_value(&event).unwrap(), raw);
        }
    }
}
