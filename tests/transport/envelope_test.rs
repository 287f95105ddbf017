// Envelope Tests
// Tests for the two-level success model on replies

use cluster_link::transport::{parse_reply, ProtocolError, StatusEnvelope};
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Details {
    client_name: String,
}

// ============================================================================
// SUCCESS
// ============================================================================

#[test]
fn test_successful_envelope_yields_payload() {
    let details: Details =
        parse_reply(r#"{"successful":true,"message":"","clientName":"lobby"}"#).unwrap();

    assert_eq!(details.client_name, "lobby");
}

#[test]
fn test_successful_envelope_as_plain_status() {
    let status: StatusEnvelope = parse_reply(r#"{"successful":true}"#).unwrap();

    assert!(status.successful);
    assert_eq!(status.message, None);
}

// ============================================================================
// FAILURE LEVELS
// ============================================================================

#[test]
fn test_unsuccessful_envelope_is_rejection() {
    let result: Result<Details, _> =
        parse_reply(r#"{"successful":false,"message":"invalid secret"}"#);

    match result {
        Err(ProtocolError::Rejected(message)) => assert_eq!(message, "invalid secret"),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_rejection_without_message() {
    let result: Result<StatusEnvelope, _> = parse_reply(r#"{"successful":false}"#);

    assert!(matches!(result, Err(ProtocolError::Rejected(_))));
}

#[test]
fn test_missing_successful_is_malformed() {
    let result: Result<Details, _> = parse_reply(r#"{"clientName":"lobby"}"#);

    assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));
}

#[test]
fn test_non_json_is_malformed() {
    let result: Result<Details, _> = parse_reply("<html>502</html>");

    assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));
}

#[test]
fn test_successful_but_wrong_shape_is_unexpected_payload() {
    let result: Result<Details, _> = parse_reply(r#"{"successful":true,"other":1}"#);

    assert!(matches!(result, Err(ProtocolError::UnexpectedPayload(_))));
}

#[test]
fn test_failed_envelope_serialization() {
    let json = serde_json::to_value(StatusEnvelope::failed("nope")).unwrap();

    assert_eq!(json["successful"], false);
    assert_eq!(json["message"], "nope");
    assert!(serde_json::to_value(StatusEnvelope::ok()).unwrap().get("message").is_none());
}
