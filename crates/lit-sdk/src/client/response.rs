//! Response decoding for the bundled server's JSON replies.
//!
//! Every reply is first parsed into an [`RpcResponse`], a loose mapping of
//! field names to JSON values. Calls with a known contract then decode it
//! into an [`Outcome`], which separates the typed success payload from the
//! runtime's `{success: false, error, message, stack}` failure shape.

use std::fmt;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ClientError;

/// Raw reply from the bundled server.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    endpoint: String,
    status: u16,
    fields: Map<String, Value>,
}

impl RpcResponse {
    /// Parses a response body received from `endpoint`.
    ///
    /// A `null` body decodes to an empty mapping; any other non-object JSON
    /// is rejected as `UnexpectedShape`.
    pub fn from_body(endpoint: &str, status: u16, body: &str) -> Result<Self, ClientError> {
        let value: Value =
            serde_json::from_str(body).map_err(|source| ClientError::Decode {
                endpoint: endpoint.to_owned(),
                source,
            })?;
        let fields = match value {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                return Err(ClientError::UnexpectedShape {
                    endpoint: endpoint.to_owned(),
                    source: serde_json::Error::custom(format!(
                        "expected a JSON object, found {other}"
                    )),
                });
            }
        };
        Ok(Self {
            endpoint: endpoint.to_owned(),
            status,
            fields,
        })
    }

    /// Endpoint the response was received from.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// HTTP status code of the response.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// All top-level fields of the response.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    #[must_use]
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Whether the server reported a failure, either through the status code
    /// or through an explicit `success: false`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status >= 400 || self.bool_field("success") == Some(false)
    }

    /// Decodes the response into a typed [`Outcome`].
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedShape` when the fields do not match `T` (or the
    /// failure shape, for failed responses).
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Outcome<T>, ClientError> {
        let value = Value::Object(self.fields.clone());
        if self.is_failure() {
            let mut failure: ServerFailure =
                serde_json::from_value(value).map_err(|source| self.shape_error(source))?;
            failure.status = self.status;
            return Ok(Outcome::Failure(failure));
        }
        serde_json::from_value(value)
            .map(Outcome::Success)
            .map_err(|source| self.shape_error(source))
    }

    fn shape_error(&self, source: serde_json::Error) -> ClientError {
        ClientError::UnexpectedShape {
            endpoint: self.endpoint.clone(),
            source,
        }
    }
}

/// Result of a call whose response was well formed.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(ServerFailure),
}

impl<T> Outcome<T> {
    /// Whether the server reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the payload, discarding any failure.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Converts the outcome into a standard `Result`.
    ///
    /// # Errors
    ///
    /// Returns the [`ServerFailure`] reported by the server.
    pub fn into_result(self) -> Result<T, ServerFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }

    /// Transforms the success payload, passing a failure through unchanged.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(failure) => Outcome::Failure(failure),
        }
    }
}

/// Error body reported by the bundled server.
///
/// `error` is whatever the runtime put there: usually a string, but a thrown
/// script error arrives as a structured object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerFailure {
    #[serde(default)]
    pub error: Value,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
    /// HTTP status the failure arrived with.
    #[serde(skip)]
    pub status: u16,
}

impl ServerFailure {
    /// Short description of the error: the `error` string when there is one,
    /// otherwise `message`, otherwise the compact JSON of `error`.
    #[must_use]
    pub fn summary(&self) -> String {
        match (&self.error, self.message.as_deref()) {
            (Value::String(error), _) if !error.is_empty() => error.clone(),
            (_, Some(message)) if !message.is_empty() => message.to_owned(),
            (Value::Null, _) | (Value::String(_), _) => String::from("unknown error"),
            (other, _) => other.to_string(),
        }
    }
}

impl fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.summary();
        write!(f, "server reported failure (status {}): {summary}", self.status)?;
        if let Some(message) = self.message.as_deref()
            && !message.is_empty()
            && message != summary
        {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerFailure {}

/// Reply to `/executeJs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub success: bool,
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub signed_data: Value,
    #[serde(default)]
    pub decrypted_data: Value,
    #[serde(default)]
    pub claim_data: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Key pair owned by the runtime's signing network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub eth_address: String,
    pub public_key: String,
    pub token_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reply to `/createWallet`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MintedWallet {
    pub pkp: KeyPair,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reply to `/sign`. The signature may be a string or a structured object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Signature {
    pub signature: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reply to calls that only acknowledge receipt, such as `/setAuthToken`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Acknowledgement {
    pub success: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reply to `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerStatus {
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn response(status: u16, body: &str) -> RpcResponse {
        RpcResponse::from_body("/test", status, body).expect("parse body")
    }

    #[rstest]
    #[case::ready(r#"{"ready":true}"#, Some(true))]
    #[case::not_ready(r#"{"ready":false}"#, Some(false))]
    #[case::wrong_type(r#"{"ready":"yes"}"#, None)]
    #[case::missing("{}", None)]
    fn bool_field_only_accepts_booleans(#[case] body: &str, #[case] expected: Option<bool>) {
        assert_eq!(response(200, body).bool_field("ready"), expected);
    }

    #[test]
    fn null_body_is_an_empty_mapping() {
        let response = response(200, "null");
        assert!(response.fields().is_empty());
    }

    #[test]
    fn scalar_body_is_rejected() {
        let error = RpcResponse::from_body("/test", 200, "42").expect_err("scalar body");
        assert!(matches!(error, ClientError::UnexpectedShape { .. }));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let error = RpcResponse::from_body("/test", 200, "{not json").expect_err("bad body");
        let ClientError::Decode { endpoint, .. } = error else {
            panic!("expected Decode, got {error:?}");
        };
        assert_eq!(endpoint, "/test");
    }

    #[test]
    fn execution_decodes_with_extra_fields() {
        let body = json!({
            "success": true,
            "response": "Hello, World!",
            "logs": "This is a log\n",
            "signedData": {},
            "claimData": {},
            "elapsedMs": 12
        });
        let outcome = response(200, &body.to_string())
            .decode::<Execution>()
            .expect("decode execution");
        let execution = outcome.success().expect("successful execution");
        assert_eq!(execution.response, json!("Hello, World!"));
        assert_eq!(execution.logs, "This is a log\n");
        assert_eq!(execution.decrypted_data, Value::Null);
        assert_eq!(execution.extra.get("elapsedMs"), Some(&json!(12)));
    }

    #[rstest]
    #[case::error_status(500, r#"{"success":false,"error":"boom","message":"kaput"}"#)]
    #[case::explicit_flag(200, r#"{"success":false,"error":"boom","message":"kaput"}"#)]
    fn failures_decode_into_server_failure(#[case] status: u16, #[case] body: &str) {
        let outcome = response(status, body)
            .decode::<Execution>()
            .expect("decode failure");
        let failure = outcome.into_result().expect_err("failure outcome");
        assert_eq!(failure.error, json!("boom"));
        assert_eq!(failure.message.as_deref(), Some("kaput"));
        assert_eq!(failure.status, status);
        assert!(failure.to_string().contains("boom: kaput"));
    }

    #[test]
    fn thrown_error_objects_decode_into_server_failure() {
        let body = json!({
            "success": false,
            "error": {"errorKind": "Validation", "errorCode": "NodeInvalidJs"},
            "stack": "Error: bad js\n    at eval",
            "message": "bad js"
        });
        let failure = response(500, &body.to_string())
            .decode::<Execution>()
            .expect("decode failure")
            .into_result()
            .expect_err("failure outcome");
        assert_eq!(failure.error["errorCode"], json!("NodeInvalidJs"));
        assert_eq!(failure.stack.as_deref(), Some("Error: bad js\n    at eval"));
        assert_eq!(failure.summary(), "bad js");
        assert_eq!(
            failure.to_string(),
            "server reported failure (status 500): bad js"
        );
    }

    #[test]
    fn error_object_without_message_renders_as_json() {
        let failure = response(500, r#"{"success":false,"error":{"code":7}}"#)
            .decode::<Execution>()
            .expect("decode failure")
            .into_result()
            .expect_err("failure outcome");
        assert_eq!(failure.summary(), r#"{"code":7}"#);
    }

    #[test]
    fn missing_required_field_is_unexpected_shape() {
        let error = response(200, r#"{"pkp":{"ethAddress":"0xabc"}}"#)
            .decode::<MintedWallet>()
            .expect_err("incomplete key pair");
        assert!(matches!(error, ClientError::UnexpectedShape { .. }));
    }

    #[test]
    fn signature_accepts_structured_values() {
        let body = json!({"signature": {"r": "0x1", "s": "0x2", "recid": 0}});
        let signature = response(200, &body.to_string())
            .decode::<Signature>()
            .expect("decode signature")
            .success()
            .expect("successful signature");
        assert_eq!(signature.signature["recid"], json!(0));
    }
}
