//! Identity-token decoding.
//!
//! The token endpoint returns `id_token` as base64 of a header JSON object, a
//! payload JSON object and the raw signature bytes, concatenated with no
//! separators. The two objects are recovered by brace matching; the signature
//! is kept as opaque bytes and never verified.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::error::AuthError;

const LENIENT_CONFIG: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_CONFIG);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_CONFIG);

/// Normalized identity-token header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityHeader {
    /// `typ`, usually `"JWT"`.
    pub token_type: String,
    /// `alg`, e.g. `"HS256"`.
    pub algorithm: String,
}

/// Identity claims with `exp`/`iat` converted to timestamps.
///
/// Every claim of the payload is kept verbatim in `claims`, whatever its JSON
/// type. The registered-claim accessors only read string values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityClaims {
    pub expires_at: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub claims: Map<String, Value>,
}

impl IdentityClaims {
    fn from_map(claims: Map<String, Value>) -> Result<Self, AuthError> {
        Ok(Self {
            expires_at: numeric_date(&claims, "exp")?,
            issued_at: numeric_date(&claims, "iat")?,
            claims,
        })
    }

    /// `iss`, when it is a string.
    pub fn issuer(&self) -> Option<&str> {
        self.string_claim("iss")
    }

    /// `sub`, when it is a string.
    pub fn subject(&self) -> Option<&str> {
        self.string_claim("sub")
    }

    /// `aud` as a list; a single string audience yields one entry.
    pub fn audience(&self) -> Vec<&str> {
        match self.claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// `jti`, when it is a string.
    pub fn jwt_id(&self) -> Option<&str> {
        self.string_claim("jti")
    }

    fn string_claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}

/// A decoded, unverified identity token.
///
/// # Example
/// ```
/// use schwab_auth::auth::IdentityToken;
///
/// let raw = br#"{"typ":"JWT","alg":"HS256"}{"sub":"abcd","exp":1744668728}sig"#;
/// let token = IdentityToken::decode(raw)?;
/// assert_eq!(token.payload.subject(), Some("abcd"));
/// assert_eq!(token.signature, b"sig");
/// # Ok::<(), schwab_auth::auth::AuthError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityToken {
    pub header: IdentityHeader,
    pub payload: IdentityClaims,
    #[serde(serialize_with = "serialize_signature")]
    pub signature: Vec<u8>,
}

impl IdentityToken {
    /// Decode the raw concatenated buffer.
    pub fn decode(buf: &[u8]) -> Result<Self, AuthError> {
        let header_span = find_object(buf, 0)
            .ok_or_else(|| AuthError::MalformedToken("no header object found".to_string()))?;
        let payload_span = find_object(buf, header_span.end)
            .ok_or_else(|| AuthError::MalformedToken("no payload object found".to_string()))?;

        let header: RawHeader = serde_json::from_slice(&buf[header_span.clone()])
            .map_err(|e| AuthError::MalformedToken(format!("failed to parse header JSON: {e}")))?;
        let payload: Map<String, Value> = serde_json::from_slice(&buf[payload_span.clone()])
            .map_err(|e| AuthError::MalformedToken(format!("failed to parse payload JSON: {e}")))?;

        Ok(Self {
            header: IdentityHeader {
                token_type: header.typ.unwrap_or_default(),
                algorithm: header.alg.unwrap_or_default(),
            },
            payload: IdentityClaims::from_map(payload)?,
            signature: buf[payload_span.end..].to_vec(),
        })
    }

    /// Decode the base64 transport form found in a token response.
    ///
    /// Accepts the standard and URL-safe alphabets, padded or not.
    pub fn decode_base64(encoded: &str) -> Result<Self, AuthError> {
        let trimmed = encoded.trim();
        let engine = if trimmed.contains(['-', '_']) {
            &URL_SAFE_LENIENT
        } else {
            &STANDARD_LENIENT
        };
        let raw = engine
            .decode(trimmed)
            .map_err(|e| AuthError::MalformedToken(format!("invalid base64: {e}")))?;
        Self::decode(&raw)
    }

    /// Look up any payload claim by name, as it appeared in the token.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.payload.claims.get(name)
    }

    /// Whether the token's own `exp` claim has passed.
    pub fn is_expired(&self) -> bool {
        self.payload
            .expires_at
            .map(|exp| exp <= Utc::now())
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    typ: Option<String>,
    alg: Option<String>,
}

/// Seconds since the epoch to a timestamp. Absent or `null` gives `None`.
fn numeric_date(
    claims: &Map<String, Value>,
    claim: &str,
) -> Result<Option<DateTime<Utc>>, AuthError> {
    let secs = match claims.get(claim) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| AuthError::MalformedToken(format!("{claim} is not a number")))?,
    };
    let millis = (secs * 1000.0).round();
    if !millis.is_finite() {
        return Err(AuthError::MalformedToken(format!("{claim} is not a valid timestamp")));
    }
    DateTime::from_timestamp_millis(millis as i64)
        .map(Some)
        .ok_or_else(|| AuthError::MalformedToken(format!("{claim} is out of range")))
}

/// Find the first balanced `{...}` span at or after `offset`.
///
/// Bytes before the opening brace are skipped. Braces inside JSON string
/// literals do not count toward nesting.
fn find_object(buf: &[u8], offset: usize) -> Option<std::ops::Range<usize>> {
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &byte) in buf.iter().enumerate().skip(offset) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some(start..i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn serialize_signature<S: Serializer>(signature: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(signature))
}
