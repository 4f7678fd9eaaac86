use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use std::borrow::Cow;
use std::fmt::Display;

/// Contains bytes of base64 encoded some other bytes.
///
/// The `X-PAYMENT` header carries a base64-encoded JSON payment payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    /// Decode base64 string bytes to raw binary payload.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Encode raw binary input into base64 string bytes
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = b64.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }

    /// Decodes and parses the payload as JSON.
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        let bytes = self.decode().ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl<'a> From<&'a str> for Base64Bytes<'a> {
    fn from(value: &'a str) -> Self {
        Base64Bytes(Cow::Borrowed(value.as_bytes()))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_json_payload() {
        let payload = json!({ "x402Version": 1, "scheme": "exact" });
        let encoded = Base64Bytes::encode(serde_json::to_vec(&payload).unwrap());
        let decoded: serde_json::Value = encoded.decode_json().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_json_rejects_garbage() {
        let garbage = Base64Bytes::from("not base64 at all!");
        assert!(garbage.decode_json::<serde_json::Value>().is_none());
    }
}
