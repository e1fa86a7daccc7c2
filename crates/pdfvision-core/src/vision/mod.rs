//! Google Cloud Vision `images:annotate` client.

pub mod auth;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use base64::Engine as _;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};

use crate::credentials::ConfigError;
use crate::ocr::{OcrClient, OcrError, OcrResponse};

pub use auth::{CredentialsFile, TokenSource};

pub const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com";

/// Dense-text OCR mode, as opposed to sparse `TEXT_DETECTION`.
pub const DOCUMENT_TEXT_DETECTION: &str = "DOCUMENT_TEXT_DETECTION";

/// How requests to Cloud Vision are authorized.
#[derive(Clone)]
pub enum VisionAuth {
    /// API key sent as the `key` query parameter.
    ApiKey(String),
    /// OAuth2 bearer token from a credentials file at a known path.
    CredentialsFile(PathBuf),
    /// OAuth2 bearer token from application default credentials.
    ApplicationDefault,
}

impl fmt::Debug for VisionAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisionAuth::ApiKey(_) => f.write_str("ApiKey(***)"),
            VisionAuth::CredentialsFile(path) => {
                f.debug_tuple("CredentialsFile").field(path).finish()
            }
            VisionAuth::ApplicationDefault => f.write_str("ApplicationDefault"),
        }
    }
}

enum Authorizer {
    ApiKey(String),
    Bearer(TokenSource),
}

/// Cloud Vision client. No request timeout is configured.
pub struct VisionClient {
    client: reqwest::Client,
    endpoint: String,
    auth: Authorizer,
}

impl fmt::Debug for VisionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = match self.auth {
            Authorizer::ApiKey(_) => "api key",
            Authorizer::Bearer(_) => "oauth2",
        };
        f.debug_struct("VisionClient")
            .field("endpoint", &self.endpoint)
            .field("auth", &auth)
            .finish()
    }
}

impl VisionClient {
    /// Build a client for `auth`. Credentials files are loaded here, so a
    /// missing or malformed file fails before any page is rendered.
    pub fn new(auth: VisionAuth) -> Result<Self, ConfigError> {
        Self::with_endpoint(auth, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(auth: VisionAuth, endpoint: &str) -> Result<Self, ConfigError> {
        let auth = match auth {
            VisionAuth::ApiKey(key) => Authorizer::ApiKey(key),
            VisionAuth::CredentialsFile(path) => {
                Authorizer::Bearer(TokenSource::new(CredentialsFile::load(&path)?))
            }
            VisionAuth::ApplicationDefault => {
                Authorizer::Bearer(TokenSource::new(CredentialsFile::application_default()?))
            }
        };
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn annotate_url(&self) -> String {
        format!("{}/v1/images:annotate", self.endpoint)
    }

    async fn annotate(&self, png: &[u8]) -> Result<OcrResponse, OcrError> {
        let body = AnnotateRequest::document_text(png);

        let mut req = self.client.post(self.annotate_url()).json(&body);
        req = match &self.auth {
            Authorizer::ApiKey(key) => req.query(&[("key", key.as_str())]),
            Authorizer::Bearer(tokens) => {
                req.bearer_auth(tokens.access_token(&self.client).await?)
            }
        };

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(OcrError::Http {
                status: status.as_u16(),
                message: error_message_from_body(&text),
            });
        }

        let data: AnnotateResponse = resp
            .json()
            .await
            .map_err(|e| OcrError::Decode(e.to_string()))?;
        data.into_first()
    }
}

impl OcrClient for VisionClient {
    fn name(&self) -> &str {
        "Cloud Vision"
    }

    fn detect_document_text<'a>(
        &'a self,
        png: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<OcrResponse, OcrError>> + Send + 'a>> {
        Box::pin(self.annotate(png))
    }
}

#[derive(Debug, Serialize)]
pub struct AnnotateRequest {
    pub requests: Vec<ImageRequest>,
}

#[derive(Debug, Serialize)]
pub struct ImageRequest {
    pub image: ImageContent,
    pub features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
pub struct ImageContent {
    /// Base64-encoded image bytes.
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl AnnotateRequest {
    /// A single-image request for full-document text detection.
    pub fn document_text(png: &[u8]) -> Self {
        Self {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: general_purpose::STANDARD.encode(png),
                },
                features: vec![Feature {
                    kind: DOCUMENT_TEXT_DETECTION,
                }],
            }],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AnnotateResponse {
    #[serde(default)]
    pub responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    #[serde(default)]
    pub full_text_annotation: Option<TextAnnotation>,
    #[serde(default)]
    pub error: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextAnnotation {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl AnnotateResponse {
    /// Convert the response for the single submitted image.
    pub fn into_first(self) -> Result<OcrResponse, OcrError> {
        let image = self
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| OcrError::Decode("response contained no image results".into()))?;
        Ok(image.into())
    }
}

impl From<ImageResponse> for OcrResponse {
    fn from(image: ImageResponse) -> Self {
        OcrResponse {
            error_message: image
                .error
                .map(|status| status.message)
                .filter(|message| !message.is_empty()),
            full_text: image.full_text_annotation.map(|annotation| annotation.text),
        }
    }
}

/// Pull `error.message` out of a Google API error body, falling back to the
/// raw body.
fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_asks_for_document_text_detection() {
        let request = AnnotateRequest::document_text(b"png-bytes");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["requests"][0]["features"][0]["type"],
            "DOCUMENT_TEXT_DETECTION"
        );
        assert_eq!(json["requests"][0]["image"]["content"], "cG5nLWJ5dGVz");
    }

    #[test]
    fn full_text_response_maps_to_text() {
        let body = r#"{"responses":[{"fullTextAnnotation":{"text":"Hello\nWorld\n","pages":[]}}]}"#;
        let response: AnnotateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            response.into_first().unwrap(),
            OcrResponse::text("Hello\nWorld\n")
        );
    }

    #[test]
    fn in_band_error_maps_to_error_message() {
        let body = r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#;
        let response: AnnotateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            response.into_first().unwrap(),
            OcrResponse::error("Bad image data.")
        );
    }

    #[test]
    fn empty_image_response_has_no_text() {
        let response: AnnotateResponse = serde_json::from_str(r#"{"responses":[{}]}"#).unwrap();
        assert_eq!(response.into_first().unwrap(), OcrResponse::empty());
    }

    #[test]
    fn missing_responses_is_a_decode_error() {
        let response: AnnotateResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(response.into_first(), Err(OcrError::Decode(_))));
    }

    #[test]
    fn extracts_google_error_message() {
        let body = r#"{"error":{"code":403,"message":"API key not valid.","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(error_message_from_body(body), "API key not valid.");
        assert_eq!(error_message_from_body("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn api_key_client_needs_no_credentials_file() {
        let client =
            VisionClient::with_endpoint(VisionAuth::ApiKey("k".into()), "http://localhost:1/")
                .unwrap();
        assert_eq!(client.annotate_url(), "http://localhost:1/v1/images:annotate");
        assert_eq!(client.name(), "Cloud Vision");
    }

    #[test]
    fn credentials_file_is_loaded_from_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, "{}").unwrap();
        let err = VisionClient::new(VisionAuth::CredentialsFile(path.clone())).unwrap_err();
        assert!(matches!(err, ConfigError::CredentialsFile { path: ref p, .. } if *p == path));
    }
}
