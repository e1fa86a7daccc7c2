use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod backend;
pub mod config_file;
pub mod credentials;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod ocr;
pub mod pipeline;
pub mod render;
pub mod vision;

// Re-export for convenience
pub use backend::{BackendError, Bitmap, PdfBackend, PdfDocument};
pub use credentials::{
    AmbientCredentials, ConfigError, CredentialInputs, CredentialMode, DEFAULT_CREDENTIALS_FILE,
};
pub use ocr::{OcrClient, OcrError, OcrResponse};
pub use pipeline::extract_with_client;
pub use render::{EncodeError, InvalidDpi, RenderOptions, encode_png};
pub use vision::{VisionAuth, VisionClient};

/// Inserted between the texts of consecutive pages in the joined output.
pub const PAGE_SEPARATOR: &str = "\n\n--- PAGE BREAK ---\n\n";

/// What a single page produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Recognized full text.
    Text(String),
    /// The OCR service reported an error for this page.
    ApiError(String),
    /// The service answered without a text annotation.
    NoText,
}

impl PageOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            PageOutcome::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Result of extracting text from a whole document.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// One outcome per page, in document order.
    pub pages: Vec<PageOutcome>,
    /// Texts of the successful pages joined with [`PAGE_SEPARATOR`].
    pub text: String,
}

impl Extraction {
    pub fn from_pages(pages: Vec<PageOutcome>) -> Self {
        let text = pages
            .iter()
            .filter_map(PageOutcome::text)
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR);
        Self { pages, text }
    }

    /// Number of characters (not bytes) in the joined text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn pages_with_text(&self) -> usize {
        self.pages.iter().filter(|p| p.text().is_some()).count()
    }
}

/// Progress events emitted during extraction.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Credentials were resolved.
    Credentials { mode: &'static str },
    /// The document was opened.
    Processing { total_pages: usize },
    PageText {
        index: usize,
        total: usize,
        chars: usize,
    },
    PageApiError {
        index: usize,
        total: usize,
        message: String,
    },
    PageNoText { index: usize, total: usize },
    Done { total_chars: usize },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("PDF file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Missing dependencies: {0}\nRebuild with: cargo install pdfvision-cli --features pdf")]
    DependencyUnavailable(String),
    #[error("PDF error: {0}")]
    Pdf(BackendError),
    #[error("image encoding error: {0}")]
    Encode(#[from] EncodeError),
    #[error("OCR request failed: {0}")]
    Ocr(#[from] OcrError),
}

impl From<BackendError> for ExtractError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(reason) => ExtractError::DependencyUnavailable(reason),
            other => ExtractError::Pdf(other),
        }
    }
}

/// Options for [`extract_text`].
#[derive(Clone)]
pub struct ExtractOptions {
    /// Explicit Cloud Vision API key; takes priority over every other source.
    pub api_key: Option<String>,
    /// Service-account JSON file, used when no API key is available.
    pub credentials_path: PathBuf,
    pub render: RenderOptions,
    /// Override for the Cloud Vision base URL.
    pub endpoint: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            render: RenderOptions::default(),
            endpoint: None,
        }
    }
}

impl std::fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("credentials_path", &self.credentials_path)
            .field("render", &self.render)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Resolve credentials from `options` and the process environment and
/// build a Cloud Vision client.
///
/// The process environment is only read. Binaries that want the mode 3 key
/// file visible as `GOOGLE_APPLICATION_CREDENTIALS` call
/// [`CredentialMode::export_env`] on the returned mode before starting
/// other threads.
pub fn connect(options: &ExtractOptions) -> Result<(CredentialMode, VisionClient), ConfigError> {
    let inputs =
        CredentialInputs::from_env(options.api_key.clone(), options.credentials_path.clone());
    let mode = credentials::resolve(&inputs)?;
    tracing::info!(mode = %mode, "resolved credentials");

    let auth = mode.clone().prepare();
    let client = match options.endpoint.as_deref() {
        Some(endpoint) => VisionClient::with_endpoint(auth, endpoint)?,
        None => VisionClient::new(auth)?,
    };
    Ok((mode, client))
}

/// Extract the text of the PDF at `path` with Cloud Vision OCR.
///
/// The file must exist; this is checked before credentials are resolved.
/// Pages whose OCR call reports an in-band error or yields no text are left
/// out of [`Extraction::text`]. Any other failure aborts the run.
pub async fn extract_text<F>(
    path: &Path,
    options: &ExtractOptions,
    backend: &dyn PdfBackend,
    progress: F,
) -> Result<Extraction, ExtractError>
where
    F: Fn(ProgressEvent),
{
    if !path.exists() {
        return Err(ExtractError::FileNotFound(path.to_path_buf()));
    }

    let (mode, client) = connect(options)?;
    extract_connected(path, &mode, &client, backend, options.render, progress).await
}

/// Like [`extract_text`], with credentials already resolved by [`connect`].
/// Lets callers process many documents with one client.
pub async fn extract_connected<F>(
    path: &Path,
    mode: &CredentialMode,
    client: &dyn OcrClient,
    backend: &dyn PdfBackend,
    render: RenderOptions,
    progress: F,
) -> Result<Extraction, ExtractError>
where
    F: Fn(ProgressEvent),
{
    if !path.exists() {
        return Err(ExtractError::FileNotFound(path.to_path_buf()));
    }

    progress(ProgressEvent::Credentials { mode: mode.label() });
    extract_with_client(path, client, backend, render, progress).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_only_text_pages_in_order() {
        let extraction = Extraction::from_pages(vec![
            PageOutcome::Text("one".into()),
            PageOutcome::ApiError("boom".into()),
            PageOutcome::NoText,
            PageOutcome::Text("four".into()),
        ]);
        assert_eq!(extraction.text, "one\n\n--- PAGE BREAK ---\n\nfour");
        assert_eq!(extraction.pages_with_text(), 2);
    }

    #[test]
    fn no_pages_yields_empty_text() {
        let extraction = Extraction::from_pages(Vec::new());
        assert_eq!(extraction.text, "");
        assert_eq!(extraction.char_count(), 0);
    }

    #[test]
    fn char_count_counts_characters_not_bytes() {
        let extraction = Extraction::from_pages(vec![PageOutcome::Text("власність".into())]);
        assert_eq!(extraction.char_count(), 9);
    }

    #[test]
    fn unavailable_backend_maps_to_dependency_error() {
        let err: ExtractError = BackendError::Unavailable("mupdf".into()).into();
        assert!(matches!(err, ExtractError::DependencyUnavailable(_)));
        assert!(err.to_string().contains("--features pdf"));

        let err: ExtractError = BackendError::OpenError("bad xref".into()).into();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn default_options_use_default_credentials_file() {
        let options = ExtractOptions::default();
        assert_eq!(
            options.credentials_path,
            PathBuf::from("google-cloud-key.json")
        );
        assert_eq!(options.render, RenderOptions::default());
    }

    #[tokio::test]
    async fn missing_pdf_fails_before_credentials() {
        let backend = mock::MockPdf::new(vec![]);
        let options = ExtractOptions {
            credentials_path: PathBuf::from("/nonexistent/creds.json"),
            ..ExtractOptions::default()
        };
        let err = extract_text(
            Path::new("/nonexistent/input.pdf"),
            &options,
            &backend,
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound(_)));
        assert_eq!(backend.open_count(), 0);
    }

    #[tokio::test]
    async fn connected_extraction_reuses_one_client() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.pdf");
        let second = dir.path().join("b.pdf");
        std::fs::write(&first, b"").unwrap();
        std::fs::write(&second, b"").unwrap();

        let mode = CredentialMode::ExplicitKey("k".into());
        let ocr = mock::MockOcr::with_texts(["one", "two", "three"]);
        let backend = mock::MockPdf::with_pages(1);
        for path in [&first, &second] {
            extract_connected(path, &mode, &ocr, &backend, RenderOptions::default(), |_| {})
                .await
                .unwrap();
        }
        assert_eq!(ocr.call_count(), 2);
        assert_eq!(backend.open_count(), 2);

        let err = extract_connected(
            &dir.path().join("missing.pdf"),
            &mode,
            &ocr,
            &backend,
            RenderOptions::default(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound(_)));
    }
}
