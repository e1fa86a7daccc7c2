use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pdfvision_core::config_file::{self, ConfigFile};
use pdfvision_core::credentials::API_KEY_ENV;
use pdfvision_core::{
    ConfigError, CredentialMode, DEFAULT_CREDENTIALS_FILE, ExtractError, ExtractOptions,
    OcrClient, PdfBackend, ProgressEvent, RenderOptions, VisionClient, connect, extract_connected,
};
use tracing_subscriber::EnvFilter;

mod output;
mod setup;

use output::ColorMode;

const DEFAULT_OUTPUT: &str = "result.txt";
const DEFAULT_PREVIEW_CHARS: usize = 300;

/// PDF OCR - Extract text from PDFs with Google Cloud Vision
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct AuthArgs {
    /// Google Cloud API key (overrides GOOGLE_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Path to a service account JSON key
    #[arg(long)]
    credentials: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract text from a PDF (defaults to the first PDF in the current directory)
    Extract {
        /// Path to the PDF file
        file_path: Option<PathBuf>,

        #[command(flatten)]
        auth: AuthArgs,

        /// Where to write the extracted text
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Render resolution in DPI
        #[arg(long, value_parser = parse_dpi)]
        dpi: Option<f32>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Extract every PDF in a directory to `<name>_extracted.txt`
    Batch {
        /// Directory to scan for PDF files
        #[arg(default_value = ".")]
        dir: PathBuf,

        #[command(flatten)]
        auth: AuthArgs,

        /// Render resolution in DPI
        #[arg(long, value_parser = parse_dpi)]
        dpi: Option<f32>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Verify that credentials and the Cloud Vision API are configured
    CheckSetup {
        #[command(flatten)]
        auth: AuthArgs,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

// Credentials are resolved and exported here, on the main thread, before the
// tokio runtime (and its worker threads) exists. Nothing below `block_on`
// resolves credentials again.
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config_file::load_config();

    match cli.command {
        Command::Extract {
            file_path,
            auth,
            output,
            dpi,
            no_color,
        } => {
            let options = build_options(&config, auth, dpi)?;
            let output = output
                .or_else(|| config.output_path())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
            let preview_chars = config.preview_chars().unwrap_or(DEFAULT_PREVIEW_CHARS);

            let file_path = input_pdf(file_path)?;
            if !file_path.exists() {
                return Err(ExtractError::FileNotFound(file_path).into());
            }
            let (mode, client) = connect_before_runtime(&options)?;

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(extract(
                &file_path,
                &mode,
                &client,
                options.render,
                &output,
                preview_chars,
                ColorMode(!no_color),
            ))
        }
        Command::Batch {
            dir,
            auth,
            dpi,
            no_color,
        } => {
            let options = build_options(&config, auth, dpi)?;
            let pdfs = find_pdfs(&dir)?;
            if pdfs.is_empty() {
                anyhow::bail!("No PDF files found in {}", dir.display());
            }
            let (mode, client) = connect_before_runtime(&options)?;

            let runtime = tokio::runtime::Runtime::new()?;
            let backend = pdf_backend();
            runtime.block_on(batch(
                &pdfs,
                &mode,
                &client,
                backend.as_ref(),
                options.render,
                ColorMode(!no_color),
            ))?;
            Ok(())
        }
        Command::CheckSetup { auth, no_color } => {
            let options = build_options(&config, auth, None)?;
            let connected = connect_before_runtime(&options);

            let runtime = tokio::runtime::Runtime::new()?;
            let mut stdout = std::io::stdout();
            let passed = runtime.block_on(setup::check_setup(
                &mut stdout,
                connected,
                cfg!(feature = "pdf"),
                ColorMode(!no_color),
            ))?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Resolve credentials, build the client and export the key file path for
/// the rest of the process. Must run before any other thread is started.
fn connect_before_runtime(
    options: &ExtractOptions,
) -> Result<(CredentialMode, VisionClient), ConfigError> {
    let (mode, client) = connect(options)?;
    // SAFETY: called from `main` before the tokio runtime is built; the
    // process is still single-threaded.
    unsafe { mode.export_env() };
    Ok((mode, client))
}

/// clap parser for `--dpi`.
fn parse_dpi(s: &str) -> Result<f32, String> {
    let dpi: f32 = s.parse().map_err(|e| format!("{e}"))?;
    RenderOptions::with_dpi(dpi).map_err(|e| e.to_string())?;
    Ok(dpi)
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn build_options(
    config: &ConfigFile,
    auth: AuthArgs,
    dpi: Option<f32>,
) -> anyhow::Result<ExtractOptions> {
    let env_key_set = std::env::var(API_KEY_ENV).is_ok_and(|v| !v.is_empty());
    let api_key = auth
        .api_key
        .or_else(|| (!env_key_set).then(|| config.api_key()).flatten());
    let credentials_path = auth
        .credentials
        .or_else(|| config.credentials_path())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE));
    let render = match dpi {
        Some(dpi) => RenderOptions::with_dpi(dpi)?,
        None => match config.dpi() {
            Some(dpi) => RenderOptions::with_dpi(dpi).context("invalid [render] dpi in config")?,
            None => RenderOptions::default(),
        },
    };

    Ok(ExtractOptions {
        api_key,
        credentials_path,
        render,
        endpoint: config.endpoint(),
    })
}

fn print_event(event: ProgressEvent, color: ColorMode) {
    let mut stdout = std::io::stdout().lock();
    let _ = output::print_progress(&mut stdout, &event, color);
    let _ = stdout.flush();
}

/// The PDF to extract: the given path, else the first PDF in the current
/// directory.
fn input_pdf(file_path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match file_path {
        Some(path) => Ok(path),
        None => match find_pdfs(Path::new("."))?.into_iter().next() {
            Some(path) => Ok(path),
            None => anyhow::bail!(
                "No PDF files found in current directory\n\n\
                 Usage:\n  pdfvision extract <FILE>\n  pdfvision extract --api-key YOUR_KEY <FILE>"
            ),
        },
    }
}

async fn extract(
    file_path: &Path,
    mode: &CredentialMode,
    client: &dyn OcrClient,
    render: RenderOptions,
    output_path: &Path,
    preview_chars: usize,
    color: ColorMode,
) -> anyhow::Result<()> {
    tracing::debug!(path = %file_path.display(), ?render, "starting extraction");
    println!("Processing: {}\n", file_path.display());

    let backend = pdf_backend();
    let extraction = extract_connected(file_path, mode, client, backend.as_ref(), render, |event| {
        print_event(event, color)
    })
    .await?;

    std::fs::write(output_path, &extraction.text)?;

    let mut stdout = std::io::stdout();
    output::print_saved(
        &mut stdout,
        output_path,
        &extraction.text,
        preview_chars,
        color,
    )?;
    Ok(())
}

/// Extract each PDF with the one already-connected client. Returns the
/// written output paths.
async fn batch(
    pdfs: &[PathBuf],
    mode: &CredentialMode,
    client: &dyn OcrClient,
    backend: &dyn PdfBackend,
    render: RenderOptions,
    color: ColorMode,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(pdfs.len());
    for pdf in pdfs {
        println!("Processing: {}", pdf.display());
        let extraction = extract_connected(pdf, mode, client, backend, render, |event| {
            print_event(event, color)
        })
        .await?;

        let output = extracted_path(pdf);
        std::fs::write(&output, &extraction.text)?;
        println!("Saved: {}\n", output.display());
        written.push(output);
    }
    Ok(written)
}

/// PDF files directly inside `dir`, sorted by name.
fn find_pdfs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

/// `report.pdf` -> `report_extracted.txt`, next to the source.
fn extracted_path(pdf: &Path) -> PathBuf {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    pdf.with_file_name(format!("{}_extracted.txt", stem))
}

#[cfg(feature = "pdf")]
fn pdf_backend() -> Box<dyn PdfBackend> {
    Box::new(pdfvision_pdf_mupdf::MupdfBackend::new())
}

#[cfg(not(feature = "pdf"))]
fn pdf_backend() -> Box<dyn PdfBackend> {
    Box::new(NoPdfSupport)
}

/// Stand-in renderer when built without the `pdf` feature; fails on first use.
#[cfg(not(feature = "pdf"))]
struct NoPdfSupport;

#[cfg(not(feature = "pdf"))]
impl PdfBackend for NoPdfSupport {
    fn open(
        &self,
        _path: &Path,
    ) -> Result<Box<dyn pdfvision_core::PdfDocument>, pdfvision_core::BackendError> {
        Err(pdfvision_core::BackendError::Unavailable(
            "PDF support not compiled in (enable the `pdf` feature of pdfvision-cli)".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfvision_core::config_file::{CredentialsConfig, RenderConfig};
    use pdfvision_core::mock::{MockOcr, MockPdf};

    #[test]
    fn finds_pdfs_sorted_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf.bak"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let names: Vec<String> = find_pdfs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn extracted_path_sits_next_to_source() {
        assert_eq!(
            extracted_path(Path::new("/docs/report.pdf")),
            PathBuf::from("/docs/report_extracted.txt")
        );
    }

    fn sample_config() -> ConfigFile {
        ConfigFile {
            credentials: Some(CredentialsConfig {
                api_key: None,
                credentials_path: Some("cfg.json".into()),
            }),
            render: Some(RenderConfig { dpi: Some(150.0) }),
            ..Default::default()
        }
    }

    fn no_auth() -> AuthArgs {
        AuthArgs {
            api_key: None,
            credentials: None,
        }
    }

    #[test]
    fn flags_override_config() {
        let config = sample_config();
        let options = build_options(
            &config,
            AuthArgs {
                api_key: Some("flag-key".into()),
                credentials: Some(PathBuf::from("flag.json")),
            },
            Some(200.0),
        )
        .unwrap();
        assert_eq!(options.api_key.as_deref(), Some("flag-key"));
        assert_eq!(options.credentials_path, PathBuf::from("flag.json"));
        assert_eq!(options.render.dpi(), 200.0);
    }

    #[test]
    fn config_fills_missing_flags() {
        let config = sample_config();
        let options = build_options(&config, no_auth(), None).unwrap();
        assert_eq!(options.credentials_path, PathBuf::from("cfg.json"));
        assert_eq!(options.render.dpi(), 150.0);
    }

    #[test]
    fn defaults_without_config() {
        let options = build_options(&ConfigFile::default(), no_auth(), None).unwrap();
        assert_eq!(
            options.credentials_path,
            PathBuf::from("google-cloud-key.json")
        );
        assert_eq!(options.render, RenderOptions::default());
        assert!(options.endpoint.is_none());
    }

    #[test]
    fn unusable_config_dpi_is_rejected() {
        for dpi in [0.0, -300.0, f32::NAN] {
            let config = ConfigFile {
                render: Some(RenderConfig { dpi: Some(dpi) }),
                ..Default::default()
            };
            let err = build_options(&config, no_auth(), None).unwrap_err();
            assert!(err.to_string().contains("[render] dpi"), "{err:#}");
        }
    }

    #[test]
    fn valid_flag_dpi_wins_over_bad_config_dpi() {
        let config = ConfigFile {
            render: Some(RenderConfig { dpi: Some(0.0) }),
            ..Default::default()
        };
        let options = build_options(&config, no_auth(), Some(144.0)).unwrap();
        assert_eq!(options.render.dpi(), 144.0);
    }

    #[test]
    fn dpi_flag_rejects_unusable_values() {
        for value in ["0", "-300", "NaN", "inf", "abc"] {
            let result = Cli::try_parse_from(["pdfvision", "extract", "doc.pdf", "--dpi", value]);
            assert!(result.is_err(), "accepted --dpi {value}");
        }
        assert_eq!(parse_dpi("150"), Ok(150.0));
    }

    #[tokio::test]
    async fn batch_runs_every_pdf_through_one_client() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.pdf", "b.pdf"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let pdfs = find_pdfs(dir.path()).unwrap();

        let mode = CredentialMode::ExplicitKey("k".into());
        let ocr = MockOcr::with_texts(["first", "second"]);
        let backend = MockPdf::with_pages(1);
        let written = batch(
            &pdfs,
            &mode,
            &ocr,
            &backend,
            RenderOptions::default(),
            ColorMode(false),
        )
        .await
        .unwrap();

        assert_eq!(
            written,
            vec![
                dir.path().join("a_extracted.txt"),
                dir.path().join("b_extracted.txt")
            ]
        );
        assert_eq!(std::fs::read_to_string(&written[0]).unwrap(), "first");
        assert_eq!(std::fs::read_to_string(&written[1]).unwrap(), "second");
        assert_eq!(ocr.call_count(), 2);
        assert_eq!(backend.open_count(), 2);
    }

    #[test]
    fn cli_parses_extract_flags() {
        let cli = Cli::try_parse_from([
            "pdfvision",
            "extract",
            "doc.pdf",
            "--api-key",
            "k",
            "-o",
            "out.txt",
            "--dpi",
            "150",
        ])
        .unwrap();
        match cli.command {
            Command::Extract {
                file_path,
                auth,
                output,
                dpi,
                ..
            } => {
                assert_eq!(file_path, Some(PathBuf::from("doc.pdf")));
                assert_eq!(auth.api_key.as_deref(), Some("k"));
                assert_eq!(output, Some(PathBuf::from("out.txt")));
                assert_eq!(dpi, Some(150.0));
            }
            other => panic!("expected extract, got {other:?}"),
        }
    }
}
