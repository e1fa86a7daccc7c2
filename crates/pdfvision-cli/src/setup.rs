//! `check-setup`: verify credentials and a live OCR round trip.

use std::io::Write;

use owo_colors::OwoColorize;
use pdfvision_core::{Bitmap, ConfigError, CredentialMode, OcrClient, encode_png};

use crate::output::ColorMode;

fn ok(w: &mut dyn Write, msg: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "   {} {}", "OK:".green(), msg)
    } else {
        writeln!(w, "   OK: {}", msg)
    }
}

fn fail(w: &mut dyn Write, msg: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "   {} {}", "ERROR:".red(), msg)
    } else {
        writeln!(w, "   ERROR: {}", msg)
    }
}

/// Run every check, printing as it goes. Returns whether all passed.
///
/// `connected` is the outcome of credential resolution, done by the caller
/// before the runtime started.
pub async fn check_setup<C: OcrClient>(
    w: &mut dyn Write,
    connected: Result<(CredentialMode, C), ConfigError>,
    pdf_support: bool,
    color: ColorMode,
) -> anyhow::Result<bool> {
    let sep = "=".repeat(60);
    writeln!(w, "{}", sep)?;
    writeln!(w, "Google Cloud Vision API - Setup Test")?;
    writeln!(w, "{}", sep)?;

    writeln!(w)?;
    writeln!(w, "1. Checking credentials...")?;
    let (mode, client) = match connected {
        Ok(connected) => connected,
        Err(e) => {
            fail(w, &e.to_string(), color)?;
            return Ok(false);
        }
    };
    ok(w, &format!("Using {}", mode), color)?;

    writeln!(w)?;
    writeln!(w, "2. Testing OCR...")?;
    let png = encode_png(&Bitmap::filled(400, 100, [255, 255, 255]))?;
    match client.detect_document_text(&png).await {
        Ok(response) => match response.error_message {
            Some(message) => {
                fail(w, &message, color)?;
                return Ok(false);
            }
            None => ok(w, "OCR works", color)?,
        },
        Err(e) => {
            fail(w, &e.to_string(), color)?;
            return Ok(false);
        }
    }

    writeln!(w)?;
    writeln!(w, "3. Checking PDF renderer...")?;
    if pdf_support {
        ok(w, "MuPDF renderer compiled in", color)?;
    } else {
        fail(w, "PDF support not compiled in", color)?;
        writeln!(w, "   Rebuild with: cargo install pdfvision-cli --features pdf")?;
    }

    writeln!(w)?;
    writeln!(w, "{}", sep)?;
    if pdf_support {
        writeln!(w, "SUCCESS: All checks passed")?;
        writeln!(w, "{}", sep)?;
        writeln!(w)?;
        writeln!(w, "Ready to use:")?;
        writeln!(w, "  pdfvision extract")?;
    } else {
        writeln!(w, "FAILED: See errors above")?;
        writeln!(w, "{}", sep)?;
    }

    Ok(pdf_support)
}
