use std::io::Write;
use std::path::Path;

use owo_colors::OwoColorize;
use pdfvision_core::ProgressEvent;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Credentials { mode } => {
            if color.enabled() {
                writeln!(w, "{}", format!("Using credentials: {}", mode).dimmed())?;
            } else {
                writeln!(w, "Using credentials: {}", mode)?;
            }
        }
        ProgressEvent::Processing { total_pages } => {
            writeln!(w, "Processing {} pages...", total_pages)?;
        }
        ProgressEvent::PageText {
            index,
            total,
            chars,
        } => {
            writeln!(w, "Page {}/{}: {} chars", index + 1, total, chars)?;
        }
        ProgressEvent::PageApiError { index, message, .. } => {
            if color.enabled() {
                writeln!(
                    w,
                    "Page {}: {} - {}",
                    index + 1,
                    "API error".red(),
                    message
                )?;
            } else {
                writeln!(w, "Page {}: API error - {}", index + 1, message)?;
            }
        }
        ProgressEvent::PageNoText { index, total } => {
            if color.enabled() {
                writeln!(w, "Page {}/{}: {}", index + 1, total, "No text found".yellow())?;
            } else {
                writeln!(w, "Page {}/{}: No text found", index + 1, total)?;
            }
        }
        ProgressEvent::Done { total_chars } => {
            writeln!(w)?;
            writeln!(w, "Done. Total: {} characters", total_chars)?;
        }
    }
    Ok(())
}

/// First `max_chars` characters of `text`, followed by an ellipsis.
pub fn preview(text: &str, max_chars: usize) -> String {
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}

/// Print where the result went and a short preview of it.
pub fn print_saved(
    w: &mut dyn Write,
    output_path: &Path,
    text: &str,
    preview_chars: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "Saved to: {}", output_path.display().bold())?;
    } else {
        writeln!(w, "Saved to: {}", output_path.display())?;
    }
    writeln!(w)?;
    writeln!(w, "Preview (first {} chars):", preview_chars)?;
    writeln!(w, "{}", "-".repeat(60))?;
    writeln!(w, "{}", preview(text, preview_chars))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(event: ProgressEvent) -> String {
        let mut buf = Vec::new();
        print_progress(&mut buf, &event, ColorMode(false)).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn page_lines_are_one_based() {
        assert_eq!(
            render(ProgressEvent::PageText {
                index: 0,
                total: 3,
                chars: 42
            }),
            "Page 1/3: 42 chars\n"
        );
        assert_eq!(
            render(ProgressEvent::PageApiError {
                index: 1,
                total: 3,
                message: "Bad image data.".into()
            }),
            "Page 2: API error - Bad image data.\n"
        );
        assert_eq!(
            render(ProgressEvent::PageNoText { index: 2, total: 3 }),
            "Page 3/3: No text found\n"
        );
    }

    #[test]
    fn done_prints_total() {
        assert_eq!(
            render(ProgressEvent::Done { total_chars: 1234 }),
            "\nDone. Total: 1234 characters\n"
        );
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("структури власності", 4), "стру...");
        assert_eq!(preview("ab", 300), "ab...");
    }

    #[test]
    fn saved_block_contains_path_and_preview() {
        let mut buf = Vec::new();
        print_saved(
            &mut buf,
            Path::new("result.txt"),
            "hello world",
            5,
            ColorMode(false),
        )
        .unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("Saved to: result.txt"));
        assert!(out.contains("Preview (first 5 chars):"));
        assert!(out.contains("hello..."));
    }
}
