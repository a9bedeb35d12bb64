use haven_core::config::IngestConfig;
use haven_core::model::ExtractStrategy;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("audio transcription exceeded the configured duration cap")]
    AudioDurationExceeded,
    #[error("extraction failed: {0}")]
    Failed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const MIME_TO_SUFFIX: &[(&str, &str)] = &[
    ("text/plain", ".txt"),
    ("text/markdown", ".md"),
    ("text/x-markdown", ".md"),
    ("application/pdf", ".pdf"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    ("audio/mpeg", ".mp3"),
];

/// Resolves a supported suffix via filename extension, then a provided MIME
/// type, then magic-byte sniffing.
pub fn detect_suffix(
    filename: &str,
    content: &[u8],
    content_type: Option<&str>,
    config: &IngestConfig,
) -> Option<String> {
    let from_name = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()));
    if let Some(suffix) = &from_name {
        if config.supports_extension(suffix) {
            return Some(suffix.clone());
        }
    }

    if let Some(ct) = content_type {
        if let Some(&(_, mapped)) = MIME_TO_SUFFIX.iter().find(|(mime, _)| *mime == ct) {
            if config.supports_extension(mapped) {
                return Some(mapped.to_string());
            }
        }
    }

    if let Some(kind) = infer::get(content) {
        let mapped = match kind.mime_type() {
            "application/pdf" => Some(".pdf"),
            "text/plain" => Some(".txt"),
            "audio/mpeg" => Some(".mp3"),
            _ => None,
        };
        if let Some(mapped) = mapped {
            if config.supports_extension(mapped) {
                return Some(mapped.to_string());
            }
        }
    }

    None
}

/// Transcribes audio bytes to text. Actual speech-to-text is an external
/// collaborator; this trait only defines the boundary the orchestrator
/// calls through.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &[u8], max_duration_minutes: u64) -> Result<String, ExtractError>;
}

/// Stand-in transcriber for corpora with no audio support wired up.
pub struct NullTranscriber;

impl Transcriber for NullTranscriber {
    fn transcribe(&self, _audio: &[u8], _max_duration_minutes: u64) -> Result<String, ExtractError> {
        Err(ExtractError::Failed(
            "no transcriber configured for audio ingestion".to_string(),
        ))
    }
}

/// Extracts plain text and the strategy tag used to produce it, from file
/// bytes already resolved to a supported suffix.
pub fn extract(
    suffix: &str,
    bytes: &[u8],
    transcriber: &dyn Transcriber,
    max_audio_duration_minutes: u64,
) -> Result<(String, ExtractStrategy), ExtractError> {
    match suffix {
        ".txt" => Ok((
            String::from_utf8_lossy(bytes).into_owned(),
            ExtractStrategy::Txt,
        )),
        ".md" => {
            let markdown = String::from_utf8_lossy(bytes);
            let mut html = String::new();
            pulldown_cmark::html::push_html(&mut html, pulldown_cmark::Parser::new(&markdown));
            Ok((strip_html_tags(&html), ExtractStrategy::MarkdownHtmlStrip))
        }
        ".pdf" => {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ExtractError::Failed(e.to_string()))?;
            Ok((text, ExtractStrategy::PdfTextLayer))
        }
        ".docx" => {
            let text = extract_docx_paragraphs(bytes)?;
            Ok((text, ExtractStrategy::DocxParagraphs))
        }
        ".mp3" => {
            let text = transcriber.transcribe(bytes, max_audio_duration_minutes)?;
            Ok((text, ExtractStrategy::AudioTranscript))
        }
        other => Err(ExtractError::Unsupported(other.to_string())),
    }
}

fn extract_docx_paragraphs(bytes: &[u8]) -> Result<String, ExtractError> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| ExtractError::Failed(e.to_string()))?;
    let mut paragraphs = Vec::new();
    for child in docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            let mut text = String::new();
            for run_child in &p.children {
                if let docx_rs::ParagraphChild::Run(run) = run_child {
                    for run_part in &run.children {
                        if let docx_rs::RunChild::Text(t) = run_part {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            paragraphs.push(text);
        }
    }
    Ok(paragraphs.join("\n"))
}

/// Minimal tag stripper for markdown-rendered HTML: drops tags and keeps
/// block boundaries as newlines, enough for plain-prose documents.
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push('\n');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IngestConfig {
        IngestConfig::default()
    }

    #[test]
    fn detect_suffix_prefers_filename_extension() {
        let suffix = detect_suffix("report.pdf", b"", None, &config());
        assert_eq!(suffix.as_deref(), Some(".pdf"));
    }

    #[test]
    fn detect_suffix_falls_back_to_content_type() {
        let suffix = detect_suffix("upload", b"hello world", Some("text/plain"), &config());
        assert_eq!(suffix.as_deref(), Some(".txt"));
    }

    #[test]
    fn detect_suffix_rejects_unsupported_types() {
        let suffix = detect_suffix("app.exe", b"MZ\x90\x00", None, &config());
        assert_eq!(suffix, None);
    }

    #[test]
    fn extract_txt_passes_bytes_through_as_utf8() {
        let (text, strategy) = extract(".txt", b"hello", &NullTranscriber, 60).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(strategy, ExtractStrategy::Txt);
    }

    #[test]
    fn extract_markdown_strips_tags() {
        let (text, strategy) =
            extract(".md", b"# Title\n\nBody text.", &NullTranscriber, 60).unwrap();
        assert!(text.contains("Title"));
        assert!(text.contains("Body text."));
        assert_eq!(strategy, ExtractStrategy::MarkdownHtmlStrip);
    }

    #[test]
    fn extract_audio_without_transcriber_fails() {
        let err = extract(".mp3", b"id3", &NullTranscriber, 60).unwrap_err();
        assert!(matches!(err, ExtractError::Failed(_)));
    }
}
