//! DOCX text: paragraphs of `word/document.xml` in document order, one per line.

use std::io::{Cursor, Read};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

const DOCUMENT_PART: &str = "word/document.xml";

/// Inflated size ceiling for the document part. A resume body is far below
/// this; anything larger is treated as a zip bomb.
pub const MAX_DOCUMENT_XML_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("not a DOCX archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to read {DOCUMENT_PART}: {0}")]
    Io(#[from] std::io::Error),

    #[error("{DOCUMENT_PART} inflates past {limit} bytes")]
    TooLarge { limit: u64 },
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(/?)([A-Za-z0-9_:.\-]+)[^>]*?(/?)>").expect("static regex is valid")
    })
}

pub fn extract_docx(bytes: &[u8]) -> Result<String, DocxError> {
    extract_docx_capped(bytes, MAX_DOCUMENT_XML_BYTES)
}

/// The declared size is checked first, but the read itself is bounded too
/// since the header can understate it.
fn extract_docx_capped(bytes: &[u8], limit: u64) -> Result<String, DocxError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let part = archive.by_name(DOCUMENT_PART)?;
    if part.size() > limit {
        return Err(DocxError::TooLarge { limit });
    }
    let mut xml = String::new();
    part.take(limit + 1).read_to_string(&mut xml)?;
    if xml.len() as u64 > limit {
        return Err(DocxError::TooLarge { limit });
    }
    Ok(document_text(&xml))
}

/// Walks the tags of a WordprocessingML body. Text is only taken from inside
/// `w:t`; `w:tab` and `w:br` count only inside a run, so tab-stop definitions
/// in paragraph properties are ignored.
fn document_text(xml: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut in_run = false;
    let mut last = 0;

    for cap in tag_regex().captures_iter(xml) {
        let Some(tag) = cap.get(0) else { continue };
        if in_text {
            current.push_str(&decode_entities(&xml[last..tag.start()]));
        }
        last = tag.end();

        let closing = !cap[1].is_empty();
        let self_closing = !cap[3].is_empty();
        match (&cap[2], closing, self_closing) {
            ("w:t", false, false) => in_text = true,
            ("w:t", true, _) => in_text = false,
            ("w:r", false, false) => in_run = true,
            ("w:r", true, _) => in_run = false,
            ("w:tab", false, _) if in_run => current.push('\t'),
            ("w:br" | "w:cr", false, _) if in_run => current.push('\n'),
            ("w:p", true, _) | ("w:p", false, true) => {
                paragraphs.push(std::mem::take(&mut current));
            }
            _ => {}
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs.join("\n")
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let Some(semi) = after.find(';') else {
            out.push_str(after);
            return out;
        };
        let entity = &after[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&after[..=semi]),
        }
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    out
}
