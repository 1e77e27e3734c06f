//! Binary file detection (C3).
//!
//! Three strategies combined by logical OR: a static extension table, a
//! MIME probe with text-friendly exceptions, and a content sniff of the
//! first 8 KiB. The content sniff alone implements three checks: a NUL
//! byte anywhere in the window is conclusive; otherwise the window is
//! decoded as UTF-8 and flagged binary if replacement characters make up
//! 5% or more of it, or if fewer than 85% of its characters are printable
//! (ASCII 32-126, tab/LF/CR, or non-control Unicode).

use std::path::Path;

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svgz", "pdf", "zip", "gz", "tar", "rar",
    "7z", "exe", "dll", "so", "dylib", "bin", "class", "jar", "pyc", "o", "a", "lib", "wasm",
    "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "wav", "avi", "mov", "mkv", "flac", "db",
    "sqlite", "sqlite3",
];

/// Extensions a naive MIME probe would call `application/*` but that are
/// actually plain text -- e.g. a `.json`/`.svg`/`.csv` file probed by
/// content sniffing alone would otherwise need the full window scan.
const MIME_TEXT_EXCEPTIONS: &[&str] =
    &["json", "svg", "csv", "xml", "yaml", "yml", "toml", "ndjson", "geojson"];

const SNIFF_WINDOW: usize = 8192;
const REPLACEMENT_CHAR_THRESHOLD: f64 = 0.05;
const PRINTABLE_RATIO_THRESHOLD: f64 = 0.85;

/// Returns true if the extension is a known binary format.
pub fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| BINARY_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Best-effort MIME probe from the extension alone (no external MIME
/// database is linked). Returns `Some(true)` when the extension maps to a
/// known-binary MIME family, `Some(false)` for a known text exception, and
/// `None` when the extension isn't probeable at all -- callers treat `None`
/// as "defer to content sniffing".
pub fn mime_probe_is_binary(path: &Path) -> Option<bool> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if MIME_TEXT_EXCEPTIONS.contains(&ext.as_str()) {
        return Some(false);
    }
    if BINARY_EXTENSIONS.contains(&ext.as_str()) {
        return Some(true);
    }
    None
}

/// Sniff the first `SNIFF_WINDOW` bytes of `content` for binary signals:
/// a NUL byte, excessive UTF-8 replacement characters, or a low printable
/// ratio.
pub fn looks_binary(content: &[u8]) -> bool {
    let window = &content[..content.len().min(SNIFF_WINDOW)];

    if window.iter().any(|&b| b == 0) {
        return true;
    }

    if window.is_empty() {
        return false;
    }

    let text = String::from_utf8_lossy(window);
    let total_chars = text.chars().count();
    if total_chars == 0 {
        return false;
    }

    let replacement_count = text.chars().filter(|&c| c == '\u{FFFD}').count();
    #[expect(clippy::cast_precision_loss)]
    if replacement_count as f64 / total_chars as f64 >= REPLACEMENT_CHAR_THRESHOLD {
        return true;
    }

    let printable_count = text
        .chars()
        .filter(|&c| {
            matches!(c, '\t' | '\n' | '\r')
                || (c as u32 >= 32 && c as u32 <= 126)
                || (!c.is_control() && c as u32 > 126)
        })
        .count();
    #[expect(clippy::cast_precision_loss)]
    let printable_ratio = printable_count as f64 / total_chars as f64;
    printable_ratio < PRINTABLE_RATIO_THRESHOLD
}

/// Combined check: extension, then MIME probe, then content sniff, OR'd
/// together per §4.3.
pub fn is_binary(path: &Path, content: &[u8]) -> bool {
    has_binary_extension(path) || mime_probe_is_binary(path).unwrap_or(false) || looks_binary(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_extension() {
        assert!(has_binary_extension(Path::new("photo.PNG")));
        assert!(!has_binary_extension(Path::new("main.rs")));
    }

    #[test]
    fn test_nul_byte_sniff() {
        assert!(looks_binary(b"hello\0world"));
        assert!(!looks_binary(b"hello world"));
    }

    #[test]
    fn test_mime_probe_text_exception() {
        assert_eq!(mime_probe_is_binary(Path::new("data.json")), Some(false));
        assert_eq!(mime_probe_is_binary(Path::new("photo.png")), Some(true));
        assert_eq!(mime_probe_is_binary(Path::new("main.rs")), None);
    }

    #[test]
    fn test_low_printable_ratio_is_binary() {
        let mostly_control: Vec<u8> = (0..200).map(|i| if i % 3 == 0 { b'a' } else { 1u8 }).collect();
        assert!(looks_binary(&mostly_control));
    }

    #[test]
    fn test_high_printable_ratio_is_text() {
        let text = "this is a perfectly normal source file with plenty of ascii text\n".repeat(20);
        assert!(!looks_binary(text.as_bytes()));
    }
}
