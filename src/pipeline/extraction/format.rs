use crate::models::DocumentKind;

/// How many leading bytes the text heuristic inspects.
const TEXT_SNIFF_BYTES: usize = 4096;

/// Detect document kind from magic bytes (NOT file extensions).
/// Returns `None` for anything we cannot read.
pub fn detect_kind(bytes: &[u8]) -> Option<DocumentKind> {
    match bytes {
        // PDF: starts with %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some(DocumentKind::Pdf),
        // JPEG: starts with FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some(DocumentKind::Image),
        // PNG: starts with 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(DocumentKind::Image),
        // TIFF: little-endian (49 49 2A 00) or big-endian (4D 4D 00 2A)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Some(DocumentKind::Image),
        // BMP: "BM"
        [0x42, 0x4D, ..] if bytes.len() > 26 && !is_likely_text(bytes) => Some(DocumentKind::Image),
        _ if is_likely_text(bytes) => Some(DocumentKind::PlainText),
        _ => None,
    }
}

/// Valid UTF-8 with at least 80% printable characters (or whitespace).
fn is_likely_text(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(TEXT_SNIFF_BYTES)];
    if head.is_empty() {
        return false;
    }

    let text = match std::str::from_utf8(head) {
        Ok(t) => t,
        // A multi-byte character cut by the sniff window is still text.
        Err(e) if e.error_len().is_none() => match std::str::from_utf8(&head[..e.valid_up_to()]) {
            Ok(t) => t,
            Err(_) => return false,
        },
        Err(_) => return false,
    };

    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable as f64 / total as f64 > 0.80
}
