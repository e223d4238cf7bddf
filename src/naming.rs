//! Output file names derived from the document title.

/// Longest base name kept, in UTF-16 code units
pub const MAX_BASE_LEN: usize = 50;

const TITLE_SUFFIXES: &[&str] = &[" - Google Docs", " - Google Slides", " - Google Drive"];

/// Characters kept as-is; everything else becomes `_`.
fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || ('\u{00C0}'..='\u{024F}').contains(&c)
        || ('\u{1E00}'..='\u{1EFF}').contains(&c)
}

/// Turn a tab title into a safe, lower-case file base name.
///
/// A character outside the allowlist becomes one `_` per UTF-16 code unit,
/// so an emoji turns into `__`. May return an empty string.
pub fn sanitize_title(title: &str) -> String {
    let mut stripped = title.to_string();
    for suffix in TITLE_SUFFIXES {
        stripped = stripped.replacen(suffix, "", 1);
    }

    let mut replaced = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        if is_allowed(c) {
            replaced.push(c);
        } else {
            replaced.extend(std::iter::repeat('_').take(c.len_utf16()));
        }
    }

    let mut out = String::new();
    let mut units = 0;
    for c in replaced.to_lowercase().chars() {
        units += c.len_utf16();
        if units > MAX_BASE_LEN {
            break;
        }
        out.push(c);
    }
    out
}

/// `<base>.pdf`, `<base>_hires.pdf`, or `document.pdf` for an empty title
pub fn pdf_file_name(title: &str, high_res: bool) -> String {
    let base = sanitize_title(title);
    if base.is_empty() {
        return "document.pdf".to_string();
    }
    format!("{}{}.pdf", base, if high_res { "_hires" } else { "" })
}

/// `<base>_images.zip`, or `document.zip` for an empty title
pub fn zip_file_name(title: &str) -> String {
    let base = sanitize_title(title);
    if base.is_empty() {
        return "document.zip".to_string();
    }
    format!("{}_images.zip", base)
}
