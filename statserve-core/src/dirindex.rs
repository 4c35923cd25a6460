use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::error::StaticFileError;

/// Characters percent-encoded in generated hrefs, beyond the base
/// control-character set: space, quoting and bracket characters that
/// would otherwise break the surrounding HTML attribute.
const HREF_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'%');

struct Entry {
    name: String,
    is_dir: bool,
    len: u64,
    modified: std::time::SystemTime,
}

/// Renders an HTML directory listing for `dir`, suitable for wrapping
/// in a [`crate::cache::FileEntry`].
///
/// Entries are sorted byte-lexicographically by raw file name (no
/// directories-first grouping), and any entry whose name ends with
/// `compressed_suffix` is omitted, since it is a generated sidecar
/// rather than a file a user created.
pub fn render(dir: &Path, request_path: &str, compressed_suffix: &str) -> Result<Vec<u8>, StaticFileError> {
    let mut entries = Vec::new();
    for dirent in fs::read_dir(dir)? {
        let dirent = dirent?;
        let name = dirent.file_name().to_string_lossy().into_owned();
        if name.ends_with(compressed_suffix) {
            continue;
        }
        let meta = dirent.metadata()?;
        entries.push(Entry {
            name,
            is_dir: meta.is_dir(),
            len: meta.len(),
            modified: meta.modified()?,
        });
    }
    entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

    let mut out = String::new();
    let escaped_path = escape_html(request_path);
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{escaped_path}</title></head>\n<body>\n<h1>{escaped_path}</h1>\n<ul>\n"
    );

    if request_path != "/" {
        out.push_str("<li><a href=\"../\">../</a></li>\n");
    }

    for entry in &entries {
        let href = if entry.is_dir {
            format!("{}/", entry.name)
        } else {
            entry.name.clone()
        };
        let encoded_href = utf8_percent_encode(&href, HREF_ENCODE_SET);
        let label = escape_html(&entry.name);
        let class = if entry.is_dir { "dir" } else { "file" };
        let mtime = httpdate::fmt_http_date(entry.modified);
        if entry.is_dir {
            let _ = write!(
                out,
                "<li class=\"{class}\"><a href=\"{encoded_href}\">{label}/</a> &mdash; {mtime}</li>\n"
            );
        } else {
            let _ = write!(
                out,
                "<li class=\"{class}\"><a href=\"{encoded_href}\">{label}</a> &mdash; file, {} bytes, {mtime}</li>\n",
                entry.len
            );
        }
    }

    out.push_str("</ul>\n</body>\n</html>\n");
    Ok(out.into_bytes())
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
