//! Assemble the `srcdoc` for a preview frame from a project's files.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::script;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewFile {
    pub name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl PreviewFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            language: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewOptions {
    /// Inject the selection probe so the frame answers `TOGGLE_VISUAL_EDIT`.
    #[serde(default)]
    pub visual_edit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewDocument {
    pub html: String,
    pub probe_injected: bool,
}

impl PreviewDocument {
    pub fn is_empty(&self) -> bool {
        self.html.is_empty()
    }
}

pub const NO_HTML_PAGE: &str = "<html><body><h2 style=\"color:white;font-family:sans-serif;\
text-align:center;margin-top:20%\">No HTML file found</h2></body></html>";

/// Build the preview document.
///
/// The first `*.html` file is the page; the first `*.css` and `*.js` files are
/// inlined unless the page already carries its own `<style>` / `<script>`.
pub fn assemble(files: &[PreviewFile], options: PreviewOptions) -> PreviewDocument {
    let html = files.iter().find(|f| f.name.contains(".html"));
    let css = files.iter().find(|f| f.name.ends_with(".css"));
    let js = files.iter().find(|f| f.name.ends_with(".js"));

    let mut page = match html {
        Some(f) if !f.content.is_empty() => f.content.clone(),
        _ if files.is_empty() => {
            return PreviewDocument {
                html: String::new(),
                probe_injected: false,
            };
        }
        _ => NO_HTML_PAGE.to_string(),
    };

    if let Some(css) = css.filter(|f| !f.content.is_empty()) {
        if !page.contains("<style>") {
            page = page.replacen("</head>", &format!("<style>{}</style></head>", css.content), 1);
        }
    }
    if let Some(js) = js.filter(|f| !f.content.is_empty()) {
        if !page.contains("<script>") {
            page = page.replacen("</body>", &format!("<script>{}</script></body>", js.content), 1);
        }
    }

    if options.visual_edit {
        page = inject_probe(&page);
    }

    debug!(
        files = files.len(),
        bytes = page.len(),
        visual_edit = options.visual_edit,
        "Assembled preview document"
    );
    PreviewDocument {
        html: page,
        probe_injected: options.visual_edit,
    }
}

/// Insert the probe so it runs before any page script: right after the
/// `<head>` open tag, else after `<html>`, else at the very start.
pub fn inject_probe(page: &str) -> String {
    let tag = script::probe_script_tag();
    let at = open_tag_end(page, "head")
        .or_else(|| open_tag_end(page, "html"))
        .unwrap_or(0);
    let mut out = String::with_capacity(page.len() + tag.len());
    out.push_str(&page[..at]);
    out.push_str(&tag);
    out.push_str(&page[at..]);
    out
}

/// Byte offset just past `<name ...>`, case-insensitive, not matching longer
/// tag names such as `<header>`.
fn open_tag_end(page: &str, name: &str) -> Option<usize> {
    let lower = page.to_ascii_lowercase();
    let needle = format!("<{name}");
    let mut from = 0;
    while let Some(pos) = lower[from..].find(&needle) {
        let start = from + pos;
        let after = start + needle.len();
        match lower.as_bytes().get(after) {
            Some(b'>') => return Some(after + 1),
            Some(c) if c.is_ascii_whitespace() || *c == b'/' => {
                return lower[after..].find('>').map(|end| after + end + 1);
            }
            Some(_) => from = after,
            None => return None,
        }
    }
    None
}

/// Remove Markdown code fences that models wrap generated code in.
pub fn strip_code_fences(code: &str) -> String {
    code.replace("```html", "").replace("```", "")
}

/// Placeholder page for a project with no generated code yet.
pub fn default_html() -> String {
    script::default_page().into_owned()
}
