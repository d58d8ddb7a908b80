//! Browser-side probe and placeholder page, baked in with `rust-embed`.
//!
//! The workspace enables `debug-embed`, so debug builds embed the files too
//! and tests see exactly what ships.

use std::borrow::Cow;

use rust_embed::Embed;

#[derive(Embed)]
#[folder = "assets/"]
struct PreviewAssets;

pub const PROBE_SCRIPT: &str = "probe.js";
pub const DEFAULT_PAGE: &str = "default.html";

fn asset(name: &str) -> Cow<'static, str> {
    match PreviewAssets::get(name) {
        Some(file) => match file.data {
            Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes),
            Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
        },
        None => Cow::Borrowed(""),
    }
}

/// The probe JavaScript injected into preview documents.
pub fn probe_script() -> Cow<'static, str> {
    asset(PROBE_SCRIPT)
}

/// The probe wrapped in a marked `<script>` element.
pub fn probe_script_tag() -> String {
    format!("<script data-codegenesis-probe>{}</script>", probe_script())
}

/// Placeholder page shown before anything has been generated.
pub fn default_page() -> Cow<'static, str> {
    asset(DEFAULT_PAGE)
}
