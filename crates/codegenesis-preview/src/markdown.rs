//! Small Markdown-to-HTML renderer for chat and agent messages.
//!
//! Not CommonMark. It handles what models actually emit in this product:
//! fenced code, pipe tables, `##`/`###` headings, bold, task lists, inline
//! code, bullet lists, links and blank-line breaks. Input is HTML-escaped
//! first, and link targets are limited to http(s), mailto and relative URLs.

use std::sync::LazyLock;

use regex::{Captures, Regex};

const SLOT: char = '\u{1}';

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\|(.+)\|[ \t]*\n\|[-| :]+\|[ \t]*\n((?:\|.+\|[ \t]*(?:\n|$))+)").unwrap()
});
static H3: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^### (.*)$").unwrap());
static H2: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^## (.*)$").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static TASK_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[*-][ \t]+\[ \][ \t]+(.*)$").unwrap());
static TASK_DONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[*-][ \t]+\[[xX]\][ \t]+(.*)$").unwrap());
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[*-][ \t]+(.*)$").unwrap());
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").unwrap());
static SLOT_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new("\u{1}(\\d+)\u{1}").unwrap());

/// Render message text to an HTML fragment.
pub fn render(markdown: &str) -> String {
    let mut slots: Vec<String> = Vec::new();
    let text = escape_html(&markdown.replace(SLOT, ""));

    // Code is parked in slots so later passes leave it alone.
    let text = FENCE.replace_all(&text, |c: &Captures| {
        park(&mut slots, format!("<pre class=\"md-code\"><code>{}</code></pre>", c[1].trim()))
    });
    let text = INLINE_CODE.replace_all(&text, |c: &Captures| {
        park(&mut slots, format!("<code class=\"md-inline\">{}</code>", &c[1]))
    });

    let text = TABLE.replace_all(&text, |c: &Captures| render_table(&c[1], &c[2]));
    let text = H3.replace_all(&text, "<h3 class=\"md-h3\">$1</h3>");
    let text = H2.replace_all(&text, "<h2 class=\"md-h2\">$1</h2>");
    let text = BOLD.replace_all(&text, "<strong>$1</strong>");
    let text = TASK_OPEN.replace_all(
        &text,
        "<li class=\"md-task\"><input type=\"checkbox\" disabled> <span>$1</span></li>",
    );
    let text = TASK_DONE.replace_all(
        &text,
        "<li class=\"md-task md-done\"><input type=\"checkbox\" checked disabled> <s>$1</s></li>",
    );
    let text = BULLET.replace_all(&text, "<li class=\"md-item\">$1</li>");
    let text = LINK.replace_all(&text, |c: &Captures| {
        if is_safe_href(&c[2]) {
            format!(
                "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
                &c[2], &c[1]
            )
        } else {
            c[1].to_string()
        }
    });
    let text = text.replace("\n\n", "<div class=\"md-gap\"></div>");

    SLOT_REF
        .replace_all(&text, |c: &Captures| {
            c[1].parse::<usize>()
                .ok()
                .and_then(|i| slots.get(i))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

fn park(slots: &mut Vec<String>, html: String) -> String {
    slots.push(html);
    format!("{SLOT}{}{SLOT}", slots.len() - 1)
}

fn render_table(header: &str, rows: &str) -> String {
    let cells = |line: &str| -> Vec<String> {
        line.trim()
            .trim_matches('|')
            .split('|')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    };

    let mut out = String::from("<div class=\"md-table\"><table><thead><tr>");
    for h in cells(header) {
        out.push_str(&format!("<th>{h}</th>"));
    }
    out.push_str("</tr></thead><tbody>");
    for row in rows.lines().filter(|l| !l.trim().is_empty()) {
        out.push_str("<tr>");
        for cell in cells(row) {
            out.push_str(&format!("<td>{cell}</td>"));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table></div>\n");
    out
}

fn is_safe_href(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    if ["http://", "https://", "mailto:"]
        .iter()
        .any(|p| lower.starts_with(p))
    {
        return true;
    }
    // Relative: no scheme before the first path, query or fragment delimiter.
    match lower.find(':') {
        None => true,
        Some(colon) => lower[..colon].contains(['/', '?', '#']),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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
