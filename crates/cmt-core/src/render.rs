//! Comment rendering
//!
//! Uses pulldown-cmark to turn a comment's Markdown source into HTML. Raw HTML
//! in the source is emitted as escaped text.

use pulldown_cmark::{html, Event, Options, Parser};

/// Render comment Markdown into HTML
#[must_use]
pub fn render_comment(content: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let events = Parser::new_ext(content, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(content.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}
