//! CSS extraction from assistant replies.
//!
//! The stylesheet is never stored: it is rebuilt wholesale from the assistant
//! messages every time they change.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

/// Order in which assistant replies are concatenated. Later text wins
/// cascade ties, so `OldestFirst` lets newer replies override older ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Lazily yield the bodies of fenced ```css blocks in `markdown`.
///
/// An unterminated fence runs to the end of the text, so a reply that is
/// still streaming contributes the CSS written so far.
pub fn css_blocks(markdown: &str) -> impl Iterator<Item = String> + '_ {
    let mut parser = Parser::new(markdown);

    std::iter::from_fn(move || {
        let mut body: Option<String> = None;

        for event in parser.by_ref() {
            match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) if is_css(&info) => {
                    body = Some(String::new());
                }
                Event::Text(text) => {
                    if let Some(body) = body.as_mut() {
                        body.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) if body.is_some() => return body,
                _ => {}
            }
        }

        None
    })
}

fn is_css(info: &str) -> bool {
    info.split_whitespace()
        .next()
        .is_some_and(|lang| lang.eq_ignore_ascii_case("css"))
}

/// Concatenate every CSS block across `replies` (given oldest-first) in the
/// requested order.
pub fn build_stylesheet<'a, I>(replies: I, order: StyleOrder) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut replies: Vec<&'a str> = replies.into_iter().collect();
    if order == StyleOrder::NewestFirst {
        replies.reverse();
    }

    replies.into_iter().flat_map(|reply| css_blocks(reply)).collect()
}
