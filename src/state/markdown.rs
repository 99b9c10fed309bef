use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

const YAML_CLASS: &str = "yaml";

/// Renders a complete markdown buffer to HTML.
///
/// Callers re-render the whole accumulated buffer on every streamed chunk, so
/// a fence or emphasis split across chunks still yields balanced markup. Raw
/// HTML in the source is escaped rather than passed through.
pub fn render_markdown(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let mut events: Vec<Event> = Vec::new();
    let mut code_block: Option<(Option<String>, String)> = None;

    for event in Parser::new_ext(source, options) {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => Some(fence_language(&info)),
                    CodeBlockKind::Indented => None,
                };
                code_block = Some((lang, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((lang, body)) = code_block.take() {
                    events.push(Event::Html(render_code_block(lang.as_deref(), &body).into()));
                }
            }
            Event::Text(text) if code_block.is_some() => {
                if let Some((_, body)) = code_block.as_mut() {
                    body.push_str(&text);
                }
            }
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

/// Language class used for a fenced block. Untagged fences are YAML.
pub fn code_fence_class(lang: &str) -> String {
    match lang.trim().to_ascii_lowercase().as_str() {
        "" | "yaml" | "yml" => YAML_CLASS.to_string(),
        other => other
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
            .collect(),
    }
}

fn fence_language(info: &str) -> String {
    info.split_whitespace().next().unwrap_or_default().to_string()
}

fn render_code_block(lang: Option<&str>, body: &str) -> String {
    let escaped = escape_html(body);
    match lang {
        Some(lang) => {
            let class = code_fence_class(lang);
            format!("<pre class=\"code-block {class}\"><code class=\"language-{class}\">{escaped}</code></pre>\n")
        }
        None => format!("<pre><code>{escaped}</code></pre>\n"),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_and_yaml_fences_are_yaml() {
        let html = render_markdown("```\nsteps: []\n```\n");
        assert!(html.contains("class=\"language-yaml\""), "{html}");

        let html = render_markdown("```yml\n- a\n```\n");
        assert!(html.contains("class=\"language-yaml\""), "{html}");
    }

    #[test]
    fn test_other_languages_keep_their_tag() {
        let html = render_markdown("```JavaScript title=demo\nlet a = 1 < 2;\n```\n");
        assert!(html.contains("class=\"language-javascript\""), "{html}");
        assert!(html.contains("let a = 1 &lt; 2;"), "{html}");
    }

    #[test]
    fn test_unterminated_fence_still_closes() {
        let html = render_markdown("```yaml\nsteps:\n  - prompt: p1");
        assert!(html.contains("<pre"), "{html}");
        assert!(html.trim_end().ends_with("</pre>"), "{html}");
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = render_markdown("hello <script>alert(1)</script>");
        assert!(!html.contains("<script>"), "{html}");
    }

    #[test]
    fn test_headings_and_emphasis_render() {
        assert_eq!(render_markdown("# Hi"), "<h1>Hi</h1>\n");
        assert_eq!(render_markdown("**bold**"), "<p><strong>bold</strong></p>\n");
    }
}
