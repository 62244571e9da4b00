//! HTML escaping and pretty-printing.

use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Elements that never have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Escape HTML special characters for safe rendering.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Re-emit a document with one node per line, indented two spaces per level.
///
/// Whitespace-only text nodes are dropped and remaining text is trimmed.
/// Comments are kept.
pub fn prettify(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len());

    for child in document.tree.root().children() {
        if let Node::Doctype(doctype) = child.value() {
            out.push_str(&format!("<!DOCTYPE {}>\n", doctype.name()));
        }
    }

    write_element(document.root_element(), 0, &mut out);
    out
}

fn write_element(element: ElementRef<'_>, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let name = element.value().name();

    out.push_str(&indent);
    out.push('<');
    out.push_str(name);
    for (key, value) in element.value().attrs() {
        out.push_str(&format!(" {}=\"{}\"", key, html_escape(value)));
    }
    out.push_str(">\n");

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    let child_indent = "  ".repeat(depth + 1);
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            write_element(child_element, depth + 1, out);
            continue;
        }
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push_str(&child_indent);
                    out.push_str(&html_escape(trimmed));
                    out.push('\n');
                }
            }
            Node::Comment(comment) => {
                out.push_str(&child_indent);
                out.push_str(&format!("<!--{}-->\n", &**comment));
            }
            _ => {}
        }
    }

    out.push_str(&indent);
    out.push_str(&format!("</{}>\n", name));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape_combined() {
        assert_eq!(
            html_escape("<a href=\"test\">foo & bar</a>"),
            "&lt;a href=&quot;test&quot;&gt;foo &amp; bar&lt;/a&gt;"
        );
    }

    #[test]
    fn test_prettify_indents_nested_elements() {
        let pretty = prettify("<!DOCTYPE html><html><head><title>Ogłoszenie</title></head><body><div class=\"x\"><p>Hi <b>there</b></p><br></div></body></html>");
        let expected = "\
<!DOCTYPE html>
<html>
  <head>
    <title>
      Ogłoszenie
    </title>
  </head>
  <body>
    <div class=\"x\">
      <p>
        Hi
        <b>
          there
        </b>
      </p>
      <br>
    </div>
  </body>
</html>
";
        assert_eq!(pretty, expected);
    }

    #[test]
    fn test_prettify_fragment_gets_document_shell() {
        let pretty = prettify("<p>x</p>");
        assert!(pretty.starts_with("<html>\n  <head>\n  </head>\n  <body>\n"));
        assert!(pretty.contains("    <p>\n      x\n    </p>\n"));
    }
}
