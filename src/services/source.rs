//! Source text handed to the judge.
//!
//! Editors in the browser submit HTML-escaped code, so entities are decoded before the
//! student's code and the hidden driver are joined.

const ENTITIES: &[(&str, char)] = &[
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&amp;", '&'),
    ("&quot;", '"'),
    ("&#39;", '\''),
    ("&#x27;", '\''),
    ("&nbsp;", ' '),
];

/// Single left-to-right pass, so `&amp;lt;` becomes `&lt;` and not `<`.
pub(crate) fn decode_html_entities(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(position) = rest.find('&') {
        output.push_str(&rest[..position]);
        rest = &rest[position..];

        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, decoded)) => {
                output.push(*decoded);
                rest = &rest[entity.len()..];
            }
            None => {
                output.push('&');
                rest = &rest[1..];
            }
        }
    }

    output.push_str(rest);
    output
}

pub(crate) fn compose_source(code: &str, main_block: &str) -> String {
    let code = decode_html_entities(code);
    if main_block.trim().is_empty() {
        return code;
    }

    format!("{code}\n{}", decode_html_entities(main_block))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_entities() {
        assert_eq!(
            decode_html_entities("if a &lt; b &amp;&amp; c &gt; d: print(&quot;x&#39;s&#x27;&quot;)"),
            "if a < b && c > d: print(\"x's'\")"
        );
        assert_eq!(decode_html_entities("a&nbsp;b"), "a b");
    }

    #[test]
    fn decoding_is_not_recursive() {
        assert_eq!(decode_html_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn unknown_entities_pass_through() {
        assert_eq!(decode_html_entities("AT&T &copy; &"), "AT&T &copy; &");
    }

    #[test]
    fn driver_is_appended_on_its_own_line() {
        assert_eq!(
            compose_source("def solve():\n    return 1 &lt; 2", "print(solve())"),
            "def solve():\n    return 1 < 2\nprint(solve())"
        );
        assert_eq!(compose_source("print(1)", "  "), "print(1)");
    }
}
