//! Conservative CSS and JavaScript minifiers.
//!
//! Both only remove comments and redundant whitespace. String literals pass
//! through untouched, and JavaScript keeps its line structure so automatic
//! semicolon insertion behaves the same after minification.

#[derive(Clone, Copy)]
enum Scan {
    Code,
    Str(char),
    Escape(char),
    Slash,
    Block,
    BlockStar,
    Line,
    Regex,
    RegexEscape,
    RegexClass,
    RegexClassEscape,
}

/// Keywords after which a `/` opens a regular expression literal.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Remove `/* */` comments and, for JavaScript, `//` comments. JavaScript
/// regular expression literals pass through like strings.
fn strip_comments(input: &str, javascript: bool) -> String {
    let mut out = String::with_capacity(input.len());
    let mut state = Scan::Code;

    for ch in input.chars() {
        state = match state {
            Scan::Slash => match ch {
                '*' => Scan::Block,
                '/' if javascript => Scan::Line,
                _ if javascript && regex_allowed(&out) => {
                    out.push('/');
                    regex(&mut out, ch)
                }
                _ => {
                    out.push('/');
                    code(&mut out, ch)
                }
            },
            Scan::Code => code(&mut out, ch),
            Scan::Str(quote) => {
                out.push(ch);
                match ch {
                    '\\' => Scan::Escape(quote),
                    c if c == quote => Scan::Code,
                    _ => Scan::Str(quote),
                }
            }
            Scan::Escape(quote) => {
                out.push(ch);
                Scan::Str(quote)
            }
            Scan::Block => {
                if ch == '*' {
                    Scan::BlockStar
                } else {
                    Scan::Block
                }
            }
            Scan::BlockStar => match ch {
                '/' => {
                    out.push(' ');
                    Scan::Code
                }
                '*' => Scan::BlockStar,
                _ => Scan::Block,
            },
            Scan::Line => {
                if ch == '\n' {
                    out.push('\n');
                    Scan::Code
                } else {
                    Scan::Line
                }
            }
            Scan::Regex => regex(&mut out, ch),
            Scan::RegexEscape => {
                out.push(ch);
                Scan::Regex
            }
            Scan::RegexClass => {
                out.push(ch);
                match ch {
                    '\\' => Scan::RegexClassEscape,
                    ']' => Scan::Regex,
                    _ => Scan::RegexClass,
                }
            }
            Scan::RegexClassEscape => {
                out.push(ch);
                Scan::RegexClass
            }
        };
    }

    if matches!(state, Scan::Slash) {
        out.push('/');
    }
    out
}

fn code(out: &mut String, ch: char) -> Scan {
    match ch {
        '/' => Scan::Slash,
        '"' | '\'' | '`' => {
            out.push(ch);
            Scan::Str(ch)
        }
        _ => {
            out.push(ch);
            Scan::Code
        }
    }
}

/// One character inside a regular expression body. An unterminated literal
/// ends at the line break.
fn regex(out: &mut String, ch: char) -> Scan {
    out.push(ch);
    match ch {
        '\\' => Scan::RegexEscape,
        '[' => Scan::RegexClass,
        '/' | '\n' => Scan::Code,
        _ => Scan::Regex,
    }
}

/// Whether a `/` following `emitted` starts a regular expression rather
/// than a division.
fn regex_allowed(emitted: &str) -> bool {
    let trimmed = emitted.trim_end();
    let Some(last) = trimmed.chars().last() else {
        return true;
    };
    if "(,=:[!&|?{};+-*%<>~^".contains(last) {
        return true;
    }
    if last.is_alphanumeric() || last == '_' || last == '$' {
        let word_start = trimmed
            .rfind(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
            .map_or(0, |index| index + 1);
        return REGEX_KEYWORDS.contains(&&trimmed[word_start..]);
    }
    false
}

pub fn minify_js(source: &str) -> String {
    strip_comments(source, true)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn minify_css(source: &str) -> String {
    const TIGHT: &[char] = &['{', '}', ':', ';', ','];

    let stripped = strip_comments(source, false);
    let mut out = String::with_capacity(stripped.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for ch in stripped.chars() {
        if let Some(open) = quote {
            out.push(ch);
            if ch == open && !out.ends_with(&format!("\\{open}")) {
                quote = None;
            }
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            let prev = out.chars().last();
            if prev.is_some_and(|prev| !TIGHT.contains(&prev)) && !TIGHT.contains(&ch) {
                out.push(' ');
            }
            pending_space = false;
        }
        if ch == '}' && out.ends_with(';') {
            out.pop();
        }
        if ch == '"' || ch == '\'' {
            quote = Some(ch);
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_drops_comments_and_whitespace() {
        let css = "/* reset */\nbody {\n  margin : 0;\n  color: red;\n}\n\na, b { content: \"a  /* b */\"; }\n";
        assert_eq!(
            minify_css(css),
            "body{margin:0;color:red}a,b{content:\"a  /* b */\"}"
        );
    }

    #[test]
    fn css_keeps_spaces_between_values() {
        assert_eq!(minify_css("p { margin: 0 auto; }"), "p{margin:0 auto}");
    }

    #[test]
    fn js_drops_comments_but_not_strings() {
        let js = "// header\nvar a = \"http://x\"; /* note */\n\n  call(a); // trailing\n";
        assert_eq!(minify_js(js), "var a = \"http://x\";\ncall(a);");
    }

    #[test]
    fn js_keeps_division() {
        assert_eq!(minify_js("var x = a / b;"), "var x = a / b;");
        assert_eq!(minify_js("var y = (a + 1) / 2 / c;"), "var y = (a + 1) / 2 / c;");
    }

    #[test]
    fn js_keeps_regex_literals() {
        let js = "var re = /\\/\\//g;\nfoo();\nvar q = /\"/; // quote\nbar();";
        assert_eq!(
            minify_js(js),
            "var re = /\\/\\//g;\nfoo();\nvar q = /\"/;\nbar();"
        );
    }

    #[test]
    fn js_regex_classes_may_hold_slashes() {
        let js = "if (x) return /[/*]+/.test(s); /* done */";
        assert_eq!(minify_js(js), "if (x) return /[/*]+/.test(s);");
    }
}
