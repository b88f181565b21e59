//! Template compilation for template-type assets.
//!
//! The engine only depends on the [`Template`] contract: a compiled value that
//! renders a JSON context into a string. [`CompiledTemplate`] is the built-in
//! implementation, a small mustache-style interpolator:
//!
//! - `{{ path.to.value }}` renders an HTML-escaped value,
//! - `{{{ path }}}` renders the raw value,
//! - `{{> partial.html }}` inlines another file, resolved relative to the
//!   including template, when the template is compiled,
//! - `{{! comment }}` renders nothing.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;

const MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unclosed template tag opened at byte {offset}")]
    Unclosed { offset: usize },
    #[error("empty template tag at byte {offset}")]
    EmptyTag { offset: usize },
    #[error("include `{name}` needs a template file to resolve against")]
    UnresolvedInclude { name: String },
    #[error("failed to include `{}`: {source}", path.display())]
    Include {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("includes nested deeper than {MAX_INCLUDE_DEPTH} levels at `{}`", path.display())]
    IncludeDepth { path: PathBuf },
}

/// A render function attached to an asset by its prefilter.
pub trait Template: Send + Sync + fmt::Debug {
    fn render(&self, context: &Value) -> Result<String, TemplateError>;
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Value { path: Vec<String>, escape: bool },
}

#[derive(Debug, Clone, PartialEq)]
enum Tag<'a> {
    Value { path: &'a str, escape: bool },
    Include(&'a str),
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    segments: Vec<Segment>,
}

impl CompiledTemplate {
    /// Compile `source`, inlining `{{> file}}` includes relative to `base_dir`.
    pub async fn compile(source: &str, base_dir: Option<&Path>) -> Result<Self, TemplateError> {
        let expanded = expand_includes(source.to_string(), base_dir.map(Path::to_path_buf), 0).await?;
        Self::parse(&expanded)
    }

    /// Compile a template that must not contain includes.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        for piece in tokenize(source)? {
            match piece {
                Piece::Text(text) => segments.push(Segment::Text(text.to_string())),
                Piece::Tag {
                    tag: Tag::Comment, ..
                } => {}
                Piece::Tag {
                    tag: Tag::Include(name),
                    ..
                } => {
                    return Err(TemplateError::UnresolvedInclude {
                        name: name.to_string(),
                    });
                }
                Piece::Tag {
                    tag: Tag::Value { path, escape },
                    ..
                } => segments.push(Segment::Value {
                    path: split_path(path),
                    escape,
                }),
            }
        }
        Ok(Self { segments })
    }
}

impl Template for CompiledTemplate {
    fn render(&self, context: &Value) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Value { path, escape } => {
                    let rendered = lookup(context, path).map(display_value).unwrap_or_default();
                    if *escape {
                        out.push_str(&escape_html(&rendered));
                    } else {
                        out.push_str(&rendered);
                    }
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug)]
enum Piece<'a> {
    Text(&'a str),
    Tag { tag: Tag<'a>, raw: &'a str },
}

fn tokenize(source: &str) -> Result<Vec<Piece<'_>>, TemplateError> {
    let mut pieces = Vec::new();
    let mut rest = source;
    let mut consumed = 0;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            pieces.push(Piece::Text(&rest[..start]));
        }
        let offset = consumed + start;
        let raw_value = rest[start..].starts_with("{{{");
        let (open, close) = if raw_value { ("{{{", "}}}") } else { ("{{", "}}") };
        let body_start = start + open.len();
        let Some(body_len) = rest[body_start..].find(close) else {
            return Err(TemplateError::Unclosed { offset });
        };
        let body = rest[body_start..body_start + body_len].trim();
        if body.is_empty() {
            return Err(TemplateError::EmptyTag { offset });
        }

        let tag = if raw_value {
            Tag::Value {
                path: body,
                escape: false,
            }
        } else if let Some(name) = body.strip_prefix('>') {
            Tag::Include(name.trim())
        } else if body.starts_with('!') {
            Tag::Comment
        } else {
            Tag::Value {
                path: body,
                escape: true,
            }
        };
        let end = body_start + body_len + close.len();
        pieces.push(Piece::Tag {
            tag,
            raw: &rest[start..end],
        });

        consumed += end;
        rest = &rest[end..];
    }

    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }
    Ok(pieces)
}

fn expand_includes(
    source: String,
    base_dir: Option<PathBuf>,
    depth: usize,
) -> Pin<Box<dyn Future<Output = Result<String, TemplateError>> + Send>> {
    Box::pin(async move {
        let pieces = tokenize(&source)?;
        if !pieces.iter().any(|piece| {
            matches!(
                piece,
                Piece::Tag {
                    tag: Tag::Include(_),
                    ..
                }
            )
        }) {
            return Ok(source);
        }

        let mut out = String::with_capacity(source.len());
        for piece in pieces {
            let name = match piece {
                Piece::Text(text) => {
                    out.push_str(text);
                    continue;
                }
                Piece::Tag {
                    tag: Tag::Include(name),
                    ..
                } => name,
                Piece::Tag { raw, .. } => {
                    out.push_str(raw);
                    continue;
                }
            };

            let Some(base) = base_dir.as_ref() else {
                return Err(TemplateError::UnresolvedInclude {
                    name: name.to_string(),
                });
            };
            let path = base.join(name);
            if depth >= MAX_INCLUDE_DEPTH {
                return Err(TemplateError::IncludeDepth { path });
            }
            let included = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| TemplateError::Include {
                    path: path.clone(),
                    source,
                })?;
            let nested_base = path.parent().map(Path::to_path_buf);
            out.push_str(&expand_includes(included, nested_base, depth + 1).await?);
        }
        Ok(out)
    })
}

fn split_path(path: &str) -> Vec<String> {
    if path == "." || path == "this" {
        return Vec::new();
    }
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn lookup<'a>(context: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(context, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
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
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn renders_escaped_and_raw_values() {
        let template = CompiledTemplate::parse("<h1>{{ title }}</h1>{{{ body }}}").unwrap();
        let html = template
            .render(&json!({ "title": "Fish & <Chips>", "body": "<p>ok</p>" }))
            .unwrap();
        assert_eq!(html, "<h1>Fish &amp; &lt;Chips&gt;</h1><p>ok</p>");
    }

    #[test]
    fn resolves_nested_paths_and_missing_values() {
        let template =
            CompiledTemplate::parse("{{_asset.name}}|{{items.1}}|{{missing.key}}|{{n}}").unwrap();
        let html = template
            .render(&json!({ "_asset": { "name": "page.html" }, "items": ["a", "b"], "n": 3 }))
            .unwrap();
        assert_eq!(html, "page.html|b||3");
    }

    #[test]
    fn comments_render_nothing() {
        let template = CompiledTemplate::parse("a{{! note }}b").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "ab");
    }

    #[test]
    fn unclosed_tag_is_rejected() {
        let err = CompiledTemplate::parse("hello {{ name").unwrap_err();
        assert!(matches!(err, TemplateError::Unclosed { offset: 6 }));
    }

    #[test]
    fn include_without_base_is_rejected() {
        let err = CompiledTemplate::parse("{{> header.html}}").unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedInclude { .. }));
    }

    #[tokio::test]
    async fn includes_are_inlined_relative_to_the_template() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir(dir.path().join("partials")).unwrap();
        std::fs::write(dir.path().join("partials/nav.html"), "<nav>{{site}}</nav>{{> item.html}}")
            .unwrap();
        std::fs::write(dir.path().join("partials/item.html"), "<i>{{site}}</i>").unwrap();

        let template =
            CompiledTemplate::compile("<body>{{> partials/nav.html}}</body>", Some(dir.path()))
                .await
                .unwrap();
        let html = template.render(&json!({ "site": "demo" })).unwrap();
        assert_eq!(html, "<body><nav>demo</nav><i>demo</i></body>");
    }

    #[tokio::test]
    async fn recursive_includes_hit_the_depth_limit() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("loop.html"), "x{{> loop.html}}").unwrap();

        let err = CompiledTemplate::compile("{{> loop.html}}", Some(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::IncludeDepth { .. }));
    }
}
