// src/core/template.rs

use crate::models::{Segment, Template};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    // `$$` escapes a dollar; `${...}` is a reference; a bare `${` is unterminated.
    static ref TOKEN_RE: Regex = Regex::new(r"\$\$|\$\{([^}]*)\}|\$\{").expect("valid token regex");
    static ref NAME_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid name regex");
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated '${{' at byte {offset}")]
    Unterminated { offset: usize },
    #[error("empty reference '${{}}' at byte {offset}")]
    EmptyReference { offset: usize },
    #[error("invalid variable name '{name}' in reference")]
    InvalidName { name: String },
}

/// Returns `true` when `name` can be used as a variable key and as a reference target.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Splits a raw value into literal and `${NAME}` segments.
///
/// Adjacent literal text is merged, so a value without references always
/// yields at most one `Segment::Literal`.
pub fn parse(raw: &str) -> Result<Template, TemplateError> {
    let mut segments = Vec::new();

    let push_literal = |segments: &mut Vec<Segment>, s: &str| {
        if s.is_empty() {
            return;
        }
        if let Some(Segment::Literal(last)) = segments.last_mut() {
            last.push_str(s);
        } else {
            segments.push(Segment::Literal(s.to_string()));
        }
    };

    let mut last_index = 0;
    for caps in TOKEN_RE.captures_iter(raw) {
        let Some(full_match) = caps.get(0) else {
            continue;
        };
        push_literal(
            &mut segments,
            raw.get(last_index..full_match.start()).unwrap_or_default(),
        );

        match (full_match.as_str(), caps.get(1)) {
            ("$$", _) => push_literal(&mut segments, "$"),
            (_, Some(name)) => {
                let name = name.as_str();
                if name.is_empty() {
                    return Err(TemplateError::EmptyReference {
                        offset: full_match.start(),
                    });
                }
                if !is_valid_name(name) {
                    return Err(TemplateError::InvalidName {
                        name: name.to_string(),
                    });
                }
                segments.push(Segment::Reference(name.to_string()));
            }
            (_, None) => {
                return Err(TemplateError::Unterminated {
                    offset: full_match.start(),
                });
            }
        }
        last_index = full_match.end();
    }

    push_literal(&mut segments, raw.get(last_index..).unwrap_or_default());

    Ok(Template {
        raw: raw.to_string(),
        segments,
    })
}
