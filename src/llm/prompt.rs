//! Prompt template rendering.
//!
//! Templates use single-brace placeholders:
//! - `{input}` expands to the whole input map serialized as JSON
//! - `{key}` expands to `input[key]`; strings are inserted verbatim, any other
//!   value as compact JSON
//! - `{{` and `}}` produce literal braces

use serde_json::{Map, Value};

use crate::error::LlmError;

/// Placeholder that expands to the entire input map.
const WHOLE_INPUT: &str = "input";

/// Render `template` against one dataset item's input.
pub fn render_template(template: &str, input: &Map<String, Value>) -> Result<String, LlmError> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    rendered.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }

                if !closed {
                    return Err(LlmError::Template(format!(
                        "unterminated placeholder at byte {}",
                        pos
                    )));
                }

                rendered.push_str(&resolve(name.trim(), input)?);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                }
                rendered.push('}');
            }
            other => rendered.push(other),
        }
    }

    Ok(rendered)
}

fn resolve(name: &str, input: &Map<String, Value>) -> Result<String, LlmError> {
    if name == WHOLE_INPUT {
        return serde_json::to_string(input).map_err(|e| LlmError::Template(e.to_string()));
    }

    match input.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(LlmError::Template(format!(
            "placeholder '{{{}}}' has no matching input field",
            name
        ))),
    }
}
