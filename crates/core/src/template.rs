use std::error::Error as _;

use tera::{Context, Tera};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("template rendering failed: {0}")]
pub struct TemplateError(pub String);

impl From<tera::Error> for TemplateError {
    fn from(error: tera::Error) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self(message)
    }
}

/// Highest positional arg index a template may reference.
pub const MAX_ARG_INDEX: usize = 255;

pub fn render(template: &str, context: &Context) -> Result<String, TemplateError> {
    Ok(Tera::one_off(template, context, false)?)
}

/// Number of positional args a template needs so that every `args[N]` (or
/// `args.N`) it references resolves. Indices above [`MAX_ARG_INDEX`] are
/// rejected.
pub fn referenced_arg_count(template: &str) -> Result<usize, TemplateError> {
    let mut count = 0;
    let mut rest = template;

    while let Some(position) = rest.find("args") {
        let after = &rest[position + "args".len()..];
        let mut chars = after.chars();
        let digits = match chars.next() {
            Some('[') | Some('.') => chars.take_while(|ch| ch.is_ascii_digit()).collect::<String>(),
            _ => String::new(),
        };
        if !digits.is_empty() {
            let index = digits
                .parse::<usize>()
                .ok()
                .filter(|index| *index <= MAX_ARG_INDEX)
                .ok_or_else(|| {
                    TemplateError(format!(
                        "args[{digits}] exceeds the highest supported index {MAX_ARG_INDEX}"
                    ))
                })?;
            count = count.max(index + 1);
        }
        rest = after;
    }

    Ok(count)
}
