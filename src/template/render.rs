// mailmerge-lib, a Rust library for paced, resumable mail merge runs.
// Copyright (C) 2022  soywod <clement.douin@posteo.net>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Render module.
//!
//! A template is a plain string in which `{FieldName}` placeholders
//! are replaced by the value of the matching field. `{{` and `}}`
//! produce literal braces. There is no other syntax.

use log::{trace, warn};
use std::{
    collections::{BTreeMap, HashMap},
    result,
};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum Error {
    #[error("cannot render template: unknown field {0:?}")]
    MissingFieldError(String),
    #[error("cannot render template: placeholder opened at {0} is never closed")]
    UnclosedPlaceholderError(usize),
    #[error("cannot render template: empty placeholder at {0}")]
    EmptyPlaceholderError(usize),
    #[error("cannot render template: single '}}' at {0}")]
    UnmatchedBraceError(usize),
}

pub type Result<T> = result::Result<T, Error>;

/// Named string values a template can pick from.
pub trait Fields {
    fn field(&self, name: &str) -> Option<&str>;
}

impl Fields for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl Fields for BTreeMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl Fields for [(&str, &str)] {
    fn field(&self, name: &str) -> Option<&str> {
        self.iter().find(|(key, _)| *key == name).map(|(_, val)| *val)
    }
}

/// Renders the given template with the given fields.
pub fn render<F: Fields + ?Sized>(tpl: &str, fields: &F) -> Result<String> {
    trace!(">> render template {:?}", tpl);

    let mut output = String::with_capacity(tpl.len());
    let mut rest = tpl;
    let mut offset = 0;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        output.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            output.push('{');
            rest = &tail[2..];
            offset += pos + 2;
        } else if tail.starts_with("}}") {
            output.push('}');
            rest = &tail[2..];
            offset += pos + 2;
        } else if tail.starts_with('}') {
            return Err(Error::UnmatchedBraceError(offset + pos));
        } else {
            let end = tail
                .find('}')
                .ok_or(Error::UnclosedPlaceholderError(offset + pos))?;
            let name = &tail[1..end];
            if name.contains('{') {
                return Err(Error::UnclosedPlaceholderError(offset + pos));
            }
            if name.is_empty() {
                return Err(Error::EmptyPlaceholderError(offset + pos));
            }
            let value = fields
                .field(name)
                .ok_or_else(|| Error::MissingFieldError(name.to_owned()))?;
            output.push_str(value);
            rest = &tail[end + 1..];
            offset += pos + end + 1;
        }
    }

    output.push_str(rest);

    trace!("<< render template");
    Ok(output)
}

/// Represents the outcome of a rendering that never fails: on error
/// the text is the unrendered template.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Rendered {
    pub text: String,
    pub error: Option<Error>,
}

/// Renders the given template, falling back to the template itself
/// when it cannot be rendered.
pub fn render_or_fallback<F: Fields + ?Sized>(tpl: &str, fields: &F) -> Rendered {
    match render(tpl, fields) {
        Ok(text) => Rendered { text, error: None },
        Err(err) => {
            warn!("{}, using unrendered template", err);
            Rendered {
                text: tpl.to_owned(),
                error: Some(err),
            }
        }
    }
}
