//! Template module.
//!
//! This module contains the flat placeholder renderer used for
//! subjects and bodies, and the markup to HTML transform applied to
//! bodies.

pub mod markup;
pub mod render;

pub use self::markup::markup_to_html;
pub use self::render::{render, render_or_fallback, Error, Fields, Rendered, Result};
