//! Rx Language Front-End
//!
//! Lexer, parser and a four-pass semantic analyzer for Rx, a small
//! statically-typed language with Rust-like syntax.

pub mod error;
pub mod lexer;
pub mod parser;
pub mod semantic;

pub use error::{RxError, RxResult};
