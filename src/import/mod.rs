//! Turning question-bank documents into a [`ConceptGraph`](crate::models::ConceptGraph).

mod parser;
pub mod tokenizer;

pub use parser::{parse, ParseOutcome};
