//! Source parsing and call-graph extraction for TypeScript and JavaScript

pub mod coordinator;
pub mod extractor;
pub mod languages;
pub mod parser_pool;
pub mod resolver;

#[cfg(test)]
pub mod tests;

pub use coordinator::Coordinator;
pub use extractor::{FileExtraction, LanguageExtractor};
pub use parser_pool::{FileType, ParseRequest, ParseResult, ParserPool, create_parser_pool};
