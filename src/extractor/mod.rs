pub mod body;
pub mod cleaner;
pub mod language;
pub mod reject;

#[cfg(test)]
mod tests;

pub use body::{BodyExtractor, extract_body_text};
pub use cleaner::{clean, truncate_chars};
pub use language::detect_language;
pub use reject::{RejectReason, Validation, validate};
