pub mod error;
pub mod index;
pub mod text;
pub mod vectorizer;
