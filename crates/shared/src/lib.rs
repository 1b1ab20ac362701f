pub mod document;
pub mod domain;
pub mod error;
pub mod protocol;
