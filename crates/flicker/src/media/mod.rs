pub mod decoder;
pub mod filter;
pub mod types;
