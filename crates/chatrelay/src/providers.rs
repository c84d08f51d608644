pub mod base;
pub mod configs;
pub mod errors;
pub mod factory;
pub mod groq;
pub mod openai;
pub mod stream;
pub mod utils;

#[cfg(test)]
pub mod mock;
