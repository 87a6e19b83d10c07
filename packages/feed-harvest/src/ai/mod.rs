//! Inference backends.
//!
//! Reference implementations of the [`Inference`](crate::traits::inference::Inference)
//! trait. Applications can use these directly or bring their own.

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAI;
