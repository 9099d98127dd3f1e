//! Retrieval-augmented generation: context assembly, prompt construction,
//! and output post-processing.

pub mod context_builder;
pub mod postprocess;
pub mod prompt;

pub use context_builder::{confidence_hint, ContextBuilder};
pub use postprocess::{finalize, FinalizedResponse};
pub use prompt::{AssembledPrompt, PersonaPolicy, WebSearchGate};
