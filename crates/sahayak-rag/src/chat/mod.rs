//! Chat surface: the ask pipeline and the coalescing stream consumer.

pub mod engine;
pub mod stream;

pub use engine::{AskOptions, AskResult, ChatEngine};
pub use stream::{NoopSink, RenderSink, StreamConsumer};
