//! Incremental token delivery for generated responses.
//!
//! A `TokenStream` is an ordered, finite, non-restartable sequence of text
//! fragments, consumed exactly once. Producers keep the same contract
//! whether the underlying provider streams natively or the full completion
//! is replayed word by word.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

pub struct TokenStream {
    receiver: mpsc::Receiver<String>,
}

impl TokenStream {
    pub fn new(receiver: mpsc::Receiver<String>) -> Self {
        Self { receiver }
    }

    /// Create a connected producer/consumer pair.
    pub fn channel(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self::new(rx))
    }

    /// Next fragment, or None once the producer is done.
    pub async fn next(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Drain the remaining fragments into one string.
    pub async fn collect(mut self) -> String {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment);
        }
        text
    }
}

impl Stream for TokenStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
