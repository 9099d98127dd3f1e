//! Streaming consumer with render coalescing.
//!
//! Fragments can arrive far faster than a UI can usefully repaint. The
//! consumer accumulates them and re-renders the full accumulated text at
//! most once per frame interval: the first fragment after a quiet period
//! schedules a flush one frame later, and every fragment landing before
//! that flush rides along with it. Once the stream ends the accumulated
//! text gets the full post-processing pass before the final render, so
//! control markers and secret-shaped substrings never reach the sink in
//! the terminal update.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::llm::TokenStream;
use crate::rag::postprocess::{finalize, MAX_DISPLAY_CHARS};

/// Where coalesced text goes. Each call replaces the previously rendered
/// text with the full accumulated response so far. Called with the state
/// lock held; implementations must not call back into the consumer.
pub trait RenderSink: Send + Sync {
    fn render(&self, text: &str);
}

/// Sink that discards everything. Useful when only the collected result
/// matters.
pub struct NoopSink;

impl RenderSink for NoopSink {
    fn render(&self, _text: &str) {}
}

struct StreamState {
    accumulated: String,
    flush_scheduled: bool,
    /// Bumped on finish/fail. A scheduled flush captures the epoch it was
    /// scheduled under and skips rendering if it changed, so a flush task
    /// racing `abort()` can never paint after the terminal render.
    epoch: u64,
}

pub struct StreamConsumer {
    sink: Arc<dyn RenderSink>,
    frame_interval: Duration,
    state: Arc<Mutex<StreamState>>,
    pending_flush: Mutex<Option<JoinHandle<()>>>,
}

impl StreamConsumer {
    pub fn new(sink: Arc<dyn RenderSink>, frame_interval: Duration) -> Self {
        Self {
            sink,
            frame_interval,
            state: Arc::new(Mutex::new(StreamState {
                accumulated: String::new(),
                flush_scheduled: false,
                epoch: 0,
            })),
            pending_flush: Mutex::new(None),
        }
    }

    /// Append a fragment. Schedules a flush one frame ahead unless one is
    /// already pending; fragments arriving in between join that flush.
    pub fn push(&self, fragment: &str) {
        let mut state = self.state.lock();
        state.accumulated.push_str(fragment);
        if state.flush_scheduled {
            return;
        }
        state.flush_scheduled = true;
        let scheduled_epoch = state.epoch;
        drop(state);

        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let frame_interval = self.frame_interval;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(frame_interval).await;
            let mut state = state.lock();
            if state.epoch != scheduled_epoch {
                return;
            }
            state.flush_scheduled = false;
            // Render while holding the lock so a concurrent finish/fail
            // serializes behind this intermediate paint.
            sink.render(&state.accumulated.clone());
        });
        *self.pending_flush.lock() = Some(handle);
    }

    /// Terminate the stream: cancel any scheduled flush, post-process the
    /// accumulated text (marker stripping, redaction, display bound),
    /// render it immediately, and return it.
    pub fn finish(&self) -> String {
        if let Some(handle) = self.pending_flush.lock().take() {
            handle.abort();
        }
        let text = {
            let mut state = self.state.lock();
            state.flush_scheduled = false;
            state.epoch += 1;
            state.accumulated.clone()
        };
        let display = finalize(&text, MAX_DISPLAY_CHARS).display_text;
        if !display.is_empty() {
            self.sink.render(&display);
        }
        display
    }

    /// Terminal failure: discard whatever accumulated and render `message`
    /// as the single final text. The message goes through the same
    /// sanitization pass as a successful finish.
    pub fn fail(&self, message: &str) {
        if let Some(handle) = self.pending_flush.lock().take() {
            handle.abort();
        }
        let display = finalize(message, MAX_DISPLAY_CHARS).display_text;
        let mut state = self.state.lock();
        state.flush_scheduled = false;
        state.epoch += 1;
        state.accumulated = display.clone();
        drop(state);
        self.sink.render(&display);
    }

    /// Drain `stream` to completion through the coalescing path and return
    /// the post-processed final text.
    pub async fn run(&self, mut stream: TokenStream) -> String {
        while let Some(fragment) = stream.next().await {
            self.push(&fragment);
        }
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        renders: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                renders: Mutex::new(Vec::new()),
            })
        }

        fn renders(&self) -> Vec<String> {
            self.renders.lock().clone()
        }
    }

    impl RenderSink for RecordingSink {
        fn render(&self, text: &str) {
            self.renders.lock().push(text.to_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_fragments_coalesces_to_one_render() {
        let sink = RecordingSink::new();
        let consumer = StreamConsumer::new(sink.clone(), Duration::from_millis(16));

        consumer.push("alpha ");
        consumer.push("beta ");
        consumer.push("gamma");
        assert!(sink.renders().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.renders(), vec!["alpha beta gamma".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragments_across_frames_render_cumulatively() {
        let sink = RecordingSink::new();
        let consumer = StreamConsumer::new(sink.clone(), Duration::from_millis(16));

        consumer.push("one ");
        tokio::time::sleep(Duration::from_millis(20)).await;
        consumer.push("two");
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            sink.renders(),
            vec!["one ".to_string(), "one two".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_flushes_remainder_immediately() {
        let sink = RecordingSink::new();
        let consumer = StreamConsumer::new(sink.clone(), Duration::from_millis(16));

        consumer.push("tail");
        // No frame has elapsed, yet finish renders synchronously.
        let text = consumer.finish();
        assert_eq!(text, "tail");
        assert_eq!(sink.renders(), vec!["tail".to_string()]);

        // Neither the aborted handle nor an already-running flush task can
        // fire a second render: the epoch bump invalidates it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.renders().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_renders_single_message() {
        let sink = RecordingSink::new();
        let consumer = StreamConsumer::new(sink.clone(), Duration::from_millis(16));

        consumer.push("partial out");
        consumer.fail("something went wrong");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sink.renders(), vec!["something went wrong".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_stream_and_returns_full_text() {
        let sink = RecordingSink::new();
        let consumer = StreamConsumer::new(sink.clone(), Duration::from_millis(16));

        let (tx, stream) = TokenStream::channel(8);
        tokio::spawn(async move {
            for fragment in ["the ", "quick ", "fox"] {
                tx.send(fragment.to_string()).await.unwrap();
            }
        });

        let text = consumer.run(stream).await;
        assert_eq!(text, "the quick fox");
        assert_eq!(sink.renders().last().unwrap(), "the quick fox");
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_render_strips_control_markers() {
        let sink = RecordingSink::new();
        let consumer = StreamConsumer::new(sink.clone(), Duration::from_millis(16));

        let (tx, stream) = TokenStream::channel(8);
        tokio::spawn(async move {
            for fragment in ["Per [#src:d1 score=0.90 kind=doc] ", "the plan holds."] {
                tx.send(fragment.to_string()).await.unwrap();
            }
        });

        let text = consumer.run(stream).await;
        assert_eq!(text, "Per the plan holds.");
        let final_render = sink.renders().last().unwrap().clone();
        assert!(!final_render.contains("[#src:"));
        assert_eq!(final_render, "Per the plan holds.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_render_redacts_secrets() {
        let sink = RecordingSink::new();
        let consumer = StreamConsumer::new(sink.clone(), Duration::from_millis(16));

        consumer.push("The key is sk-abcdef1234567890abcd for now");
        let text = consumer.finish();
        assert!(!text.contains("sk-abcdef1234567890abcd"));
        assert!(text.contains("[redacted]"));
        assert!(!sink
            .renders()
            .last()
            .unwrap()
            .contains("sk-abcdef1234567890abcd"));
    }
}
