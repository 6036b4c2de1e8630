//! Event hooks for generation lifecycle and streaming.
//!
//! Provides an optional, non-intrusive way to observe LLM calls made by
//! [`LlmClient`](crate::client::LlmClient). The client emits events when a
//! generation starts, when it backs off after a rate limit, for every
//! streamed chunk, and when it finishes. Implement [`EventHandler`] to
//! receive them for progress tracking or streaming UIs.

use std::sync::Arc;

use crate::backend::Provider;

/// Events emitted during a generation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A generation has started.
    GenerationStart {
        provider: Provider,
        /// Resolved model identifier.
        model: String,
    },
    /// A rate-limited attempt failed and the client is waiting to retry.
    RateLimitRetry {
        /// The attempt that was throttled (1-indexed).
        attempt: u32,
        /// Wait before the next attempt in milliseconds.
        delay_ms: u64,
    },
    /// A chunk was received during streaming.
    Token { chunk: String },
    /// A generation has finished.
    GenerationEnd { ok: bool },
}

/// Handler for generation events.
///
/// This is entirely optional -- the client works without an event handler.
///
/// # Example
///
/// ```
/// use report_pipeline::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::Token { chunk } => print!("{}", chunk),
///             Event::GenerationStart { provider, model } => println!("[start] {provider}/{model}"),
///             Event::GenerationEnd { ok } => println!("[end] ok={}", ok),
///             Event::RateLimitRetry { attempt, delay_ms } => {
///                 println!("[throttled] attempt {attempt}, waiting {delay_ms}ms")
///             }
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use report_pipeline::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::Token { chunk } = event {
///         print!("{}", chunk);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_without_handler_is_noop() {
        emit(&None, Event::GenerationEnd { ok: true });
    }

    #[test]
    fn test_fn_handler_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Arc<dyn EventHandler> = Arc::new(FnEventHandler(move |e: Event| {
            sink.lock().unwrap().push(e);
        }));

        emit(&Some(handler.clone()), Event::Token { chunk: "a".into() });
        emit(&Some(handler), Event::GenerationEnd { ok: false });

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                Event::Token { chunk: "a".into() },
                Event::GenerationEnd { ok: false }
            ]
        );
    }
}
