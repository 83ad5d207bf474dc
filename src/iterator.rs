//! Callback-to-iterator bridge
//!
//! Runs a blocking, callback-driven generation function on a dedicated
//! background thread and exposes its intermediate outputs as a pull-based
//! iterator on the calling thread.
//!
//! # Architecture
//!
//! The two sides meet in a capacity-1 rendezvous channel: the producer's
//! [`StreamSink::send`] blocks while the previous value has not been taken,
//! so it can never run more than one item ahead of the consumer. The last
//! thing the background thread deposits is a terminal [`StreamItem`], which
//! carries either normal completion or the captured generation failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::streaming::StreamItem;

/// Error returned by the iterator when the generation function failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Generation failed: {0}")]
pub struct GenerationFailed(pub String);

/// Error returned by [`StreamSink::send`] once the consumer is gone
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Consumer disconnected, no further items will be accepted")]
pub struct SinkClosed;

/// Producer-side handle for publishing intermediate results.
///
/// Handed to the generation function by [`CallbackIterator::new`]. A
/// conforming generation function stops producing and returns as soon as
/// `send` reports [`SinkClosed`].
pub struct StreamSink<T> {
    tx: SyncSender<StreamItem<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> StreamSink<T> {
    /// Publishes one intermediate result to the consumer.
    ///
    /// Blocks while the handoff slot is full. Returns [`SinkClosed`] when the
    /// consumer has been dropped or iteration was abandoned.
    pub fn send(&self, value: T) -> Result<(), SinkClosed> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(SinkClosed);
        }
        self.tx.send(StreamItem::Item(value)).map_err(|_| SinkClosed)
    }

    /// Returns true once the consumer has abandoned iteration.
    pub fn is_closed(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Pull-based view of a callback-driven generation function.
///
/// Construction spawns one background thread that runs the generation
/// function to completion; the calling thread pulls intermediate results out
/// with `Iterator::next`. One construction drives exactly one run to exactly
/// one exhaustion; the iterator is not restartable.
pub struct CallbackIterator<T> {
    rx: Receiver<StreamItem<T>>,
    handle: Option<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
    finished: bool,
}

impl<T: Send + 'static> CallbackIterator<T> {
    /// Starts `func` on a background thread and returns the iterator over the
    /// values it publishes.
    ///
    /// `func` receives a [`StreamSink`] and calls [`StreamSink::send`] once
    /// per intermediate result, in production order. Whatever extra inputs
    /// the generation needs travel inside the closure's captures. When `func`
    /// returns, the thread deposits the terminal item as its final action, so
    /// the consumer always observes completion even on failure.
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce(StreamSink<T>) -> Result<(), String> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let cancelled = Arc::new(AtomicBool::new(false));

        let sink = StreamSink {
            tx: tx.clone(),
            cancelled: cancelled.clone(),
        };
        let handle = thread::spawn(move || {
            tracing::debug!("Generation task started");
            let terminal = match func(sink) {
                Ok(()) => StreamItem::Done,
                Err(reason) => {
                    tracing::warn!("Generation task failed: {}", reason);
                    StreamItem::Failed(reason)
                }
            };
            // Consumer may already be gone; nothing left to tell it then.
            if tx.send(terminal).is_err() {
                tracing::debug!("Consumer gone before generation task finished");
            }
        });

        Self {
            rx,
            handle: Some(handle),
            cancelled,
            finished: false,
        }
    }
}

impl<T> Iterator for CallbackIterator<T> {
    type Item = Result<T, GenerationFailed>;

    /// Blocks until the next intermediate result or the terminal item is
    /// available. A generation failure surfaces as one final `Err` after the
    /// last successfully published value.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.rx.recv() {
            Ok(StreamItem::Item(value)) => Some(Ok(value)),
            Ok(StreamItem::Done) => {
                self.finished = true;
                None
            }
            Ok(StreamItem::Failed(reason)) => {
                self.finished = true;
                Some(Err(GenerationFailed(reason)))
            }
            // Producer died without a terminal item (panicked); end iteration
            // rather than blocking forever.
            Err(_) => {
                self.finished = true;
                None
            }
        }
    }
}

impl<T> Drop for CallbackIterator<T> {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            if self.finished {
                // Terminal item already seen, the thread is exiting.
                let _ = handle.join();
            } else {
                // Abandoned mid-run. The receiver is dropped right after this
                // body, which fails any blocked send; joining here would
                // deadlock against a producer still waiting in send, so the
                // thread is left to wind down on its own.
                tracing::debug!("Iteration abandoned, generation task winding down");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn wait_for(flag: &AtomicBool) {
        for _ in 0..200 {
            if flag.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("background task did not finish in time");
    }

    #[test]
    fn test_yields_values_in_production_order() {
        let iter = CallbackIterator::new(|sink| {
            for value in ["v1", "v2", "v3"] {
                sink.send(value.to_string()).map_err(|e| e.to_string())?;
            }
            Ok(())
        });

        let collected: Vec<_> = iter.collect();
        assert_eq!(
            collected,
            vec![
                Ok("v1".to_string()),
                Ok("v2".to_string()),
                Ok("v3".to_string())
            ]
        );
    }

    #[test]
    fn test_exhausted_iterator_stays_exhausted() {
        let mut iter = CallbackIterator::new(|sink| {
            sink.send(42).map_err(|e| e.to_string())?;
            Ok(())
        });

        assert_eq!(iter.next(), Some(Ok(42)));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_producer_that_never_sends() {
        let mut iter: CallbackIterator<String> = CallbackIterator::new(|_sink| Ok(()));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_failure_surfaces_after_last_value() {
        let mut iter = CallbackIterator::new(|sink| {
            sink.send(1).map_err(|e| e.to_string())?;
            Err("context overflow".to_string())
        });

        assert_eq!(iter.next(), Some(Ok(1)));
        assert_eq!(
            iter.next(),
            Some(Err(GenerationFailed("context overflow".to_string())))
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_immediate_failure() {
        let mut iter: CallbackIterator<i32> =
            CallbackIterator::new(|_sink| Err("model not loaded".to_string()));

        assert_eq!(
            iter.next(),
            Some(Err(GenerationFailed("model not loaded".to_string())))
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_producer_blocks_on_full_slot() {
        let sends_completed = Arc::new(AtomicUsize::new(0));
        let counter = sends_completed.clone();

        let mut iter = CallbackIterator::new(move |sink| {
            for value in 0..3 {
                sink.send(value).map_err(|e| e.to_string())?;
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        // The slot holds one item, so the second send cannot complete until
        // the consumer takes the first.
        thread::sleep(Duration::from_millis(50));
        assert!(sends_completed.load(Ordering::SeqCst) <= 1);

        let collected: Vec<_> = iter.by_ref().collect();
        assert_eq!(collected, vec![Ok(0), Ok(1), Ok(2)]);
        assert_eq!(sends_completed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_dropping_iterator_unblocks_producer() {
        let producer_returned = Arc::new(AtomicBool::new(false));
        let returned = producer_returned.clone();

        let mut iter = CallbackIterator::new(move |sink| {
            assert!(!sink.is_closed());
            let mut value = 0u64;
            while sink.send(value).is_ok() {
                value += 1;
            }
            // The failed send means the consumer dropped us.
            assert!(sink.is_closed());
            returned.store(true, Ordering::SeqCst);
            Ok(())
        });

        assert!(matches!(iter.next(), Some(Ok(_))));
        drop(iter);

        wait_for(&producer_returned);
    }

    #[test]
    fn test_panicking_producer_ends_iteration() {
        let mut iter = CallbackIterator::new(|sink| {
            sink.send("before the panic").map_err(|e| e.to_string())?;
            panic!("tokenizer desync");
        });

        assert_eq!(iter.next(), Some(Ok("before the panic")));
        // No terminal item was deposited; the closed channel ends iteration
        // instead of blocking forever.
        assert_eq!(iter.next(), None);
    }
}
