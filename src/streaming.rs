//! Streamed generation items
//!
//! Tagged wrapper for everything that crosses the producer/consumer handoff:
//! intermediate values, normal completion, or a captured producer failure.
//! The terminal variants guarantee the consumer can always distinguish "no
//! more items" from "the generation call blew up".

/// One item in a generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem<T> {
    /// An intermediate result published by the generation function
    Item(T),
    /// Generation completed normally; nothing further will be produced
    Done,
    /// Generation failed; nothing further will be produced
    Failed(String),
}

impl<T> StreamItem<T> {
    /// Returns true for an intermediate result
    pub fn is_item(&self) -> bool {
        matches!(self, StreamItem::Item(_))
    }

    /// Returns true for either terminal variant
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamItem::Done | StreamItem::Failed(_))
    }

    /// Borrows the intermediate result, if any
    pub fn as_item(&self) -> Option<&T> {
        match self {
            StreamItem::Item(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the wrapper, keeping only an intermediate result
    pub fn into_item(self) -> Option<T> {
        match self {
            StreamItem::Item(value) => Some(value),
            _ => None,
        }
    }

    /// Borrows the failure reason, if any
    pub fn failure(&self) -> Option<&str> {
        match self {
            StreamItem::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_item_variants() {
        let item = StreamItem::Item("hello".to_string());
        assert!(item.is_item());
        assert!(!item.is_terminal());
        assert_eq!(item.as_item().map(String::as_str), Some("hello"));
        assert_eq!(item.into_item().as_deref(), Some("hello"));

        let done: StreamItem<String> = StreamItem::Done;
        assert!(!done.is_item());
        assert!(done.is_terminal());
        assert_eq!(done.as_item(), None);

        let failed: StreamItem<String> = StreamItem::Failed("context overflow".to_string());
        assert!(!failed.is_item());
        assert!(failed.is_terminal());
        assert_eq!(failed.failure(), Some("context overflow"));
        assert_eq!(failed.into_item(), None);
    }
}
