//! genbridge
//!
//! Adapters for running streaming text generation against an LLM runtime:
//! per-step stop criteria for the host generation loop, and a bridge that
//! turns a blocking, callback-driven generation function into a pull-based
//! iterator of partial results.

pub mod iterator;
pub mod stopping;
pub mod streaming;
