//! End-to-end tests over the public API with an in-memory store.

mod mock_feed;
mod pipeline;
