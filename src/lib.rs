//! deal-scout: judges whether a used-car listing is a good deal by
//! comparing it against similar listings the user has already seen.
//!
//! The [`store`] keeps a durable `id -> Listing` mapping, merging noisy
//! partial observations; the [`engine`] is a pure function from a target
//! listing and a store snapshot to an [`models::Analysis`].

pub mod engine;
pub mod models;
pub mod store;
pub mod text;
pub mod transfer;
