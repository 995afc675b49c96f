//! Core types and trait definitions for the Concord cross-store coordinator.
//!
//! This crate has no database or runtime dependencies.
//! Storage backends implement [`store::StoreAdapter`]; the coordinator in
//! `concord-sync` drives them through the typed operations in [`operation`].

pub mod concept;
pub mod document;
pub mod error;
pub mod event;
pub mod graph;
pub mod integrity;
pub mod operation;
pub mod store;
pub mod view;

pub use error::{Error, Result};
