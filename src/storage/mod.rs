//! Persistent and in-memory storage for the analysis stage's rolling windows.

pub mod history;

pub use history::{HistoryError, HistoryKey, HistoryStore, InMemoryHistoryStore, SledHistoryStore};
