//! News-to-question-bank pipeline for exam preparation.
//!
//! The crate crawls configured RSS/Atom feeds, fetches full article text
//! through a reader proxy, scores and classifies articles against exam
//! categories, generates multiple-choice questions with an LLM backend,
//! filters them for quality, and persists surviving questions atomically
//! into a SQLite question bank.

pub mod cancel;
pub mod config;
pub mod content;
pub mod feed;
pub mod generate;
pub mod keywords;
pub mod pipeline;
pub mod quality;
pub mod scoring;
pub mod storage;
pub mod util;
