//! collage-studio library crate.
//!
//! Scene model, selection and transform rules, compositing, and the
//! harmonize/animate job pipeline on top of the generation proxy.

pub mod acquire;
pub mod cli;
pub mod compositor;
pub mod config;
pub mod editor;
pub mod jobs;
pub mod scene;
pub mod service;
pub mod transform;
