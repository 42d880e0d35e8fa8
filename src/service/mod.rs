//! Remote generation services.
//!
//! Harmonization, animation and text-to-image generation are reached through
//! a stateless proxy. The orchestrator only sees the [`GenerationService`]
//! trait; [`StudioClient`] is the HTTP implementation.

mod cache;
mod client;
pub mod directive;

pub use cache::{CacheEntry, ImageCache};
pub use client::{
    validate_prompt, AnimationStatus, AnimationTicket, Base64Image, GenerationService,
    Harmonized, ServiceError, StudioClient, ANIMATE_PATH, BASE_URL_ENV, DEFAULT_BASE_URL,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT, HARMONIZE_PATH, IMAGEGEN_PATH,
};
