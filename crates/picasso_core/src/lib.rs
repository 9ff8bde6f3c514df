//! # picasso_core
//!
//! Core types shared by the picasso-rs crates.
//!
//! This crate provides:
//! - [`RankedPrediction`] and [`decode_top_k`] for turning class probabilities
//!   into ranked, display-ready entries
//! - [`InputShape`] describing what a model accepts
//! - [`InputImage`] and image/array conversions used by preprocessing
//! - [`PicassoConfig`] application configuration
//! - Error types and common utilities
//!
//! ## Layout Convention
//!
//! Image batches follow the convention `(N, H, W, C)`:
//! - `N`: Batch size (number of images)
//! - `H`, `W`: Height and width in pixels
//! - `C`: Channels (1 for grayscale, 3 for RGB)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
mod error;
pub mod imaging;
mod prediction;
mod shape;

pub use config::PicassoConfig;
pub use error::{CoreError, Result};
pub use imaging::InputImage;
pub use prediction::{decode_top_k, rank_row, ranked_indices, RankedPrediction, DEFAULT_TOP_K};
pub use shape::InputShape;
