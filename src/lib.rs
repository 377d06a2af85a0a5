//! Pipeline de sinais e rótulos auto-supervisionados para um stream de trades.
//!
//! Fluxo por trade (em ordem de chegada):
//! [`window::WindowStore`] → [`features::compute`] →
//! [`classifier::SignalClassifier`] → [`labeler::AdaptiveLabeler`] (com
//! atraso) → [`sample_log`].

pub mod classifier;
pub mod config;
pub mod error;
pub mod extract;
pub mod features;
pub mod feed;
pub mod labeler;
pub mod logging;
pub mod pipeline;
pub mod sample_log;
pub mod types;
pub mod window;
