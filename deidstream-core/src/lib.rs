//! Core of deidstream, a streaming batch processor for statistical
//! disclosure control.
//!
//! Records are encoded into fixed-width rows, collected into blocks and each
//! block is either anonymized until it satisfies the configured
//! re-identification risk thresholds, or assessed and routed to a compliant
//! or non-compliant channel without modification.
//!
//! # Architecture
//! - [`controller`] accumulates rows and decides when a block is due
//! - [`anonymize`] and [`assess`] orchestrate the external collaborators
//!   behind the [`engine::AnonymizationEngine`] and
//!   [`estimator::RiskEstimator`] traits
//! - [`privacy`] derives the engine's parameters from the risk thresholds
//! - [`statistics`] aggregates results across blocks
//! - [`processor`] ties one stream instance together
//!
//! Processing is synchronous. A stream instance owns all of its state, so
//! independent streams never share anything.

pub mod anonymize;
pub mod assess;
pub mod codec;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod logging;
pub mod models;
pub mod privacy;
pub mod processor;
pub mod record;
pub mod statistics;

// Re-export commonly used types
pub use assess::{Assessment, Channel};
pub use codec::OutputRecord;
pub use config::{Mode, ProcessorConfig, QuasiIdentifier, RiskProfile, RiskSettings, RuntimeSettings};
pub use error::{BlockContext, DeidError, EngineError, Result};
pub use models::{Block, Header, NULL_SENTINEL, Row};
pub use processor::{CollectingSink, OutputSink, Processor};
pub use record::{FieldType, FieldValue, InputSchema, Record};
pub use statistics::{RunReport, Statistics};
