//! Stream instance.
//!
//! A [`Processor`] owns everything that lives for one stream: the block
//! controller with its header, both orchestrators and the statistics.
//! Nothing is shared between instances, so independent streams can run on
//! separate threads without coordination.
//!
//! # Example
//! ```rust
//! use deidstream_core::config::{Mode, ProcessorConfig, RiskSettings, RuntimeSettings};
//! use deidstream_core::processor::{CollectingSink, Processor};
//! use deidstream_core::record::{FieldValue, Record};
//!
//! let config = ProcessorConfig::new(
//!     RiskSettings::new(),
//!     RuntimeSettings::new().with_mode(Mode::Assess),
//! );
//! let mut processor = Processor::with_reference_engines(&config)?;
//! let mut sink = CollectingSink::default();
//!
//! processor.process(&Record::new().with_field("age", FieldValue::Int(42)), &mut sink)?;
//! let report = processor.finish(&mut sink)?;
//!
//! assert_eq!(report.rows_processed, 1);
//! assert_eq!(sink.main().len() + sink.error().len(), 1);
//! # Ok::<(), deidstream_core::DeidError>(())
//! ```

use serde_json::Value;

use crate::anonymize::Anonymizer;
use crate::assess::{Channel, RiskAssessment};
use crate::codec::{self, OutputRecord};
use crate::config::{Mode, ProcessorConfig};
use crate::controller::BlockController;
use crate::engine::{AnonymizationEngine, LocalSuppressionEngine};
use crate::estimator::{RiskEstimator, SampleRiskEstimator};
use crate::models::{Block, Header};
use crate::record::{InputSchema, Record, record_from_json};
use crate::statistics::{RunReport, Statistics};
use crate::Result;

/// Destination of decoded output records.
pub trait OutputSink {
    /// Emits one record on a channel.
    fn emit(&mut self, channel: Channel, record: OutputRecord) -> Result<()>;
}

/// Sink keeping every record in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    main: Vec<OutputRecord>,
    error: Vec<OutputRecord>,
}

impl CollectingSink {
    /// Records emitted on the main channel.
    pub fn main(&self) -> &[OutputRecord] {
        &self.main
    }

    /// Records emitted on the error channel.
    pub fn error(&self) -> &[OutputRecord] {
        &self.error
    }
}

impl OutputSink for CollectingSink {
    fn emit(&mut self, channel: Channel, record: OutputRecord) -> Result<()> {
        match channel {
            Channel::Main => self.main.push(record),
            Channel::Error => self.error.push(record),
        }
        Ok(())
    }
}

/// One stream instance.
#[derive(Debug)]
pub struct Processor<E, R> {
    mode: Mode,
    schema: Option<InputSchema>,
    controller: BlockController,
    anonymizer: Anonymizer<E>,
    assessment: RiskAssessment<R>,
    statistics: Statistics,
}

impl Processor<LocalSuppressionEngine, SampleRiskEstimator> {
    /// Creates a stream instance backed by the bundled engine and estimator.
    pub fn with_reference_engines(config: &ProcessorConfig) -> Result<Self> {
        Self::new(config, LocalSuppressionEngine::new(), SampleRiskEstimator::new())
    }
}

impl<E: AnonymizationEngine, R: RiskEstimator> Processor<E, R> {
    /// Creates a stream instance.
    ///
    /// # Errors
    /// Returns [`crate::DeidError::Configuration`] if the configuration is
    /// invalid.
    pub fn new(config: &ProcessorConfig, engine: E, estimator: R) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            mode = %config.runtime.mode,
            block_size = config.runtime.block_size,
            qis = config.risk.qis.len(),
            "Created stream instance"
        );

        Ok(Self {
            mode: config.runtime.mode,
            schema: config.schema.clone(),
            controller: BlockController::new(config),
            anonymizer: Anonymizer::new(engine, config.risk.clone(), &config.runtime),
            assessment: RiskAssessment::new(estimator, config.risk.clone()),
            statistics: Statistics::new(),
        })
    }

    /// The stream's header, once the first record fixed it.
    pub fn header(&self) -> Option<&Header> {
        self.controller.header()
    }

    /// Statistics collected so far.
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Buffers one record, processing a block if one became due.
    pub fn process<S>(&mut self, record: &Record, sink: &mut S) -> Result<()>
    where
        S: OutputSink + ?Sized,
    {
        if let Some(block) = self.controller.push(record)? {
            self.dispatch(&block, sink)?;
        }
        Ok(())
    }

    /// Converts a JSON object with the configured schema and buffers it.
    pub fn process_json<S>(&mut self, value: &Value, sink: &mut S) -> Result<()>
    where
        S: OutputSink + ?Sized,
    {
        let record = record_from_json(value, self.schema.as_ref())?;
        self.process(&record, sink)
    }

    /// Ends the stream: processes the remaining block and reports.
    pub fn finish<S>(&mut self, sink: &mut S) -> Result<RunReport>
    where
        S: OutputSink + ?Sized,
    {
        if let Some(block) = self.controller.finish() {
            self.dispatch(&block, sink)?;
        }

        let report = self.statistics.report(self.mode);
        report.log_summary();
        Ok(report)
    }

    fn dispatch<S>(&mut self, block: &Block, sink: &mut S) -> Result<()>
    where
        S: OutputSink + ?Sized,
    {
        let rows = block.data_row_count();
        let (channel, output) = match self.mode {
            Mode::Anonymize => {
                let output = self.anonymizer.perform(block)?;
                self.statistics.track_suppressed_cells(block, &output);
                (Channel::Main, codec::decode(&output))
            }
            Mode::Assess => {
                let assessment = self.assessment.assess(block)?;
                self.statistics.track_risks(assessment.result, rows);
                (assessment.channel, codec::decode(block))
            }
        };
        self.statistics.record_block(rows);

        tracing::debug!(rows, %channel, "Emitting block");
        for record in output {
            sink.emit(channel, record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QuasiIdentifier, RiskSettings, RuntimeSettings};
    use crate::record::FieldValue;

    fn config(mode: Mode) -> ProcessorConfig {
        ProcessorConfig::new(
            RiskSettings::new()
                .with_highest_risk(0.5)
                .with_average_risk(1.0)
                .with_records_at_risk(0.0)
                .add_qi(QuasiIdentifier::new("sex")),
            RuntimeSettings::new().with_mode(mode),
        )
    }

    fn record(sex: &str, zip: i64) -> Record {
        Record::new()
            .with_field("sex", FieldValue::String(sex.to_string()))
            .with_field("zip", FieldValue::Long(zip))
    }

    #[test]
    fn test_anonymize_emits_on_main() {
        let mut processor = Processor::with_reference_engines(&config(Mode::Anonymize)).unwrap();
        let mut sink = CollectingSink::default();
        for (sex, zip) in [("M", 1), ("M", 2), ("F", 3)] {
            processor.process(&record(sex, zip), &mut sink).unwrap();
        }
        let report = processor.finish(&mut sink).unwrap();

        assert_eq!(sink.main().len(), 3);
        assert!(sink.error().is_empty());
        assert_eq!(sink.main()[2]["sex"], Value::Null);
        assert_eq!(sink.main()[2]["zip"], "3");
        assert_eq!(report.blocks_processed, 1);
        assert!(report.fraction_suppressed.is_some());
    }

    #[test]
    fn test_assess_routes_unmodified_block() {
        let mut processor = Processor::with_reference_engines(&config(Mode::Assess)).unwrap();
        let mut sink = CollectingSink::default();
        for (sex, zip) in [("M", 1), ("F", 2)] {
            processor.process(&record(sex, zip), &mut sink).unwrap();
        }
        let report = processor.finish(&mut sink).unwrap();

        assert!(sink.main().is_empty());
        assert_eq!(sink.error().len(), 2);
        assert_eq!(sink.error()[0]["sex"], "M");
        assert_eq!(report.aggregate_risk.unwrap().highest_risk, 0.5);
    }

    #[test]
    fn test_process_json_uses_schema() {
        let mut processor = Processor::with_reference_engines(&config(Mode::Assess)).unwrap();
        let mut sink = CollectingSink::default();
        processor
            .process_json(&serde_json::json!({"sex": "M", "zip": 4711}), &mut sink)
            .unwrap();
        assert_eq!(processor.header().unwrap().columns(), ["sex", "zip"]);

        let err = processor
            .process_json(&serde_json::json!(["M"]), &mut sink)
            .unwrap_err();
        assert!(matches!(err, crate::DeidError::InvalidRecord { .. }));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config(Mode::Anonymize);
        config.risk.highest_risk = 0.0;
        assert!(Processor::with_reference_engines(&config).is_err());
    }
}
