//! Block controller.
//!
//! Accumulates encoded rows into blocks and decides when a block is handed
//! on. Flushing is explicit: [`BlockController::push`] and
//! [`BlockController::finish`] return the emitted block instead of calling
//! into the orchestrators, so the controller knows nothing about modes.

use crate::codec;
use crate::config::ProcessorConfig;
use crate::models::{Block, Header};
use crate::record::Record;
use crate::{DeidError, Result};

#[derive(Debug)]
enum State {
    /// No record seen yet; the header is not fixed
    AwaitingHeader,
    /// Collecting rows for the current block
    Accumulating(Block),
    /// End of stream reached
    Draining,
}

/// Row-blocking state machine of one stream instance.
#[derive(Debug)]
pub struct BlockController {
    block_size: usize,
    row_blocking: bool,
    declared_columns: Vec<String>,
    quasi_identifiers: Vec<String>,
    header: Option<Header>,
    state: State,
}

impl BlockController {
    /// Creates a controller waiting for its first record.
    pub fn new(config: &ProcessorConfig) -> Self {
        Self {
            block_size: config.runtime.block_size,
            row_blocking: config.runtime.row_blocking(),
            declared_columns: config.declared_columns(),
            quasi_identifiers: config.risk.configured_qis(),
            header: None,
            state: State::AwaitingHeader,
        }
    }

    /// True if blocks are flushed by size.
    pub fn row_blocking(&self) -> bool {
        self.row_blocking
    }

    /// The stream's header, once fixed.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Encodes and buffers one record.
    ///
    /// Returns the previous block if it was full before this record was
    /// added; the record itself always goes into the next block.
    ///
    /// # Errors
    /// Fails if the stream was already drained.
    pub fn push(&mut self, record: &Record) -> Result<Option<Block>> {
        let mut block = match std::mem::replace(&mut self.state, State::Draining) {
            State::AwaitingHeader => Block::new(self.fix_header(record)),
            State::Accumulating(block) => block,
            State::Draining => {
                return Err(DeidError::invalid_record(
                    "record received after the end of the stream",
                ));
            }
        };

        let mut flushed = None;
        if self.row_blocking() && block.data_row_count() >= self.block_size {
            let next = Block::new(block.header().clone());
            flushed = Some(std::mem::replace(&mut block, next));
        }

        let row = codec::encode(record, block.header());
        let pushed = block.push(row);
        self.state = State::Accumulating(block);
        pushed?;

        if let Some(full) = &flushed {
            tracing::info!("Flushing block of {} rows", full.data_row_count());
        }
        Ok(flushed)
    }

    /// Ends the stream, returning the last block if one is due.
    ///
    /// With row blocking the remainder is flushed only if it holds data
    /// rows. Without it the whole stream is one block, flushed even when
    /// empty, provided a header is known.
    pub fn finish(&mut self) -> Option<Block> {
        let last = match std::mem::replace(&mut self.state, State::Draining) {
            State::Accumulating(block) if self.row_blocking() && block.is_empty() => None,
            State::Accumulating(block) => Some(block),
            State::AwaitingHeader if !self.row_blocking() && !self.declared_columns.is_empty() => {
                let header = Header::new(self.declared_columns.clone());
                self.header = Some(header.clone());
                Some(Block::new(header))
            }
            State::AwaitingHeader | State::Draining => None,
        };

        if let Some(block) = &last {
            tracing::info!("Flushing final block of {} rows", block.data_row_count());
        }
        last
    }

    fn fix_header(&mut self, first: &Record) -> Header {
        let header = if self.declared_columns.is_empty() {
            Header::new(first.field_names())
        } else {
            Header::new(self.declared_columns.clone())
        };

        for qi in &self.quasi_identifiers {
            if !header.contains(qi) {
                tracing::warn!("Quasi-identifier '{}' is not part of the input columns", qi);
            }
        }
        tracing::debug!(columns = header.len(), "Fixed stream header");

        self.header = Some(header.clone());
        header
    }
}
