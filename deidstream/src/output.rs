//! NDJSON channel output and run report files.
//!
//! Main-channel records go to the output path (stdout by default).
//! Error-channel records go to the error path if one was given and are
//! dropped otherwise.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use deidstream_core::{Channel, DeidError, OutputRecord, OutputSink, Result, RunReport};

use crate::input::{STDIO, is_zstd};

/// Output sink writing one JSON object per line per channel.
pub(crate) struct ChannelWriter {
    main: Target,
    error: Option<Target>,
    written: u64,
    rejected: u64,
    dropped: u64,
}

impl ChannelWriter {
    /// Opens the writers for both channels.
    pub(crate) fn create(main: &Path, error: Option<&Path>) -> Result<Self> {
        Ok(Self {
            main: open_writer(main)?,
            error: error.map(open_writer).transpose()?,
            written: 0,
            rejected: 0,
            dropped: 0,
        })
    }

    /// Records written to the main channel.
    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    /// Records written to the error channel.
    pub(crate) fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Flushes both channels and finalizes compressed outputs.
    pub(crate) fn finish(self) -> Result<()> {
        self.main.close("main output")?;
        if let Some(error) = self.error {
            error.close("error output")?;
        }
        if self.dropped > 0 {
            tracing::warn!(
                "Dropped {} non-compliant records, use --error-output to keep them",
                self.dropped
            );
        }
        Ok(())
    }
}

impl OutputSink for ChannelWriter {
    fn emit(&mut self, channel: Channel, record: OutputRecord) -> Result<()> {
        let writer = match channel {
            Channel::Main => {
                self.written += 1;
                &mut self.main
            }
            Channel::Error => match self.error.as_mut() {
                Some(writer) => {
                    self.rejected += 1;
                    writer
                }
                None => {
                    self.dropped += 1;
                    return Ok(());
                }
            },
        };

        serde_json::to_writer(&mut *writer, &record)
            .map_err(|e| DeidError::serialization(format!("Writing {} record", channel), e))?;
        writer
            .write_all(b"\n")
            .map_err(|e| DeidError::io(format!("Writing {} record", channel), e))
    }
}

/// Destination of one channel.
enum Target {
    Plain(BufWriter<Box<dyn Write>>),
    #[cfg(feature = "compression")]
    Zstd(BufWriter<zstd::Encoder<'static, File>>),
}

impl Target {
    /// Flushes buffered records and writes the end of a compressed frame.
    fn close(self, name: &str) -> Result<()> {
        match self {
            Self::Plain(mut writer) => writer
                .flush()
                .map_err(|e| DeidError::io(format!("Flushing {}", name), e)),
            #[cfg(feature = "compression")]
            Self::Zstd(writer) => {
                let encoder = writer
                    .into_inner()
                    .map_err(|e| DeidError::io(format!("Flushing {}", name), e.into_error()))?;
                encoder.finish().map_err(|e| {
                    DeidError::io(format!("Compression finalization failed for {}", name), e)
                })?;
                Ok(())
            }
        }
    }
}

impl Write for Target {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(writer) => writer.write(buf),
            #[cfg(feature = "compression")]
            Self::Zstd(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(writer) => writer.flush(),
            #[cfg(feature = "compression")]
            Self::Zstd(writer) => writer.flush(),
        }
    }
}

fn open_writer(path: &Path) -> Result<Target> {
    if path.as_os_str() == STDIO {
        let stdout: Box<dyn Write> = Box::new(io::stdout());
        return Ok(Target::Plain(BufWriter::new(stdout)));
    }

    let file = File::create(path)
        .map_err(|e| DeidError::io(format!("Failed to create {}", path.display()), e))?;

    if is_zstd(path) {
        #[cfg(feature = "compression")]
        {
            let encoder = zstd::Encoder::new(file, 3).map_err(|e| {
                DeidError::io(format!("Failed to create compressor for {}", path.display()), e)
            })?;
            return Ok(Target::Zstd(BufWriter::new(encoder)));
        }
        #[cfg(not(feature = "compression"))]
        {
            return Err(DeidError::configuration(
                "Compressed output not available. Compile with --features compression",
            ));
        }
    }

    let file: Box<dyn Write> = Box::new(file);
    Ok(Target::Plain(BufWriter::new(file)))
}

/// Saves the run report as pretty-printed JSON.
pub(crate) fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| DeidError::serialization("Serializing run report", e))?;
    std::fs::write(path, json)
        .map_err(|e| DeidError::io(format!("Failed to write to {}", path.display()), e))
}
