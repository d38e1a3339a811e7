//! NDJSON record input.
//!
//! Reads one JSON object per line from a file or stdin, transparently
//! decompressing `.zst` files when built with the `compression` feature.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use deidstream_core::{DeidError, Result};
use serde_json::Value;

/// Path meaning stdin or stdout.
pub(crate) const STDIO: &str = "-";

/// True if the path names a Zstandard-compressed file.
pub(crate) fn is_zstd(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("zst"))
}

/// Opens the input for line-wise reading.
pub(crate) fn open(path: &Path) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == STDIO {
        return Ok(Box::new(BufReader::new(io::stdin().lock())));
    }

    let file = File::open(path)
        .map_err(|e| DeidError::io(format!("Failed to open {}", path.display()), e))?;

    if is_zstd(path) {
        #[cfg(feature = "compression")]
        {
            let decoder = zstd::Decoder::new(file).map_err(|e| {
                DeidError::io(format!("Failed to create decompressor for {}", path.display()), e)
            })?;
            return Ok(Box::new(BufReader::new(decoder)));
        }
        #[cfg(not(feature = "compression"))]
        {
            return Err(DeidError::configuration(
                "Compressed input not available. Compile with --features compression",
            ));
        }
    }

    Ok(Box::new(BufReader::new(file)))
}

/// Iterator over the JSON values of an NDJSON stream.
///
/// Blank lines are skipped. Items carry their 1-based line number.
pub(crate) struct JsonLines<R> {
    reader: R,
    line: usize,
    buffer: String,
}

impl<R: BufRead> JsonLines<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buffer: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for JsonLines<R> {
    type Item = Result<(usize, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            self.line += 1;
            match self.reader.read_line(&mut self.buffer) {
                Ok(0) => return None,
                Ok(_) if self.buffer.trim().is_empty() => {}
                Ok(_) => {
                    let line = self.line;
                    return Some(
                        serde_json::from_str(self.buffer.trim())
                            .map(|value| (line, value))
                            .map_err(|e| {
                                DeidError::serialization(format!("Parsing input line {}", line), e)
                            }),
                    );
                }
                Err(e) => {
                    return Some(Err(DeidError::io(
                        format!("Reading input line {}", self.line),
                        e,
                    )));
                }
            }
        }
    }
}
