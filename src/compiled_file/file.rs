//! Compiled file container: three header lines and a lazily decoded body.
//!
//! ```text
//! !RBIX\n
//! 0\n
//! <checksum>\n
//! <marshalled compiled method>
//! ```
//!
//! The header is parsed and validated when a file is loaded, so a magic or
//! version mismatch is reported before the body is touched. The body is
//! unmarshalled on first access and cached.

use crate::compiled_file::checksum::{Checksum, UNCHECKED};
use crate::compiled_file::compiled_method::CompiledMethod;
use crate::compiled_file::errors::CompiledFileError;
use crate::compiled_file::marshal::{Marshal, unmarshal_with};
use crate::compiled_file::value::Value;
use crate::compiled_file::varint::Reader;
use crate::config::Config;
use crate::{debug, warn};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::OnceLock;

/// Magic string on the first header line.
pub const MAGIC: &str = "!RBIX";

/// Container format version on the second header line.
pub const FORMAT_VERSION: u64 = 0;

/// Result of [`dump`] when no error is raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpOutcome {
    /// The file was written.
    Written { bytes: usize },
    /// The destination was not writable; nothing was written.
    Skipped,
}

/// A loaded compiled file.
#[derive(Debug)]
pub struct CompiledFile {
    magic: String,
    version: u64,
    checksum: String,
    body: Vec<u8>,
    config: Config,
    decoded: OnceLock<Value>,
}

impl CompiledFile {
    /// Parses and validates the header of `bytes`. The body is not decoded.
    pub fn from_bytes(bytes: &[u8], config: &Config) -> Result<Self, CompiledFileError> {
        let mut reader = Reader::new(bytes);
        let magic = header_line(&mut reader, "magic")?;
        let version_line = header_line(&mut reader, "version")?;
        let checksum = header_line(&mut reader, "checksum")?;

        if magic != MAGIC {
            return Err(CompiledFileError::UnsupportedVersion {
                what: "file magic",
                found: magic,
            });
        }
        let version = version_line
            .parse::<u64>()
            .map_err(|_| CompiledFileError::BadHeader {
                reason: format!("version {version_line:?} is not an integer"),
            })?;
        if version != FORMAT_VERSION {
            return Err(CompiledFileError::UnsupportedVersion {
                what: "file format",
                found: version.to_string(),
            });
        }

        Ok(Self {
            magic,
            version,
            checksum,
            body: reader.rest().to_vec(),
            config: config.clone(),
            decoded: OnceLock::new(),
        })
    }

    /// Reads and validates the header of the file at `path`.
    pub fn load(path: impl AsRef<Path>, config: &Config) -> Result<Self, CompiledFileError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| io_error(path, &e))?;
        Self::from_bytes(&bytes, config)
    }

    pub fn magic(&self) -> &str {
        &self.magic
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Checksum header line: hex digest or [`UNCHECKED`].
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Undecoded body bytes.
    pub fn raw_body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the body has been decoded yet.
    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    /// Decoded body, unmarshalled on first call.
    pub fn body(&self) -> Result<&Value, CompiledFileError> {
        if let Some(value) = self.decoded.get() {
            return Ok(value);
        }
        let value = self.decode_body()?;
        Ok(self.decoded.get_or_init(|| value))
    }

    /// Decoded body as a compiled method.
    pub fn method(&self) -> Result<&CompiledMethod, CompiledFileError> {
        let body = self.body()?;
        body.as_method()
            .ok_or(CompiledFileError::UnexpectedKind {
                expected: "compiled method",
                found: body.kind_name(),
            })
    }

    fn decode_body(&self) -> Result<Value, CompiledFileError> {
        if self.config.verify_checksum && self.checksum != UNCHECKED {
            let actual = Checksum::of(&self.body);
            if !actual.matches_header(&self.checksum) {
                return Err(CompiledFileError::ChecksumMismatch {
                    expected: self.checksum.clone(),
                    actual: actual.to_string(),
                });
            }
        }
        debug!("decoding {} byte compiled file body", self.body.len());
        unmarshal_with(&self.body, &self.config)
    }
}

/// Reads one header line, trimming surrounding whitespace.
fn header_line(reader: &mut Reader<'_>, field: &str) -> Result<String, CompiledFileError> {
    let line = reader
        .read_line()
        .map_err(|_| CompiledFileError::BadHeader {
            reason: format!("missing {field} line"),
        })?;
    let text = std::str::from_utf8(line).map_err(|_| CompiledFileError::BadHeader {
        reason: format!("{field} line is not valid UTF-8"),
    })?;
    Ok(text.trim().to_string())
}

fn io_error(path: &Path, err: &io::Error) -> CompiledFileError {
    CompiledFileError::IoError {
        path: path.display().to_string(),
        source: err.to_string(),
    }
}

/// Serializes `method` into the compiled-file layout.
pub fn encode_file(method: &CompiledMethod) -> Vec<u8> {
    let mut body = Vec::new();
    method.marshal(&mut body);
    let checksum = Checksum::of(&body);

    let mut out = Vec::with_capacity(body.len() + 96);
    out.extend_from_slice(format!("{MAGIC}\n{FORMAT_VERSION}\n{checksum}\n").as_bytes());
    out.extend_from_slice(&body);
    out
}

/// Writes `method` to `path`.
///
/// A destination that cannot be written for lack of permission is not an
/// error: the write is skipped and [`DumpOutcome::Skipped`] is returned, so
/// callers keep running from the in-memory method. Every other I/O failure is
/// raised.
pub fn dump(method: &CompiledMethod, path: impl AsRef<Path>) -> Result<DumpOutcome, CompiledFileError> {
    dump_with(method, path.as_ref(), |path| File::create(path))
}

/// [`dump`] with the destination opened by `create`.
fn dump_with(
    method: &CompiledMethod,
    path: &Path,
    create: impl FnOnce(&Path) -> io::Result<File>,
) -> Result<DumpOutcome, CompiledFileError> {
    let bytes = encode_file(method);
    let written = create(path).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.flush()
    });
    match written {
        Ok(()) => {
            debug!("wrote {} bytes to {}", bytes.len(), path.display());
            Ok(DumpOutcome::Written { bytes: bytes.len() })
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!("skipping compiled file {}: {e}", path.display());
            Ok(DumpOutcome::Skipped)
        }
        Err(e) => Err(io_error(path, &e)),
    }
}

/// Reads the compiled file at `path`; see [`CompiledFile::load`].
pub fn load(path: impl AsRef<Path>, config: &Config) -> Result<CompiledFile, CompiledFileError> {
    CompiledFile::load(path, config)
}
