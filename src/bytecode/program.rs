//! Module file format.
//!
//! ```text
//! offset 0:  version-major   u16 LE
//! offset 2:  version-minor   u16 LE
//! offset 4:  version-patch   u16 LE
//! offset 6:  program-size    u32 LE  (byte length of the instruction stream)
//! offset 10: instruction stream
//! ```
//!
//! The program-size field is advisory. Readers take the instruction stream to
//! be everything after the header and only report a disagreement between the
//! declared and actual length, so a wrong size never hides instructions.

use crate::bytecode::errors::VMError;
use crate::bytecode::version::{Compatibility, Version, VersionPolicy};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use stackvm_derive::BinaryCodec;
use std::fs;
use std::path::Path;

/// Encoded size of [`Header`].
pub const HEADER_LEN: usize = 10;

/// Fixed-size module header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub struct Header {
    pub version: Version,
    pub program_size: u32,
}

impl Header {
    /// Decodes the header from the start of `bytes`, returning the rest.
    pub fn parse(bytes: &[u8]) -> Result<(Header, &[u8]), VMError> {
        let mut input = bytes;
        let header = Header::decode(&mut input).map_err(|e| match e {
            DecodeError::UnexpectedEof { .. } => VMError::TruncatedHeader {
                expected: HEADER_LEN,
                actual: bytes.len(),
            },
        })?;
        Ok((header, input))
    }
}

/// A header plus the instruction stream it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub header: Header,
    pub code: Vec<u8>,
}

impl Module {
    /// Builds a module whose program size is the length of `code`.
    pub fn new(version: Version, code: Vec<u8>) -> Result<Self, VMError> {
        let program_size = u32::try_from(code.len()).map_err(|_| VMError::ProgramTooLarge {
            size: code.len(),
            max: u32::MAX as usize,
        })?;
        Ok(Self {
            header: Header {
                version,
                program_size,
            },
            code,
        })
    }

    /// True when the declared program size equals the stream length.
    pub fn size_matches(&self) -> bool {
        self.header.program_size as usize == self.code.len()
    }
}

impl Encode for Module {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.header.encode(out);
        out.write(&self.code);
    }
}

/// Serializes instruction streams under a fixed format version.
#[derive(Debug, Clone, Copy)]
pub struct ModuleWriter {
    version: Version,
}

impl ModuleWriter {
    pub const fn new(version: Version) -> Self {
        Self { version }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Wraps `code` in a header and returns the module bytes.
    pub fn to_bytes(&self, code: &[u8]) -> Result<Vec<u8>, VMError> {
        Ok(Module::new(self.version, code.to_vec())?.to_bytes())
    }

    /// Writes the module to `path`, creating or truncating the file.
    ///
    /// A failed write may leave a partial file behind.
    pub fn write_file<P: AsRef<Path>>(&self, path: P, code: &[u8]) -> Result<(), VMError> {
        let path_ref = path.as_ref();
        let bytes = self.to_bytes(code)?;
        fs::write(path_ref, bytes).map_err(|e| VMError::IoError {
            path: path_ref.display().to_string(),
            source: e.to_string(),
        })
    }
}

impl Default for ModuleWriter {
    fn default() -> Self {
        Self::new(Version::default())
    }
}

/// A module that passed the version gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub module: Module,
    pub compatibility: Compatibility,
}

/// Parses module bytes and applies a [`VersionPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleReader {
    policy: VersionPolicy,
}

impl ModuleReader {
    pub const fn new(policy: VersionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> VersionPolicy {
        self.policy
    }

    /// Parses the header, checks the version and takes the remaining bytes as code.
    ///
    /// Minor drift and a program-size mismatch are logged as warnings.
    pub fn read_bytes(&self, bytes: &[u8]) -> Result<LoadedModule, VMError> {
        let (header, code) = Header::parse(bytes)?;
        let compatibility = self.policy.check(header.version)?;

        if let Compatibility::MinorDrift { supported, found } = compatibility {
            crate::warn!(
                "module version {} is newer than supported: expected minor <= {}, found {}",
                header.version,
                supported,
                found
            );
        }

        let module = Module {
            header,
            code: code.to_vec(),
        };

        if !module.size_matches() {
            crate::warn!(
                "program size field says {} bytes but {} bytes follow the header",
                header.program_size,
                module.code.len()
            );
        }

        Ok(LoadedModule {
            module,
            compatibility,
        })
    }

    /// Reads and parses a module file.
    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<LoadedModule, VMError> {
        let path_ref = path.as_ref();
        let bytes = fs::read(path_ref).map_err(|e| VMError::IoError {
            path: path_ref.display().to_string(),
            source: e.to_string(),
        })?;
        self.read_bytes(&bytes)
    }
}
