//! Compiled-file persistence.
//!
//! # Modules
//!
//! - [`value`]: Value graph node kinds
//! - [`varint`]: Byte reader and LEB128 varints
//! - [`float`]: Textual float encoding
//! - [`marshal`]: Tagged recursive marshaller
//! - [`compiled_method`]: The 14-field compiled method record
//! - [`checksum`]: Body digest
//! - [`file`]: Header, lazy body, dump and load
//! - [`errors`]: Compiled-file error type

pub mod checksum;
pub mod compiled_method;
pub mod errors;
pub mod file;
pub mod float;
pub mod marshal;
pub mod value;
pub mod varint;
