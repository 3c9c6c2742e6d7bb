//! Common functionality for `binstruct`.
//!
//! This crate exposes a set of key types:
//!
//!  - [`ByteView`]: Gives access to binary data in-memory or on the file system, with
//!    bounds-checked little-endian reads at absolute offsets.
//!  - [`OutOfBounds`]: The error returned when a read falls outside of a [`ByteView`].
//!
//! This module is part of the `binstruct` workspace.

#![warn(missing_docs)]

mod byteview;

pub use crate::byteview::*;
