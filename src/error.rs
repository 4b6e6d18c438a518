/*
 * Copyright 2026 the sfs contributors
 *
 * This file is part of sfs.
 *
 * sfs is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * sfs is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * sfs. If not, see <https://www.gnu.org/licenses/>.
 */

//! Error values returned by the crate's operation surface.
//!
//! Nothing in this crate prints to stderr or calls `exit()`; every failure
//! is surfaced as a value of [`Error`] instead of the global errno-style
//! reporting a command-line tool would use.

use thiserror::Error as ThisError;

/// Every way an operation on a mounted [`crate::Volume`] can fail.
#[derive(Debug, ThisError)]
pub enum Error {
    /// No live entry matches the given path.
    #[error("no such file or directory")]
    NotFound,
    /// An entry already exists at the given path.
    #[error("file or directory already exists")]
    AlreadyExists,
    /// The entry at the given path is not a directory.
    #[error("not a directory")]
    NotADirectory,
    /// The entry at the given path is not a file.
    #[error("not a file")]
    NotAFile,
    /// A directory to be removed or replaced still has live children.
    #[error("directory not empty")]
    NotEmpty,
    /// A path's basename is empty, or it is otherwise not usable as a name.
    #[error("invalid name")]
    InvalidName,
    /// Neither the reusable-slot scan nor the free map's trailing extent had
    /// enough room for the requested allocation.
    #[error("no space left on device")]
    NoSpace,
    /// A record's modular-256 checksum did not sum to zero.
    #[error("checksum mismatch")]
    CorruptChecksum,
    /// A structural invariant of the volume was violated (bad magic,
    /// version, entry ordering, ...).
    #[error("corrupt image: {0}")]
    CorruptImage(&'static str),
    /// The underlying byte stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
