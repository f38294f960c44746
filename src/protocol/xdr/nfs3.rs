//! Program and procedure numbers of the NFS version 3 protocol (RFC 1813).

// Keep original RFC naming conventions
#![allow(non_camel_case_types)]

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use super::{DeserializeEnum, SerializeEnum};

/// NFS program number for RPC
pub const PROGRAM: u32 = 100003;
/// NFS protocol version 3
pub const VERSION: u32 = 3;

/// Procedure numbers for the NFS version 3 protocol
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum NFSProgram {
    /// Do nothing - used primarily for performance measurement
    NFSPROC3_NULL = 0,
    /// Get file attributes
    NFSPROC3_GETATTR = 1,
    /// Set file attributes
    NFSPROC3_SETATTR = 2,
    /// Look up filename
    NFSPROC3_LOOKUP = 3,
    /// Check file access permission
    NFSPROC3_ACCESS = 4,
    /// Read from symbolic link
    NFSPROC3_READLINK = 5,
    /// Read from file
    NFSPROC3_READ = 6,
    /// Write to file
    NFSPROC3_WRITE = 7,
    /// Create file
    NFSPROC3_CREATE = 8,
    /// Create directory
    NFSPROC3_MKDIR = 9,
    /// Create symbolic link
    NFSPROC3_SYMLINK = 10,
    /// Create special device
    NFSPROC3_MKNOD = 11,
    /// Remove file
    NFSPROC3_REMOVE = 12,
    /// Remove directory
    NFSPROC3_RMDIR = 13,
    /// Rename file or directory
    NFSPROC3_RENAME = 14,
    /// Create hard link
    NFSPROC3_LINK = 15,
    /// Read directory
    NFSPROC3_READDIR = 16,
    /// Extended read directory
    NFSPROC3_READDIRPLUS = 17,
    /// Get file system statistics
    NFSPROC3_FSSTAT = 18,
    /// Get file system information
    NFSPROC3_FSINFO = 19,
    /// Get POSIX information
    NFSPROC3_PATHCONF = 20,
    /// Commit cached data to stable storage
    NFSPROC3_COMMIT = 21,
}
impl SerializeEnum for NFSProgram {}
impl DeserializeEnum for NFSProgram {}

impl NFSProgram {
    /// Short symbolic name of the procedure, e.g. `GETATTR`.
    pub fn name(self) -> &'static str {
        match self {
            NFSProgram::NFSPROC3_NULL => "NULL",
            NFSProgram::NFSPROC3_GETATTR => "GETATTR",
            NFSProgram::NFSPROC3_SETATTR => "SETATTR",
            NFSProgram::NFSPROC3_LOOKUP => "LOOKUP",
            NFSProgram::NFSPROC3_ACCESS => "ACCESS",
            NFSProgram::NFSPROC3_READLINK => "READLINK",
            NFSProgram::NFSPROC3_READ => "READ",
            NFSProgram::NFSPROC3_WRITE => "WRITE",
            NFSProgram::NFSPROC3_CREATE => "CREATE",
            NFSProgram::NFSPROC3_MKDIR => "MKDIR",
            NFSProgram::NFSPROC3_SYMLINK => "SYMLINK",
            NFSProgram::NFSPROC3_MKNOD => "MKNOD",
            NFSProgram::NFSPROC3_REMOVE => "REMOVE",
            NFSProgram::NFSPROC3_RMDIR => "RMDIR",
            NFSProgram::NFSPROC3_RENAME => "RENAME",
            NFSProgram::NFSPROC3_LINK => "LINK",
            NFSProgram::NFSPROC3_READDIR => "READDIR",
            NFSProgram::NFSPROC3_READDIRPLUS => "READDIRPLUS",
            NFSProgram::NFSPROC3_FSSTAT => "FSSTAT",
            NFSProgram::NFSPROC3_FSINFO => "FSINFO",
            NFSProgram::NFSPROC3_PATHCONF => "PATHCONF",
            NFSProgram::NFSPROC3_COMMIT => "COMMIT",
        }
    }

    /// Looks up a procedure by its number.
    pub fn from_proc(proc: u32) -> Option<Self> {
        Self::from_u32(proc)
    }
}
