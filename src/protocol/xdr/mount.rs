//! Program and procedure numbers of the `MOUNT` version 3 protocol
//! (RFC 1813 Appendix I).

// Keep original RFC naming conventions
#![allow(non_camel_case_types)]

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use super::{DeserializeEnum, SerializeEnum};

/// MOUNT program number for RPC
pub const PROGRAM: u32 = 100005;
/// MOUNT protocol version 3
pub const VERSION: u32 = 3;

/// Procedure numbers for the `MOUNT` version 3 protocol
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum MountProgram {
    /// Null procedure for service availability testing
    MOUNTPROC3_NULL = 0,
    /// Mount a file system
    MOUNTPROC3_MNT = 1,
    /// Get list of mounted file systems
    MOUNTPROC3_DUMP = 2,
    /// Unmount a file system
    MOUNTPROC3_UMNT = 3,
    /// Unmount all file systems
    MOUNTPROC3_UMNTALL = 4,
    /// Get list of exported file systems
    MOUNTPROC3_EXPORT = 5,
}
impl SerializeEnum for MountProgram {}
impl DeserializeEnum for MountProgram {}

impl MountProgram {
    /// Short symbolic name of the procedure, e.g. `MNT`.
    pub fn name(self) -> &'static str {
        match self {
            MountProgram::MOUNTPROC3_NULL => "NULL",
            MountProgram::MOUNTPROC3_MNT => "MNT",
            MountProgram::MOUNTPROC3_DUMP => "DUMP",
            MountProgram::MOUNTPROC3_UMNT => "UMNT",
            MountProgram::MOUNTPROC3_UMNTALL => "UMNTALL",
            MountProgram::MOUNTPROC3_EXPORT => "EXPORT",
        }
    }

    /// Looks up a procedure by its number.
    pub fn from_proc(proc: u32) -> Option<Self> {
        Self::from_u32(proc)
    }
}
