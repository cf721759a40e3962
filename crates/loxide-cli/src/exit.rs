//! Process exit codes. See spec.md §6: usage/IO/compile/runtime failures
//! each get a distinct BSD `sysexits.h`-style code so scripts invoking
//! `loxide` can branch on failure category.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    /// Wrong number of command-line arguments.
    Usage,
    /// The script file could not be read.
    IoError,
    /// The script failed to compile.
    DataError,
    /// The script compiled but raised a runtime error.
    SoftwareError,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        match code {
            ExitCode::Ok => 0,
            ExitCode::Usage => 64,
            ExitCode::DataError => 65,
            ExitCode::IoError => 74,
            ExitCode::SoftwareError => 70,
        }
    }
}
