use std::io;

use thiserror::Error;

use crate::firewall::ParseError;

/// Failure surfaced by the DAO layer.
///
/// Loader errors pass through the memoizing caches untouched, so callers see
/// the same variant the loader produced.
#[derive(Debug, Error)]
pub enum DaoError {
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    #[error("malformed data: {0}")]
    Parse(#[from] ParseError),

    #[error("start index {start} is past end index {end}")]
    InvalidRange { start: usize, end: usize },

    #[error("start index {start} is out of range for {total} entries")]
    OutOfRange { start: usize, total: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_errors_convert() {
        let io: DaoError = io::Error::new(io::ErrorKind::NotFound, "job.xml").into();
        assert!(matches!(io, DaoError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));

        let parse: DaoError = ParseError::new("bad port").into();
        assert_eq!(parse.to_string(), "malformed data: bad port");
    }

    #[test]
    fn range_errors_name_the_bounds() {
        let err = DaoError::OutOfRange { start: 9, total: 3 };
        assert_eq!(err.to_string(), "start index 9 is out of range for 3 entries");
    }
}
