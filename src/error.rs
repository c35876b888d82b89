use crate::Status;
use nom::error::ErrorKind as NomErrorKind;

/// Helper alias for nom's default error type.
pub type NomError<I> = nom::error::Error<I>;

/// Result type used throughout the crate. Failures are classified by
/// [`Status`]; only `Status::Error` is a true error, the remaining variants
/// are control-flow outcomes.
pub type Result<T> = std::result::Result<T, Status>;

impl<T> From<Result<T>> for Status {
    fn from(res: Result<T>) -> Status {
        match res {
            Ok(_) => Status::Ok,
            Err(e) => e,
        }
    }
}

impl From<Status> for Result<()> {
    fn from(status: Status) -> Result<()> {
        if status == Status::Ok {
            Ok(())
        } else {
            Err(status)
        }
    }
}

impl From<std::io::Error> for Status {
    fn from(_: std::io::Error) -> Self {
        Status::Error
    }
}

impl<I: std::fmt::Debug> From<nom::Err<NomError<I>>> for Status {
    fn from(_: nom::Err<NomError<I>>) -> Self {
        Status::Error
    }
}

impl From<NomErrorKind> for Status {
    fn from(_: NomErrorKind) -> Self {
        Status::Error
    }
}
