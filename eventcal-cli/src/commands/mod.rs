use std::fmt;

/// A problem with what the user asked for, reported as-is without
/// pointing at the error log.
#[derive(Debug)]
pub struct UserError(pub String);

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UserError {}

/// `bail!` for user-facing errors.
macro_rules! user_bail {
    ($($arg:tt)*) => {
        return Err(anyhow::Error::new($crate::commands::UserError(format!($($arg)*))))
    };
}

pub(crate) use user_bail;

pub mod add;
pub mod config;
pub mod list;
pub mod remove;
pub mod watch;
