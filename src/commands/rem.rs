use super::Builtin;
use crate::error::Result;
use crate::eval::Shell;

/// `REM`: a comment. Leaves the errorlevel alone.
pub struct Rem;

impl Builtin for Rem {
    fn run(&self, _shell: &mut Shell, _args: &str) -> Result<Option<i32>> {
        Ok(None)
    }
}
