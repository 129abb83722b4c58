use std::io::BufRead;

use super::Builtin;
use crate::error::{BatchError, Result};
use crate::eval::Shell;
use crate::parse::parameters;

/// `TYPE file...`: copy files to standard output.
pub struct TypeFile;

impl Builtin for TypeFile {
    fn run(&self, shell: &mut Shell, args: &str) -> Result<Option<i32>> {
        let names = parameters(args);
        if names.is_empty() {
            return Err(BatchError::Syntax);
        }
        for name in names {
            let path = shell.ctx.resolve(&name);
            let reader = shell
                .fs()
                .open(&path)
                .map_err(|source| BatchError::ReadFailed {
                    path: path.clone(),
                    source,
                })?;
            let mut text = String::new();
            for line in reader.split(b'\n') {
                let line = line?;
                text.push_str(String::from_utf8_lossy(&line).trim_end_matches('\r'));
                text.push('\n');
            }
            shell.write_out(&text);
        }
        Ok(None)
    }
}
