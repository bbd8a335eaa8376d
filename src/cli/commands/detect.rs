//! Detect command - report whether a directory is a Ruby application

use crate::cli::args::DetectArgs;
use crate::error::{RbpackError, RbpackResult};
use crate::lockfile::{is_ruby_app, GEMFILE_NAME};

/// Execute the detect command
pub async fn execute(args: DetectArgs) -> RbpackResult<()> {
    if !args.build_dir.is_dir() {
        return Err(RbpackError::PathNotFound(args.build_dir));
    }
    if !is_ruby_app(&args.build_dir) {
        return Err(RbpackError::User(format!(
            "No {} found in {}",
            GEMFILE_NAME,
            args.build_dir.display()
        )));
    }

    println!("Ruby");
    Ok(())
}
