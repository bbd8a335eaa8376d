//! Terminal output for rbpack commands
//!
//! Uses `cliclack` for styled output in interactive terminals and falls
//! back to plain, prefixed lines in CI and build containers, where most
//! builds actually run.
//!
//! # Example
//!
//! ```rust,ignore
//! use rbpack::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect().with_auto_yes(args.yes);
//!
//! ui::intro(&ctx, "Building /app");
//! ui::step_ok_detail(&ctx, "Using ruby-3.2.4", "from Gemfile.lock");
//!
//! if ui::confirm(&ctx, "Clear the cache?", false).await? {
//!     let mut spinner = TaskSpinner::new(&ctx);
//!     spinner.start("Clearing cache...");
//!     spinner.stop("Cache cleared");
//! }
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, outro_success, remark, step_info, step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::TaskSpinner;
pub use prompts::confirm;
pub use theme::init_theme;
