//! Terminal output for the CLI
//!
//! Styled steps and spinners in an interactive terminal, plain bracketed
//! lines in CI and when output is piped.
//!
//! ```rust,ignore
//! use offcache::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Installing portfolio-v1.0.0...");
//! // ... do work ...
//! spinner.stop("Installed portfolio-v1.0.0");
//!
//! ui::key_value(&ctx, "Source", "cache");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    key_value, key_value_status, remark, section, step_info, step_ok, step_ok_detail, step_warn,
    step_warn_hint,
};
pub use progress::TaskSpinner;
