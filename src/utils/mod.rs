//! Utility functions shared by both search backends.
//!
//! ## Modules
//!
//! - [`app_data`] - Configuration file and application data directory (XDG-compliant)
//! - [`text`] - Substring tokenizing, case-insensitive matching, root containment
//!
//! ## Key Functions
//!
//! ```
//! use hybridfind::utils::{split_tokens, contains_all_tokens};
//!
//! // "cat  photo" -> ["cat", "photo"]
//! let tokens = split_tokens("cat  photo");
//! assert!(contains_all_tokens("Photo of a Cat.jpg", &tokens));
//! ```

pub mod app_data;
pub mod text;

pub use app_data::*;
pub use text::*;
