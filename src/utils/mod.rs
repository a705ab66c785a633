//! Utility functions shared across the crate.
//!
//! ## Modules
//!
//! - [`app_data`] - Configuration stored in the app data directory (XDG-compliant)
//! - [`encoding`] - Encoders for the formats [`DataInput`](crate::store::DataInput) decodes
//!
//! ```no_run
//! use segdir::utils::{encode_vint, put_long};
//!
//! let mut buf = Vec::new();
//! put_long(0x0102_0304_0506_0708, &mut buf);
//! encode_vint(300, &mut buf);
//! // buf = [1, 2, 3, 4, 5, 6, 7, 8, 0xAC, 0x02]
//! ```

pub mod app_data;
pub mod encoding;

pub use app_data::*;
pub use encoding::*;
