//! Normalized token records, their store keys, and redacted secrets.

pub mod key;
pub mod record;
pub mod secret;
