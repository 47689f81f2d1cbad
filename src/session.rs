//! Keys in the browser session.

/// One-shot message shown on the next rendered page.
pub const ALERT: &str = "alert";

/// The visitor's auth session: token pair and user.
pub const AUTH: &str = "auth";
