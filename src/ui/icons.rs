//! Shared status icons.
//!
//! Each icon falls back to a bracketed tag on terminals without emoji support.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[SKIP]");
pub static PAUSE: Emoji<'_, '_> = Emoji("⏸️  ", "[PAUSE]");
pub static ALERT: Emoji<'_, '_> = Emoji("🚨 ", "[!]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
