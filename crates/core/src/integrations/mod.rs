pub mod hue;
pub mod macos;
pub mod vaillant;

use crate::error::{ToolError, ToolResult};

pub use hue::{clamp_brightness, clamp_color_temp, HueAdapter, HueBridge, LightUpdate};
pub use macos::MacOsAdapter;
pub use vaillant::{HeatingCloud, HeatingSession, MyVaillantCloud, VaillantAdapter};

/// Selection policy for single-system households: always act on the first entry.
pub fn select_primary<'a, T>(items: &'a [T], what: &str) -> ToolResult<&'a T> {
    items
        .first()
        .ok_or_else(|| ToolError::Missing(format!("no {} found", what)))
}
