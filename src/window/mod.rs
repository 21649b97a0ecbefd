use crate::Extent2D;
#[cfg(feature = "ege-serde")]
use serde::{Deserialize, Serialize};

mod winit_window;
pub use winit_window::WinitWindow;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ege-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "ege-serde", serde(default))]
pub struct WindowInfo {
    pub title: String,
    pub size: [u32; 2],
    pub resizable: bool,
}

impl Default for WindowInfo {
    fn default() -> Self {
        Self {
            title: "Enchanted Engine".to_string(),
            size: [800, 600],
            resizable: true,
        }
    }
}

/// Display surface the engine renders into.
///
/// The engine polls once per frame and only blocks in [`Window::wait_events`]
/// while the surface has zero area.
pub trait Window {
    /// True once the user asked to close the window.
    fn should_close(&self) -> bool;

    /// Current drawable size in physical pixels.
    fn extent(&self) -> Extent2D;

    /// True if the surface changed size since the flag was last reset.
    fn was_resized(&self) -> bool;

    fn reset_resized_flag(&mut self);

    /// Processes pending events without blocking.
    fn poll_events(&mut self);

    /// Blocks until at least one event arrives, then processes it.
    fn wait_events(&mut self);
}
