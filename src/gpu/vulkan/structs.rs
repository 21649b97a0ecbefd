use super::device_selector::DeviceType;
#[cfg(feature = "ege-serde")]
use serde::{Deserialize, Serialize};

#[repr(C)]
#[derive(Hash, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ege-serde", derive(Serialize, Deserialize))]
pub enum WindowBuffering {
    #[default]
    Double,
    Triple,
}

impl WindowBuffering {
    pub fn image_count(&self) -> u32 {
        match self {
            WindowBuffering::Double => 2,
            WindowBuffering::Triple => 3,
        }
    }
}

/// Presentation preferences applied every time a swap chain is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ege-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "ege-serde", serde(default))]
pub struct DisplayInfo {
    pub vsync: bool,
    pub buffering: WindowBuffering,
}

impl Default for DisplayInfo {
    fn default() -> Self {
        Self {
            vsync: true,
            buffering: WindowBuffering::Double,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextInfo {
    pub display: DisplayInfo,
    /// Device kind tried first when several physical devices qualify.
    pub preferred_device: DeviceType,
}
