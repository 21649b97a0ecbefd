pub mod engine;
pub mod geometry;
pub mod gpu;
pub mod logging;
pub mod utils;
pub mod window;

pub use engine::{Engine, EngineInfo, EngineState, ModelSource};
pub use gpu::*;
pub use window::{Window, WindowInfo, WinitWindow};
