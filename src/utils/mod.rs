pub mod per_frame;
pub use per_frame::PerFrame;
