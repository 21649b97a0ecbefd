use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GPUError {
    #[error("Vulkan Error: {0}")]
    VulkanError(#[from] vk::Result),
    #[error("failed to load the Vulkan library: {0}")]
    LoadingError(#[from] ash::LoadingError),
    #[error("window system error: {0}")]
    WindowError(String),
    #[error("a headless context cannot present to a display")]
    HeadlessDisplayNotSupported,
    #[error("no physical device supports graphics, presentation and swap chains")]
    NoSuitableDevice,
    #[error("surface creation failed: {0}")]
    SurfaceCreationError(String),
    #[error("pipeline build failed: {0}")]
    PipelineBuildError(String),
    #[error("buffer creation failed: {0}")]
    BufferCreationError(String),
    #[error("failed to acquire swap chain image: {0}")]
    AcquireError(vk::Result),
    #[error("failed to record command buffer: {0}")]
    RecordingError(vk::Result),
    #[error("failed to submit or present swap chain image: {0}")]
    SubmitError(vk::Result),
    #[error("image index {index} is out of range for a chain of {count} images")]
    ImageIndexOutOfRange { index: u32, count: usize },
    #[error("invalid configuration: {0}")]
    ConfigError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GPUError {
    /// True for failures while constructing the surface chain, a pipeline or
    /// a buffer. These abort startup.
    pub fn is_creation_error(&self) -> bool {
        matches!(
            self,
            GPUError::SurfaceCreationError(_)
                | GPUError::PipelineBuildError(_)
                | GPUError::BufferCreationError(_)
                | GPUError::HeadlessDisplayNotSupported
        )
    }
}

/// Convenient crate-wide result type.
pub type Result<T, E = GPUError> = std::result::Result<T, E>;
