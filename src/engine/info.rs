use crate::{
    geometry, window::WindowInfo, ClearValues, ContextInfo, DisplayInfo, GPUError, Result,
    ShaderPaths, Vertex,
};
#[cfg(feature = "ege-serde")]
use serde::{Deserialize, Serialize};

/// Vertex data the engine uploads at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ege-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "ege-serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum ModelSource {
    #[default]
    Triangle,
    Sierpinski { level: u32 },
}

impl ModelSource {
    /// Vertices to upload. Sierpinski levels above
    /// [`geometry::MAX_SIERPINSKI_LEVEL`] are a [`GPUError::ConfigError`].
    pub fn vertices(&self) -> Result<Vec<Vertex>> {
        match self {
            ModelSource::Triangle => Ok(geometry::triangle()),
            ModelSource::Sierpinski { level } => geometry::sierpinski_vertices(*level),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ModelSource::Sierpinski { level } if *level > geometry::MAX_SIERPINSKI_LEVEL => {
                Err(GPUError::ConfigError(format!(
                    "sierpinski level {} exceeds the maximum of {}",
                    level,
                    geometry::MAX_SIERPINSKI_LEVEL
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Startup configuration for the engine and its collaborators.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "ege-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "ege-serde", serde(default))]
pub struct EngineInfo {
    pub window: WindowInfo,
    pub display: DisplayInfo,
    pub shaders: ShaderPaths,
    pub clear: ClearValues,
    pub model: ModelSource,
    /// `env_logger` filter; `RUST_LOG` applies when unset.
    pub log_filter: Option<String>,
}

impl EngineInfo {
    pub fn context_info(&self) -> ContextInfo {
        ContextInfo {
            display: self.display,
            ..Default::default()
        }
    }
}

#[cfg(feature = "ege-serde")]
impl EngineInfo {
    pub fn from_yaml(s: &str) -> Result<Self> {
        let info: Self =
            serde_yaml::from_str(s).map_err(|e| GPUError::ConfigError(e.to_string()))?;
        info.model.validate()?;
        Ok(info)
    }

    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_yaml(&s)
    }
}
