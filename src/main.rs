use ege::logging::{init_logging, LoggingConfig};
use ege::{Engine, EngineInfo, Result, VulkanContext, WinitWindow};

fn load_info() -> Result<EngineInfo> {
    match std::env::args().nth(1) {
        #[cfg(feature = "ege-serde")]
        Some(path) => EngineInfo::from_yaml_file(&path),
        #[cfg(not(feature = "ege-serde"))]
        Some(_) => Err(ege::GPUError::ConfigError(
            "configuration files need the ege-serde feature".into(),
        )),
        None => Ok(EngineInfo::default()),
    }
}

fn run() -> Result<()> {
    let info = load_info()?;
    init_logging(LoggingConfig {
        env_filter: info.log_filter.clone(),
        ..Default::default()
    });

    let window = WinitWindow::new(&info.window)?;
    let ctx = VulkanContext::new(&info.context_info(), window.raw())?;
    log::info!("running on {}", ctx.device_info().name);

    let vertices = info.model.vertices()?;
    let mut engine = Engine::new(ctx, window, &vertices, &info)?;
    engine.run()
}

fn main() {
    if let Err(err) = run() {
        // The logger may not be up if the configuration failed to load.
        eprintln!("ege: {}", err);
        log::error!("{}", err);
        std::process::exit(1);
    }
}
