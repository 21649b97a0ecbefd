use super::{Window, WindowInfo};
use crate::{Extent2D, GPUError, Result};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::WindowBuilder;

/// winit window whose event loop is pumped by the caller instead of owning
/// the thread.
pub struct WinitWindow {
    event_loop: EventLoop<()>,
    window: winit::window::Window,
    close_requested: bool,
    resized: bool,
}

impl WinitWindow {
    pub fn new(info: &WindowInfo) -> Result<Self> {
        let event_loop = EventLoop::new();
        let window = WindowBuilder::new()
            .with_title(info.title.clone())
            .with_inner_size(PhysicalSize::new(info.size[0], info.size[1]))
            .with_resizable(info.resizable)
            .build(&event_loop)
            .map_err(|e| GPUError::WindowError(e.to_string()))?;

        log::info!(
            "opened window '{}' ({}x{})",
            info.title,
            info.size[0],
            info.size[1]
        );

        Ok(Self {
            event_loop,
            window,
            close_requested: false,
            resized: false,
        })
    }

    /// Underlying winit window, e.g. to create a Vulkan surface.
    pub fn raw(&self) -> &winit::window::Window {
        &self.window
    }

    fn pump(&mut self, block: bool) {
        let id = self.window.id();
        let close_requested = &mut self.close_requested;
        let resized = &mut self.resized;
        let mut handled = false;

        self.event_loop.run_return(|event, _target, control_flow| {
            if let Event::WindowEvent { event, window_id } = event {
                if window_id == id {
                    handled = true;
                    match event {
                        WindowEvent::CloseRequested => *close_requested = true,
                        WindowEvent::KeyboardInput {
                            input:
                                KeyboardInput {
                                    virtual_keycode: Some(VirtualKeyCode::Escape),
                                    state: ElementState::Pressed,
                                    ..
                                },
                            ..
                        } => *close_requested = true,
                        WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                            *resized = true
                        }
                        _ => {}
                    }
                }
            }

            *control_flow = if block && !handled {
                ControlFlow::Wait
            } else {
                ControlFlow::Exit
            };
        });
    }
}

impl Window for WinitWindow {
    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn extent(&self) -> Extent2D {
        let size = self.window.inner_size();
        Extent2D::new(size.width, size.height)
    }

    fn was_resized(&self) -> bool {
        self.resized
    }

    fn reset_resized_flag(&mut self) {
        self.resized = false;
    }

    fn poll_events(&mut self) {
        self.pump(false);
    }

    fn wait_events(&mut self) {
        self.pump(true);
    }
}
