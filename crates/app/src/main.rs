//! Demo application: a spinning textured model.
//!
//! Owns the winit event loop and forwards lifecycle events to the
//! renderer. A rendering error that reaches this layer is fatal: the
//! loop exits and the error becomes the process exit status.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use ember_core::EngineConfig;
use ember_platform::Window;
use ember_render::Renderer;

struct App {
    config: EngineConfig,
    window: Option<Window>,
    renderer: Option<Renderer>,
    /// Error that ended the loop, surfaced as the process result.
    exit_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            exit_error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(
            event_loop,
            self.config.window_width,
            self.config.window_height,
            &self.config.window_title,
        )?;
        let renderer = Renderer::new(&window, &self.config)?;

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        error!("{:#}", error);
        self.exit_error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Desktop platforms resume exactly once
        if self.window.is_some() {
            return;
        }

        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => self.fail(event_loop, e.context("initialization failed")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(ref mut renderer) = self.renderer {
                    if let Err(e) = renderer.render_frame() {
                        self.fail(event_loop, anyhow::Error::from(e).context("render failed"));
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    ember_core::init_logging();
    info!("Starting ember");

    let event_loop = EventLoop::new()?;
    // Redraw continuously; the frame loop paces itself on the GPU
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(EngineConfig::default());
    event_loop.run_app(&mut app)?;

    match app.exit_error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
