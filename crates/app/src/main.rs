//! Demo binary: a fixed-size window presenting a static triangle.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vk2d_platform::Window;
use vk2d_renderer::{Renderer, DEFAULT_FRAMES_IN_FLIGHT};
use vk2d_rhi::vertex::Vertex;

const WINDOW_WIDTH: u32 = 1024;
const WINDOW_HEIGHT: u32 = 720;

/// One triangle in clip space, uploaded once at startup.
const TRIANGLE: [Vertex; 3] = [
    Vertex::new(0.0, -0.5),
    Vertex::new(0.5, 0.5),
    Vertex::new(-0.5, 0.5),
];

#[derive(Default)]
struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, "vk2d")
            .map_err(|e| anyhow::anyhow!("window creation failed: {}", e))?;
        let renderer = Renderer::new(&window, &TRIANGLE, DEFAULT_FRAMES_IN_FLIGHT)?;

        info!("Initialization complete, entering main loop");
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            error!("Startup failed: {:?}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(e) = renderer.draw_frame() {
                        error!("Render error: {:?}", e);
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    vk2d_core::init_logging();
    info!("Starting vk2d");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    event_loop.run_app(&mut app)?;

    Ok(())
}
