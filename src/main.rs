// =============================================================================
// VULKAN COMPUTE RAY TRACER
// =============================================================================
//
// A compute shader traces the scene into an offscreen storage image every
// frame; the image is then copied into the swapchain and presented.
//
// FRAME FLOW:
// 1. Acquire swapchain image
// 2. Wait for the previous frame's fence
// 3. Update the time uniform
// 4. Record dispatch + layout transitions + copy
// 5. Submit to the compute queue
// 6. Present
//
// =============================================================================

mod backend;
mod config;
mod error;
mod renderer;
mod scene;
mod timing;

use anyhow::Result;
use ash::vk;
use config::Config;
use renderer::RayTracer;
use scene::Scene;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use timing::FrameTimer;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting ray tracer");
    log::info!(
        "Window: {}x{}, shader: {}",
        config.window.width,
        config.window.height,
        config.shader.path.display()
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, Scene::default_room());
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => {
            log::info!("Exited cleanly");
            Ok(())
        }
    }
}

/// Initialize logging, optionally redirected to a fresh log file
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env, Target};

    let mut builder = Builder::new();
    builder.filter_level(config.log_level());
    // RUST_LOG directives take precedence over the configured level
    builder.parse_env(Env::default());

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Vulkan Ray Tracer Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Could not open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Window plus renderer session.
///
/// The renderer is declared before the window so its surface is destroyed
/// while the window still exists.
struct App {
    config: Config,
    scene: Scene,
    renderer: Option<RayTracer>,
    window: Option<Arc<Window>>,
    timer: FrameTimer,
    /// First fatal error; returned from `main` once the event loop exits
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config, scene: Scene) -> Self {
        Self {
            config,
            scene,
            renderer: None,
            window: None,
            timer: FrameTimer::new(Instant::now()),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn render(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match renderer.render_frame() {
            Ok(_) => self.report_frame_time(),
            Err(e) => self.fail(event_loop, e.into()),
        }
    }

    /// Drain in-flight work and leave the event loop
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        let drained = match self.renderer.as_mut() {
            Some(renderer) => renderer.shutdown(),
            None => Ok(()),
        };

        match drained {
            Ok(()) => event_loop.exit(),
            Err(e) => self.fail(event_loop, e.into()),
        }
    }

    fn report_frame_time(&mut self) {
        let Some(report) = self.timer.tick(Instant::now()) else {
            return;
        };

        log::info!("{:.2} ms/frame ({:.0} FPS)", report.ms_per_frame, report.fps());

        if self.config.debug.show_frame_time {
            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.2} ms/frame",
                    self.config.window.title, report.ms_per_frame
                ));
            }
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        let size = window.inner_size();
        let extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };

        match RayTracer::new(window.as_ref(), extent, &self.config, &self.scene) {
            Ok(renderer) => {
                let extent = renderer.extent();
                log::info!("Rendering at {}x{}", extent.width, extent.height);
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                let e = anyhow::Error::new(e).context("Failed to initialize Vulkan");
                self.fail(event_loop, e);
            }
        }
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::RedrawRequested => self.render(event_loop),

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws; the frame loop is paced by presentation.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
