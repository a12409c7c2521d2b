//! Vulkan Triangle - Main Entry Point
//!
//! Opens a window and spins one colored triangle under an orbit camera.
//!
//! Controls: arrow keys orbit, W/S or +/- zoom, Space toggles
//! auto-rotation, Escape quits. Pass a TOML file path as the first
//! argument to override `triangle.toml`.

use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use triangle_core::{AppConfig, CameraConfig, FrameTimer};
use triangle_platform::{InputState, KeyCode, Window};
use triangle_renderer::{TriangleRenderer, TriangleSettings, WindowPresenter};
use triangle_scene::OrbitCamera;

const DEFAULT_CONFIG_PATH: &str = "triangle.toml";

fn camera_from_config(config: &CameraConfig) -> OrbitCamera {
    let mut camera = OrbitCamera::new(
        config.distance,
        config.pitch.to_radians(),
        config.yaw.to_radians(),
    );
    camera.auto_rotate = config.auto_rotate;
    camera.rotate_speed = config.rotate_speed.to_radians();
    camera.zoom_speed = config.zoom_speed;
    camera
}

/// Field order matters on drop: the renderer's resources go before the
/// presenter's device, and the presenter before the window.
struct Viewer {
    renderer: TriangleRenderer,
    presenter: WindowPresenter,
    window: Window,
}

impl Viewer {
    fn new(event_loop: &ActiveEventLoop, config: &AppConfig) -> Result<Self> {
        let window =
            Window::new(event_loop, &config.window).context("Failed to create window")?;
        let mut presenter =
            WindowPresenter::new(&window, &config.render).context("Failed to create presenter")?;
        info!("Rendering on {}", presenter.device_name());

        let mut renderer = TriangleRenderer::new(
            TriangleSettings::from(&config.render),
            camera_from_config(&config.camera),
        );
        presenter
            .init(&mut renderer)
            .context("Failed to initialize triangle resources")?;

        Ok(Self {
            renderer,
            presenter,
            window,
        })
    }

    fn apply_input(&mut self, input: &InputState, dt: f32) {
        let camera = self.renderer.camera_mut();

        let pitch = input.axis(&[KeyCode::ArrowDown], &[KeyCode::ArrowUp]);
        let yaw = input.axis(&[KeyCode::ArrowLeft], &[KeyCode::ArrowRight]);
        if pitch != 0.0 || yaw != 0.0 {
            let step = camera.rotate_speed * dt;
            camera.rotate(pitch * step, yaw * step);
        }

        let zoom = input.axis(
            &[KeyCode::KeyW, KeyCode::Equal, KeyCode::NumpadAdd],
            &[KeyCode::KeyS, KeyCode::Minus, KeyCode::NumpadSubtract],
        );
        if zoom != 0.0 {
            let step = camera.zoom_speed * dt;
            camera.zoom(zoom * step);
        }

        if input.is_key_just_pressed(KeyCode::Space) {
            camera.toggle_auto_rotate();
            info!("Auto-rotate {}", if camera.auto_rotate { "on" } else { "off" });
        }

        camera.update(dt);
    }

    fn release(&mut self) {
        self.presenter.release(&mut self.renderer);
    }
}

struct App {
    config: AppConfig,
    viewer: Option<Viewer>,
    input: InputState,
    timer: FrameTimer,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            viewer: None,
            input: InputState::new(),
            timer: FrameTimer::new(),
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.failure = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let dt = self.timer.tick();
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };

        viewer.apply_input(&self.input, dt);
        self.input.begin_frame();

        if viewer.window.is_minimized() {
            return;
        }

        if let Err(e) = viewer.presenter.render(&mut viewer.renderer) {
            self.fail(event_loop, anyhow::Error::new(e).context("Frame failed"));
            return;
        }

        if viewer.presenter.take_update_request() {
            viewer.window.request_redraw();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }

        match Viewer::new(event_loop, &self.config) {
            Ok(viewer) => {
                info!("Initialization complete, entering main loop");
                viewer.window.request_redraw();
                self.viewer = Some(viewer);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.presenter.resize(size.width, size.height);
                    viewer.window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        if key == KeyCode::Escape {
                            event_loop.exit();
                        }
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut viewer) = self.viewer.take() {
            viewer.release();
        }
        info!(
            "Rendered {} frame(s), {:.1} fps average",
            self.timer.frame_count(),
            self.timer.average_fps()
        );
    }
}

fn main() -> Result<()> {
    triangle_core::init_logging();
    info!("Starting Vulkan Triangle");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
