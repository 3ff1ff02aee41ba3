use std::collections::HashSet;
use std::num::NonZeroU32;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::camera::Camera;
use crate::raycaster::Viewport;
use crate::scaler::Upscaler;
use crate::world::World;

mod camera;
mod entity;
mod level;
mod lighting;
mod pathfind;
mod raycaster;
mod rng;
mod scaler;
mod sprite;
mod texture;
mod world;

/// Simulation advances in whole ticks; accumulated lag drains here.
const TICK: Duration = Duration::from_micros(16_667);
/// Cap so a stall doesn't trigger a catch-up avalanche
const MAX_FRAME_LAG: Duration = Duration::from_millis(100);

const MOVE_PER_TICK: f32 = 0.06;
const TURN_PER_TICK: f32 = 0.045;
const LOOK_PER_TICK: f32 = 0.025;
const INTERNAL_HEIGHT: usize = 480;

struct App {
    window: Option<Rc<Window>>,
    surface: Option<softbuffer::Surface<Rc<Window>, Rc<Window>>>,
    world: World,
    camera: Camera,

    // Internal render target + per-column depth
    fb_small: Vec<u32>,
    depth: Vec<f32>,
    viewport: Viewport,
    upscaler: Upscaler,

    keys_down: HashSet<KeyCode>,
    fire_latch: bool,
    use_latch: bool,
    dead_logged: bool,

    last_tick: Instant,
    lag: Duration,
    frame_counter: u32,
    last_fps_log: Instant,
}

impl App {
    fn new(world: World, camera: Camera) -> Self {
        let viewport = Viewport::new(640, INTERNAL_HEIGHT);
        Self {
            window: None,
            surface: None,
            world,
            camera,
            fb_small: vec![0; 640 * INTERNAL_HEIGHT],
            depth: vec![0.0; 640],
            viewport,
            upscaler: Upscaler::empty(),
            keys_down: HashSet::new(),
            fire_latch: false,
            use_latch: false,
            dead_logged: false,
            last_tick: Instant::now(),
            lag: Duration::ZERO,
            frame_counter: 0,
            last_fps_log: Instant::now(),
        }
    }

    /// Drain accumulated lag in whole-tick increments.
    fn pump_simulation(&mut self) {
        let now = Instant::now();
        let mut elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;
        if elapsed > MAX_FRAME_LAG {
            elapsed = MAX_FRAME_LAG;
        }
        self.lag += elapsed;
        while self.lag >= TICK {
            self.simulate_tick();
            self.lag -= TICK;
        }
    }

    fn simulate_tick(&mut self) {
        if self.world.player.alive() {
            self.handle_input();
        } else if !self.dead_logged {
            self.dead_logged = true;
            warn!("player died");
        }
        self.world.tick(self.camera.pos);
    }

    fn handle_input(&mut self) {
        let mut forward = 0.0;
        let mut strafe = 0.0;
        if self.keys_down.contains(&KeyCode::KeyW) {
            forward += 1.0;
        }
        if self.keys_down.contains(&KeyCode::KeyS) {
            forward -= 1.0;
        }
        if self.keys_down.contains(&KeyCode::KeyD) {
            strafe += 1.0;
        }
        if self.keys_down.contains(&KeyCode::KeyA) {
            strafe -= 1.0;
        }
        if forward != 0.0 || strafe != 0.0 {
            let dir = self.camera.dir;
            let right = -dir.perp();
            let delta =
                (dir * forward + right * strafe).normalize_or_zero() * MOVE_PER_TICK;
            self.camera.pos = self.world.slide_move(self.camera.pos, delta);
        }

        let mut turn = 0.0;
        if self.keys_down.contains(&KeyCode::KeyQ) || self.keys_down.contains(&KeyCode::ArrowLeft)
        {
            turn -= 1.0;
        }
        if self.keys_down.contains(&KeyCode::KeyE) || self.keys_down.contains(&KeyCode::ArrowRight)
        {
            turn += 1.0;
        }
        if turn != 0.0 {
            self.camera.rotate(turn * TURN_PER_TICK);
        }
        if self.keys_down.contains(&KeyCode::ArrowUp) {
            self.camera.look(LOOK_PER_TICK);
        }
        if self.keys_down.contains(&KeyCode::ArrowDown) {
            self.camera.look(-LOOK_PER_TICK);
        }

        // Edge-triggered actions
        let fire_down = self.keys_down.contains(&KeyCode::Space);
        if fire_down && !self.fire_latch {
            let fired = self.world.fire(
                &self.camera,
                &self.depth,
                self.viewport.width,
                self.viewport.height,
            );
            if !fired {
                debug!("click: out of ammo");
            }
        }
        self.fire_latch = fire_down;

        let use_down = self.keys_down.contains(&KeyCode::KeyF);
        if use_down && !self.use_latch {
            self.world.use_door(&self.camera);
        }
        self.use_latch = use_down;
    }

    fn render_frame(&mut self) {
        raycaster::render(
            &mut self.fb_small,
            &mut self.depth,
            &self.viewport,
            &self.world.map,
            &self.camera,
            &self.world.textures,
            &self.world.lighting,
        );
        sprite::composite(
            &mut self.fb_small,
            &self.depth,
            self.viewport.width,
            self.viewport.height,
            &self.camera,
            &self.world.entities,
            &self.world.sprites,
            &self.world.lighting,
        );
    }

    fn rebuild_render_target(&mut self, dst_w: usize, dst_h: usize) {
        // Internal height stays fixed; width follows the window aspect
        let aspect = if dst_h > 0 {
            dst_w as f32 / dst_h as f32
        } else {
            1.0
        };
        let mut width = (INTERNAL_HEIGHT as f32 * aspect).round() as usize;
        width = width.max(160);
        if width % 2 != 0 {
            width += 1;
        }
        if width != self.viewport.width {
            self.viewport = Viewport::new(width, INTERNAL_HEIGHT);
            self.fb_small = vec![0; width * INTERNAL_HEIGHT];
            self.depth = vec![0.0; width];
        }
        self.upscaler = Upscaler::new(dst_w, dst_h, self.viewport.width, self.viewport.height);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let attributes = Window::default_attributes()
            .with_title("Gridcast Engine")
            .with_inner_size(LogicalSize::new(960.0, 720.0));
        let window = Rc::new(event_loop.create_window(attributes).expect("create window"));
        let context = softbuffer::Context::new(window.clone()).expect("softbuffer context");
        let surface =
            softbuffer::Surface::new(&context, window.clone()).expect("softbuffer surface");

        let size = window.inner_size();
        self.rebuild_render_target(size.width as usize, size.height as usize);

        self.surface = Some(surface);
        self.window = Some(window);
        self.last_tick = Instant::now();
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("close requested, shutting down");
                event_loop.exit();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key,
                        state,
                        ..
                    },
                ..
            } => {
                if let PhysicalKey::Code(code) = physical_key {
                    match state {
                        ElementState::Pressed => {
                            self.keys_down.insert(code);
                        }
                        ElementState::Released => {
                            self.keys_down.remove(&code);
                        }
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                self.pump_simulation();
                // Render into the internal buffer before borrowing the
                // surface; presentation below only reads fb_small
                self.render_frame();

                let (window, surface) = match (&self.window, &mut self.surface) {
                    (Some(w), Some(s)) if w.id() == id => (w.clone(), s),
                    _ => return,
                };
                let size = window.inner_size();
                let (dw, dh) = (size.width as usize, size.height as usize);
                if dw == 0 || dh == 0 {
                    return; // minimized
                }

                surface
                    .resize(
                        NonZeroU32::new(dw as u32).unwrap(),
                        NonZeroU32::new(dh as u32).unwrap(),
                    )
                    .unwrap();

                let mut buf = surface.buffer_mut().expect("buffer_mut");
                self.upscaler
                    .blit(&mut buf, &self.fb_small, self.viewport.width);
                buf.present().unwrap();

                self.frame_counter += 1;
                let now = Instant::now();
                let since = now.duration_since(self.last_fps_log).as_secs_f32();
                if since >= 1.0 {
                    debug!(fps = self.frame_counter as f32 / since, "frame rate");
                    self.frame_counter = 0;
                    self.last_fps_log = now;
                }

                window.request_redraw();
            }

            WindowEvent::Resized(new_size) => {
                self.rebuild_render_target(new_size.width as usize, new_size.height as usize);
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (world, player_start) = World::demo(0xC0FFEE).context("building demo level")?;
    let camera = Camera::new(player_start, 0.0, 66.0);

    let event_loop = EventLoop::new().context("creating event loop")?;
    // Poll keeps redraws coming even without OS events; the fixed
    // timestep inside pump_simulation does the pacing.
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(world, camera);
    event_loop.run_app(&mut app)?;
    Ok(())
}
