use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::info;
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{
    ElementState, Event, KeyboardInput, MouseButton as WinitMouseButton, VirtualKeyCode,
    WindowEvent,
};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::WindowBuilder;

use robot_garden::{
    walkthrough, GardenApp, KeyCode, NamedKey, Renderer, WorldManifest,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;

    let manifest_path = options.assets.join("world.xml");
    let manifest = if manifest_path.is_file() {
        let xml = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        WorldManifest::from_xml(&xml)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?
    } else {
        WorldManifest::embedded()?
    };

    let app = GardenApp::new(manifest, options.assets.clone())
        .context("failed to build the session")?;

    if options.walkthrough {
        return run_walkthrough(app);
    }

    match run_interactive(app) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to the scripted walkthrough (set DISPLAY or install X11 libs to enable rendering)."
                );
                let manifest = if manifest_path.is_file() {
                    WorldManifest::from_xml(&std::fs::read_to_string(&manifest_path)?)?
                } else {
                    WorldManifest::embedded()?
                };
                run_walkthrough(GardenApp::new(manifest, options.assets)?)
            } else {
                Err(err)
            }
        }
    }
}

fn run_walkthrough(mut app: GardenApp) -> Result<()> {
    println!("Running scripted walkthrough...");
    let summary = walkthrough::run(&mut app).context("walkthrough failed")?;
    println!(
        "Walkthrough finished in {} simulated frames ({:.1}s of play)",
        summary.frames,
        summary.frames as f32 * walkthrough::DT
    );
    print_final_state(&app);
    Ok(())
}

fn run_interactive(app: GardenApp) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop =
        event_loop.map_err(|panic| WindowInitError::from_panic("event loop", panic))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Robot Garden")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let renderer = block_on(Renderer::new(Arc::clone(&window)))?;

    let mut shell = Shell {
        renderer,
        app,
        last_frame: Instant::now(),
        last_error: None,
    };

    let mut event_loop = event_loop;
    event_loop.run_return(|event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        if let Err(err) = shell.process_event(&event, control_flow) {
            shell.last_error = Some(err);
            control_flow.set_exit();
        }
    });

    print_final_state(&shell.app);

    if let Some(err) = shell.last_error {
        return Err(err);
    }
    Ok(())
}

struct Shell {
    renderer: Renderer,
    app: GardenApp,
    last_frame: Instant,
    last_error: Option<anyhow::Error>,
}

impl Shell {
    fn process_event(&mut self, event: &Event<()>, control_flow: &mut ControlFlow) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        control_flow.set_exit();
                    }
                    WindowEvent::Resized(size) => {
                        self.renderer.resize(*size);
                    }
                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        self.renderer.resize(**new_inner_size);
                    }
                    WindowEvent::KeyboardInput { input, .. } => {
                        self.handle_keyboard(input, control_flow);
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        if *state == ElementState::Pressed && *button == WinitMouseButton::Left {
                            self.app.input().push_click();
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        let pos = Vec2::new(position.x as f32, position.y as f32);
                        self.app.input().set_cursor(pos);
                    }
                    _ => {}
                }
            }
            Event::RedrawRequested(window_id) if *window_id == self.renderer.window_id() => {
                let now = Instant::now();
                let dt = (now - self.last_frame).as_secs_f32().min(0.1);
                self.last_frame = now;

                let size = self.renderer.window().inner_size();
                self.app.advance(dt, (size.width, size.height));

                self.renderer.sync_meshes(self.app.assets());
                let camera = self.app.camera_params(aspect(size.width, size.height));
                let light = self.app.light_params();
                self.renderer.update_globals(&camera, &light);

                let snapshot = self.app.world().resolved_snapshot();
                if let Err(err) = self.renderer.render(&snapshot) {
                    match err {
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                            let size = self.renderer.window().inner_size();
                            self.renderer.resize(size);
                        }
                        wgpu::SurfaceError::OutOfMemory => {
                            return Err(anyhow!("GPU is out of memory"));
                        }
                        wgpu::SurfaceError::Timeout => {
                            info!("Surface timeout; retrying next frame");
                        }
                    }
                }
            }
            Event::MainEventsCleared => {
                self.renderer.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_keyboard(&self, input: &KeyboardInput, control_flow: &mut ControlFlow) {
        let Some(code) = input.virtual_keycode else {
            return;
        };
        if code == VirtualKeyCode::Escape && input.state == ElementState::Pressed {
            control_flow.set_exit();
            return;
        }
        let Some(key) = map_keycode(code) else {
            return;
        };
        match input.state {
            ElementState::Pressed => self.app.input().set_key_down(key),
            ElementState::Released => self.app.input().set_key_up(key),
        }
    }
}

fn aspect(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

/// The fixed key set the scene responds to.
fn map_keycode(code: VirtualKeyCode) -> Option<KeyCode> {
    Some(match code {
        VirtualKeyCode::W => KeyCode::Character('W'),
        VirtualKeyCode::A => KeyCode::Character('A'),
        VirtualKeyCode::S => KeyCode::Character('S'),
        VirtualKeyCode::D => KeyCode::Character('D'),
        VirtualKeyCode::X => KeyCode::Character('X'),
        VirtualKeyCode::Y => KeyCode::Character('Y'),
        VirtualKeyCode::N => KeyCode::Character('N'),
        VirtualKeyCode::Space => KeyCode::Named(NamedKey::Space),
        VirtualKeyCode::Return => KeyCode::Named(NamedKey::Enter),
        _ => return None,
    })
}

fn print_final_state(app: &GardenApp) {
    let flags = app.flags();
    println!("Final quest state:");
    println!(" - walls up: {}", flags.walls_up());
    println!(" - frames dusted: {}/4", flags.dusted_count());
    println!(" - can picked up: {}", flags.can_picked_up);
    println!(" - garden watered: {}%", app.grid().progress_percent());
    println!(" - finale triggered: {}", flags.finale_triggered);
    println!(" - hint: {}", app.bubble().message());
    let position = app.player_position();
    println!(" - player at ({:.2}, {:.2})", position.x, position.y);
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

struct CliOptions {
    walkthrough: bool,
    assets: PathBuf,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut walkthrough = false;
        let mut assets = PathBuf::from("assets");
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--walkthrough" => walkthrough = true,
                "--assets" => {
                    let dir = args
                        .next()
                        .ok_or_else(|| anyhow!("--assets expects a directory"))?;
                    assets = PathBuf::from(dir);
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --walkthrough or --assets <dir>"
                    ));
                }
            }
        }
        Ok(Self { walkthrough, assets })
    }
}
