use anyhow::{ensure, Result};
use glam::Vec2;
use log::info;

use crate::app::GardenApp;
use crate::input::{Bindings, Control};

/// Fixed timestep the headless driver simulates at.
pub const DT: f32 = 1.0 / 60.0;
/// Viewport assumed for camera and hint anchoring.
pub const VIEWPORT: (u32, u32) = (1280, 720);

const MAX_FRAMES: u64 = 400_000;
const ARRIVE_DISTANCE: f32 = 0.3;

/// Outcome of a completed walkthrough.
#[derive(Debug)]
pub struct Summary {
    pub frames: u64,
    pub watered_percent: u32,
    pub finale: bool,
    pub hint: String,
}

/// Plays the whole quest through the public input surface: raise both
/// walls, dust the frames, fetch the can, water the garden and trigger the
/// finale. Fails if any transition does not fire.
pub fn run(app: &mut GardenApp) -> Result<Summary> {
    let mut driver = Driver {
        app,
        bindings: Bindings::default(),
        frames: 0,
    };

    driver.step_n(5)?;

    driver.walk_to(Vec2::new(19.0, 0.0))?;
    driver.tap(Control::Interact)?;
    ensure!(driver.app.flags().wall1_up, "wall 1 did not raise");
    info!("walkthrough: wall 1 raised");

    driver.walk_to(Vec2::new(-19.0, 0.0))?;
    driver.tap(Control::Interact)?;
    ensure!(driver.app.flags().walls_up(), "wall 2 did not raise");
    ensure!(
        driver.app.flags().stage2_initialized,
        "stage 2 did not spawn"
    );
    info!("walkthrough: walls up");

    for x in [-6.0, -2.0, 2.0, 6.0] {
        driver.walk_to(Vec2::new(x, -17.5))?;
        driver.tap(Control::Interact)?;
    }
    ensure!(driver.app.flags().frames_done(), "frames were not all dusted");
    ensure!(
        driver.app.flags().stage3_initialized,
        "stage 3 did not spawn"
    );
    info!("walkthrough: frames dusted");

    driver.walk_to(Vec2::new(8.0, 8.0))?;
    driver.step_n(2)?;
    ensure!(driver.app.flags().can_picked_up, "can was not picked up");
    info!("walkthrough: can in hand");

    driver.hold(Control::Interact);
    let rows = [-18.0, -12.0, -6.0, 0.0, 6.0, 12.0, 18.0];
    for (index, z) in rows.iter().enumerate() {
        let (from, to) = if index % 2 == 0 {
            (-19.3, 19.3)
        } else {
            (19.3, -19.3)
        };
        driver.walk_to(Vec2::new(from, *z))?;
        driver.walk_to(Vec2::new(to, *z))?;
        if driver.app.flags().stage4_initialized {
            break;
        }
    }
    driver.release(Control::Interact);
    driver.step_n(2)?;
    ensure!(
        driver.app.flags().stage4_initialized,
        "garden never completed ({}% watered)",
        driver.app.grid().progress_percent()
    );
    info!("walkthrough: garden watered");

    driver.tap(Control::Dance)?;
    ensure!(driver.app.flags().finale_triggered, "finale did not trigger");
    info!("walkthrough: finale");

    Ok(Summary {
        frames: driver.frames,
        watered_percent: driver.app.grid().progress_percent(),
        finale: driver.app.flags().finale_triggered,
        hint: driver.app.bubble().message().to_string(),
    })
}

struct Driver<'a> {
    app: &'a mut GardenApp,
    bindings: Bindings,
    frames: u64,
}

impl Driver<'_> {
    fn step(&mut self) -> Result<()> {
        ensure!(self.frames < MAX_FRAMES, "walkthrough exceeded its frame limit");
        self.app.advance(DT, VIEWPORT);
        self.frames += 1;
        Ok(())
    }

    fn step_n(&mut self, n: u32) -> Result<()> {
        for _ in 0..n {
            self.step()?;
        }
        Ok(())
    }

    fn set(&self, control: Control, down: bool) {
        if let Some(key) = self.bindings.key_for(control) {
            if down {
                self.app.input().set_key_down(key);
            } else {
                self.app.input().set_key_up(key);
            }
        }
    }

    fn hold(&self, control: Control) {
        self.set(control, true);
    }

    fn release(&self, control: Control) {
        self.set(control, false);
    }

    fn tap(&mut self, control: Control) -> Result<()> {
        self.set(control, true);
        self.step()?;
        self.set(control, false);
        self.step()
    }

    /// Steers with the directional keys until the player arrives at
    /// `target` (x, z).
    fn walk_to(&mut self, target: Vec2) -> Result<()> {
        loop {
            let delta = target - self.app.player_position();
            if delta.length() < ARRIVE_DISTANCE {
                for control in [
                    Control::Forward,
                    Control::Back,
                    Control::Left,
                    Control::Right,
                ] {
                    self.release(control);
                }
                return self.step();
            }
            self.set(Control::Forward, delta.y < -0.05);
            self.set(Control::Back, delta.y > 0.05);
            self.set(Control::Left, delta.x < -0.05);
            self.set(Control::Right, delta.x > 0.05);
            self.step()?;
        }
    }
}
