use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

/// Cross-fade duration for steady locomotion/state switches.
pub const STATE_FADE: f32 = 0.5;
/// Cross-fade duration for emote triggers and movement-driven switches.
pub const MOVE_FADE: f32 = 0.2;

/// Fixed vocabulary of named clips carried by the character model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipName {
    Idle,
    Walking,
    Running,
    Dance,
    Death,
    Sitting,
    Standing,
    Jump,
    Yes,
    No,
    Wave,
    Punch,
    ThumbsUp,
}

impl ClipName {
    pub const ALL: [ClipName; 13] = [
        ClipName::Idle,
        ClipName::Walking,
        ClipName::Running,
        ClipName::Dance,
        ClipName::Death,
        ClipName::Sitting,
        ClipName::Standing,
        ClipName::Jump,
        ClipName::Yes,
        ClipName::No,
        ClipName::Wave,
        ClipName::Punch,
        ClipName::ThumbsUp,
    ];

    /// Emotes play once and hand control back to the resting state.
    pub const EMOTES: [ClipName; 6] = [
        ClipName::Jump,
        ClipName::Yes,
        ClipName::No,
        ClipName::Wave,
        ClipName::Punch,
        ClipName::ThumbsUp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClipName::Idle => "Idle",
            ClipName::Walking => "Walking",
            ClipName::Running => "Running",
            ClipName::Dance => "Dance",
            ClipName::Death => "Death",
            ClipName::Sitting => "Sitting",
            ClipName::Standing => "Standing",
            ClipName::Jump => "Jump",
            ClipName::Yes => "Yes",
            ClipName::No => "No",
            ClipName::Wave => "Wave",
            ClipName::Punch => "Punch",
            ClipName::ThumbsUp => "ThumbsUp",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|clip| clip.as_str() == name)
    }

    pub fn is_emote(self) -> bool {
        Self::EMOTES.contains(&self)
    }

    /// One-shots clamp on their final frame instead of looping: every emote
    /// plus the terminal poses.
    pub fn is_one_shot(self) -> bool {
        self.is_emote()
            || matches!(self, ClipName::Death | ClipName::Sitting | ClipName::Standing)
    }
}

/// Clip durations resolved from the character schema.
#[derive(Debug, Clone, Default)]
pub struct ClipLibrary {
    durations: HashMap<ClipName, f32>,
}

impl ClipLibrary {
    pub fn new(entries: &[(ClipName, f32)]) -> Self {
        Self {
            durations: entries.iter().copied().collect(),
        }
    }

    pub fn duration(&self, clip: ClipName) -> Option<f32> {
        self.durations.get(&clip).copied()
    }

    pub fn contains(&self, clip: ClipName) -> bool {
        self.durations.contains_key(&clip)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopMode {
    Repeat,
    Once,
}

#[derive(Debug, Clone, Copy)]
struct Fade {
    target: f32,
    rate: f32,
}

/// Playback bookkeeping for a single clip: time, effective weight and the
/// in-flight fade. The mixer deforms nothing; it tracks exactly the state
/// needed to drive switching and completion.
#[derive(Debug, Clone)]
pub struct ClipAction {
    duration: f32,
    loop_mode: LoopMode,
    time: f32,
    weight: f32,
    time_scale: f32,
    playing: bool,
    finished: bool,
}

impl ClipAction {
    fn new(duration: f32, loop_mode: LoopMode) -> Self {
        Self {
            duration,
            loop_mode,
            time: 0.0,
            weight: 0.0,
            time_scale: 1.0,
            playing: false,
            finished: false,
        }
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// A one-shot that has reached its final frame and stays clamped there.
    pub fn is_clamped(&self) -> bool {
        self.finished
    }
}

/// Per-character clip mixer: advances clip time and linear fade weights and
/// reports one-shot completions, once each.
#[derive(Debug)]
pub struct Mixer {
    actions: HashMap<ClipName, ClipAction>,
    fades: HashMap<ClipName, Fade>,
}

impl Mixer {
    pub fn new(library: &ClipLibrary) -> Self {
        Self::with_forced_loops(library, &[])
    }

    /// Builds a mixer where the listed clips loop even though their class
    /// would normally clamp (the companion's continuous `Wave`).
    pub fn with_forced_loops(library: &ClipLibrary, forced: &[ClipName]) -> Self {
        let mut actions = HashMap::new();
        for clip in ClipName::ALL {
            let Some(duration) = library.duration(clip) else {
                continue;
            };
            let loop_mode = if clip.is_one_shot() && !forced.contains(&clip) {
                LoopMode::Once
            } else {
                LoopMode::Repeat
            };
            actions.insert(clip, ClipAction::new(duration, loop_mode));
        }
        Self {
            actions,
            fades: HashMap::new(),
        }
    }

    pub fn action(&self, clip: ClipName) -> Option<&ClipAction> {
        self.actions.get(&clip)
    }

    /// Resets the clip to its first frame at full time-scale and weight and
    /// starts it playing.
    pub fn play(&mut self, clip: ClipName) {
        let Some(action) = self.actions.get_mut(&clip) else {
            warn!("cannot play unavailable clip {}", clip.as_str());
            return;
        };
        action.time = 0.0;
        action.time_scale = 1.0;
        action.weight = 1.0;
        action.playing = true;
        action.finished = false;
        self.fades.remove(&clip);
    }

    /// Ramps the clip's weight from zero to one over `duration` seconds.
    pub fn fade_in(&mut self, clip: ClipName, duration: f32) {
        if !self.actions.contains_key(&clip) {
            return;
        }
        if let Some(action) = self.actions.get_mut(&clip) {
            action.weight = 0.0;
        }
        self.fades.insert(
            clip,
            Fade {
                target: 1.0,
                rate: fade_rate(duration),
            },
        );
    }

    /// Ramps the clip's weight down to zero over `duration` seconds; the clip
    /// keeps playing until the fade lands.
    pub fn fade_out(&mut self, clip: ClipName, duration: f32) {
        if !self.actions.contains_key(&clip) {
            return;
        }
        self.fades.insert(
            clip,
            Fade {
                target: 0.0,
                rate: fade_rate(duration),
            },
        );
    }

    /// Advances fades and clip time. Returns the one-shots that reached their
    /// final frame during this step; each completion is reported exactly once.
    pub fn update(&mut self, dt: f32) -> Vec<ClipName> {
        let mut finished = Vec::new();

        let actions = &mut self.actions;
        self.fades.retain(|clip, fade| {
            let Some(action) = actions.get_mut(clip) else {
                return false;
            };
            let step = fade.rate * dt;
            if fade.target > action.weight {
                action.weight = (action.weight + step).min(fade.target);
            } else {
                action.weight = (action.weight - step).max(fade.target);
            }
            if (action.weight - fade.target).abs() < f32::EPSILON {
                if fade.target == 0.0 {
                    action.playing = false;
                }
                return false;
            }
            true
        });

        for (clip, action) in self.actions.iter_mut() {
            if !action.playing || action.finished {
                continue;
            }
            action.time += dt * action.time_scale;
            match action.loop_mode {
                LoopMode::Repeat => {
                    if action.time >= action.duration {
                        action.time %= action.duration;
                    }
                }
                LoopMode::Once => {
                    if action.time >= action.duration {
                        action.time = action.duration;
                        action.finished = true;
                        finished.push(*clip);
                    }
                }
            }
        }

        finished
    }
}

fn fade_rate(duration: f32) -> f32 {
    if duration <= f32::EPSILON {
        f32::INFINITY
    } else {
        1.0 / duration
    }
}

/// Chooses the active clip for one character and implements the cross-fade
/// contract. The active clip is an explicit tag, and an in-flight one-shot is
/// an explicit field checked by the per-frame update; neither requires
/// scanning clip names.
#[derive(Debug)]
pub struct AnimationSelector {
    active: ClipName,
    resting: ClipName,
    pending_one_shot: Option<ClipName>,
}

impl AnimationSelector {
    /// Starts the character in `initial`, which also becomes the resting
    /// state one-shots return to.
    pub fn new(mixer: &mut Mixer, initial: ClipName) -> Self {
        mixer.play(initial);
        Self {
            active: initial,
            resting: initial,
            pending_one_shot: None,
        }
    }

    pub fn active(&self) -> ClipName {
        self.active
    }

    pub fn resting(&self) -> ClipName {
        self.resting
    }

    pub fn one_shot_active(&self) -> bool {
        self.pending_one_shot.is_some()
    }

    /// Cross-fades to `to` over `fade` seconds. A transition to the clip that
    /// is already active issues no fade and reports `false`.
    pub fn set_state(&mut self, mixer: &mut Mixer, to: ClipName, fade: f32) -> bool {
        if to == self.active {
            return false;
        }
        mixer.fade_out(self.active, fade);
        mixer.play(to);
        mixer.fade_in(to, fade);
        self.active = to;
        if !to.is_one_shot() {
            self.resting = to;
        }
        true
    }

    /// Fires a one-shot clip; the current resting state is restored when the
    /// mixer reports completion.
    pub fn trigger_one_shot(&mut self, mixer: &mut Mixer, clip: ClipName, fade: f32) {
        if !clip.is_one_shot() {
            self.set_state(mixer, clip, fade);
            return;
        }
        self.set_state(mixer, clip, fade);
        self.pending_one_shot = Some(clip);
    }

    /// Called once per frame with the mixer's completion report; restores the
    /// resting state at most once per one-shot playback.
    pub fn apply_finished(&mut self, mixer: &mut Mixer, finished: &[ClipName]) {
        let Some(pending) = self.pending_one_shot else {
            return;
        };
        if finished.contains(&pending) {
            self.pending_one_shot = None;
            let resting = self.resting;
            self.set_state(mixer, resting, MOVE_FADE);
        }
    }
}
