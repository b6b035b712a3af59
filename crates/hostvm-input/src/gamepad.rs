//! Game controller state
//!
//! Controllers are polled by the host (outside this crate) and the raw
//! readings are folded into a [`GamePadSnapshot`] that scripts read through
//! the `GamePad` natives.

use parking_lot::{Mutex, RwLock};
use tracing::trace;

/// Controller slot associated with a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayerIndex {
    /// First controller
    #[default]
    One,
    /// Second controller
    Two,
    /// Third controller
    Three,
    /// Fourth controller
    Four,
}

impl PlayerIndex {
    /// Number of controller slots
    pub const COUNT: usize = 4;

    /// Map a script-supplied index; anything outside `0..4` is player one
    pub fn from_index(index: i64) -> Self {
        match index {
            1 => PlayerIndex::Two,
            2 => PlayerIndex::Three,
            3 => PlayerIndex::Four,
            _ => PlayerIndex::One,
        }
    }

    /// Slot number
    pub fn as_usize(self) -> usize {
        self as usize
    }
}

/// One raw controller reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawGamePad {
    /// Changes whenever the controller state changes
    pub packet_number: u32,
    /// Button bitmask
    pub buttons: u16,
    /// Left trigger, `0..=255`
    pub left_trigger: u8,
    /// Right trigger, `0..=255`
    pub right_trigger: u8,
    /// Left stick X axis
    pub thumb_lx: i16,
    /// Left stick Y axis
    pub thumb_ly: i16,
    /// Right stick X axis
    pub thumb_rx: i16,
    /// Right stick Y axis
    pub thumb_ry: i16,
}

/// Normalized controller state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GamePadState {
    /// Whether the controller is connected
    pub connected: bool,
    /// Packet number of the last reading applied
    pub packet_number: u32,
    /// Left stick X, `-1.0..=1.0`
    pub left_thumbstick_x: f64,
    /// Left stick Y, `-1.0..=1.0`
    pub left_thumbstick_y: f64,
    /// Right stick X, `-1.0..=1.0`
    pub right_thumbstick_x: f64,
    /// Right stick Y, `-1.0..=1.0`
    pub right_thumbstick_y: f64,
    /// Left trigger, `0.0..=1.0`
    pub left_trigger: f64,
    /// Right trigger, `0.0..=1.0`
    pub right_trigger: f64,
    /// Button bitmask
    pub buttons: u16,
}

impl GamePadState {
    /// Fold a reading into the state. `None` means the controller did not
    /// answer and zeroes everything.
    ///
    /// Values are only copied when the packet number changed.
    pub fn update_from_raw(&mut self, raw: Option<&RawGamePad>) {
        let Some(raw) = raw else {
            *self = GamePadState::default();
            return;
        };

        self.connected = true;
        if self.packet_number == raw.packet_number {
            return;
        }
        self.packet_number = raw.packet_number;
        self.left_trigger = f64::from(raw.left_trigger) / 255.0;
        self.right_trigger = f64::from(raw.right_trigger) / 255.0;
        self.left_thumbstick_x = axis(raw.thumb_lx);
        self.left_thumbstick_y = axis(raw.thumb_ly);
        self.right_thumbstick_x = axis(raw.thumb_rx);
        self.right_thumbstick_y = axis(raw.thumb_ry);
        self.buttons = raw.buttons;
    }
}

fn axis(value: i16) -> f64 {
    (f64::from(value) / 32767.0).clamp(-1.0, 1.0)
}

/// Motor speeds sent to a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vibration {
    /// Left (low frequency) motor
    pub left: u16,
    /// Right (high frequency) motor
    pub right: u16,
}

impl Vibration {
    /// Scale `0.0..=1.0` speeds to motor values. Out-of-range speeds saturate.
    pub fn from_speeds(left: f64, right: f64) -> Self {
        Self {
            left: (left * 65535.0) as u16,
            right: (right * 65535.0) as u16,
        }
    }
}

/// Source of controller state for the input natives
pub trait GamePadProvider: Send + Sync {
    /// Current state of a controller
    fn state(&self, player: PlayerIndex) -> GamePadState;

    /// Drive a controller's motors
    fn set_vibration(&self, player: PlayerIndex, vibration: Vibration);
}

/// Polled snapshot of all controllers.
///
/// The host calls [`poll`](Self::poll) from its input loop; scripts read the
/// last folded state from any thread.
#[derive(Debug, Default)]
pub struct GamePadSnapshot {
    states: RwLock<[GamePadState; PlayerIndex::COUNT]>,
    vibration: Mutex<[Vibration; PlayerIndex::COUNT]>,
}

impl GamePadSnapshot {
    /// Create a snapshot with every controller disconnected
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one reading per slot into the snapshot
    pub fn poll(&self, readings: [Option<RawGamePad>; PlayerIndex::COUNT]) {
        let mut states = self.states.write();
        for (state, raw) in states.iter_mut().zip(readings.iter()) {
            state.update_from_raw(raw.as_ref());
        }
        trace!("controllers polled");
    }

    /// Last vibration requested for a controller
    pub fn vibration(&self, player: PlayerIndex) -> Vibration {
        self.vibration.lock()[player.as_usize()]
    }
}

impl GamePadProvider for GamePadSnapshot {
    fn state(&self, player: PlayerIndex) -> GamePadState {
        self.states.read()[player.as_usize()]
    }

    fn set_vibration(&self, player: PlayerIndex, vibration: Vibration) {
        self.vibration.lock()[player.as_usize()] = vibration;
    }
}
