//! `GamePad_*` and `GamePadState_*` natives
//!
//! A script `GamePadState` carries a [`GamePadState`] as its native peer.
//! `GamePadState_New` attaches a zeroed peer and `GamePad_GetState` copies
//! the provider's state into it.

use crate::gamepad::{GamePadProvider, GamePadState, PlayerIndex, Vibration};
use hostvm_sdk::{NativeArguments, NativeError, NativeResult, NativeTable, TableError, Value};
use std::sync::Arc;
use tracing::debug;

/// Build the input native table over a controller provider
pub fn input_table(provider: Arc<dyn GamePadProvider>) -> Result<NativeTable, TableError> {
    let get_state_provider = Arc::clone(&provider);
    let vibration_provider = provider;

    NativeTable::builder()
        .class("GamePad", move |c| {
            c.method("GetState", 2, move |args| get_state(&*get_state_provider, args))
                .method("SetVibration", 3, move |args| {
                    set_vibration(&*vibration_provider, args)
                })
        })
        .class("GamePadState", |c| {
            c.method("New", 1, new_state)
                .method("IsConnected", 1, |args| {
                    read_state(args, |s| Value::Bool(s.connected))
                })
                .method("GetLeftThumbstickX", 1, |args| {
                    read_state(args, |s| Value::Double(s.left_thumbstick_x))
                })
                .method("GetLeftThumbstickY", 1, |args| {
                    read_state(args, |s| Value::Double(s.left_thumbstick_y))
                })
                .method("GetRightThumbstickX", 1, |args| {
                    read_state(args, |s| Value::Double(s.right_thumbstick_x))
                })
                .method("GetRightThumbstickY", 1, |args| {
                    read_state(args, |s| Value::Double(s.right_thumbstick_y))
                })
                .method("GetLeftTrigger", 1, |args| {
                    read_state(args, |s| Value::Double(s.left_trigger))
                })
                .method("GetRightTrigger", 1, |args| {
                    read_state(args, |s| Value::Double(s.right_trigger))
                })
                .method("GetButtons", 1, |args| {
                    read_state(args, |s| Value::Int(i64::from(s.buttons)))
                })
        })
        .build()
}

/// `GamePad_GetState(index, state)`
fn get_state(provider: &dyn GamePadProvider, args: &mut NativeArguments) -> NativeResult {
    let player = PlayerIndex::from_index(args.int(0)?);
    let target = args.instance(1)?;
    let current = provider.state(player);
    target
        .with_peer_mut(|state: &mut GamePadState| *state = current)
        .ok_or(NativeError::MissingPeer(1))?;
    Ok(Value::Null)
}

/// `GamePad_SetVibration(index, leftMotor, rightMotor)`
fn set_vibration(provider: &dyn GamePadProvider, args: &mut NativeArguments) -> NativeResult {
    let player = PlayerIndex::from_index(args.int(0)?);
    let vibration = Vibration::from_speeds(args.double(1)?, args.double(2)?);
    debug!(?player, left = vibration.left, right = vibration.right, "set vibration");
    provider.set_vibration(player, vibration);
    Ok(Value::Null)
}

/// `GamePadState_New(this)`
fn new_state(args: &mut NativeArguments) -> NativeResult {
    args.instance(0)?.set_peer(GamePadState::default());
    Ok(Value::Null)
}

fn read_state(args: &NativeArguments, f: impl FnOnce(&GamePadState) -> Value) -> NativeResult {
    args.instance(0)?
        .with_peer(f)
        .ok_or(NativeError::MissingPeer(0))
}
