//! `embed:input` - game controller access for scripts
//!
//! The library is registered with the engine as a user library:
//!
//! ```ignore
//! let snapshot = Arc::new(GamePadSnapshot::new());
//! vm.load_script_library(
//!     INPUT_LIBRARY,
//!     LibrarySource::Inline(INPUT_SOURCE.to_string()),
//!     Some(Arc::new(input_library(snapshot.clone()))),
//! )?;
//! ```
//!
//! The host keeps the snapshot and calls [`GamePadSnapshot::poll`] from its
//! input loop.

#![warn(missing_docs)]

pub mod gamepad;
pub mod natives;

use hostvm_sdk::TableLibrary;
use std::sync::Arc;

pub use gamepad::{
    GamePadProvider, GamePadSnapshot, GamePadState, PlayerIndex, RawGamePad, Vibration,
};
pub use natives::input_table;

/// Name of the input library
pub const INPUT_LIBRARY: &str = "embed:input";

/// Script source of the input library
pub const INPUT_SOURCE: &str = include_str!("../dart/input.dart");

/// The input library's native capability
pub fn input_library(provider: Arc<dyn GamePadProvider>) -> TableLibrary {
    TableLibrary::new(INPUT_LIBRARY, move || input_table(Arc::clone(&provider)))
}
