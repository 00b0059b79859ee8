//! Engine-agnostic client side of the synchronization protocol
//!
//! A renderer feeds held keys into a [`Predictor`] once per frame, sends the
//! inputs it returns, and hands every server message back to it. The
//! predictor keeps the local player's position responsive and corrects it
//! against authoritative snapshots.

pub mod mode;
pub mod predictor;

pub use mode::{SyncMode, SyncModeError};
pub use predictor::{ClientEvent, Predictor};
