//! DispatcherHandle - public API of the dispatcher actor
//!
//! Cheap to clone and safe to use from plain OS threads: hot path methods
//! only push onto an unbounded channel and never block or await.

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::commands::DispatchCommand;
use super::state::ControlSnapshot;
use crate::input::Rotation;
use crate::midi::MidiMessage;
use crate::output::PointerButton;

#[derive(Clone)]
pub struct DispatcherHandle {
    cmd_tx: mpsc::UnboundedSender<DispatchCommand>,
}

impl DispatcherHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<DispatchCommand>) -> Self {
        Self { cmd_tx }
    }

    fn send(&self, cmd: DispatchCommand) {
        if let Err(e) = self.cmd_tx.send(cmd) {
            warn!(cmd = ?e.0, "Dispatcher stopped, command dropped");
        }
    }

    // =========================================================================
    // Hot path methods (fire-and-forget)
    // =========================================================================

    /// Flip toggle `index`
    pub fn toggle_effect(&self, index: usize) {
        self.send(DispatchCommand::ToggleEffect { index });
    }

    /// One tick of encoder `encoder`
    pub fn encoder_tick(&self, encoder: usize, rotation: Rotation) {
        self.send(DispatchCommand::EncoderTick { encoder, rotation });
    }

    pub fn select_bank(&self, bank: u8) {
        self.send(DispatchCommand::SelectBank { bank });
    }

    /// Presets above 127 are rejected by the actor
    pub fn select_preset(&self, preset: u16) {
        self.send(DispatchCommand::SelectPreset { preset });
    }

    pub fn pointer_motion(&self, dx: i32, dy: i32) {
        self.send(DispatchCommand::PointerMotion { dx, dy });
    }

    pub fn pointer_button(&self, button: PointerButton, pressed: bool) {
        self.send(DispatchCommand::PointerButton { button, pressed });
    }

    /// Resync local state from a message sent by the effect engine
    pub fn apply_inbound(&self, msg: MidiMessage) {
        self.send(DispatchCommand::Inbound(msg));
    }

    /// Emit the current value of every encoder
    pub fn announce(&self) {
        self.send(DispatchCommand::Announce);
    }

    // =========================================================================
    // Query and lifecycle methods
    // =========================================================================

    /// Copy of the toggle array and encoder cache
    ///
    /// Returns `None` once the actor has stopped.
    pub async fn snapshot(&self) -> Option<ControlSnapshot> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(DispatchCommand::Snapshot { response: response_tx })
            .is_err()
        {
            return None;
        }
        response_rx.await.ok()
    }

    /// Check if the actor is still alive
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Force every output off and stop the actor
    ///
    /// Resolves once the indicators and power LED are off and the actor has
    /// exited. Calling it on a stopped actor returns immediately.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.cmd_tx.send(DispatchCommand::Shutdown { done: done_tx }).is_err() {
            return;
        }
        let _ = done_rx.await;
        self.cmd_tx.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_clone() {
        fn assert_clone<T: Clone + Send + Sync>() {}
        assert_clone::<DispatcherHandle>();
    }

    #[tokio::test]
    async fn test_is_alive_when_channel_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = DispatcherHandle::new(tx);
        assert!(handle.is_alive());

        drop(rx);
        assert!(!handle.is_alive());
        assert!(handle.snapshot().await.is_none());

        // Sending to a stopped actor is harmless
        handle.toggle_effect(0);
        handle.shutdown().await;
    }
}
