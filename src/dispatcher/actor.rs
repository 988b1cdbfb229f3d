//! Dispatcher actor
//!
//! Single owner of the toggle array, the encoder cache, the indicator LEDs
//! and the output sinks. Pollers and the MIDI input callback reach it only
//! through [`DispatcherHandle`], so every state change is applied in one
//! place, in arrival order, without locks.
//!
//! ```text
//!  joystick thread ─┐
//!  keypad thread ───┤                 ┌──────────────────────────┐
//!  encoder threads ─┼─ command_rx ──▶ │ DispatcherActor          │ ──▶ indicators
//!  MIDI input ──────┘  (unbounded)    │  ControlState            │ ──▶ MIDI sink
//!                                     └──────────────────────────┘ ──▶ pointer sink
//! ```

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::commands::DispatchCommand;
use super::handle::DispatcherHandle;
use super::state::{ControlState, Effect};
use crate::hal::DigitalOutput;
use crate::output::{OutputSinks, PointerEvent};

/// Outputs driven by the dispatcher
pub struct Indicators {
    /// One LED per toggle, same order as the toggle buttons
    pub toggles: Vec<Box<dyn DigitalOutput>>,
    /// Lit while the dispatcher runs
    pub power: Option<Box<dyn DigitalOutput>>,
}

pub struct DispatcherActor {
    state: ControlState,
    indicators: Indicators,
    sinks: OutputSinks,
    command_rx: mpsc::UnboundedReceiver<DispatchCommand>,
    processed: u64,
}

/// An actor that owns its outputs but has not started yet
///
/// Commands sent through the paired handle queue up until [`start`] is
/// called. Dropping it leaves every output untouched and closes the
/// command channel.
///
/// [`start`]: PendingDispatcher::start
pub struct PendingDispatcher {
    actor: DispatcherActor,
}

impl PendingDispatcher {
    /// Spawn the actor on the current runtime
    ///
    /// The power LED is switched on before the first command is processed.
    pub fn start(self) {
        tokio::spawn(self.actor.run());
        info!("Dispatcher spawned");
    }
}

impl DispatcherActor {
    /// Build the actor and its handle without touching any output
    pub fn prepare(
        state: ControlState,
        indicators: Indicators,
        sinks: OutputSinks,
    ) -> (DispatcherHandle, PendingDispatcher) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let actor = DispatcherActor {
            state,
            indicators,
            sinks,
            command_rx: cmd_rx,
            processed: 0,
        };

        (DispatcherHandle::new(cmd_tx), PendingDispatcher { actor })
    }

    async fn run(mut self) {
        self.set_power(true);
        debug!(toggles = self.state.toggle_count(), "Dispatcher run loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");
            self.processed += 1;

            match cmd {
                DispatchCommand::ToggleEffect { index } => {
                    let effects = self.state.toggle_effect(index);
                    self.apply(effects);
                }
                DispatchCommand::EncoderTick { encoder, rotation } => {
                    let effects = self.state.encoder_tick(encoder, rotation);
                    self.apply(effects);
                }
                DispatchCommand::SelectBank { bank } => {
                    let effects = self.state.select_bank(bank);
                    self.apply(effects);
                }
                DispatchCommand::SelectPreset { preset } => {
                    let effects = self.state.select_preset(preset);
                    self.apply(effects);
                }
                DispatchCommand::PointerMotion { dx, dy } => {
                    self.sinks.send_pointer(PointerEvent::Motion { dx, dy });
                }
                DispatchCommand::PointerButton { button, pressed } => {
                    debug!(?button, pressed, "Pointer button");
                    self.sinks.send_pointer(PointerEvent::Button { button, pressed });
                }
                DispatchCommand::Inbound(msg) => {
                    let effects = self.state.apply_inbound(&msg);
                    self.apply(effects);
                }
                DispatchCommand::Announce => {
                    let effects = self.state.announce();
                    self.apply(effects);
                }
                DispatchCommand::Snapshot { response } => {
                    let _ = response.send(self.state.snapshot());
                }
                DispatchCommand::Shutdown { done } => {
                    info!("Dispatcher received shutdown command");
                    self.outputs_off();
                    let _ = done.send(());
                    info!(processed = self.processed, "Dispatcher run loop terminated");
                    return;
                }
            }
        }

        // Every handle dropped without an explicit shutdown
        self.outputs_off();
        info!(processed = self.processed, "Dispatcher run loop terminated");
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Indicator { index, on } => {
                    if let Some(led) = self.indicators.toggles.get_mut(index) {
                        if let Err(e) = led.write(on) {
                            warn!(index, on, "Failed to drive indicator: {}", e);
                        }
                    }
                }
                Effect::Midi(msg) => {
                    debug!(%msg, "MIDI out");
                    self.sinks.send_midi(msg);
                }
            }
        }
    }

    fn set_power(&mut self, on: bool) {
        if let Some(led) = self.indicators.power.as_mut() {
            if let Err(e) = led.write(on) {
                warn!(on, "Failed to drive power LED: {}", e);
            }
        }
    }

    fn outputs_off(&mut self) {
        let effects = self.state.indicators_off();
        self.apply(effects);
        self.set_power(false);
        debug!("All indicators off");
    }
}
