//! Virtual pointer device (uinput through evdev)

use std::io;

use anyhow::{Context, Result};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key, RelativeAxisType};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use crate::output::{PointerButton, PointerEvent};

/// Destination of pointer events
pub trait PointerDevice: Send {
    fn emit(&mut self, event: PointerEvent) -> io::Result<()>;
}

fn button_key(button: PointerButton) -> Key {
    match button {
        PointerButton::Left => Key::BTN_LEFT,
        PointerButton::Middle => Key::BTN_MIDDLE,
        PointerButton::Right => Key::BTN_RIGHT,
    }
}

/// Kernel input events for one pointer event
fn input_events(event: PointerEvent) -> Vec<InputEvent> {
    match event {
        PointerEvent::Motion { dx, dy } => {
            let mut events = Vec::with_capacity(2);
            if dx != 0 {
                events.push(InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_X.0, dx));
            }
            if dy != 0 {
                events.push(InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_Y.0, dy));
            }
            events
        }
        PointerEvent::Button { button, pressed } => {
            vec![InputEvent::new(EventType::KEY, button_key(button).code(), i32::from(pressed))]
        }
    }
}

/// Relative pointer with three buttons, created on `/dev/uinput`
pub struct UinputPointer {
    device: VirtualDevice,
}

impl UinputPointer {
    pub fn create(name: &str) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for button in [PointerButton::Left, PointerButton::Middle, PointerButton::Right] {
            keys.insert(button_key(button));
        }

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);

        let device = VirtualDeviceBuilder::new()
            .and_then(|b| b.name(name).with_keys(&keys))
            .and_then(|b| b.with_relative_axes(&axes))
            .and_then(|b| b.build())
            .context("Failed to create uinput device (check /dev/uinput permissions or the input group)")?;

        info!(name, "Virtual pointer created");
        Ok(Self { device })
    }
}

impl PointerDevice for UinputPointer {
    fn emit(&mut self, event: PointerEvent) -> io::Result<()> {
        let events = input_events(event);
        if events.is_empty() {
            return Ok(());
        }
        self.device.emit(&events)
    }
}

/// Drain the pointer sink into `device` until the dispatcher drops its sender
///
/// Without a device the events are discarded.
pub fn spawn_sender(
    mut device: Option<Box<dyn PointerDevice>>,
    mut rx: mpsc::UnboundedReceiver<PointerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Some(device) = device.as_mut() else {
                trace!(?event, "No pointer device, event discarded");
                continue;
            };
            if let Err(e) = device.emit(event) {
                warn!(?event, "Failed to emit pointer event: {}", e);
            }
        }
        info!("Pointer output closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<PointerEvent>>>,
    }

    impl PointerDevice for Recorder {
        fn emit(&mut self, event: PointerEvent) -> io::Result<()> {
            self.events.lock().push(event);
            Ok(())
        }
    }

    #[test]
    fn test_motion_events() {
        let events = input_events(PointerEvent::Motion { dx: 3, dy: 0 });
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), EventType::RELATIVE);
        assert_eq!(events[0].code(), RelativeAxisType::REL_X.0);
        assert_eq!(events[0].value(), 3);

        assert!(input_events(PointerEvent::Motion { dx: 0, dy: 0 }).is_empty());
    }

    #[test]
    fn test_button_events() {
        let events = input_events(PointerEvent::Button {
            button: PointerButton::Right,
            pressed: true,
        });
        assert_eq!(events[0].event_type(), EventType::KEY);
        assert_eq!(events[0].code(), Key::BTN_RIGHT.code());
        assert_eq!(events[0].value(), 1);
    }

    #[tokio::test]
    async fn test_sender_drains_in_order() {
        let recorder = Recorder::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = spawn_sender(Some(Box::new(recorder.clone())), rx);

        tx.send(PointerEvent::Motion { dx: 1, dy: 2 }).unwrap();
        tx.send(PointerEvent::Button {
            button: PointerButton::Left,
            pressed: false,
        })
        .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec![
                PointerEvent::Motion { dx: 1, dy: 2 },
                PointerEvent::Button {
                    button: PointerButton::Left,
                    pressed: false
                },
            ]
        );
    }
}
