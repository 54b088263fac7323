//! Debounced push-buttons sharing the 74HC165 chain with the home sensors.
//!
//! ## Hardware
//!
//! Four active-low momentary switches with pull-ups on bits 0..=3 of the
//! input sample. There are no interrupts: [`ButtonBank::update`] is fed the
//! same sample the scheduler used this tick and runs the debounce + gesture
//! state machine for every button.
//!
//! ## Gesture detection
//!
//! | Gesture     | Condition                        | Event        |
//! |-------------|----------------------------------|--------------|
//! | Short press | Released after debounce, < 2 s   | `ShortPress` |
//! | Long press  | Held >= 2 s (fires while held)   | `LongPress`  |

use heapless::Vec;

use crate::drivers::shift_in::InputSample;
use crate::sensors::limit::LimitSensor;

pub const BUTTON_COUNT: usize = 4;

const DEBOUNCE_MS: u32 = 50;
const LONG_PRESS_MS: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonGesture {
    ShortPress,
    LongPress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    /// Button index `0..4`.
    pub button: u8,
    pub gesture: ButtonGesture,
}

/// Internal state machine for gesture detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    DebounceWait { since_ms: u32 },
    Pressed { since_ms: u32 },
    /// Long press already reported, waiting for release.
    Held,
}

pub struct ButtonBank {
    inputs: [LimitSensor; BUTTON_COUNT],
    states: [GestureState; BUTTON_COUNT],
}

impl ButtonBank {
    /// Buttons on bits `base_bit..base_bit + 4`.
    pub fn new(base_bit: u8) -> Self {
        Self {
            inputs: core::array::from_fn(|i| LimitSensor::new(base_bit + i as u8)),
            states: [GestureState::Idle; BUTTON_COUNT],
        }
    }

    /// Run one debounce step for every button.
    /// `now_ms` is the current monotonic time in milliseconds.
    pub fn update(&mut self, sample: InputSample, now_ms: u32) -> Vec<ButtonEvent, BUTTON_COUNT> {
        let mut events = Vec::new();
        for (i, (input, state)) in self.inputs.iter().zip(self.states.iter_mut()).enumerate() {
            let pressed = input.is_asserted(sample);
            if let Some(gesture) = step(state, pressed, now_ms) {
                // Capacity equals the button count; one event per button.
                let _ = events.push(ButtonEvent {
                    button: i as u8,
                    gesture,
                });
            }
        }
        events
    }
}

fn step(state: &mut GestureState, pressed: bool, now_ms: u32) -> Option<ButtonGesture> {
    match *state {
        GestureState::Idle => {
            if pressed {
                *state = GestureState::DebounceWait { since_ms: now_ms };
            }
            None
        }

        GestureState::DebounceWait { since_ms } => {
            if !pressed {
                *state = GestureState::Idle;
            } else if now_ms.wrapping_sub(since_ms) >= DEBOUNCE_MS {
                *state = GestureState::Pressed { since_ms };
            }
            None
        }

        GestureState::Pressed { since_ms } => {
            if !pressed {
                *state = GestureState::Idle;
                return Some(ButtonGesture::ShortPress);
            }
            if now_ms.wrapping_sub(since_ms) >= LONG_PRESS_MS {
                *state = GestureState::Held;
                return Some(ButtonGesture::LongPress);
            }
            None
        }

        GestureState::Held => {
            if !pressed {
                *state = GestureState::Idle;
            }
            None
        }
    }
}
