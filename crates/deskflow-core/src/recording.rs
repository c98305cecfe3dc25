//! Conversion of raw hook events into replayable steps.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::constants::EngineConstants;
use crate::keys::vk_list_to_combo;
use crate::step::{Coord, Flow, MouseButton, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawEventKind {
    KeyDown,
    KeyUp,
    MouseDown,
    MouseUp,
    MouseMove,
    Wheel,
}

/// One observed input event. `time` is in device ticks (milliseconds on
/// Windows) and wraps around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub time: u32,
    pub x: i32,
    pub y: i32,
    pub vk: u32,
    pub button: MouseButton,
    pub wheel_delta: i32,
}

impl RawEvent {
    const fn blank(kind: RawEventKind, time: u32) -> Self {
        Self {
            kind,
            time,
            x: 0,
            y: 0,
            vk: 0,
            button: MouseButton::Left,
            wheel_delta: 0,
        }
    }

    pub const fn key_down(vk: u32, time: u32) -> Self {
        Self {
            vk,
            ..Self::blank(RawEventKind::KeyDown, time)
        }
    }

    pub const fn key_up(vk: u32, time: u32) -> Self {
        Self {
            vk,
            ..Self::blank(RawEventKind::KeyUp, time)
        }
    }

    pub const fn mouse_down(button: MouseButton, x: i32, y: i32, time: u32) -> Self {
        Self {
            x,
            y,
            button,
            ..Self::blank(RawEventKind::MouseDown, time)
        }
    }

    pub const fn mouse_up(button: MouseButton, x: i32, y: i32, time: u32) -> Self {
        Self {
            x,
            y,
            button,
            ..Self::blank(RawEventKind::MouseUp, time)
        }
    }

    pub const fn mouse_move(x: i32, y: i32, time: u32) -> Self {
        Self {
            x,
            y,
            ..Self::blank(RawEventKind::MouseMove, time)
        }
    }

    pub const fn wheel(x: i32, y: i32, wheel_delta: i32, time: u32) -> Self {
        Self {
            x,
            y,
            wheel_delta,
            ..Self::blank(RawEventKind::Wheel, time)
        }
    }

    fn distance(&self, other: &Self) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }

    const fn ticks_since(&self, earlier: u32) -> u32 {
        self.time.wrapping_sub(earlier)
    }
}

/// Folds each run of consecutive moves into a single way-point: the last
/// move that was more than the threshold away from the previous kept one.
fn compress_moves(events: &[RawEvent]) -> Vec<RawEvent> {
    let mut result = Vec::with_capacity(events.len());
    let mut i = 0;

    while i < events.len() {
        let ev = events[i];
        if ev.kind != RawEventKind::MouseMove {
            result.push(ev);
            i += 1;
            continue;
        }

        let mut kept = ev;
        let mut j = i + 1;
        while let Some(next) = events.get(j).filter(|e| e.kind == RawEventKind::MouseMove) {
            if next.distance(&kept) > EngineConstants::MOVE_THRESHOLD_PX {
                kept = *next;
            }
            j += 1;
        }
        result.push(kept);
        i = j;
    }

    result
}

/// Converts a recording into a flat [`Flow`].
///
/// Key downs inside the chord window become one `keys` step and their key
/// ups are swallowed. A mouse down is paired with the next up of the same
/// button and emitted as a click at the down position. Gaps over the delay
/// threshold between steps become `delay` steps. Wheel events and stray ups
/// only advance the clock.
pub fn to_steps(events: &[RawEvent]) -> Flow {
    let filtered = compress_moves(events);
    let mut steps: Vec<Step> = Vec::new();
    let Some(first) = filtered.first() else {
        return Flow::new();
    };
    let mut last_time = first.time;
    let mut i = 0;

    while i < filtered.len() {
        let ev = filtered[i];

        let gap = ev.ticks_since(last_time);
        if gap > EngineConstants::DELAY_THRESHOLD_MS && !steps.is_empty() {
            steps.push(Step::Delay {
                ms: u64::from(gap),
            });
        }

        match ev.kind {
            RawEventKind::KeyDown => {
                let mut chord = vec![ev.vk];
                let mut j = i + 1;
                while let Some(next) = filtered.get(j) {
                    if next.kind != RawEventKind::KeyDown
                        || next.ticks_since(ev.time) >= EngineConstants::CHORD_WINDOW_TICKS
                    {
                        break;
                    }
                    chord.push(next.vk);
                    j += 1;
                }

                let combo = vk_list_to_combo(&chord);
                if !combo.is_empty() {
                    steps.push(Step::Keys {
                        target: combo.clone(),
                        label: combo,
                    });
                }

                let mut pending: HashSet<u32> = chord.into_iter().collect();
                while let Some(next) = filtered.get(j) {
                    if next.kind != RawEventKind::KeyUp {
                        break;
                    }
                    j += 1;
                    if pending.remove(&next.vk) && pending.is_empty() {
                        break;
                    }
                }

                last_time = filtered[j - 1].time;
                i = j;
            }
            RawEventKind::MouseDown => {
                let up = filtered[i + 1..]
                    .iter()
                    .position(|e| e.kind == RawEventKind::MouseUp && e.button == ev.button)
                    .map(|offset| i + 1 + offset);

                steps.push(Step::MouseClick {
                    x: Coord::from(ev.x),
                    y: Coord::from(ev.y),
                    button: ev.button,
                });

                match up {
                    Some(j) => {
                        last_time = filtered[j].time;
                        i = j + 1;
                    }
                    None => {
                        last_time = ev.time;
                        i = filtered.len();
                    }
                }
            }
            RawEventKind::MouseMove => {
                steps.push(Step::MouseMove {
                    x: Coord::from(ev.x),
                    y: Coord::from(ev.y),
                });
                last_time = ev.time;
                i += 1;
            }
            RawEventKind::KeyUp | RawEventKind::MouseUp | RawEventKind::Wheel => {
                last_time = ev.time;
                i += 1;
            }
        }
    }

    let mut flow = Flow::new();
    for step in steps {
        // Recorded steps have no children, so the arena accepts them.
        if let Err(e) = flow.push(step) {
            log::warn!("dropping recorded step: {e}");
        }
    }
    flow
}
