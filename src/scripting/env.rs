use std::time::Instant;

use crate::input::InputHandle;

/// Monotonic clock shared by everything that reports engine time.
#[derive(Debug, Clone, Copy)]
pub struct EngineClock {
    start: Instant,
}

impl EngineClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for EngineClock {
    fn default() -> Self {
        Self::new()
    }
}

/// What a script host can see of the engine besides its bound target.
#[derive(Clone, Default)]
pub struct ScriptEnv {
    pub clock: EngineClock,
    pub input: Option<InputHandle>,
}

impl ScriptEnv {
    pub fn new(clock: EngineClock, input: Option<InputHandle>) -> Self {
        Self { clock, input }
    }
}
