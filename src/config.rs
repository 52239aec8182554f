use std::time::Duration;

pub const DEFAULT_VALIDATION_DEBOUNCE: Duration = Duration::from_millis(100);

/// Registry-wide options, shared by every form the registry creates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormOptions {
    /// Delay between the last validation request and the actual run; requests
    /// arriving inside the window coalesce into one invocation.
    pub validation_debounce: Duration,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validation_debounce: DEFAULT_VALIDATION_DEBOUNCE,
        }
    }
}
