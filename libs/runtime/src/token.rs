use std::cell::Cell;
use std::rc::Rc;

use crate::signal::Signal;
use crate::task::Ctx;

/// A cooperative suspension flag shared between a parking task and whoever unparks it.
///
/// Unlike an OS-level parker this never blocks a thread: `park` just yields [`Signal::Park`]
/// back to the scheduler, which is responsible for never resuming the task again until
/// [`Token::unpark`] has cleared the flag. Cloning a `Token` shares the same flag.
#[derive(Clone, Default)]
pub struct Token {
    parked: Rc<Cell<bool>>,
}

impl Token {
    /// Creates a fresh, unparked token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token as parked and yields to the scheduler.
    ///
    /// Returns once the scheduler resumes this task, which it must only do after
    /// [`Token::unpark`] has cleared the flag.
    pub fn park(&self, ctx: &Ctx<'_>) {
        self.parked.set(true);
        ctx.suspend(Signal::Park);
        debug_assert!(!self.is_parked(), "scheduler resumed a still-parked task");
    }

    /// Clears the parked flag. A no-op if the token isn't currently parked.
    pub fn unpark(&self) {
        self.parked.set(false);
    }

    /// Returns whether the token is currently parked.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        self.parked.get()
    }

    /// Resets the token to its initial, unparked state.
    ///
    /// Called between checker rounds so a reused target starts each round fresh.
    pub fn reset(&self) {
        self.parked.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::Token;

    #[test]
    fn fresh_token_is_unparked() {
        assert!(!Token::new().is_parked());
    }

    #[test]
    fn unpark_is_idempotent() {
        let token = Token::new();
        token.unpark();
        token.unpark();
        assert!(!token.is_parked());
    }

    #[test]
    fn clones_share_state() {
        let a = Token::new();
        let b = a.clone();
        a.parked.set(true);
        assert!(b.is_parked());
    }
}
