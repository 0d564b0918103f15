//! Event callbacks registered on policy stages

use std::fmt;
use std::sync::Arc;

/// Callback invoked on a stage event
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Ordered list of callbacks for one event
#[derive(Clone, Default)]
pub struct Callbacks(Vec<Callback>);

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.0.push(Arc::new(callback));
    }

    pub fn push_shared(&mut self, callback: Callback) {
        self.0.push(callback);
    }

    /// Invoke every callback in registration order
    pub fn fire(&self) {
        for callback in &self.0 {
            callback();
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callbacks({})", self.0.len())
    }
}
