//! Change detection and handler dispatch.
//!
//! Handlers are an explicit lookup table keyed by parameter name, registered
//! at setup. The dispatcher fires a handler only when the resolved value
//! differs from the prior-trial baseline, so expensive side effects (such as
//! reprogramming hardware) are skipped when nothing actually changed. A
//! parameter without a handler is valid and dispatch is a silent no-op.

use std::collections::HashMap;

use tracing::debug;

use crate::eval::expression::Value;

pub type ChangeHandler = Box<dyn FnMut(&Value)>;

#[derive(Default)]
pub struct ChangeDispatcher {
    handlers: HashMap<String, ChangeHandler>,
}

impl ChangeDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: impl FnMut(&Value) + 'static) {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Compares the newly resolved value against the prior baseline and fires
    /// the handler on an actual change. `prior` is `None` on the first trial
    /// ever, which always counts as a change. Returns whether the value
    /// changed.
    pub fn on_resolved(&mut self, name: &str, new_value: &Value, prior: Option<&Value>) -> bool {
        if prior == Some(new_value) {
            debug!("{} unchanged, skipping handler", name);
            return false;
        }

        match self.handlers.get_mut(name) {
            Some(handler) => {
                debug!("Dispatching change of {} to {:?}", name, new_value);
                handler(new_value);
            }
            None => {
                debug!("No handler for {}", name);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_handler() -> (Rc<RefCell<Vec<Value>>>, impl FnMut(&Value)) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |value: &Value| sink.borrow_mut().push(value.clone()))
    }

    #[test]
    fn test_fires_on_change() {
        let mut dispatcher = ChangeDispatcher::new();
        let (seen, handler) = recording_handler();
        dispatcher.register("x", handler);

        let changed = dispatcher.on_resolved("x", &Value::Float(0.5), Some(&Value::Float(0.2)));
        assert!(changed);
        assert_eq!(*seen.borrow(), vec![Value::Float(0.5)]);
    }

    #[test]
    fn test_skips_when_equal() {
        let mut dispatcher = ChangeDispatcher::new();
        let (seen, handler) = recording_handler();
        dispatcher.register("x", handler);

        let changed = dispatcher.on_resolved("x", &Value::Float(0.2), Some(&Value::Float(0.2)));
        assert!(!changed);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_fires_when_prior_is_unset() {
        let mut dispatcher = ChangeDispatcher::new();
        let (seen, handler) = recording_handler();
        dispatcher.register("x", handler);

        // 初回試行: 前回値が無ければ必ず発火する
        let changed = dispatcher.on_resolved("x", &Value::Float(0.2), None);
        assert!(changed);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_unset_prior_fires_even_for_null() {
        let mut dispatcher = ChangeDispatcher::new();
        let (seen, handler) = recording_handler();
        dispatcher.register("x", handler);

        // 格納された null と「値なし」は区別される
        assert!(dispatcher.on_resolved("x", &Value::Null, None));
        assert_eq!(seen.borrow().len(), 1);

        assert!(!dispatcher.on_resolved("x", &Value::Null, Some(&Value::Null)));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_missing_handler_is_silent() {
        let mut dispatcher = ChangeDispatcher::new();
        // ハンドラー未登録でもエラーにはならず、変更自体は報告される
        let changed = dispatcher.on_resolved("unhandled", &Value::Integer(1), None);
        assert!(changed);
    }

    #[test]
    fn test_unregister() {
        let mut dispatcher = ChangeDispatcher::new();
        let (seen, handler) = recording_handler();
        dispatcher.register("x", handler);

        assert!(dispatcher.unregister("x"));
        assert!(!dispatcher.has_handler("x"));
        dispatcher.on_resolved("x", &Value::Integer(1), None);
        assert!(seen.borrow().is_empty());
    }
}
