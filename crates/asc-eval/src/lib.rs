//! Evaluator for asc definition graphs.
//!
//! Turns a stack of definition layers plus a form-value provider into
//! concrete values: lazily scoped, cached (at most one evaluation per scope
//! and node), with termination guarded by a host-supplied halt predicate.
//! The standard library and the optional formatting extension slots live
//! here as well.

use std::collections::HashMap;

mod datetime;
pub mod ext;
mod interp;
mod stdlib;
mod value;

#[cfg(test)]
mod eval_tests;

pub use datetime::{Date, Timestamp};
pub use interp::{EvalOptions, Interp, evaluate};
pub use value::{Callable, NativeFn, UserFn, Value};

/// Result alias for evaluation.
pub type EvalResult<T> = Result<T, asc_diag::Error>;

/// Host-supplied resolution for `@`-prefixed form values.
///
/// The provider receives the full identifier including the leading `@` and
/// returns `Value::Null` for unknown names.
pub trait FormValues {
    fn form_value(&self, name: &str) -> Value;
}

/// Adapter implementing [`FormValues`] from a closure.
pub struct FormValuesFn<F>(pub F);

impl<F: Fn(&str) -> Value> FormValues for FormValuesFn<F> {
    fn form_value(&self, name: &str) -> Value {
        (self.0)(name)
    }
}

impl FormValues for HashMap<String, Value> {
    fn form_value(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or(Value::Null)
    }
}

/// A provider with no form values: every lookup yields `null`.
pub struct NoFormValues;

impl FormValues for NoFormValues {
    fn form_value(&self, _name: &str) -> Value {
        Value::Null
    }
}
