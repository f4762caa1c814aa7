//! The scoped, cached definition reducer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use asc_def::{Def, Ident, Layer, NodeId};
use asc_diag::{Error, ErrorKind};

use crate::value::{Callable, UserFn, Value};
use crate::{EvalResult, FormValues, stdlib};

/// Evaluation options. `should_halt` is queried before every definition
/// reduction; `debug` only affects warning verbosity, never semantics.
#[derive(Default)]
pub struct EvalOptions<'a> {
    pub should_halt: Option<&'a dyn Fn() -> bool>,
    pub debug: bool,
}

/// Evaluate `id` against a stack of definition layers.
///
/// The stdlib layer is laid underneath the user layers, so stdlib names
/// resolve automatically. Later layers shadow earlier ones.
pub fn evaluate(
    layers: &[Layer],
    id: &Ident,
    form_values: &dyn FormValues,
    options: EvalOptions<'_>,
) -> EvalResult<Value> {
    let mut stack: Vec<Arc<Frame>> = Vec::with_capacity(layers.len() + 1);
    stack.push(Frame::values(stdlib::values()));
    for layer in layers {
        stack.push(Frame::defs(layer.clone()));
    }

    let mut interp = Interp {
        should_halt: options.should_halt.unwrap_or(&never_halt),
        form_values,
        debug: options.debug,
        path: Vec::new(),
    };
    let top = stack.len() - 1;
    interp.eval_ident(&stack, top, id)
}

fn never_halt() -> bool {
    false
}

// ---------------------------------------------------------------------------
// Scope frames
// ---------------------------------------------------------------------------

/// One entry of the scope stack: either a definition layer or a map of
/// already-evaluated bindings (stdlib natives, function parameters).
pub(crate) enum Bindings {
    Defs(Layer),
    Values(HashMap<Ident, Value>),
}

/// A scope frame: its bindings plus the evaluation cache for this lexical
/// scope. Caches are keyed by definition-node identity; entering a function
/// body pushes a fresh frame, so distinct activations never collide.
pub(crate) struct Frame {
    bindings: Bindings,
    cache: RefCell<HashMap<NodeId, Value>>,
}

impl Frame {
    pub(crate) fn defs(layer: Layer) -> Arc<Frame> {
        Arc::new(Frame {
            bindings: Bindings::Defs(layer),
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub(crate) fn values(values: HashMap<Ident, Value>) -> Arc<Frame> {
        Arc::new(Frame {
            bindings: Bindings::Values(values),
            cache: RefCell::new(HashMap::new()),
        })
    }
}

// ---------------------------------------------------------------------------
// The interpreter
// ---------------------------------------------------------------------------

/// Evaluation state threaded through every reduction: the halt predicate,
/// the form-value provider, and the identifier path for error reports.
pub struct Interp<'a> {
    should_halt: &'a dyn Fn() -> bool,
    form_values: &'a dyn FormValues,
    debug: bool,
    path: Vec<String>,
}

impl Interp<'_> {
    fn check_halt(&self) -> EvalResult<()> {
        if (self.should_halt)() {
            Err(Error::new(ErrorKind::Aborted, self.path.clone()))
        } else {
            Ok(())
        }
    }

    fn path_with(&self, id: &Ident) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(id.to_string());
        path
    }

    /// Resolve and evaluate one identifier under the given scope ceiling.
    fn eval_ident(&mut self, stack: &[Arc<Frame>], top: usize, id: &Ident) -> EvalResult<Value> {
        self.check_halt()?;

        if id.is_form_value() {
            let name = id.as_name().unwrap_or_default();
            return Ok(self.form_values.form_value(name));
        }

        // Top-down lookup; the defining layer becomes the scope ceiling for
        // everything the definition references.
        let mut found: Option<(usize, Arc<Def>)> = None;
        for idx in (0..=top).rev() {
            match &stack[idx].bindings {
                Bindings::Values(values) => {
                    if let Some(value) = values.get(id) {
                        return Ok(value.clone());
                    }
                }
                Bindings::Defs(layer) => {
                    if let Some(def) = layer.get(id) {
                        found = Some((idx, def.clone()));
                        break;
                    }
                }
            }
        }
        let Some((scope, def)) = found else {
            return Err(Error::new(
                ErrorKind::UndefinedIdentifier,
                self.path_with(id),
            ));
        };

        let key = NodeId::of(&def);
        for frame in stack[..=top].iter().rev() {
            if let Some(value) = frame.cache.borrow().get(&key) {
                return Ok(value.clone());
            }
        }

        self.path.push(id.to_string());
        let result = self.eval_def(stack, scope, &def);
        self.path.pop();
        let value = result?;

        stack[top].cache.borrow_mut().insert(key, value.clone());
        Ok(value)
    }

    fn eval_def(&mut self, stack: &[Arc<Frame>], scope: usize, def: &Arc<Def>) -> EvalResult<Value> {
        match def.as_ref() {
            Def::Null => Ok(Value::Null),
            Def::Bool { value } => Ok(Value::Bool(*value)),
            Def::Number { value } => {
                if !value.is_finite() {
                    return Err(Error::new(ErrorKind::InvalidFormat, self.path.clone())
                        .with_detail("numeric literals must be finite"));
                }
                Ok(Value::Number(*value))
            }
            Def::Str { value } => Ok(Value::Str(value.clone())),
            Def::Literal { value } => {
                let items = value
                    .iter()
                    .map(|item| self.json_literal(item))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::Array(items))
            }
            Def::List { items } => {
                let values = items
                    .iter()
                    .map(|item| self.eval_ident(stack, scope, item))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }
            Def::Call { f, args } => {
                let callee = self.eval_ident(stack, scope, f)?;
                match callee {
                    Value::Callable(callable) => {
                        if callable.arity() != args.len() {
                            return Err(Error::new(ErrorKind::ArityMismatch, self.path.clone())
                                .with_detail(format!(
                                    "`{f}` expects {} arguments, got {}",
                                    callable.arity(),
                                    args.len()
                                )));
                        }
                        let mut values = Vec::with_capacity(args.len());
                        for arg in args {
                            values.push(self.eval_ident(stack, scope, arg)?);
                        }
                        self.apply(&callable, &values)
                    }
                    // A zero-argument call of a constant yields the value.
                    value if args.is_empty() => Ok(value),
                    value => Err(Error::new(ErrorKind::NotCallable, self.path.clone())
                        .with_detail(format!("`{f}` is a {}, not a callable", value.kind()))),
                }
            }
            Def::Fn { params, body } => Ok(Value::Callable(Callable::User(Arc::new(UserFn {
                params: params.clone(),
                body: body.clone(),
                stack: stack[..=scope].to_vec(),
            })))),
            Def::Switch { cases } => {
                for case in cases {
                    let selected = match &case.cond {
                        None => true,
                        // Only strict `true` selects a case.
                        Some(cond) => {
                            matches!(self.eval_ident(stack, scope, cond)?, Value::Bool(true))
                        }
                    };
                    if selected {
                        return self.eval_ident(stack, scope, &case.value);
                    }
                }
                if self.debug {
                    eprintln!(
                        "warning: switch at `{}` selected no case",
                        self.path.join(".")
                    );
                }
                Ok(Value::Null)
            }
        }
    }

    /// Apply a callable to already-evaluated arguments. Natives run their
    /// host function; user functions push a parameter frame and their body
    /// layer under a fresh cache scope and evaluate `=`.
    pub fn apply(&mut self, callable: &Callable, args: &[Value]) -> EvalResult<Value> {
        if callable.arity() != args.len() {
            return Err(
                Error::new(ErrorKind::ArityMismatch, self.path.clone()).with_detail(format!(
                    "{callable} expects {} arguments, got {}",
                    callable.arity(),
                    args.len()
                )),
            );
        }
        match callable {
            Callable::Native(native) => (native.run)(self, args),
            Callable::User(func) => {
                let params: HashMap<Ident, Value> = func
                    .params
                    .iter()
                    .cloned()
                    .map(Ident::Name)
                    .zip(args.iter().cloned())
                    .collect();
                let mut stack = func.stack.clone();
                stack.push(Frame::values(params));
                stack.push(Frame::defs(func.body.clone()));
                let top = stack.len() - 1;
                self.eval_ident(&stack, top, &Ident::name("="))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Interp<'static> {
        static NO_FORM: crate::NoFormValues = crate::NoFormValues;
        Interp {
            should_halt: &never_halt,
            form_values: &NO_FORM,
            debug: false,
            path: Vec::new(),
        }
    }

    fn json_literal(&self, item: &serde_json::Value) -> EvalResult<Value> {
        match item {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_f64()
                .filter(|n| n.is_finite())
                .map(Value::Number)
                .ok_or_else(|| {
                    Error::new(ErrorKind::InvalidFormat, self.path.clone())
                        .with_detail("literal numbers must be finite")
                }),
            serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
            serde_json::Value::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.json_literal(item))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }
            serde_json::Value::Object(_) => {
                Err(Error::new(ErrorKind::InvalidFormat, self.path.clone())
                    .with_detail("objects are not literal values"))
            }
        }
    }
}
