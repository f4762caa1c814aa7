//! Static type analysis for asc definition graphs.
//!
//! The analyzer traverses a definition graph under the same scoping
//! discipline as the evaluator and produces a [`Report`] per definition:
//! the reduced type, the set of node tags encountered, and the stdlib names
//! referenced. Recursive definitions are handled with a lock map and
//! deferred unresolved types that a post-pass substitutes away.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use asc_def::{Def, Ident, Layer, NodeId, Tag};
use asc_diag::{Error, ErrorKind};
use asc_types::{
    FuncType, Pattern, Type, TypeMapping, TypeVar, UnresolvedType, apply, array_of, union,
};

mod stdlib_types;
pub use stdlib_types::stdlib_types;

#[cfg(test)]
mod analyze_tests;


/// Result alias for analysis.
pub type AnalyzeResult<T> = Result<T, Error>;

// ---------------------------------------------------------------------------
// Form-value types
// ---------------------------------------------------------------------------

/// Host-supplied types for `@`-prefixed form values. The provider receives
/// the full identifier including the leading `@`.
pub trait FormTypes {
    fn form_type(&self, name: &str) -> Option<Type>;
}

/// Adapter implementing [`FormTypes`] from a closure.
pub struct FormTypesFn<F>(pub F);

impl<F: Fn(&str) -> Option<Type>> FormTypes for FormTypesFn<F> {
    fn form_type(&self, name: &str) -> Option<Type> {
        (self.0)(name)
    }
}

impl FormTypes for HashMap<String, Type> {
    fn form_type(&self, name: &str) -> Option<Type> {
        self.get(name).cloned()
    }
}

/// A provider with no form-value types.
pub struct NoFormTypes;

impl FormTypes for NoFormTypes {
    fn form_type(&self, _name: &str) -> Option<Type> {
        None
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A successful analysis: the definition's type plus the node tags and
/// stdlib names its reference closure uses.
#[derive(Debug, Clone)]
pub struct Report {
    pub ty: Type,
    pub def_types: BTreeSet<Tag>,
    pub std_usage: BTreeSet<String>,
}

impl Report {
    fn of(ty: Type) -> Self {
        Self {
            ty,
            def_types: BTreeSet::new(),
            std_usage: BTreeSet::new(),
        }
    }

    fn absorb(&mut self, child: &Report) {
        self.def_types.extend(child.def_types.iter().copied());
        self.std_usage.extend(child.std_usage.iter().cloned());
    }
}

/// Analyze one top-level identifier.
pub fn analyze(defs: &[Layer], id: &Ident, form_types: &dyn FormTypes) -> AnalyzeResult<Report> {
    Analyzer::new(form_types).analyze(defs, id)
}

/// Analyze every top-level identifier, sharing one cache across them.
pub fn analyze_all(
    defs: &[Layer],
    form_types: &dyn FormTypes,
) -> Vec<(Ident, AnalyzeResult<Report>)> {
    let mut analyzer = Analyzer::new(form_types);
    let mut ids: Vec<Ident> = defs.iter().flat_map(|l| l.ids().cloned()).collect();
    ids.sort();
    ids.dedup();
    ids.into_iter()
        .map(|id| {
            let report = analyzer.analyze(defs, &id);
            (id, report)
        })
        .collect()
}

/// Like [`analyze_all`], but fails when any definition fails, collecting
/// every error.
pub fn analyze_all_strict(
    defs: &[Layer],
    form_types: &dyn FormTypes,
) -> Result<Vec<(Ident, Report)>, asc_diag::ErrorSet> {
    let mut reports = Vec::new();
    let mut errors = Vec::new();
    for (id, result) in analyze_all(defs, form_types) {
        match result {
            Ok(report) => reports.push((id, report)),
            Err(err) => errors.push(err),
        }
    }
    if errors.is_empty() {
        Ok(reports)
    } else {
        Err(asc_diag::ErrorSet(errors))
    }
}

// ---------------------------------------------------------------------------
// Scope frames
// ---------------------------------------------------------------------------

enum Bindings {
    Defs(Layer),
    /// Already-typed bindings: stdlib names or function parameters.
    Types {
        map: HashMap<Ident, Type>,
        stdlib: bool,
    },
}

struct Frame {
    bindings: Bindings,
    /// True on the parameter frame of a function body; `_`-prefixed names
    /// defined below a boundary are hidden from the body.
    fn_boundary: bool,
}

// ---------------------------------------------------------------------------
// The analyzer
// ---------------------------------------------------------------------------

/// Analysis state: the report cache, the lock map for in-progress nodes,
/// and the resolve map filled in when locked nodes finish.
pub struct Analyzer<'a> {
    form_types: &'a dyn FormTypes,
    stdlib_frame: Arc<Frame>,
    cache: HashMap<NodeId, Report>,
    locks: HashMap<NodeId, Vec<UnresolvedType>>,
    resolve: HashMap<u64, Type>,
    path: Vec<String>,
}

impl<'a> Analyzer<'a> {
    pub fn new(form_types: &'a dyn FormTypes) -> Self {
        Self {
            form_types,
            stdlib_frame: Arc::new(Frame {
                bindings: Bindings::Types {
                    map: stdlib_types(),
                    stdlib: true,
                },
                fn_boundary: false,
            }),
            cache: HashMap::new(),
            locks: HashMap::new(),
            resolve: HashMap::new(),
            path: Vec::new(),
        }
    }

    pub fn analyze(&mut self, defs: &[Layer], id: &Ident) -> AnalyzeResult<Report> {
        let mut stack: Vec<Arc<Frame>> = Vec::with_capacity(defs.len() + 1);
        stack.push(self.stdlib_frame.clone());
        for layer in defs {
            stack.push(Arc::new(Frame {
                bindings: Bindings::Defs(layer.clone()),
                fn_boundary: false,
            }));
        }
        let top = stack.len() - 1;
        let mut report = self.analyze_ident(&stack, top, id)?;
        report.ty = self.resolve_type(report.ty);
        Ok(report)
    }

    /// Substitute unresolved types through the resolve map, iterated to a
    /// bounded fixpoint; anything still unresolved after that is part of a
    /// recursion cycle and collapses to `never`.
    fn resolve_type(&self, ty: Type) -> Type {
        let mut ty = ty;
        for _ in 0..=self.resolve.len() {
            let mut changed = false;
            for (&id, resolved) in &self.resolve {
                if !ty.contains_unresolved(id) {
                    continue;
                }
                let replacement = if resolved.contains_unresolved(id) {
                    resolved.substitute_unresolved(id, &Type::Never)
                } else {
                    resolved.clone()
                };
                ty = ty.substitute_unresolved(id, &replacement);
                changed = true;
            }
            if !changed {
                break;
            }
        }
        for id in ty.unresolved_ids() {
            ty = ty.substitute_unresolved(id, &Type::Never);
        }
        ty.reduce()
    }

    fn path_with(&self, id: &Ident) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(id.to_string());
        path
    }

    fn analyze_ident(
        &mut self,
        stack: &[Arc<Frame>],
        top: usize,
        id: &Ident,
    ) -> AnalyzeResult<Report> {
        if id.is_form_value() {
            let name = id.as_name().unwrap_or_default();
            if let Some(ty) = self.form_types.form_type(name) {
                return Ok(Report::of(ty));
            }
            return Err(Error::new(ErrorKind::LeadingAtIdent, self.path_with(id)));
        }

        let mut crossed_boundary = false;
        let mut found: Option<(usize, Arc<Def>)> = None;
        for idx in (0..=top).rev() {
            let frame = &stack[idx];
            let hidden = crossed_boundary && id.is_private();
            match &frame.bindings {
                Bindings::Types { map, stdlib } => {
                    if !hidden {
                        if let Some(ty) = map.get(id) {
                            let mut report = Report::of(ty.clone());
                            if *stdlib {
                                if let Some(name) = id.as_name() {
                                    report.std_usage.insert(name.to_string());
                                }
                            }
                            return Ok(report);
                        }
                    }
                }
                Bindings::Defs(layer) => {
                    if !hidden {
                        if let Some(def) = layer.get(id) {
                            found = Some((idx, def.clone()));
                            break;
                        }
                    }
                }
            }
            if frame.fn_boundary {
                crossed_boundary = true;
            }
        }
        let Some((scope, def)) = found else {
            return Err(Error::new(ErrorKind::NotInScope, self.path_with(id)));
        };

        let key = NodeId::of(&def);
        if let Some(report) = self.cache.get(&key) {
            return Ok(report.clone());
        }
        // Re-entering a locked node means recursion: emit a placeholder tied
        // to the lock and resolve it once the outer analysis completes.
        if let Some(pending) = self.locks.get_mut(&key) {
            let unresolved = UnresolvedType::fresh(id.to_string());
            pending.push(unresolved.clone());
            return Ok(Report::of(Type::Unresolved(unresolved)));
        }

        self.locks.insert(key, Vec::new());
        self.path.push(id.to_string());
        let result = self.analyze_def(stack, scope, &def);
        self.path.pop();
        let pending = self.locks.remove(&key).unwrap_or_default();
        let report = result?;
        for unresolved in pending {
            self.resolve.insert(unresolved.id, report.ty.clone());
        }
        self.cache.insert(key, report.clone());
        Ok(report)
    }

    fn analyze_def(
        &mut self,
        stack: &[Arc<Frame>],
        scope: usize,
        def: &Arc<Def>,
    ) -> AnalyzeResult<Report> {
        let mut report = Report::of(Type::Never);
        report.def_types.insert(def.tag());

        let ty = match def.as_ref() {
            Def::Null => Type::Null,
            Def::Bool { .. } => Type::Bool,
            Def::Number { value } => {
                if !value.is_finite() {
                    return Err(Error::new(ErrorKind::InvalidFormat, self.path.clone())
                        .with_detail("numeric literals must be finite"));
                }
                Type::Number
            }
            Def::Str { .. } => Type::Str,
            Def::Literal { value } => self.literal_type(value)?,
            Def::List { items } => {
                let mut members = Vec::with_capacity(items.len());
                for item in items {
                    let child = self.analyze_ident(stack, scope, item)?;
                    report.absorb(&child);
                    members.push(child.ty);
                }
                if members.is_empty() {
                    array_of(Type::Var(TypeVar::fresh("el")))
                } else {
                    array_of(union(members))
                }
            }
            Def::Call { f, args } => {
                let callee = self.analyze_ident(stack, scope, f)?;
                report.absorb(&callee);
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args {
                    let child = self.analyze_ident(stack, scope, arg)?;
                    report.absorb(&child);
                    arg_types.push(child.ty);
                }
                apply(&callee.ty, &arg_types)
            }
            Def::Fn { params, body } => {
                let vars: Vec<TypeVar> = params.iter().map(|p| TypeVar::fresh(p)).collect();
                let bindings: HashMap<Ident, Type> = params
                    .iter()
                    .zip(&vars)
                    .map(|(p, v)| (Ident::name(p.clone()), Type::Var(v.clone())))
                    .collect();

                let mut child_stack: Vec<Arc<Frame>> = stack[..=scope].to_vec();
                child_stack.push(Arc::new(Frame {
                    bindings: Bindings::Types {
                        map: bindings,
                        stdlib: false,
                    },
                    fn_boundary: true,
                }));
                child_stack.push(Arc::new(Frame {
                    bindings: Bindings::Defs(body.clone()),
                    fn_boundary: false,
                }));

                let top = child_stack.len() - 1;
                let result = self.analyze_ident(&child_stack, top, &Ident::name("="))?;
                report.absorb(&result);
                Type::Func(FuncType {
                    mappings: vec![TypeMapping {
                        bindings: vars.clone(),
                        patterns: vars.into_iter().map(Pattern::var).collect(),
                        result: result.ty,
                    }],
                })
            }
            Def::Switch { cases } => {
                let mut members = Vec::with_capacity(cases.len());
                for case in cases {
                    if let Some(cond) = &case.cond {
                        // Conditions are walked for error propagation; their
                        // type is not constrained.
                        let child = self.analyze_ident(stack, scope, cond)?;
                        report.absorb(&child);
                    }
                    let child = self.analyze_ident(stack, scope, &case.value)?;
                    report.absorb(&child);
                    members.push(child.ty);
                }
                union(members)
            }
        };

        if !ty.is_valid() {
            return Err(Error::new(ErrorKind::TypeError, self.path.clone())
                .with_detail(format!("reduced to {}", ty.signature())));
        }
        report.ty = ty.reduce();
        Ok(report)
    }

    fn literal_type(&self, items: &[serde_json::Value]) -> AnalyzeResult<Type> {
        if items.is_empty() {
            return Ok(array_of(Type::Var(TypeVar::fresh("el"))));
        }
        let mut members = Vec::with_capacity(items.len());
        for item in items {
            members.push(self.json_type(item)?);
        }
        Ok(array_of(union(members)))
    }

    fn json_type(&self, item: &serde_json::Value) -> AnalyzeResult<Type> {
        match item {
            serde_json::Value::Null => Ok(Type::Null),
            serde_json::Value::Bool(_) => Ok(Type::Bool),
            serde_json::Value::Number(n) => {
                if n.as_f64().is_some_and(f64::is_finite) {
                    Ok(Type::Number)
                } else {
                    Err(Error::new(ErrorKind::InvalidFormat, self.path.clone())
                        .with_detail("literal numbers must be finite"))
                }
            }
            serde_json::Value::String(_) => Ok(Type::Str),
            serde_json::Value::Array(items) => self.literal_type(items),
            serde_json::Value::Object(_) => {
                Err(Error::new(ErrorKind::InvalidFormat, self.path.clone())
                    .with_detail("objects are not literal values"))
            }
        }
    }
}
