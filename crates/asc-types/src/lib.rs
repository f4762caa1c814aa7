//! The type algebra for asc definitions.
//!
//! This crate defines the semantic types produced by the analyzer: primitive
//! tags, type variables, unions, applied types, function types with
//! pattern-matching mappings, predicate-guarded conditional types, unresolved
//! recursion placeholders, and error types. The operations are `signature`,
//! `substitute`, `apply`, `reduce`, pattern `match`, `is_concrete`,
//! `does_halt`, and `is_valid`.
//!
//! Signatures are the identity of a type: two types are equal for union
//! deduplication exactly when their signatures agree.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Global counters for type-variable and unresolved-type identity.
///
/// Fresh ids come from process-wide counters so that no two analysis
/// contexts ever mint the same variable.
static TYPE_VAR_IDS: AtomicU64 = AtomicU64::new(0);
static UNRESOLVED_IDS: AtomicU64 = AtomicU64::new(0);

/// A type variable. Equality is identity (the id); the name is only used
/// when rendering signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVar {
    pub id: u64,
    pub name: String,
}

impl TypeVar {
    pub fn fresh(name: impl Into<String>) -> Self {
        Self {
            id: TYPE_VAR_IDS.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }
}

/// A placeholder for the type of a definition that referenced itself during
/// analysis. Replaced by the fully computed type in the resolve post-pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnresolvedType {
    pub id: u64,
    pub name: String,
}

impl UnresolvedType {
    pub fn fresh(name: impl Into<String>) -> Self {
        Self {
            id: UNRESOLVED_IDS.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }
}

/// Why type reduction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeErrorKind {
    /// No function mapping matched the argument types.
    Undefined,
    /// A function was applied with the wrong number of arguments.
    WrongArity,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A semantic type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// The empty type; absorbing under union, poisons application.
    Never,
    Null,
    Bool,
    Number,
    Str,
    /// The `array` constructor. Only meaningful applied to an element type.
    Array,
    Var(TypeVar),
    /// A deduplicated union. Use [`union`] to construct; an empty union is
    /// `Never` and a singleton collapses to its member.
    Union(Vec<Type>),
    /// A (possibly deferred) application of a receiver to arguments.
    Applied(Box<Type>, Vec<Type>),
    Func(FuncType),
    Cond(CondType),
    Unresolved(UnresolvedType),
    Error(TypeErrorKind),
}

/// A function type: an ordered list of pattern-matching mappings, all of the
/// same arity. Application tries mappings in order.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub mappings: Vec<TypeMapping>,
}

impl FuncType {
    pub fn arity(&self) -> usize {
        self.mappings.first().map_or(0, |m| m.patterns.len())
    }
}

/// One mapping of a function type: the variables it binds, the patterns its
/// arguments must match, and the result those bindings are substituted into.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMapping {
    pub bindings: Vec<TypeVar>,
    pub patterns: Vec<Pattern>,
    pub result: Type,
}

/// An argument pattern of a function-type mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Matches exactly this primitive type.
    Prim(Box<Type>),
    /// Matches an applied type with this head, argument-wise.
    Applied { head: Box<Type>, args: Vec<Pattern> },
    /// Matches any function of the given arity, binding the whole function.
    Func { arity: usize, bind: TypeVar },
    /// Matches anything, binding it.
    Var(TypeVar),
}

impl Pattern {
    pub fn prim(ty: Type) -> Self {
        Pattern::Prim(Box::new(ty))
    }

    pub fn var(v: TypeVar) -> Self {
        Pattern::Var(v)
    }

    pub fn array(elem: Pattern) -> Self {
        Pattern::Applied {
            head: Box::new(Type::Array),
            args: vec![elem],
        }
    }

    pub fn func(arity: usize, bind: TypeVar) -> Self {
        Pattern::Func { arity, bind }
    }

    /// The variables this pattern binds.
    pub fn bound_vars(&self) -> Vec<TypeVar> {
        match self {
            Pattern::Prim(_) => Vec::new(),
            Pattern::Applied { args, .. } => args.iter().flat_map(Pattern::bound_vars).collect(),
            Pattern::Func { bind, .. } => vec![bind.clone()],
            Pattern::Var(v) => vec![v.clone()],
        }
    }
}

/// A conditional type: ordered branches of predicate-guarded results.
///
/// Produced while building polymorphic stdlib mappings; reduction eliminates
/// falsified branches and collapses the first tautological one.
#[derive(Debug, Clone, PartialEq)]
pub struct CondType {
    pub branches: Vec<CondBranch>,
}

/// One branch of a conditional type. Each predicate pairs a scrutinee (a
/// bound variable at construction time) with the pattern it must match.
#[derive(Debug, Clone, PartialEq)]
pub struct CondBranch {
    pub predicates: Vec<(Type, Pattern)>,
    pub result: Type,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build a union, flattening nested unions and deduplicating members by
/// signature. The empty union is `Never`; `Never` absorbs; a singleton
/// collapses to its member. Members are kept sorted by signature so that
/// construction order does not leak into the signature.
pub fn union(members: impl IntoIterator<Item = Type>) -> Type {
    let mut seen: Vec<(String, Type)> = Vec::new();
    let mut absorbed = false;
    collect_union(members, &mut seen, &mut absorbed);
    if absorbed {
        return Type::Never;
    }
    seen.sort_by(|(a, _), (b, _)| a.cmp(b));
    let mut members: Vec<Type> = seen.into_iter().map(|(_, t)| t).collect();
    match members.len() {
        0 => Type::Never,
        1 => members.pop().unwrap_or(Type::Never),
        _ => Type::Union(members),
    }
}

fn collect_union(
    members: impl IntoIterator<Item = Type>,
    seen: &mut Vec<(String, Type)>,
    absorbed: &mut bool,
) {
    for member in members {
        match member {
            Type::Never => *absorbed = true,
            Type::Union(inner) => collect_union(inner, seen, absorbed),
            other => {
                let sig = other.signature();
                if !seen.iter().any(|(s, _)| *s == sig) {
                    seen.push((sig, other));
                }
            }
        }
    }
}

/// `array(elem)`, as an applied type.
pub fn array_of(elem: Type) -> Type {
    Type::Applied(Box::new(Type::Array), vec![elem])
}

// ---------------------------------------------------------------------------
// Signatures and display
// ---------------------------------------------------------------------------

impl Type {
    /// The canonical textual form of this type. Deterministic; the equality
    /// key for union deduplication.
    pub fn signature(&self) -> String {
        self.render(None)
    }

    fn render(&self, names: Option<&HashMap<u64, String>>) -> String {
        match self {
            Type::Never => "never".to_string(),
            Type::Null => "null".to_string(),
            Type::Bool => "bool".to_string(),
            Type::Number => "number".to_string(),
            Type::Str => "string".to_string(),
            Type::Array => "array".to_string(),
            Type::Var(v) => render_var(v, names),
            Type::Union(members) => {
                let parts: Vec<String> = members.iter().map(|m| m.render(names)).collect();
                format!("({})", parts.join(" | "))
            }
            Type::Applied(recv, args) => {
                let parts: Vec<String> = args.iter().map(|a| a.render(names)).collect();
                format!("{}({})", recv.render(names), parts.join(", "))
            }
            Type::Func(f) => {
                let mappings: Vec<String> = f
                    .mappings
                    .iter()
                    .map(|m| {
                        let pats: Vec<String> =
                            m.patterns.iter().map(|p| p.render(names)).collect();
                        format!("({}) -> {}", pats.join(", "), m.result.render(names))
                    })
                    .collect();
                format!("fn{{{}}}", mappings.join("; "))
            }
            Type::Cond(c) => {
                let branches: Vec<String> = c
                    .branches
                    .iter()
                    .map(|b| {
                        if b.predicates.is_empty() {
                            format!("_ => {}", b.result.render(names))
                        } else {
                            let preds: Vec<String> = b
                                .predicates
                                .iter()
                                .map(|(scrut, pat)| {
                                    format!("{} ~ {}", scrut.render(names), pat.render(names))
                                })
                                .collect();
                            format!("{} => {}", preds.join(" & "), b.result.render(names))
                        }
                    })
                    .collect();
                format!("cond({})", branches.join("; "))
            }
            Type::Unresolved(u) => match names {
                Some(_) => format!("~{}", u.name),
                None => format!("~{}#{}", u.name, u.id),
            },
            Type::Error(TypeErrorKind::Undefined) => "error(undefined)".to_string(),
            Type::Error(TypeErrorKind::WrongArity) => "error(arity)".to_string(),
        }
    }
}

impl Pattern {
    fn render(&self, names: Option<&HashMap<u64, String>>) -> String {
        match self {
            Pattern::Prim(t) => t.render(names),
            Pattern::Applied { head, args } => {
                let parts: Vec<String> = args.iter().map(|a| a.render(names)).collect();
                format!("{}({})", head.render(names), parts.join(", "))
            }
            Pattern::Func { arity, bind } => {
                format!("fn/{arity}@{}", render_var(bind, names))
            }
            Pattern::Var(v) => render_var(v, names),
        }
    }
}

fn render_var(v: &TypeVar, names: Option<&HashMap<u64, String>>) -> String {
    match names.and_then(|m| m.get(&v.id)) {
        Some(name) => format!("'{name}"),
        None => format!("'{}#{}", v.name, v.id),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Render a type with alphabetic names (`'a`, `'b`, …) for its variables, in
/// order of first appearance. Used for user-facing signatures.
pub fn display_signature(ty: &Type) -> String {
    let mut order: Vec<u64> = Vec::new();
    collect_var_order(ty, &mut order);
    let names: HashMap<u64, String> = order
        .into_iter()
        .enumerate()
        .map(|(i, id)| (id, alphabetic_var_name(i)))
        .collect();
    ty.render(Some(&names))
}

/// Alphabetic variable names: a, b, …, z, a1, b1, …
fn alphabetic_var_name(index: usize) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    let suffix = index / 26;
    if suffix == 0 {
        letter.to_string()
    } else {
        format!("{letter}{suffix}")
    }
}

fn collect_var_order(ty: &Type, order: &mut Vec<u64>) {
    let mut push = |id: u64, order: &mut Vec<u64>| {
        if !order.contains(&id) {
            order.push(id);
        }
    };
    match ty {
        Type::Var(v) => push(v.id, order),
        Type::Union(members) => {
            for m in members {
                collect_var_order(m, order);
            }
        }
        Type::Applied(recv, args) => {
            collect_var_order(recv, order);
            for a in args {
                collect_var_order(a, order);
            }
        }
        Type::Func(f) => {
            for m in &f.mappings {
                for p in &m.patterns {
                    collect_pattern_var_order(p, order);
                }
                collect_var_order(&m.result, order);
            }
        }
        Type::Cond(c) => {
            for b in &c.branches {
                for (scrut, pat) in &b.predicates {
                    collect_var_order(scrut, order);
                    collect_pattern_var_order(pat, order);
                }
                collect_var_order(&b.result, order);
            }
        }
        _ => {}
    }
}

fn collect_pattern_var_order(pat: &Pattern, order: &mut Vec<u64>) {
    match pat {
        Pattern::Prim(t) => collect_var_order(t, order),
        Pattern::Applied { args, .. } => {
            for a in args {
                collect_pattern_var_order(a, order);
            }
        }
        Pattern::Func { bind, .. } => {
            if !order.contains(&bind.id) {
                order.push(bind.id);
            }
        }
        Pattern::Var(v) => {
            if !order.contains(&v.id) {
                order.push(v.id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

impl Type {
    /// Replace every free occurrence of `var` by `value`.
    ///
    /// Function mappings that bind `var` are left untouched: substitution
    /// never reaches through a binder for its own variable.
    pub fn substitute(&self, var: &TypeVar, value: &Type) -> Type {
        match self {
            Type::Var(v) if v.id == var.id => value.clone(),
            Type::Union(members) => union(members.iter().map(|m| m.substitute(var, value))),
            Type::Applied(recv, args) => Type::Applied(
                Box::new(recv.substitute(var, value)),
                args.iter().map(|a| a.substitute(var, value)).collect(),
            ),
            Type::Func(f) => Type::Func(FuncType {
                mappings: f
                    .mappings
                    .iter()
                    .map(|m| {
                        if m.bindings.iter().any(|b| b.id == var.id) {
                            m.clone()
                        } else {
                            TypeMapping {
                                bindings: m.bindings.clone(),
                                patterns: m.patterns.clone(),
                                result: m.result.substitute(var, value),
                            }
                        }
                    })
                    .collect(),
            }),
            Type::Cond(c) => Type::Cond(CondType {
                branches: c
                    .branches
                    .iter()
                    .map(|b| CondBranch {
                        predicates: b
                            .predicates
                            .iter()
                            .map(|(scrut, pat)| (scrut.substitute(var, value), pat.clone()))
                            .collect(),
                        result: b.result.substitute(var, value),
                    })
                    .collect(),
            }),
            other => other.clone(),
        }
    }

    /// Replace every occurrence of the unresolved type `id` by `value`.
    pub fn substitute_unresolved(&self, id: u64, value: &Type) -> Type {
        match self {
            Type::Unresolved(u) if u.id == id => value.clone(),
            Type::Union(members) => {
                union(members.iter().map(|m| m.substitute_unresolved(id, value)))
            }
            Type::Applied(recv, args) => Type::Applied(
                Box::new(recv.substitute_unresolved(id, value)),
                args.iter()
                    .map(|a| a.substitute_unresolved(id, value))
                    .collect(),
            ),
            Type::Func(f) => Type::Func(FuncType {
                mappings: f
                    .mappings
                    .iter()
                    .map(|m| TypeMapping {
                        bindings: m.bindings.clone(),
                        patterns: m.patterns.clone(),
                        result: m.result.substitute_unresolved(id, value),
                    })
                    .collect(),
            }),
            Type::Cond(c) => Type::Cond(CondType {
                branches: c
                    .branches
                    .iter()
                    .map(|b| CondBranch {
                        predicates: b
                            .predicates
                            .iter()
                            .map(|(scrut, pat)| {
                                (scrut.substitute_unresolved(id, value), pat.clone())
                            })
                            .collect(),
                        result: b.result.substitute_unresolved(id, value),
                    })
                    .collect(),
            }),
            other => other.clone(),
        }
    }

    /// Does this type mention the unresolved type `id`?
    pub fn contains_unresolved(&self, id: u64) -> bool {
        match self {
            Type::Unresolved(u) => u.id == id,
            Type::Union(members) => members.iter().any(|m| m.contains_unresolved(id)),
            Type::Applied(recv, args) => {
                recv.contains_unresolved(id) || args.iter().any(|a| a.contains_unresolved(id))
            }
            Type::Func(f) => f
                .mappings
                .iter()
                .any(|m| m.result.contains_unresolved(id)),
            Type::Cond(c) => c.branches.iter().any(|b| {
                b.result.contains_unresolved(id)
                    || b.predicates.iter().any(|(s, _)| s.contains_unresolved(id))
            }),
            _ => false,
        }
    }

    /// Every unresolved-type id mentioned in this type.
    pub fn unresolved_ids(&self) -> Vec<u64> {
        fn walk(ty: &Type, out: &mut Vec<u64>) {
            match ty {
                Type::Unresolved(u) => {
                    if !out.contains(&u.id) {
                        out.push(u.id);
                    }
                }
                Type::Union(members) => members.iter().for_each(|m| walk(m, out)),
                Type::Applied(recv, args) => {
                    walk(recv, out);
                    args.iter().for_each(|a| walk(a, out));
                }
                Type::Func(f) => f.mappings.iter().for_each(|m| walk(&m.result, out)),
                Type::Cond(c) => c.branches.iter().for_each(|b| {
                    b.predicates.iter().for_each(|(s, _)| walk(s, out));
                    walk(&b.result, out);
                }),
                _ => {}
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }

    /// Does this type mention any unresolved type at all?
    pub fn has_unresolved(&self) -> bool {
        match self {
            Type::Unresolved(_) => true,
            Type::Union(members) => members.iter().any(Type::has_unresolved),
            Type::Applied(recv, args) => {
                recv.has_unresolved() || args.iter().any(Type::has_unresolved)
            }
            Type::Func(f) => f.mappings.iter().any(|m| m.result.has_unresolved()),
            Type::Cond(c) => c.branches.iter().any(|b| {
                b.result.has_unresolved() || b.predicates.iter().any(|(s, _)| s.has_unresolved())
            }),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Pattern matching
// ---------------------------------------------------------------------------

/// Outcome of matching a pattern against a type.
#[derive(Debug, Clone, PartialEq)]
pub enum Match {
    /// The pattern matched, with these variable bindings.
    Bind(Vec<(TypeVar, Type)>),
    /// The pattern cannot match this type.
    Fail,
    /// The argument is a type variable (or unresolved); matching must wait.
    Defer,
}

/// Match `pat` against `ty`. Unions match member-wise; bindings from the
/// members that matched are merged by union.
pub fn match_pattern(pat: &Pattern, ty: &Type) -> Match {
    if let Pattern::Var(v) = pat {
        return Match::Bind(vec![(v.clone(), ty.clone())]);
    }
    match ty {
        Type::Var(_) | Type::Unresolved(_) => Match::Defer,
        Type::Union(members) => {
            let mut bindings: Vec<(TypeVar, Type)> = Vec::new();
            let mut matched = false;
            let mut deferred = false;
            for member in members {
                match match_pattern(pat, member) {
                    Match::Bind(bs) => {
                        matched = true;
                        bindings.extend(bs);
                    }
                    Match::Fail => {}
                    Match::Defer => deferred = true,
                }
            }
            if matched {
                Match::Bind(merge_bindings(bindings))
            } else if deferred {
                Match::Defer
            } else {
                Match::Fail
            }
        }
        _ => match pat {
            Pattern::Prim(p) => {
                if ty.signature() == p.signature() {
                    Match::Bind(Vec::new())
                } else {
                    Match::Fail
                }
            }
            Pattern::Applied { head, args } => match ty {
                Type::Applied(recv, targs)
                    if recv.signature() == head.signature() && targs.len() == args.len() =>
                {
                    let mut bindings: Vec<(TypeVar, Type)> = Vec::new();
                    for (p, t) in args.iter().zip(targs) {
                        match match_pattern(p, t) {
                            Match::Bind(bs) => bindings.extend(bs),
                            Match::Fail => return Match::Fail,
                            Match::Defer => return Match::Defer,
                        }
                    }
                    Match::Bind(merge_bindings(bindings))
                }
                _ => Match::Fail,
            },
            Pattern::Func { arity, bind } => match ty {
                Type::Func(f) if f.arity() == *arity => {
                    Match::Bind(vec![(bind.clone(), ty.clone())])
                }
                _ => Match::Fail,
            },
            Pattern::Var(_) => unreachable!("variable patterns are handled above"),
        },
    }
}

/// Merge bindings for the same variable into a union.
fn merge_bindings(bindings: Vec<(TypeVar, Type)>) -> Vec<(TypeVar, Type)> {
    let mut merged: Vec<(TypeVar, Type)> = Vec::new();
    for (var, ty) in bindings {
        if let Some((_, existing)) = merged.iter_mut().find(|(v, _)| v.id == var.id) {
            *existing = union([existing.clone(), ty]);
        } else {
            merged.push((var, ty));
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Apply a receiver type to argument types.
///
/// `never` poisons the application from either side. Error types propagate.
/// Function types dispatch through their mappings; every other receiver
/// yields the receiver itself for an empty argument list (zero-arity
/// references are constants) and a deferred applied stub otherwise.
pub fn apply(recv: &Type, args: &[Type]) -> Type {
    if let Type::Error(_) = recv {
        return recv.clone();
    }
    if let Some(err) = args.iter().find(|a| matches!(a, Type::Error(_))) {
        return err.clone();
    }
    if matches!(recv, Type::Never) || args.iter().any(|a| matches!(a, Type::Never)) {
        return Type::Never;
    }
    match recv {
        Type::Func(f) => apply_mappings(f, args),
        Type::Union(members) => union(members.iter().map(|m| apply(m, args))),
        _ if args.is_empty() => recv.clone(),
        _ => Type::Applied(Box::new(recv.clone()), args.to_vec()),
    }
}

fn apply_mappings(f: &FuncType, args: &[Type]) -> Type {
    if f.arity() != args.len() {
        return Type::Error(TypeErrorKind::WrongArity);
    }
    let mut deferred = false;
    'mappings: for mapping in &f.mappings {
        let mut bindings: Vec<(TypeVar, Type)> = Vec::new();
        for (pat, arg) in mapping.patterns.iter().zip(args) {
            match match_pattern(pat, arg) {
                Match::Bind(bs) => bindings.extend(bs),
                Match::Fail => continue 'mappings,
                Match::Defer => {
                    deferred = true;
                    continue 'mappings;
                }
            }
        }
        let mut result = mapping.result.clone();
        for (var, ty) in merge_bindings(bindings) {
            result = result.substitute(&var, &ty);
        }
        // A first reduction may enable further reductions of re-applied
        // stdlib mappings, hence the second pass.
        return result.reduce().reduce();
    }
    if deferred {
        Type::Applied(Box::new(Type::Func(f.clone())), args.to_vec())
    } else {
        Type::Error(TypeErrorKind::Undefined)
    }
}

// ---------------------------------------------------------------------------
// Reduction
// ---------------------------------------------------------------------------

impl Type {
    /// One normalization pass. Composites reduce their children; applied
    /// types re-apply their reduced receiver; conditionals eliminate
    /// falsified branches and collapse the first tautology.
    pub fn reduce(&self) -> Type {
        match self {
            Type::Union(members) => union(members.iter().map(Type::reduce)),
            Type::Applied(recv, args) => {
                let recv = recv.reduce();
                let args: Vec<Type> = args.iter().map(Type::reduce).collect();
                apply(&recv, &args)
            }
            Type::Func(f) => Type::Func(FuncType {
                mappings: f
                    .mappings
                    .iter()
                    .map(|m| TypeMapping {
                        bindings: m.bindings.clone(),
                        patterns: m.patterns.clone(),
                        result: m.result.reduce(),
                    })
                    .collect(),
            }),
            Type::Cond(c) => reduce_cond(c),
            other => other.clone(),
        }
    }
}

fn reduce_cond(cond: &CondType) -> Type {
    let mut kept: Vec<CondBranch> = Vec::new();
    for branch in &cond.branches {
        let predicates: Vec<(Type, Pattern)> = branch
            .predicates
            .iter()
            .map(|(scrut, pat)| (scrut.reduce(), pat.clone()))
            .collect();

        let mut decidable = true;
        let mut falsified = false;
        let mut bindings: Vec<(TypeVar, Type)> = Vec::new();
        for (scrut, pat) in &predicates {
            if !scrut.is_concrete() {
                decidable = false;
                continue;
            }
            match match_pattern(pat, scrut) {
                Match::Bind(bs) => bindings.extend(bs),
                Match::Fail => {
                    falsified = true;
                    break;
                }
                Match::Defer => decidable = false,
            }
        }
        if falsified {
            continue;
        }

        if decidable {
            // Tautological branch: substitute predicate bindings and take it.
            let mut result = branch.result.clone();
            for (var, ty) in merge_bindings(bindings) {
                result = result.substitute(&var, &ty);
            }
            let result = result.reduce();
            if kept.is_empty() {
                return result;
            }
            // Earlier branches are still undecided; this branch becomes the
            // default and everything after it is unreachable.
            splice_branch(&mut kept, Vec::new(), result);
            break;
        }

        splice_branch(&mut kept, predicates, branch.result.reduce());
    }

    match kept.len() {
        0 => Type::Never,
        1 if kept[0].predicates.is_empty() => kept.remove(0).result,
        _ => Type::Cond(CondType { branches: kept }),
    }
}

/// Append a branch, splicing a nested conditional result into flat branches.
fn splice_branch(kept: &mut Vec<CondBranch>, predicates: Vec<(Type, Pattern)>, result: Type) {
    match result {
        Type::Cond(inner) => {
            for b in inner.branches {
                let mut preds = predicates.clone();
                preds.extend(b.predicates);
                kept.push(CondBranch {
                    predicates: preds,
                    result: b.result,
                });
            }
        }
        other => kept.push(CondBranch {
            predicates,
            result: other,
        }),
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl Type {
    /// Does this type contain no free type variables and no unresolved
    /// placeholders? Variables bound by a function mapping do not count.
    pub fn is_concrete(&self) -> bool {
        fn walk(ty: &Type, bound: &mut Vec<u64>) -> bool {
            match ty {
                Type::Var(v) => bound.contains(&v.id),
                Type::Unresolved(_) => false,
                Type::Union(members) => members.iter().all(|m| walk(m, bound)),
                Type::Applied(recv, args) => {
                    walk(recv, bound) && args.iter().all(|a| walk(a, bound))
                }
                Type::Func(f) => f.mappings.iter().all(|m| {
                    let added = m.bindings.len();
                    bound.extend(m.bindings.iter().map(|b| b.id));
                    let ok = walk(&m.result, bound);
                    bound.truncate(bound.len() - added);
                    ok
                }),
                Type::Cond(c) => c.branches.iter().all(|b| {
                    b.predicates.iter().all(|(s, _)| walk(s, bound)) && walk(&b.result, bound)
                }),
                _ => true,
            }
        }
        walk(self, &mut Vec::new())
    }

    /// Tri-valued termination: `Some(true)` if this type provably halts,
    /// `Some(false)` if it provably diverges, `None` if unknown.
    pub fn does_halt(&self) -> Option<bool> {
        match self {
            Type::Never => Some(false),
            Type::Null | Type::Bool | Type::Number | Type::Str | Type::Array | Type::Error(_) => {
                Some(true)
            }
            Type::Var(_) | Type::Unresolved(_) => None,
            Type::Applied(_, _) => None,
            Type::Union(members) => fold_halt(members.iter().map(Type::does_halt)),
            Type::Func(f) => fold_halt(f.mappings.iter().map(|m| m.result.does_halt())),
            Type::Cond(c) => fold_halt(c.branches.iter().map(|b| b.result.does_halt())),
        }
    }

    /// False iff this type contains an error type anywhere.
    pub fn is_valid(&self) -> bool {
        match self {
            Type::Error(_) => false,
            Type::Union(members) => members.iter().all(Type::is_valid),
            Type::Applied(recv, args) => recv.is_valid() && args.iter().all(Type::is_valid),
            Type::Func(f) => f.mappings.iter().all(|m| m.result.is_valid()),
            Type::Cond(c) => c.branches.iter().all(|b| {
                b.result.is_valid() && b.predicates.iter().all(|(s, _)| s.is_valid())
            }),
            _ => true,
        }
    }
}

fn fold_halt(parts: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut all_true = true;
    for part in parts {
        match part {
            Some(false) => return Some(false),
            Some(true) => {}
            None => all_true = false,
        }
    }
    if all_true { Some(true) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_fn() -> Type {
        let a = TypeVar::fresh("a");
        Type::Func(FuncType {
            mappings: vec![TypeMapping {
                bindings: vec![a.clone()],
                patterns: vec![Pattern::var(a.clone())],
                result: Type::Var(a),
            }],
        })
    }

    fn add_fn() -> Type {
        Type::Func(FuncType {
            mappings: vec![TypeMapping {
                bindings: vec![],
                patterns: vec![Pattern::prim(Type::Number), Pattern::prim(Type::Number)],
                result: Type::Number,
            }],
        })
    }

    #[test]
    fn union_deduplicates_by_signature() {
        assert_eq!(union([Type::Number, Type::Number]), Type::Number);
        let u = union([Type::Number, Type::Str]);
        assert_eq!(u.signature(), "(number | string)");
    }

    #[test]
    fn union_is_order_insensitive() {
        let a = union([Type::Number, Type::Str, Type::Null]);
        let b = union([Type::Null, Type::Str, Type::Number]);
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn empty_union_is_never_and_never_absorbs() {
        assert_eq!(union([]), Type::Never);
        assert_eq!(union([Type::Number, Type::Never]), Type::Never);
    }

    #[test]
    fn applied_array_signature() {
        assert_eq!(apply(&Type::Array, &[Type::Number]).signature(), "array(number)");
    }

    #[test]
    fn substitute_fresh_var_is_identity() {
        let ty = array_of(union([Type::Number, Type::Str]));
        let fresh = TypeVar::fresh("z");
        assert_eq!(ty.substitute(&fresh, &Type::Bool).signature(), ty.signature());
    }

    #[test]
    fn substitute_is_blocked_by_binders() {
        let id = identity_fn();
        let Type::Func(f) = &id else { unreachable!() };
        let bound = f.mappings[0].bindings[0].clone();
        // Substituting the bound variable must not rewrite the mapping body.
        assert_eq!(id.substitute(&bound, &Type::Number).signature(), id.signature());
    }

    #[test]
    fn apply_identity_is_polymorphic() {
        let id = identity_fn();
        assert_eq!(apply(&id, &[Type::Number]), Type::Number);
        assert_eq!(apply(&id, &[Type::Str]), Type::Str);
    }

    #[test]
    fn apply_wrong_arity_is_an_error() {
        let add = add_fn();
        let out = apply(&add, &[Type::Number]);
        assert_eq!(out, Type::Error(TypeErrorKind::WrongArity));
        assert!(!out.is_valid());
    }

    #[test]
    fn apply_defers_on_type_variable_arguments() {
        let add = add_fn();
        let a = Type::Var(TypeVar::fresh("x"));
        let out = apply(&add, &[a.clone(), Type::Number]);
        let Type::Applied(_, args) = &out else {
            panic!("expected a deferred application, got {out}");
        };
        assert_eq!(args[0], a);
        // Once the variable is substituted, reduction completes the call.
        let Type::Var(v) = &a else { unreachable!() };
        assert_eq!(out.substitute(v, &Type::Number).reduce(), Type::Number);
    }

    #[test]
    fn apply_with_no_matching_mapping_is_undefined() {
        let add = add_fn();
        assert_eq!(
            apply(&add, &[Type::Str, Type::Number]),
            Type::Error(TypeErrorKind::Undefined)
        );
    }

    #[test]
    fn never_poisons_application() {
        assert_eq!(apply(&Type::Never, &[Type::Number]), Type::Never);
        assert_eq!(apply(&add_fn(), &[Type::Never, Type::Number]), Type::Never);
    }

    #[test]
    fn zero_argument_application_of_a_constant_is_the_constant() {
        assert_eq!(apply(&Type::Number, &[]), Type::Number);
    }

    #[test]
    fn application_of_a_primitive_with_arguments_defers() {
        let out = apply(&Type::Number, &[Type::Number]);
        assert_eq!(out.signature(), "number(number)");
    }

    #[test]
    fn cond_collapses_tautology() {
        let c = Type::Cond(CondType {
            branches: vec![
                CondBranch {
                    predicates: vec![(Type::Str, Pattern::prim(Type::Str))],
                    result: Type::Str,
                },
                CondBranch {
                    predicates: vec![],
                    result: Type::Number,
                },
            ],
        });
        assert_eq!(c.reduce(), Type::Str);
    }

    #[test]
    fn cond_eliminates_falsified_branches() {
        let c = Type::Cond(CondType {
            branches: vec![
                CondBranch {
                    predicates: vec![(Type::Number, Pattern::prim(Type::Str))],
                    result: Type::Str,
                },
                CondBranch {
                    predicates: vec![],
                    result: Type::Number,
                },
            ],
        });
        assert_eq!(c.reduce(), Type::Number);
    }

    #[test]
    fn cond_with_free_scrutinee_stays_put() {
        let v = Type::Var(TypeVar::fresh("r"));
        let c = Type::Cond(CondType {
            branches: vec![
                CondBranch {
                    predicates: vec![(v, Pattern::prim(Type::Str))],
                    result: Type::Str,
                },
                CondBranch {
                    predicates: vec![],
                    result: Type::Number,
                },
            ],
        });
        assert!(matches!(c.reduce(), Type::Cond(_)));
    }

    #[test]
    fn cond_predicate_bindings_flow_into_the_result() {
        let b = TypeVar::fresh("b");
        let c = Type::Cond(CondType {
            branches: vec![
                CondBranch {
                    predicates: vec![(array_of(Type::Number), Pattern::array(Pattern::var(b.clone())))],
                    result: array_of(Type::Var(b)),
                },
                CondBranch {
                    predicates: vec![],
                    result: Type::Null,
                },
            ],
        });
        assert_eq!(c.reduce().signature(), "array(number)");
    }

    #[test]
    fn reduce_is_stable_on_deferred_applications() {
        let add = add_fn();
        let stub = apply(&add, &[Type::Var(TypeVar::fresh("q")), Type::Number]);
        assert_eq!(stub.reduce().signature(), stub.signature());
    }

    #[test]
    fn is_concrete_distinguishes_bound_from_free() {
        assert!(identity_fn().is_concrete());
        assert!(!Type::Var(TypeVar::fresh("free")).is_concrete());
    }

    #[test]
    fn does_halt_is_tri_valued() {
        assert_eq!(Type::Number.does_halt(), Some(true));
        assert_eq!(Type::Never.does_halt(), Some(false));
        assert_eq!(Type::Var(TypeVar::fresh("u")).does_halt(), None);
    }

    #[test]
    fn display_signature_renames_variables_alphabetically() {
        assert_eq!(display_signature(&identity_fn()), "fn{('a) -> 'a}");
    }

    #[test]
    fn unresolved_substitution_resolves_recursion() {
        let u = UnresolvedType::fresh("r");
        let ty = Type::Unresolved(u.clone());
        // A self-referential resolution collapses to never.
        assert_eq!(ty.substitute_unresolved(u.id, &Type::Never), Type::Never);
    }

    #[test]
    fn match_merges_union_members() {
        let el = TypeVar::fresh("el");
        let pat = Pattern::array(Pattern::var(el.clone()));
        let arg = union([array_of(Type::Number), array_of(Type::Str)]);
        let Match::Bind(bindings) = match_pattern(&pat, &arg) else {
            panic!("expected a match");
        };
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].1.signature(), "(number | string)");
    }
}
