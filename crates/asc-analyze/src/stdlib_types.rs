//! Polymorphic types for every standard-library name.
//!
//! Each entry is built by [`poly_fn`], which turns rows of
//! `(patterns…, result)` into a function type with one mapping per row.
//! Mapping order is match order, so the most specific rows come first.
//! Calendar dates are `string` and instants/offsets are `number` at the
//! type level; the type algebra has no date primitives.

use std::collections::HashMap;

use asc_def::Ident;
use asc_types::{
    CondBranch, CondType, FuncType, Pattern, Type, TypeMapping, TypeVar, array_of, union,
};

/// Build a function type from pattern rows.
pub fn poly_fn(rows: Vec<(Vec<Pattern>, Type)>) -> Type {
    Type::Func(FuncType {
        mappings: rows
            .into_iter()
            .map(|(patterns, result)| TypeMapping {
                bindings: patterns.iter().flat_map(Pattern::bound_vars).collect(),
                patterns,
                result,
            })
            .collect(),
    })
}

fn num() -> Pattern {
    Pattern::prim(Type::Number)
}

fn text() -> Pattern {
    Pattern::prim(Type::Str)
}

fn boolean() -> Pattern {
    Pattern::prim(Type::Bool)
}

fn var(v: &TypeVar) -> Pattern {
    Pattern::var(v.clone())
}

fn t(v: &TypeVar) -> Type {
    Type::Var(v.clone())
}

fn call(f: &TypeVar, args: Vec<Type>) -> Type {
    Type::Applied(Box::new(Type::Var(f.clone())), args)
}

fn cond(branches: Vec<CondBranch>) -> Type {
    Type::Cond(CondType { branches })
}

fn branch(predicates: Vec<(Type, Pattern)>, result: Type) -> CondBranch {
    CondBranch { predicates, result }
}

fn string_or_null() -> Type {
    union([Type::Str, Type::Null])
}

/// The stdlib type bindings laid underneath every analysis stack.
pub fn stdlib_types() -> HashMap<Ident, Type> {
    let mut types: HashMap<Ident, Type> = HashMap::new();
    let mut add = |name: &str, ty: Type| {
        types.insert(Ident::name(name), ty);
    };

    // Arithmetic
    for name in ["+", "-", "*", "/", "^", "mod"] {
        add(name, poly_fn(vec![(vec![num(), num()], Type::Number)]));
    }
    for name in ["floor", "ceil", "round", "trunc", "sign", "abs"] {
        add(name, poly_fn(vec![(vec![num()], Type::Number)]));
    }

    // Comparison: total over any pair of types.
    for name in ["==", "!=", ">", "<", ">=", "<="] {
        let a = TypeVar::fresh("a");
        let b = TypeVar::fresh("b");
        add(name, poly_fn(vec![(vec![var(&a), var(&b)], Type::Bool)]));
    }

    // Logic
    for name in ["and", "or", "xor"] {
        add(name, poly_fn(vec![(vec![boolean(), boolean()], Type::Bool)]));
    }
    add("not", poly_fn(vec![(vec![boolean()], Type::Bool)]));

    add("++", concat_type());
    add("map", map_type());
    add("flat_map", flat_map_type());
    add("fold", fold_type());
    add("fold1", fold1_type());
    add("filter", filter_type());

    // Sequence accessors
    {
        let a = TypeVar::fresh("a");
        let b = TypeVar::fresh("b");
        add(
            "index",
            poly_fn(vec![
                (vec![num(), Pattern::array(var(&a))], t(&a)),
                (vec![num(), text()], Type::Str),
                (vec![num(), var(&b)], t(&b)),
            ]),
        );
    }
    {
        let f = TypeVar::fresh("f");
        let a = TypeVar::fresh("a");
        add(
            "find_index",
            poly_fn(vec![(
                vec![Pattern::func(1, f.clone()), var(&a)],
                Type::Number,
            )]),
        );
    }
    {
        let a = TypeVar::fresh("a");
        add("length", poly_fn(vec![(vec![var(&a)], Type::Number)]));
    }
    {
        let a = TypeVar::fresh("a");
        let b = TypeVar::fresh("b");
        add(
            "contains",
            poly_fn(vec![(vec![var(&a), var(&b)], Type::Bool)]),
        );
    }
    {
        let a = TypeVar::fresh("a");
        let b = TypeVar::fresh("b");
        add(
            "head",
            poly_fn(vec![
                (vec![Pattern::array(var(&a))], t(&a)),
                (vec![text()], Type::Str),
                (vec![var(&b)], t(&b)),
            ]),
        );
    }
    {
        let a = TypeVar::fresh("a");
        let b = TypeVar::fresh("b");
        add(
            "tail",
            poly_fn(vec![
                (vec![Pattern::array(var(&a))], array_of(t(&a))),
                (vec![text()], Type::Str),
                (vec![var(&b)], array_of(t(&b))),
            ]),
        );
    }
    {
        let a = TypeVar::fresh("a");
        let b = TypeVar::fresh("b");
        add(
            "sort",
            poly_fn(vec![
                (vec![Pattern::array(var(&a))], array_of(t(&a))),
                (vec![text()], Type::Str),
                (vec![var(&b)], t(&b)),
            ]),
        );
    }

    // Aggregation
    for name in ["sum", "avg", "med"] {
        let a = TypeVar::fresh("a");
        add(name, poly_fn(vec![(vec![var(&a)], Type::Number)]));
    }
    for name in ["min", "max"] {
        let a = TypeVar::fresh("a");
        add(
            name,
            poly_fn(vec![
                (vec![Pattern::array(num())], Type::Number),
                (vec![Pattern::array(text())], Type::Str),
                (vec![text()], Type::Str),
                (vec![num()], Type::Number),
                (vec![var(&a)], union([t(&a), Type::Null])),
            ]),
        );
    }

    // Dates (calendar strings)
    add(
        "date_sub",
        poly_fn(vec![(vec![text(), text(), text()], Type::Number)]),
    );
    add(
        "date_add",
        poly_fn(vec![(vec![text(), num(), text()], Type::Str)]),
    );
    add("date_today", poly_fn(vec![(vec![], Type::Str)]));
    add("date_fmt", poly_fn(vec![(vec![text(), text()], Type::Str)]));
    add(
        "date_get",
        poly_fn(vec![(vec![text(), text()], Type::Number)]),
    );
    add(
        "date_set",
        poly_fn(vec![(vec![text(), num(), text()], Type::Str)]),
    );

    // Timestamps (instants and offsets are numbers)
    add("ts_now", poly_fn(vec![(vec![], Type::Number)]));
    add("tz_utc", poly_fn(vec![(vec![], Type::Number)]));
    add("tz_local", poly_fn(vec![(vec![], Type::Number)]));
    add("ts_from_unix", poly_fn(vec![(vec![num()], Type::Number)]));
    add("ts_to_unix", poly_fn(vec![(vec![num()], Type::Number)]));
    add(
        "ts_from_date",
        poly_fn(vec![(vec![text(), num()], Type::Number)]),
    );
    add(
        "ts_to_date",
        poly_fn(vec![(vec![num(), num()], Type::Str)]),
    );
    add("ts_parse", poly_fn(vec![(vec![text()], Type::Number)]));
    add("ts_to_string", poly_fn(vec![(vec![num()], Type::Str)]));
    add(
        "ts_fmt",
        poly_fn(vec![(vec![text(), num(), num()], Type::Str)]),
    );
    add(
        "ts_add",
        poly_fn(vec![(vec![text(), num(), num()], Type::Number)]),
    );
    add(
        "ts_sub",
        poly_fn(vec![(vec![text(), num(), num()], Type::Number)]),
    );
    add(
        "ts_get",
        poly_fn(vec![(vec![text(), num(), num()], Type::Number)]),
    );
    add(
        "ts_set",
        poly_fn(vec![(vec![text(), num(), num(), num()], Type::Number)]),
    );

    // Formatting (null until the extension slots are populated)
    add(
        "currency_fmt",
        poly_fn(vec![(vec![text(), num()], string_or_null())]),
    );
    add("country_fmt", poly_fn(vec![(vec![text()], string_or_null())]));
    add("phone_fmt", poly_fn(vec![(vec![text()], string_or_null())]));

    // Misc
    {
        let a = TypeVar::fresh("a");
        let b = TypeVar::fresh("b");
        add(
            "if",
            poly_fn(vec![(
                vec![boolean(), var(&a), var(&b)],
                union([t(&a), t(&b)]),
            )]),
        );
    }
    {
        let a = TypeVar::fresh("a");
        add("id", poly_fn(vec![(vec![var(&a)], t(&a))]));
    }

    types
}

fn concat_type() -> Type {
    let mut rows = vec![(vec![text(), text()], Type::Str)];
    {
        let a = TypeVar::fresh("a");
        let b = TypeVar::fresh("b");
        rows.push((
            vec![Pattern::array(var(&a)), Pattern::array(var(&b))],
            array_of(union([t(&a), t(&b)])),
        ));
    }
    {
        let a = TypeVar::fresh("a");
        rows.push((
            vec![text(), Pattern::array(var(&a))],
            array_of(union([Type::Str, t(&a)])),
        ));
        let b = TypeVar::fresh("b");
        rows.push((
            vec![Pattern::array(var(&b)), text()],
            array_of(union([t(&b), Type::Str])),
        ));
    }
    {
        let a = TypeVar::fresh("a");
        let b = TypeVar::fresh("b");
        rows.push((
            vec![var(&a), var(&b)],
            array_of(union([t(&a), t(&b)])),
        ));
    }
    poly_fn(rows)
}

fn map_type() -> Type {
    let mut rows = Vec::new();
    {
        let f = TypeVar::fresh("f");
        let a = TypeVar::fresh("a");
        rows.push((
            vec![Pattern::func(1, f.clone()), Pattern::array(var(&a))],
            array_of(call(&f, vec![t(&a)])),
        ));
    }
    {
        // Mapping over a string stays a string while the element type does.
        let f = TypeVar::fresh("f");
        let out = call(&f, vec![Type::Str]);
        rows.push((
            vec![Pattern::func(1, f.clone()), text()],
            cond(vec![
                branch(vec![(out.clone(), text())], Type::Str),
                branch(vec![], array_of(out)),
            ]),
        ));
    }
    {
        // Non-iterables map as singletons.
        let f = TypeVar::fresh("f");
        let a = TypeVar::fresh("a");
        rows.push((
            vec![Pattern::func(1, f.clone()), var(&a)],
            call(&f, vec![t(&a)]),
        ));
    }
    poly_fn(rows)
}

fn flat_map_type() -> Type {
    let mut rows = Vec::new();
    {
        let f = TypeVar::fresh("f");
        let a = TypeVar::fresh("a");
        let b = TypeVar::fresh("b");
        let out = call(&f, vec![t(&a)]);
        rows.push((
            vec![Pattern::func(1, f.clone()), Pattern::array(var(&a))],
            cond(vec![
                branch(
                    vec![(out.clone(), Pattern::array(var(&b)))],
                    array_of(t(&b)),
                ),
                branch(vec![], array_of(out)),
            ]),
        ));
    }
    {
        let f = TypeVar::fresh("f");
        let b = TypeVar::fresh("b");
        let out = call(&f, vec![Type::Str]);
        rows.push((
            vec![Pattern::func(1, f.clone()), text()],
            cond(vec![
                branch(vec![(out.clone(), text())], Type::Str),
                branch(
                    vec![(out.clone(), Pattern::array(var(&b)))],
                    array_of(t(&b)),
                ),
                branch(vec![], array_of(out)),
            ]),
        ));
    }
    {
        let f = TypeVar::fresh("f");
        let a = TypeVar::fresh("a");
        rows.push((
            vec![Pattern::func(1, f.clone()), var(&a)],
            call(&f, vec![t(&a)]),
        ));
    }
    poly_fn(rows)
}

fn fold_type() -> Type {
    let mut rows = Vec::new();
    {
        let f = TypeVar::fresh("f");
        let acc = TypeVar::fresh("b");
        let a = TypeVar::fresh("a");
        rows.push((
            vec![
                Pattern::func(2, f.clone()),
                var(&acc),
                Pattern::array(var(&a)),
            ],
            union([t(&acc), call(&f, vec![t(&acc), t(&a)])]),
        ));
    }
    {
        let f = TypeVar::fresh("f");
        let acc = TypeVar::fresh("b");
        rows.push((
            vec![Pattern::func(2, f.clone()), var(&acc), text()],
            union([t(&acc), call(&f, vec![t(&acc), Type::Str])]),
        ));
    }
    {
        let f = TypeVar::fresh("f");
        let acc = TypeVar::fresh("b");
        let a = TypeVar::fresh("a");
        rows.push((
            vec![Pattern::func(2, f.clone()), var(&acc), var(&a)],
            union([t(&acc), call(&f, vec![t(&acc), t(&a)])]),
        ));
    }
    poly_fn(rows)
}

fn fold1_type() -> Type {
    let mut rows = Vec::new();
    {
        let f = TypeVar::fresh("f");
        let a = TypeVar::fresh("a");
        rows.push((
            vec![Pattern::func(2, f.clone()), Pattern::array(var(&a))],
            union([t(&a), call(&f, vec![t(&a), t(&a)])]),
        ));
    }
    {
        let f = TypeVar::fresh("f");
        rows.push((
            vec![Pattern::func(2, f.clone()), text()],
            union([Type::Str, call(&f, vec![Type::Str, Type::Str])]),
        ));
    }
    {
        let f = TypeVar::fresh("f");
        let a = TypeVar::fresh("a");
        rows.push((vec![Pattern::func(2, f.clone()), var(&a)], t(&a)));
    }
    poly_fn(rows)
}

fn filter_type() -> Type {
    let mut rows = Vec::new();
    {
        let f = TypeVar::fresh("f");
        let a = TypeVar::fresh("a");
        rows.push((
            vec![Pattern::func(1, f.clone()), Pattern::array(var(&a))],
            array_of(t(&a)),
        ));
    }
    {
        let f = TypeVar::fresh("f");
        rows.push((vec![Pattern::func(1, f.clone()), text()], Type::Str));
    }
    {
        let f = TypeVar::fresh("f");
        let a = TypeVar::fresh("a");
        rows.push((
            vec![Pattern::func(1, f.clone()), var(&a)],
            union([t(&a), Type::Null]),
        ));
    }
    poly_fn(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asc_types::apply;

    fn stdlib(name: &str) -> Type {
        stdlib_types()
            .remove(&Ident::name(name))
            .unwrap_or_else(|| panic!("missing stdlib type for {name}"))
    }

    #[test]
    fn every_native_has_a_type() {
        let names = [
            "+", "-", "*", "/", "^", "mod", "floor", "ceil", "round", "trunc", "sign", "abs",
            "==", "!=", ">", "<", ">=", "<=", "and", "or", "not", "xor", "++", "map", "flat_map",
            "fold", "fold1", "filter", "index", "find_index", "length", "contains", "head",
            "tail", "sort", "sum", "min", "max", "avg", "med", "date_sub", "date_add",
            "date_today", "date_fmt", "date_get", "date_set", "ts_now", "tz_utc", "tz_local",
            "ts_from_unix", "ts_to_unix", "ts_from_date", "ts_to_date", "ts_parse",
            "ts_to_string", "ts_fmt", "ts_add", "ts_sub", "ts_get", "ts_set", "currency_fmt",
            "country_fmt", "phone_fmt", "if", "id",
        ];
        let types = stdlib_types();
        for name in names {
            assert!(
                types.contains_key(&Ident::name(name)),
                "missing type for `{name}`"
            );
        }
        assert_eq!(types.len(), names.len());
    }

    #[test]
    fn addition_is_binary_numeric() {
        let plus = stdlib("+");
        assert_eq!(apply(&plus, &[Type::Number, Type::Number]), Type::Number);
        assert!(!apply(&plus, &[Type::Str, Type::Number]).is_valid());
        assert!(!apply(&plus, &[Type::Number]).is_valid());
    }

    #[test]
    fn map_distinguishes_strings_from_arrays() {
        let map = stdlib("map");
        let id = stdlib("id");
        let upper = stdlib("ts_to_string"); // number -> string

        assert_eq!(
            apply(&map, &[id.clone(), array_of(Type::Number)]).signature(),
            "array(number)"
        );
        assert_eq!(apply(&map, &[id, Type::Str]), Type::Str);
        // A string mapped through number -> string can't keep its element
        // type until the call reduces; it does here.
        assert_eq!(
            apply(&map, &[upper.clone(), array_of(Type::Number)]).signature(),
            "array(string)"
        );
        // Mapping a singleton applies once.
        assert_eq!(apply(&map, &[upper, Type::Number]), Type::Str);
    }

    #[test]
    fn flat_map_flattens_one_level() {
        let flat_map = stdlib("flat_map");
        let tail = stdlib("tail"); // array(a) -> array(a)
        assert_eq!(
            apply(&flat_map, &[tail, array_of(array_of(Type::Number))]).signature(),
            "array(number)"
        );
    }

    #[test]
    fn fold_unions_the_accumulator() {
        let fold = stdlib("fold");
        let plus = stdlib("+");
        assert_eq!(
            apply(&fold, &[plus, Type::Number, array_of(Type::Number)]),
            Type::Number
        );
    }

    #[test]
    fn concat_mixes_element_types() {
        let concat = stdlib("++");
        assert_eq!(apply(&concat, &[Type::Str, Type::Str]), Type::Str);
        assert_eq!(
            apply(&concat, &[Type::Str, array_of(Type::Number)]).signature(),
            "array((number | string))"
        );
    }

    #[test]
    fn formatters_may_return_null() {
        let fmt = stdlib("currency_fmt");
        assert_eq!(
            apply(&fmt, &[Type::Str, Type::Number]).signature(),
            "(null | string)"
        );
    }
}
