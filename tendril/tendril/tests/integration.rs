//! End-to-end behavior of compile, match, scan, and edit.

use rstest::rstest;
use serde_json::{json, Value};
use similar_asserts::assert_eq;

use tendril::{
    apply_edits, collect_edits, compile, match_all, scan_all, EditOptions, EditPlan, EvalError,
    EvalOptions, Per, Site, Solution, Tendril,
};

fn solutions(pattern: &str, input: &Value) -> Vec<Solution> {
    Tendril::new(pattern)
        .unwrap_or_else(|e| panic!("{pattern}: {e}"))
        .match_all(input)
        .unwrap()
}

fn bindings(pattern: &str, input: &Value) -> Vec<Value> {
    solutions(pattern, input)
        .into_iter()
        .map(|sol| Value::Object(sol.bindings().into_iter().collect()))
        .collect()
}

/// Every site of every binding points at a value deep-equal to the
/// binding (or, for key sites, at an existing key).
fn assert_sites_consistent(sol: &Solution, input: &Value) {
    for (name, sites) in sol.sites() {
        for site in sites {
            match site {
                Site::Scalar { path, recorded } => {
                    let at = tendril::value::value_at(input, path).expect("site path exists");
                    assert_eq!(at, recorded, "recorded snapshot of `{name}`");
                }
                Site::Slice {
                    path,
                    start,
                    end,
                    recorded,
                } => {
                    let at = tendril::value::value_at(input, path).expect("site path exists");
                    let items = at.as_array().expect("slice site in an array");
                    assert_eq!(&items[*start..*end], recorded.as_slice());
                }
                Site::Keys { path, keys, .. } => {
                    let at = tendril::value::value_at(input, path).expect("site path exists");
                    let map = at.as_object().expect("keys site in an object");
                    for k in keys {
                        assert!(map.contains_key(k), "captured key `{k}` exists");
                    }
                }
                Site::Key { path, key } => {
                    let at = tendril::value::value_at(input, path).expect("site path exists");
                    let map = at.as_object().expect("key site in an object");
                    assert!(map.contains_key(key), "bound key `{key}` exists");
                }
            }
        }
    }
}

#[test]
fn unification() {
    assert_eq!(bindings("[$x, $x]", &json!([3, 3])), vec![json!({"x": 3})]);
    assert_eq!(bindings("[$x, $x]", &json!([3, 4])), Vec::<Value>::new());

    // deep values unify structurally
    let twins = json!([{"a": [1]}, {"a": [1]}]);
    let sols = solutions("[$x, $x]", &twins);
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].sites_of("x").len(), 2);
    assert_sites_consistent(&sols[0], &twins);
}

#[test]
fn trailing_slice_binding() {
    let input = json!([1, 2, 3, 4]);
    let sols = solutions("[_, _, $tail...]", &input);
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("tail"), Some(json!([3, 4])));
    assert_sites_consistent(&sols[0], &input);
}

#[test]
fn array_anchoring() {
    assert_eq!(solutions("[1, 2]", &json!([1, 2])).len(), 1);
    assert_eq!(solutions("[1, 2]", &json!([1, 2, 3])).len(), 0);
    assert_eq!(solutions("[1, 2, ...]", &json!([1, 2, 3])).len(), 1);
    assert_eq!(solutions("[]", &json!([])).len(), 1);
    assert_eq!(solutions("[_]", &json!([])).len(), 0);
    // an array pattern never matches a non-array
    assert_eq!(solutions("[_]", &json!({"0": 1})).len(), 0);
}

#[test]
fn quantifier_enumeration_order() {
    let input = json!(["a", "a", "b"]);

    let greedy: Vec<Option<Value>> = solutions("[@run=a* ...]", &input)
        .into_iter()
        .map(|s| s.value_of("run"))
        .collect();
    assert_eq!(
        greedy,
        vec![
            Some(json!(["a", "a"])),
            Some(json!(["a"])),
            Some(json!([])),
        ]
    );

    let lazy: Vec<Option<Value>> = solutions("[@run=a*? ...]", &input)
        .into_iter()
        .map(|s| s.value_of("run"))
        .collect();
    assert_eq!(
        lazy,
        vec![
            Some(json!([])),
            Some(json!(["a"])),
            Some(json!(["a", "a"])),
        ]
    );

    // possessive commits to the maximum
    let possessive: Vec<Option<Value>> = solutions("[@run=a*+ ...]", &input)
        .into_iter()
        .map(|s| s.value_of("run"))
        .collect();
    assert_eq!(possessive, vec![Some(json!(["a", "a"]))]);
}

#[test]
fn counted_quantifier() {
    assert_eq!(solutions("[_number{2,3}]", &json!([1, 2])).len(), 1);
    assert_eq!(solutions("[_number{2,3}]", &json!([1])).len(), 0);
    assert_eq!(solutions("[_number{2,3}]", &json!([1, 2, 3, 4])).len(), 0);
}

#[test]
fn alternation() {
    // unordered alternation enumerates every branch
    assert_eq!(
        bindings("$x=1 | $x=_number", &json!(1)),
        vec![json!({"x": 1}), json!({"x": 1})]
    );
    // prioritized alternation stops at the first branch that yields
    assert_eq!(
        bindings("$x=1 || $x=_number", &json!(1)),
        vec![json!({"x": 1})]
    );
    assert_eq!(bindings("$x=1 || $x=_number", &json!(7)), vec![json!({"x": 7})]);
}

#[test]
fn conjunction() {
    assert_eq!(solutions("_number & 3", &json!(3)).len(), 1);
    assert_eq!(solutions("_number & 3", &json!(4)).len(), 0);
    assert_eq!(solutions("_string & 3", &json!(3)).len(), 0);
}

#[test]
fn guarded_binding() {
    let adult = json!({"name": "Ada", "age": 21});
    let sols = solutions("{name: $n, age: $a where $a >= 18}", &adult);
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("n"), Some(json!("Ada")));
    assert_eq!(sols[0].value_of("a"), Some(json!(21)));
    assert_sites_consistent(&sols[0], &adult);

    let minor = json!({"name": "Ada", "age": 12});
    assert_eq!(
        solutions("{name: $n, age: $a where $a >= 18}", &minor).len(),
        0
    );
}

#[test]
fn guard_never_closing_rejects() {
    // $y is never bound, so the guard cannot close
    assert_eq!(solutions("{a: $x where $y > 1}", &json!({"a": 1})).len(), 0);
}

#[test]
fn cross_variable_guard() {
    let input = json!({"lo": 1, "hi": 5});
    assert_eq!(
        solutions("{lo: $a, hi: $b where $b > $a}", &input).len(),
        1
    );
    let flipped = json!({"lo": 5, "hi": 1});
    assert_eq!(
        solutions("{lo: $a, hi: $b where $b > $a}", &flipped).len(),
        0
    );
}

#[test]
fn vertical_key_path() {
    let input = json!({"user": {"email": "x@y"}});
    let sols = solutions("{user.email: $e}", &input);
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("e"), Some(json!("x@y")));
    assert_sites_consistent(&sols[0], &input);
}

#[test]
fn bracket_breadcrumb() {
    let input = json!({"tags": ["a", "b"]});
    let sols = solutions("{tags[1]: $t}", &input);
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("t"), Some(json!("b")));
}

#[test]
fn recursive_descent_key() {
    let input = json!({"a": {"id": 7}, "id": 9});
    let mut values: Vec<Value> = solutions("{..id: $v, ...}", &input)
        .into_iter()
        .filter_map(|s| s.value_of("v"))
        .collect();
    values.sort_by_key(|v| v.as_i64());
    assert_eq!(values, vec![json!(7), json!(9)]);
}

#[test]
fn object_closure() {
    assert_eq!(solutions("{a: 1}", &json!({"a": 1})).len(), 1);
    assert_eq!(solutions("{a: 1}", &json!({"a": 1, "b": 2})).len(), 0);
    assert_eq!(solutions("{a: 1, ...}", &json!({"a": 1, "b": 2})).len(), 1);
    assert_eq!(solutions("{}", &json!({})).len(), 1);
    assert_eq!(solutions("{}", &json!({"a": 1})).len(), 0);
}

#[test]
fn closed_assertion() {
    assert_eq!(solutions("{a: 1, (! ...)}", &json!({"a": 1})).len(), 1);
    // the assertion is about the residual, which `b` is part of
    let open = json!({"a": 1, "b": 2});
    assert_eq!(solutions("{a: 1, (! ...), ...}", &open).len(), 0);
}

#[test]
fn strong_terms() {
    let pattern = "{each /^x/: _number, ...}";
    assert_eq!(solutions(pattern, &json!({"x1": 1, "x2": 2})).len(), 1);
    assert_eq!(solutions(pattern, &json!({"x1": 1, "x2": "no"})).len(), 0);
    // unrelated keys neither cover nor offend
    assert_eq!(
        solutions(pattern, &json!({"x1": 1, "other": true})).len(),
        1
    );
}

#[test]
fn weak_terms_tolerate_bad_entries() {
    // at least one `/^x/` key is a number; a bad one is fine
    let pattern = "{/^x/: _number, ...}";
    assert_eq!(solutions(pattern, &json!({"x1": 1, "x2": "no"})).len(), 1);
    assert_eq!(solutions(pattern, &json!({"x2": "no"})).len(), 0);
}

#[test]
fn optional_terms() {
    assert_eq!(solutions("{a: 1?}", &json!({})).len(), 1);
    assert_eq!(solutions("{a: 1?}", &json!({"a": 1})).len(), 1);
    // the key is covered even when its value misses an optional pattern
    assert_eq!(solutions("{a: 1?}", &json!({"a": 2})).len(), 1);
    assert_eq!(solutions("{each a: 1?}", &json!({"a": 2})).len(), 0);
}

#[test]
fn term_cardinality() {
    let pattern = "{/^x/: _number #{2,2}, ...}";
    assert_eq!(solutions(pattern, &json!({"x1": 1})).len(), 0);
    assert_eq!(solutions(pattern, &json!({"x1": 1, "x2": 2})).len(), 1);
    assert_eq!(
        solutions(pattern, &json!({"x1": 1, "x2": 2, "x3": 3})).len(),
        0
    );
}

#[test]
fn key_binding_enumerates() {
    let input = json!({"a": 1, "b": 2});
    let mut pairs: Vec<(Value, Value)> = solutions("{$k: $v, ...}", &input)
        .into_iter()
        .map(|s| (s.value_of("k").unwrap(), s.value_of("v").unwrap()))
        .collect();
    pairs.sort_by_key(|(k, _)| k.as_str().unwrap().to_string());
    assert_eq!(
        pairs,
        vec![
            (json!("a"), json!(1)),
            (json!("b"), json!(2)),
        ]
    );
}

#[test]
fn remainder_capture() {
    let input = json!({"a": 1, "b": 2, "c": 3});
    let sols = solutions("{a: 1, @rest...}", &input);
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("rest"), Some(json!({"b": 2, "c": 3})));
    assert_sites_consistent(&sols[0], &input);
}

#[test]
fn string_matchers() {
    assert_eq!(solutions("{name: ada/i}", &json!({"name": "ADA"})).len(), 1);
    assert_eq!(solutions("{name: ada/i}", &json!({"name": "Abe"})).len(), 0);
    assert_eq!(
        solutions("{email: /@/, ...}", &json!({"email": "x@y"})).len(),
        1
    );
    assert_eq!(
        solutions("{email: /@/, ...}", &json!({"email": 42})).len(),
        0
    );
}

#[test]
fn scalar_binding_rejects_sequences() {
    // a sequence needs a group binding; scalar bindings fail on it
    assert_eq!(solutions("($x=(1 2))", &json!([1, 2])).len(), 0);
    // the group form works
    let sols = solutions("[@x=(1 2)]", &json!([1, 2]));
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("x"), Some(json!([1, 2])));
}

#[test]
fn lookahead_bindings_escape() {
    let sols = solutions("[(? $x) 1 ...]", &json!([1, 2]));
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("x"), Some(json!(1)));
}

#[test]
fn negative_lookahead_is_isolated() {
    // blocks when its pattern matches
    assert_eq!(solutions("[(! 1) ...]", &json!([1, 2])).len(), 0);
    // passes without committing any binding
    let sols = solutions("[(! $z=9) _ ...]", &json!([1]));
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("z"), None);
}

#[test]
fn object_lookahead() {
    let input = json!({"a": 1, "b": 2});
    assert_eq!(solutions("{(? a: 1), ...}", &input).len(), 1);
    assert_eq!(solutions("{(! a: 1), ...}", &input).len(), 0);
    assert_eq!(solutions("{(! a: 9), ...}", &input).len(), 1);
}

#[test]
fn scan_positions() {
    let input = json!({"a": 1, "b": {"a": 2}});
    let pattern = compile("{$k: $v, ...}").unwrap();
    let sols = scan_all(&pattern, &input, &EvalOptions::default()).unwrap();

    // the root object (two entries) and the nested object (one entry)
    assert_eq!(sols.len(), 3);

    let mut roots: Vec<String> = sols
        .iter()
        .map(|s| match &s.sites_of("0")[0] {
            Site::Scalar { path, .. } => format!("{path:?}"),
            other => panic!("whole-match site is scalar: {other:?}"),
        })
        .collect();
    roots.dedup();
    assert!(roots.len() >= 2, "scan hits distinct positions: {roots:?}");
}

#[test]
fn scan_finds_deep_arrays() {
    let input = json!({"xs": [1, [2, 3]]});
    let pattern = compile("[_number, _number]").unwrap();
    let sols = scan_all(&pattern, &input, &EvalOptions::default()).unwrap();
    assert_eq!(sols.len(), 1);
}

#[test]
fn labeled_array_flow() {
    let input = json!([1, 2, 3]);
    let sols = solutions("rows@[ (_ -> @all)* ]", &input);
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("all"), Some(json!([1, 2, 3])));
}

#[test]
fn collecting_object_flow() {
    let input = json!({"a": 1, "b": 2});
    let sols = solutions("cfg@{each $k: ($v -> %pairs($k: $v))}", &input);
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("pairs"), Some(json!({"a": 1, "b": 2})));
    // contributed variables were released into the bucket
    assert_eq!(sols[0].value_of("k"), None);
    assert_eq!(sols[0].value_of("v"), None);
}

#[test]
fn keyed_flow_uses_iteration_key() {
    let input = json!({"a": 1, "b": 2});
    let sols = solutions("cfg@{each _: (_number -> %nums)}", &input);
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].value_of("nums"), Some(json!({"a": 1, "b": 2})));
}

#[test]
fn dangling_flows_are_rejected_at_compile_time() {
    // no enclosing labeled scope at all
    let err = Tendril::new("[(_ -> @b)]").unwrap_err();
    assert!(err.to_string().contains("labeled scope"), "{err}");

    // a typo'd label never matches any enclosing scope
    let err = Tendril::new("rows@[ (_ -> rws:@all)* ]").unwrap_err();
    assert!(err.to_string().contains("unknown label"), "{err}");

    // the well-labeled forms still compile
    assert!(Tendril::new("rows@[ (_ -> rows:@all)* ]").is_ok());
    assert!(Tendril::new("rows@[ (_ -> @all)* ]").is_ok());
}

#[test]
fn step_budget() {
    let pattern = compile("[_* _* _* 9]").unwrap();
    let input = json!([1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1]);
    let opts = EvalOptions {
        max_steps: 500,
        ..Default::default()
    };
    let err = match_all(&pattern, &input, &opts).unwrap_err();
    assert!(matches!(err, EvalError::Ambiguous { .. }), "{err}");
    insta::assert_snapshot!(
        err.to_string(),
        @"pattern is too ambiguous: step budget of 500 exceeded"
    );

    // the same run fits a real budget
    let ok = match_all(&pattern, &input, &EvalOptions::default()).unwrap();
    assert_eq!(ok.len(), 0);
}

#[rstest]
#[case("_string", json!("s"), true)]
#[case("_string", json!(1), false)]
#[case("_number", json!(2.5), true)]
#[case("_number", json!("2.5"), false)]
#[case("_boolean", json!(false), true)]
#[case("_boolean", json!(0), false)]
#[case("_", json!(null), true)]
fn typed_wildcards(#[case] pattern: &str, #[case] input: Value, #[case] expect: bool) {
    assert_eq!(
        Tendril::new(pattern).unwrap().matches(&input).unwrap(),
        expect
    );
}

#[test]
fn edit_scalar() {
    let input = json!([1, 2, 3]);
    let sols = solutions("[$x, _, _]", &input);
    let collected = collect_edits(&sols, &EditPlan::value("x", json!(99)), Per::Site);
    assert!(collected.conflicts.is_empty());

    let outcome = apply_edits(&input, &collected.edits, &EditOptions::default());
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.result, json!([99, 2, 3]));
    // the input is untouched
    assert_eq!(input, json!([1, 2, 3]));
}

#[test]
fn edit_idempotence() {
    let input = json!({"name": "Ada", "age": 21});
    let sols = solutions("{name: $n, age: _}", &input);
    let collected = collect_edits(&sols, &EditPlan::value("$n", json!("Ada")), Per::Site);
    let outcome = apply_edits(&input, &collected.edits, &EditOptions::default());
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.result, input);
}

#[test]
fn edit_cas_miss_skips() {
    let mut input = json!([1, 2, 3]);
    let sols = solutions("[$x, _, _]", &input);
    let collected = collect_edits(&sols, &EditPlan::value("x", json!(99)), Per::Site);

    // the input changes between matching and editing
    input[0] = json!(5);
    let outcome = apply_edits(&input, &collected.edits, &EditOptions::default());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.result, json!([5, 2, 3]));
}

#[test]
fn edit_group_splice() {
    let input = json!([1, 2, 3, 4]);
    let sols = solutions("[_, @mid=(2 3), _]", &input);
    assert_eq!(sols.len(), 1);

    let plan = EditPlan::value("mid", json!(["two", "three", "and a half"]));
    let collected = collect_edits(&sols, &plan, Per::Site);
    let outcome = apply_edits(&input, &collected.edits, &EditOptions::default());
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.result, json!([1, "two", "three", "and a half", 4]));

    // a non-array replacement becomes a one-element splice
    let collected = collect_edits(&sols, &EditPlan::value("mid", json!(0)), Per::Site);
    let outcome = apply_edits(&input, &collected.edits, &EditOptions::default());
    assert_eq!(outcome.result, json!([1, 0, 4]));
}

#[test]
fn edit_remainder_splice() {
    let input = json!({"a": 1, "b": 2, "c": 3});
    let sols = solutions("{a: 1, @rest...}", &input);
    let plan = EditPlan::value("rest", json!({"z": 0}));
    let collected = collect_edits(&sols, &plan, Per::Site);
    let outcome = apply_edits(&input, &collected.edits, &EditOptions::default());
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.result, json!({"a": 1, "z": 0}));
}

#[test]
fn edit_key_rename() {
    let input = json!({"first": 1, "second": 2});
    let sols = solutions("{$k: 1, ...}", &input);
    assert_eq!(sols.len(), 1);

    let collected = collect_edits(&sols, &EditPlan::value("k", json!("premier")), Per::Site);
    let outcome = apply_edits(&input, &collected.edits, &EditOptions::default());
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.result, json!({"premier": 1, "second": 2}));
}

#[test]
fn edit_conflicts() {
    let input = json!([1]);
    // both variables record the same site
    let sols = solutions("[$x] & [$y]", &input);
    assert_eq!(sols.len(), 1);

    let mut plan = std::collections::BTreeMap::new();
    plan.insert("x".to_string(), json!(5));
    plan.insert("y".to_string(), json!(6));
    let collected = collect_edits(&sols, &EditPlan::Values(plan), Per::Site);
    assert_eq!(collected.conflicts.len(), 1);
    // the conflicted site gets no edit at all
    assert!(collected.edits.is_empty());
}

#[test]
fn edit_in_place() {
    let mut input = json!([1, 2]);
    let sols = solutions("[$x, _]", &input);
    let collected = collect_edits(&sols, &EditPlan::value("x", json!(7)), Per::Site);
    let failures =
        tendril::apply_edits_in_place(&mut input, &collected.edits, &EditOptions::default());
    assert!(failures.is_empty());
    assert_eq!(input, json!([7, 2]));
}

#[test]
fn syntax_errors_render_with_carets() {
    let err = Tendril::new("{a: }").unwrap_err();
    let rendered = err.to_string();
    assert!(!rendered.is_empty());
    assert!(err.inner[0].span.is_some());
    let json = err.to_json();
    assert!(json.contains("\"span\""));
}

#[test]
fn compile_is_memoized() {
    let a = compile("[$x, $x]").unwrap();
    let b = compile("[$x, $x]").unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
}

#[test]
fn group_bindings_unify() {
    // the same group name must capture equal slices
    assert_eq!(
        solutions("[@a=(_ _) @a=(_ _)]", &json!([1, 2, 1, 2])).len(),
        1
    );
    assert_eq!(
        solutions("[@a=(_ _) @a=(_ _)]", &json!([1, 2, 3, 4])).len(),
        0
    );
}

#[test]
fn bindings_hide_the_whole_match() {
    let sols = solutions("[$x, $x]", &json!([3, 3]));
    assert!(!sols[0].bindings().contains_key("0"));
    assert!(sols[0].bindings_with_match().contains_key("0"));
    assert_eq!(
        sols[0].bindings_with_match()["0"],
        json!([3, 3])
    );
}

#[test]
fn scalar_binding_kind_is_stable() {
    // a name bound as a scalar cannot rebind as a group
    let sols = solutions("[$x @x=(_ _)]", &json!([1, 1, 2]));
    assert_eq!(sols.len(), 0);

    let sols = solutions("[$x @x=(_ _)]", &json!([1, 2, 3]));
    assert_eq!(sols.len(), 0);
}

#[test]
fn binding_env_is_branch_local() {
    // each alternation branch owns its clone of the environment
    let input = json!([1, 2]);
    let sols = solutions("[($a=1 _) | (_ $a=2)]", &input);
    assert_eq!(sols.len(), 2);
    let values: Vec<Option<Value>> = sols.iter().map(|s| s.value_of("a")).collect();
    assert_eq!(values, vec![Some(json!(1)), Some(json!(2))]);
}
