use crate::error::Error;
use crate::lexer::lr::Literal;
use crate::parser::parse_source;
use crate::parser::pr::*;

fn parse(source: &str) -> Pattern {
    parse_source(source).unwrap_or_else(|e| panic!("{source}: {e:?}"))
}

fn parse_err(source: &str) -> Vec<Error> {
    parse_source(source).expect_err(source)
}

#[test]
fn scalars() {
    assert_eq!(parse("42").kind, PatternKind::Lit(Literal::Integer(42)));
    assert_eq!(parse("-3.5").kind, PatternKind::Lit(Literal::Float(-3.5)));
    assert_eq!(parse("null").kind, PatternKind::Lit(Literal::Null));
    assert_eq!(parse("true").kind, PatternKind::Lit(Literal::Boolean(true)));
    assert_eq!(parse("_").kind, PatternKind::Any);
    assert_eq!(
        parse("_number").kind,
        PatternKind::TypedAny(ValueType::Number)
    );
    // a bareword is a string literal
    assert_eq!(
        parse("active").kind,
        PatternKind::Lit(Literal::String("active".to_string()))
    );
    assert_eq!(
        parse("Ada/i").kind,
        PatternKind::StringPat(StringPat::CaseInsensitive("ada".to_string()))
    );
}

#[test]
fn unification_pattern() {
    let p = parse("[$x, $x]");
    let arr = p.kind.as_arr().unwrap();
    assert_eq!(arr.items.len(), 2);
    for item in &arr.items {
        let b = item.kind.as_s_bind().unwrap();
        assert_eq!(b.name, "x");
        assert!(b.guard.is_none());
        assert_eq!(b.sub.kind, PatternKind::Any);
    }
    assert!(p.has_bindings);
}

#[test]
fn trailing_group_bind() {
    let p = parse("[_, _, $tail...]");
    let arr = p.kind.as_arr().unwrap();
    assert_eq!(arr.items.len(), 3);
    let gb = arr.items[2].kind.as_group_bind().unwrap();
    assert_eq!(gb.name, "tail");
    assert!(matches!(gb.sub.kind, PatternKind::Spread(None)));
}

#[test]
fn guarded_binding() {
    let p = parse("{name: $n, age: $a where $a >= 18}");
    let obj = p.kind.as_obj().unwrap();
    assert_eq!(obj.terms.len(), 2);
    assert!(obj.spread.is_none());

    let age = obj.terms[1].as_key_value().unwrap();
    assert_eq!(
        age.key.kind,
        PatternKind::Lit(Literal::String("age".to_string()))
    );
    let b = age.value.kind.as_s_bind().unwrap();
    assert_eq!(b.name, "a");
    let guard = b.guard.as_ref().unwrap();
    assert_eq!(guard.free_vars(), vec!["a".to_string()]);
}

#[test]
fn vertical_key() {
    let p = parse("{user.email: $e}");
    let obj = p.kind.as_obj().unwrap();
    let term = obj.terms[0].as_key_value().unwrap();
    assert_eq!(
        term.key.kind,
        PatternKind::Lit(Literal::String("user".to_string()))
    );
    assert!(!term.descend);
    assert_eq!(term.breadcrumbs.len(), 1);
    match &term.breadcrumbs[0] {
        Breadcrumb::Dot { key } => {
            assert_eq!(key.kind, PatternKind::Lit(Literal::String("email".to_string())))
        }
        other => panic!("expected a dot crumb: {other:?}"),
    }
}

#[test]
fn recursive_descent_key() {
    let p = parse("{..id: _number, ...}");
    let obj = p.kind.as_obj().unwrap();
    let term = obj.terms[0].as_key_value().unwrap();
    assert!(term.descend);
    assert!(matches!(obj.spread.as_deref(), Some(Term::Spread(None))));
}

#[test]
fn strong_and_optional_terms() {
    let p = parse("{each /^x_/: _number #{2,}, opt: _string?}");
    let obj = p.kind.as_obj().unwrap();

    let strong = obj.terms[0].as_key_value().unwrap();
    assert!(strong.strong);
    assert!(!strong.optional);
    let quant = strong.quant.unwrap();
    assert_eq!((quant.min, quant.max), (2, None));

    let opt = obj.terms[1].as_key_value().unwrap();
    assert!(opt.optional);
    assert!(!opt.strong);
    assert_eq!(opt.value.kind, PatternKind::TypedAny(ValueType::String));
}

#[test]
fn quantifier_modes() {
    let p = parse("[a* b+? (c d){2,3}+]");
    let arr = p.kind.as_arr().unwrap();
    assert_eq!(arr.items.len(), 3);

    let star = arr.items[0].kind.as_quant().unwrap();
    assert_eq!(star.quant, Quantifier::new(0, None, QuantMode::Greedy));

    let lazy_plus = arr.items[1].kind.as_quant().unwrap();
    assert_eq!(lazy_plus.quant, Quantifier::new(1, None, QuantMode::Lazy));

    let counted = arr.items[2].kind.as_quant().unwrap();
    assert_eq!(
        counted.quant,
        Quantifier::new(2, Some(3), QuantMode::Possessive)
    );
    let inner = counted.sub.kind.as_paren().unwrap();
    assert!(matches!(&inner.kind, PatternKind::Seq(items) if items.len() == 2));
}

#[test]
fn alternation() {
    let p = parse("1 | 2 | 3");
    let alt = p.kind.as_alt().unwrap();
    assert!(!alt.prioritized);
    assert_eq!(alt.alts.len(), 3);

    let p = parse("1 || 2");
    let alt = p.kind.as_alt().unwrap();
    assert!(alt.prioritized);

    let p = parse("1 & _number");
    assert!(matches!(&p.kind, PatternKind::Conj(ps) if ps.len() == 2));
}

#[test]
fn lookaheads() {
    let p = parse("[(? 1 2) _ _]");
    let arr = p.kind.as_arr().unwrap();
    let look = arr.items[0].kind.as_look().unwrap();
    assert!(!look.negative);
    assert!(matches!(&look.sub.kind, PatternKind::Seq(items) if items.len() == 2));

    let p = parse("{x: 1, (! ...)}");
    let obj = p.kind.as_obj().unwrap();
    let look = obj.terms[1].as_look().unwrap();
    assert!(look.negative);
    assert!(matches!(look.terms[0], Term::Spread(None)));
}

#[test]
fn labeled_flow() {
    let p = parse("rows@[ ($v -> @all)* ]");
    let arr = p.kind.as_arr().unwrap();
    assert_eq!(arr.label.as_deref(), Some("rows"));

    let quant = arr.items[0].kind.as_quant().unwrap();
    let paren = quant.sub.kind.as_paren().unwrap();
    let flow = paren.kind.as_flow().unwrap();
    assert_eq!(flow.target.bucket, "all");
    assert_eq!(flow.target.kind, BucketKind::Array);
    assert!(flow.target.label.is_none());
    assert!(flow.collect.is_none());
}

#[test]
fn collecting_flow() {
    let p = parse("cfg@{each $k: ($v -> %pairs($k: $v))}");
    let obj = p.kind.as_obj().unwrap();
    assert_eq!(obj.label.as_deref(), Some("cfg"));

    let term = obj.terms[0].as_key_value().unwrap();
    assert!(term.strong);
    let paren = term.value.kind.as_paren().unwrap();
    let flow = paren.kind.as_flow().unwrap();
    assert_eq!(flow.target.kind, BucketKind::Object);
    let collect = flow.collect.as_ref().unwrap();
    assert_eq!(collect.key.as_deref(), Some("k"));
    assert_eq!(collect.value, "v");
}

#[test]
fn remainder_capture() {
    let p = parse("{a: 1, @rest...}");
    let obj = p.kind.as_obj().unwrap();
    assert_eq!(obj.terms.len(), 1);
    match obj.spread.as_deref() {
        Some(Term::GroupBind(gb)) => {
            assert_eq!(gb.name, "rest");
            assert_eq!(gb.source, ObjGroupSource::Remainder);
        }
        other => panic!("expected a remainder capture: {other:?}"),
    }
}

#[test]
fn scalar_bind_of_sequence_parses() {
    // it compiles; the evaluator rejects the shape with zero solutions
    let p = parse("($x=(1 2))");
    let paren = p.kind.as_paren().unwrap();
    let bind = paren.kind.as_s_bind().unwrap();
    let inner = bind.sub.kind.as_paren().unwrap();
    assert!(matches!(&inner.kind, PatternKind::Seq(items) if items.len() == 2));
}

#[test]
fn errors() {
    // unclosed array
    assert!(!parse_err("[1, 2").is_empty());

    // bad count
    let errors = parse_err("[a{3,1}]");
    assert!(errors[0].to_string().contains("impossible count"));

    // stateful regex flags
    let errors = parse_err("/ab/g");
    assert!(errors[0].to_string().contains("stateful"));

    // spread in the middle of an object
    let errors = parse_err("{..., a: 1}");
    assert!(errors[0]
        .to_string()
        .contains("final term of an object pattern"));

    // group binding needs a container
    assert!(!parse_err("@xs=(1 2)").is_empty());

    // flow must resolve to an enclosing labeled scope
    let errors = parse_err("[(_ -> @b)]");
    assert!(errors[0].to_string().contains("labeled scope"));
    let errors = parse_err("rows@[ (_ -> other:@b)* ]");
    assert!(errors[0]
        .to_string()
        .contains("unknown label `other`"));
}
