#![allow(clippy::unwrap_used)]

use minilisp::parser::parse_with_origin;
use minilisp::{EvalConfig, Error, Evaluator, Expr, MAX_CALL_DEPTH, parse, parse_all};

/// Evaluates every form of `input` with the given evaluator
fn eval_string(input: &str, evaluator: &mut Evaluator) -> Result<Expr, Error> {
    evaluator.eval_all(input)
}

/// Evaluates `input` with a fresh global environment
fn eval_fresh(input: &str) -> Result<Expr, Error> {
    eval_string(input, &mut Evaluator::new())
}

fn printed(input: &str) -> String {
    eval_fresh(input).unwrap().to_string()
}

#[test]
fn test_arithmetic_scenario() {
    let result = eval_fresh("(+ 2 (+ 1 2) 4)").unwrap();
    assert_eq!(result, Expr::Integer(9));
    assert_eq!(result.type_name(), "integer");
}

#[test]
fn test_dotted_pair_scenario() {
    let expr = parse("(1 2 . 3)").unwrap();
    assert_eq!(expr.car(), Some(&Expr::Integer(1)));
    let rest = expr.cdr().unwrap();
    assert_eq!(rest.car(), Some(&Expr::Integer(2)));
    assert!(matches!(rest.cdr(), Some(Expr::Integer(3))));
    assert_eq!(
        expr.to_vec(),
        vec![Expr::Integer(1), Expr::Integer(2), Expr::Integer(3)]
    );
}

#[test]
fn test_closure_mutation_scenario() {
    let mut evaluator = Evaluator::new();
    eval_string(
        "(defun two-funs (x)
           (list (function (lambda () x))
                 (function (lambda (y) (setq x y)))))
         (setq funs (two-funs 6))",
        &mut evaluator,
    )
    .unwrap();

    assert_eq!(eval_string("(funcall (car funs))", &mut evaluator).unwrap(), Expr::Integer(6));
    assert_eq!(eval_string("(funcall (cadr funs) 43)", &mut evaluator).unwrap(), Expr::Integer(43));
    assert_eq!(eval_string("(funcall (car funs))", &mut evaluator).unwrap(), Expr::Integer(43));

    // A second pair of closures gets its own scope
    eval_string("(setq other (two-funs 1))", &mut evaluator).unwrap();
    assert_eq!(eval_string("(funcall (car other))", &mut evaluator).unwrap(), Expr::Integer(1));
    assert_eq!(eval_string("(funcall (car funs))", &mut evaluator).unwrap(), Expr::Integer(43));
}

#[test]
fn test_plain_lambda_is_not_closed_over() {
    // Without `function`, a lambda resolves free variables where it is called.
    let input = "
        (defun make-getter (x) (lambda () x))
        (setq getter (make-getter 1))
        (setq x 99)
        (funcall getter)";
    assert_eq!(eval_fresh(input).unwrap(), Expr::Integer(99));
}

#[test]
fn test_quote_suppresses_evaluation() {
    let result = eval_fresh("'(+ 2 2)").unwrap();
    assert_eq!(result.to_string(), "(+ 2 2)");
    assert!(result.is_pair());
    assert_eq!(parse("'(+ 2 2)").unwrap().to_string(), "'(+ 2 2)");
}

#[test]
fn test_unterminated_input() {
    let err = parse("(1 2 (3 4)").unwrap_err();
    assert!(err.is_unterminated());
    // Reported at the last character of the input
    let position = err.position().unwrap();
    assert_eq!((position.line, position.col), (1, 10));

    let err = parse("'").unwrap_err();
    assert!(err.is_unterminated());
    assert!(err.to_string().contains("Missing expression after a quote"), "{err}");

    assert!(parse("\"open string").unwrap_err().is_unterminated());
    assert!(parse("|open symbol").unwrap_err().is_unterminated());
}

#[test]
fn test_symbol_lookup_failure() {
    let err = eval_fresh("undefined-variable").unwrap_err();
    assert_eq!(err, Error::SymbolNotFound("undefined-variable".to_string()));
    assert_eq!(err.to_string(), "Symbol not found: undefined-variable");
}

#[test]
fn test_print_round_trip() {
    let cases = [
        ("42", "42"),
        ("-7", "-7"),
        ("3.5", "3.5"),
        ("2.0", "2.0"),
        ("\"a \\\"b\\\"\\n\"", "\"a \\\"b\\\"\\n\""),
        ("foo", "foo"),
        ("foo\\ bar", "foo\\ bar"),
        ("|foo bar|", "|foo bar|"),
        ("nil", "nil"),
        ("()", "nil"),
        ("t", "t"),
        ("(1 (2 3) \"x\")", "(1 (2 3) \"x\")"),
        ("(a . b)", "(a . b)"),
        ("(1 2 . 3)", "(1 2 . 3)"),
        ("(1 . (2 3))", "(1 2 3)"),
        ("'a", "'a"),
        ("#'car", "#'car"),
        ("(quote a)", "(quote a)"),
        ("\\+1", "\\+1"),
        ("\\nil", "\\nil"),
        ("a\\|b", "a\\|b"),
        ("|a\\ b|", "|a\\ b|"),
        ("(a \\. b)", "(a \\. b)"),
        ("( 1   2 ; comment\n 3 )", "(1 2 3)"),
    ];
    for (input, expected) in cases {
        let expr = parse(input).unwrap();
        assert_eq!(expr.to_string(), expected, "input: {input}");
        // Printing is a fixed point
        let reparsed = parse(&expr.to_string()).unwrap();
        assert_eq!(reparsed, expr, "reparse of {input}");
        assert_eq!(reparsed.to_string(), expected);
    }
}

#[test]
fn test_arity_enforcement_before_side_effects() {
    let mut evaluator = Evaluator::new();
    eval_string("(setq counter 0) (defun two (a b) (setq counter (+ counter 1)))", &mut evaluator)
        .unwrap();

    for input in ["(two 1)", "(two 1 2 3)", "(car)", "(cons 1)", "(not 1 2)"] {
        let err = eval_string(input, &mut evaluator).unwrap_err();
        assert!(matches!(err, Error::Parameters { .. }), "{input}: {err:?}");
        assert!(err.is_runtime());
    }
    assert_eq!(eval_string("counter", &mut evaluator).unwrap(), Expr::Integer(0));
}

#[test]
fn test_recursive_functions() {
    let input = "
        (defun fact (n) (if (<= n 1) 1 (* n (fact (- n 1)))))
        (fact 20)";
    assert_eq!(eval_fresh(input).unwrap(), Expr::Integer(2432902008176640000));

    let input = "
        (defun fib (n) (cond ((< n 2) n) (t (+ (fib (- n 1)) (fib (- n 2))))))
        (fib 15)";
    assert_eq!(eval_fresh(input).unwrap(), Expr::Integer(610));
}

#[test]
fn test_higher_order_functions() {
    let input = "
        (defun my-map (f items)
          (if items (cons (funcall f (car items)) (my-map f (cdr items))) nil))
        (my-map #'1+ '(1 2 3))";
    assert_eq!(printed(input), "(2 3 4)");

    let input = "
        (defun adder (n) #'(lambda (x) (+ x n)))
        (setq add5 (adder 5))
        (list (funcall add5 1) (apply add5 '(10)))";
    assert_eq!(printed(input), "(6 15)");

    assert_eq!(printed("((lambda (a b) (list b a)) 1 2)"), "(2 1)");
    assert_eq!(printed("(#'+ 1 2)"), "3");
}

#[test]
fn test_stack_overflow_is_an_error() {
    let mut evaluator = Evaluator::with_config(EvalConfig {
        max_call_depth: 100,
        trace_calls: false,
    });
    let err = eval_string("(defun down (n) (+ 1 (down n))) (down 1)", &mut evaluator).unwrap_err();
    assert_eq!(err, Error::StackOverflow { depth: 100 });
    assert!(err.is_runtime());

    // The evaluator stays usable afterwards
    assert_eq!(eval_string("(+ 1 1)", &mut evaluator).unwrap(), Expr::Integer(2));
}

#[test]
fn test_default_config_overflow_is_an_error() {
    let err = eval_fresh("(defun down (n) (+ 1 (down n))) (down 1)").unwrap_err();
    assert_eq!(err, Error::StackOverflow { depth: MAX_CALL_DEPTH });
}

#[test]
fn test_errors_abort_only_the_current_form() {
    let mut evaluator = Evaluator::new();
    assert!(eval_string("(setq a 1) (car 5) (setq a 2)", &mut evaluator).is_err());
    assert_eq!(eval_string("a", &mut evaluator).unwrap(), Expr::Integer(1));
}

#[test]
fn test_parse_all_positions() {
    let forms: Vec<_> = parse_all("1\n  (a b)\n'c").collect::<Result<_, _>>().unwrap();
    assert_eq!(forms.len(), 3);
    let lines: Vec<usize> = forms.iter().map(|(_, position)| position.line).collect();
    assert_eq!(lines, vec![1, 2, 3]);
    assert_eq!(forms[1].1.col, 3);
}

#[test]
fn test_diagnostics_carry_origin() {
    let err = parse_with_origin("(a b))", "init.lisp").unwrap_err();
    assert!(err.is_syntax() && !err.is_unterminated());
    assert!(err.to_string().starts_with("init.lisp:1:"), "{err}");

    let err = parse("(1 2) (3 4)").unwrap_err();
    assert!(err.to_string().contains("Expected to have a single expression"));
    assert!(matches!(parse("; only a comment").unwrap(), Expr::Nil));
}

#[test]
fn test_builtin_aliases_share_behavior() {
    let pairs = [
        ("(car '(1 2))", "(first '(1 2))"),
        ("(cdr '(1 2))", "(rest '(1 2))"),
        ("(cadr '(1 2))", "(second '(1 2))"),
        ("(= 1 1)", "(equal 1 1)"),
        ("(> 2 1)", "(greaterp 2 1)"),
        ("(< 2 1)", "(lessp 2 1)"),
        ("(not nil)", "(null nil)"),
        ("(eql 'a 'a)", "(eq 'a 'a)"),
    ];
    for (primary, alias) in pairs {
        assert_eq!(eval_fresh(primary).unwrap(), eval_fresh(alias).unwrap(), "{alias}");
    }
}

#[test]
fn test_mixed_program() {
    let input = r#"
        ; bank account with a private balance
        (defun make-account (balance)
          (list #'(lambda (amount) (setq balance (+ balance amount)))
                #'(lambda () balance)))
        (defparameter *acct* (make-account 100))
        (funcall (car *acct*) 50)
        (funcall (car *acct*) -30)
        (let* ((total (funcall (cadr *acct*)))
               (label (if (> total 100) "rich" "poor")))
          (list total label))
    "#;
    assert_eq!(printed(input), "(120 \"rich\")");
}
