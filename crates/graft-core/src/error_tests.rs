use crate::error::*;

#[test]
fn severity_ranges() {
    assert_eq!(Severity::of(RESUME_NOTICE), Severity::Notice);
    assert_eq!(Severity::of(PARSER_LOOKAHEAD_FAILURE_ONLY), Severity::Notice);
    assert_eq!(Severity::of(INFINITE_LOOP_WARNING), Severity::Warning);
    assert_eq!(Severity::of(OPTIONAL_REDUNDANTLY_NESTED_WARNING), Severity::Warning);
    assert_eq!(Severity::of(MANDATORY_CONTINUATION), Severity::Error);
    assert_eq!(Severity::of(PARSER_STOPPED_BEFORE_END), Severity::Error);
    assert_eq!(Severity::of(BAD_ORDER_OF_ALTERNATIVES), Severity::Error);
    assert_eq!(Severity::of(RECURSION_DEPTH_LIMIT_HIT), Severity::Fatal);
}

#[test]
fn classification_helpers() {
    assert!(is_warning(RESUME_NOTICE));
    assert!(is_warning(INFINITE_LOOP_WARNING));
    assert!(!is_error(INFINITE_LOOP_WARNING));
    assert!(is_error(MANDATORY_CONTINUATION));
    assert!(is_error(RECURSION_DEPTH_LIMIT_HIT));
    assert!(is_fatal(RECURSION_DEPTH_LIMIT_HIT));
    assert!(!is_fatal(MANDATORY_CONTINUATION));
}

#[test]
fn display_with_and_without_location() {
    let mut err = Error::new("'c' expected", 7, MANDATORY_CONTINUATION);
    assert_eq!(err.to_string(), "pos 7: Error (1010): 'c' expected");
    err.line = Some(2);
    err.column = Some(3);
    assert_eq!(err.to_string(), "2:3: Error (1010): 'c' expected");
}

#[test]
fn code_prefix_extraction() {
    assert_eq!(
        extract_error_code("2010:Big mistake!", ERROR),
        ("Big mistake!".to_string(), 2010)
    );
    assert_eq!(
        extract_error_code("Syntax error at: {1}", ERROR),
        ("Syntax error at: {1}".to_string(), ERROR)
    );
}

#[test]
fn has_errors_ignores_warnings() {
    let warnings = vec![Error::new("w", 0, INFINITE_LOOP_WARNING)];
    assert!(!has_errors(&warnings));
    let errors = vec![Error::new("e", 0, PARSER_STOPPED_BEFORE_END)];
    assert!(has_errors(&errors));
}

#[test]
fn length_is_at_least_one() {
    let err = Error::new("x", 0, ERROR).with_length(0);
    assert_eq!(err.length, 1);
}
