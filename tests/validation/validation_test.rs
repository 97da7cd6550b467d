use quarry::config::ValidatorSettings;
use quarry::validation::{
    ComplexityLimits, ForbiddenKind, RejectionReason, SqlValidator, ALLOWED_OPERATIONS,
};

fn validator() -> SqlValidator {
    SqlValidator::default()
}

#[test]
fn test_allowed_operations_pass() {
    for sql in [
        "SELECT id, amount FROM orders WHERE amount > {min_amount:Float64}",
        "SHOW TABLES",
        "DESCRIBE orders",
        "EXPLAIN SELECT count() FROM orders",
        "select count(*) from orders",
    ] {
        let verdict = validator().validate(sql);
        assert!(verdict.is_safe, "{} should pass: {}", sql, verdict);
        assert_eq!(verdict.error_message, None);
        assert_eq!(verdict.reason, None);
    }
}

#[test]
fn test_mutations_rejected_in_any_case() {
    for sql in [
        "DROP TABLE users",
        "drop table users",
        "DrOp TaBlE users",
        "INSERT INTO orders VALUES (1)",
        "select * from orders; delete from orders",
        "ALTER TABLE orders DELETE WHERE 1",
        "TRUNCATE TABLE orders",
        "GRANT ALL ON *.* TO bob",
    ] {
        let verdict = validator().validate(sql);
        assert!(!verdict.is_safe, "{} should be rejected", sql);
        assert!(matches!(
            verdict.reason,
            Some(RejectionReason::ForbiddenPattern {
                kind: ForbiddenKind::MutatingVerb,
                ..
            })
        ));
    }
}

#[test]
fn test_verdict_ignores_keyword_case() {
    let lower = validator().validate("insert into users values (1)");
    let upper = validator().validate("INSERT INTO USERS VALUES (1)");

    assert!(!lower.is_safe);
    assert_eq!(lower, upper);

    let lower = validator().validate("optimize table orders");
    assert_eq!(lower, validator().validate("OPTIMIZE TABLE ORDERS"));
    assert_eq!(
        lower.reason,
        Some(RejectionReason::OperationNotAllowed {
            operation: "OPTIMIZE".into()
        })
    );
}

#[test]
fn test_union_injection_rejected() {
    let verdict = validator().validate("SELECT name FROM users UNION SELECT password FROM admins");
    assert!(matches!(
        verdict.reason,
        Some(RejectionReason::ForbiddenPattern {
            kind: ForbiddenKind::InjectionKeyword,
            ..
        })
    ));
}

#[test]
fn test_comment_on_later_line_rejected() {
    let verdict = validator().validate("SELECT id FROM orders\n-- WHERE owner = current_user");
    assert!(matches!(
        verdict.reason,
        Some(RejectionReason::ForbiddenPattern {
            kind: ForbiddenKind::LineComment,
            ..
        })
    ));
}

#[test]
fn test_trailing_semicolon_on_any_line_rejected() {
    let verdict = validator().validate("SELECT id FROM orders;\nSELECT 2");
    assert!(matches!(
        verdict.reason,
        Some(RejectionReason::ForbiddenPattern {
            kind: ForbiddenKind::StatementSeparator,
            ..
        })
    ));
}

#[test]
fn test_unknown_operation_reports_allowlist() {
    let verdict = validator().validate("OPTIMIZE TABLE orders FINAL");

    assert_eq!(
        verdict.reason,
        Some(RejectionReason::OperationNotAllowed {
            operation: "OPTIMIZE".into()
        })
    );
    let allowed = verdict.allowed_operations.unwrap();
    assert_eq!(allowed, ALLOWED_OPERATIONS.map(String::from).to_vec());
}

#[test]
fn test_join_conditions_count_as_tautology() {
    let verdict = validator().validate("SELECT * FROM orders JOIN users ON orders.user_id = users.id");
    assert_eq!(verdict.reason, Some(RejectionReason::Tautology));
    assert_eq!(
        verdict.error_message.as_deref(),
        Some("Potential tautology-based SQL injection detected")
    );
}

#[test]
fn test_joins_without_equality_pass() {
    assert!(validator().validate("SELECT * FROM orders JOIN users USING (user_id)").is_safe);
    assert!(validator().validate("SELECT * FROM orders CROSS JOIN users").is_safe);
}

#[test]
fn test_parameter_comparisons_pass() {
    let verdict = validator()
        .validate("SELECT * FROM events WHERE user_name LIKE {user_name:String} AND ts > {start:DateTime}");
    assert!(verdict.is_safe, "{}", verdict);
}

#[test]
fn test_invalid_table_names_listed() {
    let verdict = validator().validate("SELECT * FROM analytics.orders JOIN system.users USING (id)");
    assert_eq!(
        verdict.reason,
        Some(RejectionReason::InvalidTableName {
            names: vec!["ANALYTICS.ORDERS".into(), "SYSTEM.USERS".into()]
        })
    );
    assert_eq!(
        verdict.error_message.as_deref(),
        Some("Invalid table names detected: ['ANALYTICS.ORDERS', 'SYSTEM.USERS']")
    );
}

#[test]
fn test_system_metadata_tables_allowed() {
    for sql in [
        "SELECT name FROM system.tables",
        "SELECT name, type FROM SYSTEM.COLUMNS",
        "SELECT name FROM System.Databases",
    ] {
        assert!(validator().validate(sql).is_safe, "{} should pass", sql);
    }
}

#[test]
fn test_subquery_skips_table_check() {
    assert!(validator()
        .validate("SELECT count() FROM (SELECT id FROM orders)")
        .is_safe);
}

#[test]
fn test_length_limit() {
    let padding = "x".repeat(10_000);
    let sql = format!("SELECT '{}' FROM orders", padding);
    assert_eq!(validator().validate(&sql).reason, Some(RejectionReason::TooComplex));
}

#[test]
fn test_join_limit() {
    let five = "SELECT * FROM a JOIN b USING (id) JOIN c USING (id) JOIN d USING (id) \
                JOIN e USING (id) JOIN f USING (id)";
    assert!(validator().validate(five).is_safe);

    let six = format!("{} JOIN g USING (id)", five);
    assert_eq!(validator().validate(&six).reason, Some(RejectionReason::TooComplex));
}

#[test]
fn test_paren_limit() {
    let nested = format!("SELECT {}1{} FROM t", "(".repeat(21), ")".repeat(21));
    assert_eq!(validator().validate(&nested).reason, Some(RejectionReason::TooComplex));

    let ok = format!("SELECT {}1{} FROM t", "(".repeat(20), ")".repeat(20));
    assert!(validator().validate(&ok).is_safe);
}

#[test]
fn test_limits_from_settings() {
    let settings = ValidatorSettings {
        max_joins: 0,
        ..Default::default()
    };
    let strict = SqlValidator::new(ComplexityLimits::from(&settings));

    assert_eq!(
        strict.validate("SELECT * FROM a CROSS JOIN b").reason,
        Some(RejectionReason::TooComplex)
    );
    assert_eq!(strict.limits().max_length, 10_000);
}

#[test]
fn test_empty_statement() {
    let verdict = validator().validate("   ");
    assert!(!verdict.is_safe);
    assert_eq!(verdict.reason, Some(RejectionReason::Empty));
    assert_eq!(verdict.error_message.as_deref(), Some("Empty SQL query"));
}
