//! Security validation of generated SQL.
//!
//! [`SqlValidator::validate`] is a pure verdict function. It runs a fixed
//! sequence of checks and stops at the first failure:
//!
//! ```text
//! empty? ─► forbidden patterns ─► operation allowlist ─► tautologies
//!        ─► table names ─► complexity limits ─► safe
//! ```
//!
//! Every check runs on the trimmed, uppercased statement. The tautology
//! check is deliberately broad: any `identifier = identifier` comparison is
//! refused, which includes ordinary join conditions such as `a.id = b.id`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ValidatorSettings;

/// Statement kinds that may be executed.
pub const ALLOWED_OPERATIONS: [&str; 4] = ["SELECT", "SHOW", "DESCRIBE", "EXPLAIN"];

/// Category of a forbidden pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForbiddenKind {
    /// Data or schema modification (`INSERT`, `DROP`, `GRANT`, ...).
    MutatingVerb,
    /// `UNION`, `EXEC` and stored-procedure prefixes.
    InjectionKeyword,
    LineComment,
    BlockComment,
    /// A trailing `;`.
    StatementSeparator,
    Backtick,
    ScriptTag,
}

struct ForbiddenPattern {
    kind: ForbiddenKind,
    source: &'static str,
    regex: Regex,
}

impl ForbiddenPattern {
    fn new(kind: ForbiddenKind, source: &'static str) -> Self {
        Self {
            kind,
            source,
            regex: Regex::new(&format!("(?im){}", source)).unwrap(),
        }
    }
}

static FORBIDDEN_PATTERNS: LazyLock<Vec<ForbiddenPattern>> = LazyLock::new(|| {
    vec![
        ForbiddenPattern::new(
            ForbiddenKind::MutatingVerb,
            r"\b(INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|TRUNCATE|GRANT|REVOKE)\b",
        ),
        ForbiddenPattern::new(ForbiddenKind::InjectionKeyword, r"\b(UNION|EXEC|EXECUTE|xp_|sp_)\b"),
        ForbiddenPattern::new(ForbiddenKind::LineComment, r"--.*$"),
        ForbiddenPattern::new(ForbiddenKind::BlockComment, r"/\*.*?\*/"),
        ForbiddenPattern::new(ForbiddenKind::StatementSeparator, r";\s*$"),
        ForbiddenPattern::new(ForbiddenKind::Backtick, r"`.*`"),
        ForbiddenPattern::new(ForbiddenKind::ScriptTag, r"<script"),
    ]
});

static TAUTOLOGY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b\d+\s*=\s*\d+\b",
        r"\bTRUE\s*=\s*TRUE\b",
        r"\bFALSE\s*=\s*FALSE\b",
        r"\b[a-zA-Z_]\w*\s*=\s*[a-zA-Z_]\w*\b",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
    .collect()
});

/// Whatever follows `FROM` or `JOIN` up to whitespace, a comma or a
/// parenthesis. A `(` right after the keyword is a subquery and is skipped.
static TABLE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([^\s,()]+)").unwrap());

static ALLOWED_TABLE_NAMES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"^[a-zA-Z_][a-zA-Z0-9_]*$", r"^system\.(columns|tables|databases)$"]
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
        .collect()
});

/// Why a statement was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    Empty,
    ForbiddenPattern {
        kind: ForbiddenKind,
        pattern: String,
    },
    OperationNotAllowed {
        operation: String,
    },
    Tautology,
    InvalidTableName {
        names: Vec<String>,
    },
    TooComplex,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Empty => write!(f, "Empty SQL query"),
            RejectionReason::ForbiddenPattern { pattern, .. } => {
                write!(f, "Forbidden operation or pattern detected: {}", pattern)
            }
            RejectionReason::OperationNotAllowed { operation } => write!(
                f,
                "Operation '{}' is not allowed. Allowed: {}",
                operation,
                ALLOWED_OPERATIONS.join(", ")
            ),
            RejectionReason::Tautology => {
                write!(f, "Potential tautology-based SQL injection detected")
            }
            RejectionReason::InvalidTableName { names } => {
                let quoted: Vec<String> = names.iter().map(|n| quote_name(n)).collect();
                write!(f, "Invalid table names detected: [{}]", quoted.join(", "))
            }
            RejectionReason::TooComplex => write!(f, "Query too complex or potentially dangerous"),
        }
    }
}

/// Outcome of validating one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub is_safe: bool,
    pub error_message: Option<String>,
    /// Set when the statement kind is not allowed.
    pub allowed_operations: Option<Vec<String>>,
    pub reason: Option<RejectionReason>,
}

impl ValidationVerdict {
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            error_message: None,
            allowed_operations: None,
            reason: None,
        }
    }

    pub fn rejected(reason: RejectionReason) -> Self {
        let allowed_operations = match reason {
            RejectionReason::OperationNotAllowed { .. } => {
                Some(ALLOWED_OPERATIONS.iter().map(|op| op.to_string()).collect())
            }
            _ => None,
        };

        Self {
            is_safe: false,
            error_message: Some(reason.to_string()),
            allowed_operations,
            reason: Some(reason),
        }
    }
}

impl fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_message {
            Some(message) => write!(f, "{}", message),
            None => write!(f, "safe"),
        }
    }
}

/// Size limits applied after all pattern checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexityLimits {
    /// Maximum statement length in characters.
    pub max_length: usize,
    /// Maximum occurrences of `JOIN`.
    pub max_joins: usize,
    /// Maximum occurrences of `(`.
    pub max_open_parens: usize,
}

impl Default for ComplexityLimits {
    fn default() -> Self {
        Self {
            max_length: 10_000,
            max_joins: 5,
            max_open_parens: 20,
        }
    }
}

impl From<&ValidatorSettings> for ComplexityLimits {
    fn from(settings: &ValidatorSettings) -> Self {
        Self {
            max_length: settings.max_length,
            max_joins: settings.max_joins,
            max_open_parens: settings.max_open_parens,
        }
    }
}

/// Validates SQL statements before execution.
///
/// # Example
///
/// ```
/// use quarry::validation::SqlValidator;
///
/// let validator = SqlValidator::default();
/// assert!(validator.validate("SELECT count(*) FROM orders").is_safe);
/// assert!(!validator.validate("DROP TABLE orders").is_safe);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SqlValidator {
    limits: ComplexityLimits,
}

impl SqlValidator {
    pub fn new(limits: ComplexityLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ComplexityLimits {
        self.limits
    }

    /// Check a statement. Identical input always yields an identical verdict.
    pub fn validate(&self, sql: &str) -> ValidationVerdict {
        match self.check(sql) {
            Ok(()) => ValidationVerdict::safe(),
            Err(reason) => ValidationVerdict::rejected(reason),
        }
    }

    fn check(&self, sql: &str) -> Result<(), RejectionReason> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(RejectionReason::Empty);
        }
        let sql = trimmed.to_uppercase();

        if let Some(p) = FORBIDDEN_PATTERNS.iter().find(|p| p.regex.is_match(&sql)) {
            return Err(RejectionReason::ForbiddenPattern {
                kind: p.kind,
                pattern: p.source.to_string(),
            });
        }

        let operation = sql.split_whitespace().next().unwrap_or_default();
        if !ALLOWED_OPERATIONS.contains(&operation) {
            return Err(RejectionReason::OperationNotAllowed {
                operation: operation.to_string(),
            });
        }

        if TAUTOLOGY_PATTERNS.iter().any(|re| re.is_match(&sql)) {
            return Err(RejectionReason::Tautology);
        }

        let names = table_references(&sql);
        if !names.iter().all(|name| is_allowed_table_name(name)) {
            return Err(RejectionReason::InvalidTableName { names });
        }

        if sql.chars().count() > self.limits.max_length
            || sql.matches("JOIN").count() > self.limits.max_joins
            || sql.matches('(').count() > self.limits.max_open_parens
        {
            return Err(RejectionReason::TooComplex);
        }

        Ok(())
    }
}

/// Names following `FROM` or `JOIN`, in order of appearance.
pub fn table_references(sql: &str) -> Vec<String> {
    TABLE_REFERENCE
        .captures_iter(sql)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn is_allowed_table_name(name: &str) -> bool {
    ALLOWED_TABLE_NAMES.iter().any(|re| re.is_match(name))
}

/// Quote a name for a message: single quotes, or double quotes when the name
/// holds a single quote and no double quote.
fn quote_name(name: &str) -> String {
    if name.contains('\'') && !name.contains('"') {
        format!("\"{}\"", name.replace('\\', "\\\\"))
    } else {
        format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}
