//! Allow-list check for model-generated SQL.
//!
//! Only a single read-only `SELECT`/`WITH` statement over the two call tables
//! (or CTEs it declares itself) gets through. The check works on tokens, so
//! keywords inside string literals or comments do not count.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

use crate::db::schema::{CALLS_TABLE, KEY_PHRASES_TABLE};

pub const ALLOWED_TABLES: [&str; 2] = [CALLS_TABLE, KEY_PHRASES_TABLE];

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "ATTACH", "DETACH", "COPY",
    "PRAGMA", "INSTALL", "LOAD", "EXPORT", "IMPORT", "CALL", "SET", "TRUNCATE", "VACUUM",
    "CHECKPOINT", "MERGE", "GRANT",
];

// Words that end a FROM item's alias position.
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "LIMIT", "HAVING", "UNION", "EXCEPT", "INTERSECT", "JOIN",
    "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "OUTER", "ON", "USING", "WINDOW",
    "QUALIFY", "OFFSET", "SELECT", "POSITIONAL", "ASOF", "ANTI", "SEMI",
];

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:sql)?").expect("valid code fence pattern"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlGuardError {
    #[error("the model returned no SQL")]
    Empty,
    #[error("only a single statement is allowed")]
    MultipleStatements,
    #[error("statement must start with SELECT or WITH, found `{0}`")]
    NotReadOnly(String),
    #[error("keyword `{0}` is not allowed")]
    ForbiddenKeyword(String),
    #[error("table `{0}` is not in the allow-list")]
    UnknownTable(String),
    #[error("unterminated literal or comment")]
    Unterminated,
}

/// SQL that passed [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Literal(String),
    Punct(char),
}

impl Token {
    fn is_word(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn identifier(&self) -> Option<&str> {
        match self {
            Token::Word(w) | Token::Quoted(w) => Some(w),
            _ => None,
        }
    }
}

/// Removes markdown code fences the model tends to wrap queries in.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

pub fn validate(raw: &str) -> Result<ValidatedSql, SqlGuardError> {
    let stripped = strip_code_fences(raw);
    let sql = stripped
        .strip_suffix(';')
        .unwrap_or(&stripped)
        .trim()
        .to_string();

    let tokens = tokenize(&sql)?;
    let Some(first) = tokens.first() else {
        return Err(SqlGuardError::Empty);
    };

    if tokens.contains(&Token::Punct(';')) {
        return Err(SqlGuardError::MultipleStatements);
    }

    if !(first.is_word("SELECT") || first.is_word("WITH")) {
        let found = match first {
            Token::Word(w) | Token::Quoted(w) => w.clone(),
            Token::Punct(c) => c.to_string(),
            Token::Literal(text) => format!("'{}'", text),
        };
        return Err(SqlGuardError::NotReadOnly(found));
    }

    if let Some(keyword) = tokens.iter().find_map(|t| match t {
        Token::Word(w) if FORBIDDEN_KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k)) => {
            Some(w.to_uppercase())
        }
        _ => None,
    }) {
        return Err(SqlGuardError::ForbiddenKeyword(keyword));
    }

    let ctes = cte_names(&tokens);
    for table in referenced_tables(&tokens) {
        let allowed = ALLOWED_TABLES.iter().any(|t| t.eq_ignore_ascii_case(&table))
            || ctes.contains(&table.to_lowercase());
        if !allowed {
            return Err(SqlGuardError::UnknownTable(table));
        }
    }

    Ok(ValidatedSql(sql))
}

fn tokenize(sql: &str) -> Result<Vec<Token>, SqlGuardError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            let end = (i + 2..chars.len().saturating_sub(1))
                .find(|&j| chars[j] == '*' && chars[j + 1] == '/')
                .ok_or(SqlGuardError::Unterminated)?;
            i = end + 2;
        } else if c == '\'' || c == '"' {
            let mut j = i + 1;
            let mut text = String::new();
            loop {
                match chars.get(j) {
                    None => return Err(SqlGuardError::Unterminated),
                    Some(&q) if q == c && chars.get(j + 1) == Some(&c) => {
                        text.push(c);
                        j += 2;
                    }
                    Some(&q) if q == c => break,
                    Some(&other) => {
                        text.push(other);
                        j += 1;
                    }
                }
            }
            tokens.push(if c == '\'' { Token::Literal(text) } else { Token::Quoted(text) });
            i = j + 1;
        } else if c.is_alphanumeric() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else {
            tokens.push(Token::Punct(c));
            i += 1;
        }
    }

    Ok(tokens)
}

/// Names declared as `name AS (` directly after `WITH`, `RECURSIVE` or `,`.
fn cte_names(tokens: &[Token]) -> HashSet<String> {
    let mut names = HashSet::new();
    for (i, window) in tokens.windows(3).enumerate() {
        let declares = window[1].is_word("AS") && window[2] == Token::Punct('(');
        let after_list_start = i > 0
            && (tokens[i - 1].is_word("WITH")
                || tokens[i - 1].is_word("RECURSIVE")
                || tokens[i - 1] == Token::Punct(','));
        if declares && after_list_start {
            if let Some(name) = window[0].identifier() {
                names.insert(name.to_lowercase());
            }
        }
    }
    names
}

/// Every relation named after `FROM` (including comma lists) or `JOIN`.
/// Subqueries are skipped here; their own `FROM`s are visited separately.
fn referenced_tables(tokens: &[Token]) -> Vec<String> {
    let mut tables = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if token.is_word("FROM") && !inside_function_call(tokens, i) && !is_distinct_from(tokens, i) {
            let mut j = i + 1;
            loop {
                let (name, next) = relation_at(tokens, j);
                tables.extend(name);
                j = skip_alias(tokens, next);
                if tokens.get(j) == Some(&Token::Punct(',')) {
                    j += 1;
                } else {
                    break;
                }
            }
        } else if token.is_word("JOIN") {
            let (name, _) = relation_at(tokens, i + 1);
            tables.extend(name);
        }
    }

    tables
}

/// Reads a (possibly schema-qualified) relation or a parenthesized subquery
/// starting at `start`. Returns the relation name, if any, and the index of
/// the following token.
fn relation_at(tokens: &[Token], start: usize) -> (Option<String>, usize) {
    let first = match tokens.get(start) {
        Some(Token::Punct('(')) => return (None, matching_paren(tokens, start) + 1),
        // DuckDB scans `FROM 'file.csv'` (or a URL) directly; keep the path
        // so it fails the allow-list like any other relation.
        Some(Token::Literal(path)) => return (Some(format!("'{}'", path)), start + 1),
        Some(token) => token.identifier(),
        None => None,
    };

    match first {
        Some(first) => {
            let mut parts = vec![first.to_string()];
            let mut j = start + 1;
            while tokens.get(j) == Some(&Token::Punct('.')) {
                match tokens.get(j + 1).and_then(Token::identifier) {
                    Some(part) => parts.push(part.to_string()),
                    None => break,
                }
                j += 2;
            }
            // A table function such as read_csv(...) keeps its name for the
            // allow-list check, its arguments are skipped.
            if tokens.get(j) == Some(&Token::Punct('(')) {
                j = matching_paren(tokens, j) + 1;
            }
            (Some(qualified_name(parts)), j)
        }
        None => (None, start),
    }
}

// EXTRACT(YEAR FROM StartTime), TRIM(BOTH ' ' FROM topic) and friends.
fn inside_function_call(tokens: &[Token], at: usize) -> bool {
    let mut depth = 0usize;
    for j in (0..at).rev() {
        match tokens[j] {
            Token::Punct(')') => depth += 1,
            Token::Punct('(') if depth > 0 => depth -= 1,
            Token::Punct('(') => {
                return j > 0
                    && ["EXTRACT", "TRIM", "SUBSTRING", "OVERLAY", "POSITION"]
                        .iter()
                        .any(|f| tokens[j - 1].is_word(f));
            }
            _ => {}
        }
    }
    false
}

// `a IS [NOT] DISTINCT FROM b` compares values.
fn is_distinct_from(tokens: &[Token], at: usize) -> bool {
    at >= 2 && tokens[at - 1].is_word("DISTINCT") && (tokens[at - 2].is_word("IS") || tokens[at - 2].is_word("NOT"))
}

// `main.km_processed_data` is the same table; any other qualifier is not.
fn qualified_name(mut parts: Vec<String>) -> String {
    let name = parts.pop().unwrap_or_default();
    if parts.is_empty() || (parts.len() == 1 && parts[0].eq_ignore_ascii_case("main")) {
        name
    } else {
        format!("{}.{}", parts.join("."), name)
    }
}

fn matching_paren(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    for (j, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return j;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

fn skip_alias(tokens: &[Token], mut j: usize) -> usize {
    if tokens.get(j).is_some_and(|t| t.is_word("AS")) {
        j += 1;
    }
    if let Some(token) = tokens.get(j) {
        let is_alias = match token {
            Token::Quoted(_) => true,
            Token::Word(w) => !CLAUSE_KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k)),
            _ => false,
        };
        if is_alias {
            j += 1;
            // Column alias list: t(a, b)
            if tokens.get(j) == Some(&Token::Punct('(')) {
                j = matching_paren(tokens, j) + 1;
            }
        }
    }
    j
}
