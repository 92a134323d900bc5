use tracing::debug;

use super::lexer::{find_operator, split_clauses};
use super::{strip_quotes, CompiledQuery, FieldRef, FileColumn, Literal, Operator, Predicate};
use crate::ingest::flatten::FieldKey;

#[derive(Debug, Clone, Copy)]
enum Target {
    File(FileColumn),
    Normalized(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum Form {
    /// Value is taken as is with a fixed operator.
    Fixed(Operator),
    /// Optional leading comparison, then a human size such as `5MB`.
    Sized,
    /// Optional leading comparison, `=` otherwise.
    Compared,
    /// Substring match unless a leading comparison is given.
    Date,
}

const SHORTCUTS: &[(&str, Target, Form)] = &[
    ("camera:", Target::Normalized("camera_make"), Form::Fixed(Operator::Eq)),
    ("make:", Target::Normalized("camera_make"), Form::Fixed(Operator::Eq)),
    ("model:", Target::Normalized("camera_model"), Form::Fixed(Operator::Like)),
    ("lens:", Target::Normalized("lens"), Form::Fixed(Operator::Like)),
    ("format:", Target::Normalized("format"), Form::Fixed(Operator::Like)),
    ("type:", Target::File(FileColumn::Type), Form::Fixed(Operator::Like)),
    ("name:", Target::File(FileColumn::Path), Form::Fixed(Operator::Like)),
    ("path:", Target::File(FileColumn::Path), Form::Fixed(Operator::Like)),
    ("filename:", Target::File(FileColumn::Path), Form::Fixed(Operator::Like)),
    ("size:", Target::File(FileColumn::Size), Form::Sized),
    ("date:", Target::Normalized("date_taken"), Form::Date),
    ("width:", Target::Normalized("width"), Form::Compared),
    ("height:", Target::Normalized("height"), Form::Compared),
];

const LEADING_OPERATORS: [(&str, Operator); 5] = [
    (">=", Operator::Ge),
    ("<=", Operator::Le),
    (">", Operator::Gt),
    ("<", Operator::Lt),
    ("=", Operator::Eq),
];

/// Compiles query text into an ordered list of conjunctive predicates.
///
/// Clauses that cannot be parsed are dropped, never reported as errors.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    normalized_category: String,
}

impl QueryCompiler {
    pub fn new(normalized_category: impl Into<String>) -> Self {
        Self {
            normalized_category: normalized_category.into(),
        }
    }

    pub fn compile(&self, query: &str) -> CompiledQuery {
        let clauses = split_clauses(query);
        let predicates: Vec<Predicate> = clauses
            .iter()
            .filter_map(|clause| {
                let parsed = self.parse_clause(clause);
                if parsed.is_none() {
                    debug!("Dropping unparsable clause {:?}", clause);
                }
                parsed
            })
            .collect();

        CompiledQuery {
            predicates,
            clauses: clauses.len(),
        }
    }

    fn parse_clause(&self, clause: &str) -> Option<Predicate> {
        if clause.is_empty() {
            return None;
        }
        match self.match_shortcut(clause) {
            Some((target, form, value)) => self.parse_shortcut(target, form, value),
            None => self.parse_raw(clause),
        }
    }

    fn match_shortcut<'a>(&self, clause: &'a str) -> Option<(Target, Form, &'a str)> {
        SHORTCUTS.iter().find_map(|(prefix, target, form)| {
            let head = clause.get(..prefix.len())?;
            head.eq_ignore_ascii_case(prefix)
                .then(|| (*target, *form, clause[prefix.len()..].trim()))
        })
    }

    fn parse_shortcut(&self, target: Target, form: Form, value: &str) -> Option<Predicate> {
        let field = match target {
            Target::File(column) => FieldRef::File(column),
            Target::Normalized(key) => FieldRef::Meta(FieldKey::new(self.normalized_category.as_str(), key)),
        };

        let (op, literal) = match form {
            Form::Fixed(op) => (op, literal_for(op, value)),
            Form::Sized => {
                let (op, rest) = split_leading_operator(value);
                (op.unwrap_or(Operator::Eq), Literal::Number(parse_size(rest)?))
            }
            Form::Compared => {
                let (op, rest) = split_leading_operator(value);
                (op.unwrap_or(Operator::Eq), Literal::parse(rest))
            }
            Form::Date => match split_leading_operator(value) {
                (Some(op), rest) => (op, Literal::Text(strip_quotes(rest).to_string())),
                (None, rest) => (Operator::Like, Literal::Text(strip_quotes(rest).to_string())),
            },
        };

        if is_empty_literal(&literal) {
            return None;
        }
        Some(Predicate { field, op, literal })
    }

    fn parse_raw(&self, clause: &str) -> Option<Predicate> {
        let (start, end, op) = find_operator(clause)?;
        let name = clause[..start].trim();
        let value = clause[end..].trim();
        if name.is_empty() || value.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }

        let field = self.resolve_field(name)?;
        let mut literal = literal_for(op, value);
        if field == FieldRef::File(FileColumn::Size) {
            if let Literal::Text(text) = &literal {
                literal = Literal::Number(parse_size(text)?);
            }
        }

        Some(Predicate { field, op, literal })
    }

    /// `category.key`, `file.path|size|type`, or a bare key. Bare `path`,
    /// `size` and `type` address the file itself, anything else is looked up
    /// in the normalized category.
    fn resolve_field(&self, name: &str) -> Option<FieldRef> {
        match name.split_once('.') {
            Some((category, key)) => {
                if category.is_empty() || key.is_empty() {
                    return None;
                }
                if category.eq_ignore_ascii_case("file") {
                    if let Some(column) = FileColumn::from_name(key) {
                        return Some(FieldRef::File(column));
                    }
                }
                Some(FieldRef::Meta(FieldKey::new(category, key)))
            }
            None => Some(match FileColumn::from_name(name) {
                Some(column) => FieldRef::File(column),
                None => FieldRef::Meta(FieldKey::new(self.normalized_category.as_str(), name)),
            }),
        }
    }
}

/// Substring operators match the token as typed, so `0042` stays `0042`.
fn literal_for(op: Operator, value: &str) -> Literal {
    match op {
        Operator::Like | Operator::Contains => Literal::Text(strip_quotes(value).to_string()),
        _ => Literal::parse(value),
    }
}

fn is_empty_literal(literal: &Literal) -> bool {
    matches!(literal, Literal::Text(text) if text.is_empty())
}

fn split_leading_operator(value: &str) -> (Option<Operator>, &str) {
    for (symbol, op) in LEADING_OPERATORS {
        if let Some(rest) = value.strip_prefix(symbol) {
            return (Some(op), rest.trim());
        }
    }
    (None, value)
}

/// `512`, `12KB`, `1.5 MB`, `2gb`: bytes with 1024-based units.
pub fn parse_size(text: &str) -> Option<f64> {
    let upper = text.trim().to_ascii_uppercase();
    let (number, multiplier) = [("GB", 1024f64.powi(3)), ("MB", 1024f64.powi(2)), ("KB", 1024.0), ("B", 1.0)]
        .iter()
        .find_map(|(suffix, mult)| upper.strip_suffix(suffix).map(|n| (n.trim().to_string(), *mult)))
        .unwrap_or((upper.clone(), 1.0));

    let value: f64 = number.parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value * multiplier)
}
