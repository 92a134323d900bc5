//! Clause splitting and operator recognition. Both ignore anything inside
//! single or double quotes.

use super::Operator;

/// Operators are recognised in exactly this order: the first entry found
/// anywhere in the clause wins, so `>=` is taken before `>` and `=`.
pub const OPERATOR_PRECEDENCE: [(&str, Operator); 8] = [
    (">=", Operator::Ge),
    ("<=", Operator::Le),
    ("!=", Operator::Ne),
    (">", Operator::Gt),
    ("<", Operator::Lt),
    ("=", Operator::Eq),
    ("LIKE", Operator::Like),
    ("CONTAINS", Operator::Contains),
];

const CLAUSE_SEPARATOR: &str = " AND ";

/// A quote opens a quoted section only where a value can start: at the
/// beginning, or after whitespace, `:` or an operator character.
fn starts_value(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, ':' | '=' | '<' | '>' | '!'),
    }
}

/// Byte-indexed mask of positions that sit inside a quoted section.
/// Quotes without a closing partner (`Tom's`) are plain characters.
fn quoted_mask(text: &str) -> Vec<bool> {
    let mut mask = vec![false; text.len()];
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut n = 0;
    while n < chars.len() {
        let (i, c) = chars[n];
        let prev = n.checked_sub(1).map(|p| chars[p].1);
        if (c == '"' || c == '\'') && starts_value(prev) {
            if let Some(offset) = chars[n + 1..].iter().position(|&(_, q)| q == c) {
                let close = n + 1 + offset;
                for flag in &mut mask[i + 1..chars[close].0] {
                    *flag = true;
                }
                n = close + 1;
                continue;
            }
        }
        n += 1;
    }
    mask
}

pub fn split_clauses(query: &str) -> Vec<&str> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let mask = quoted_mask(query);
    let mut clauses = Vec::new();
    let mut start = 0;
    for (i, _) in query.match_indices(CLAUSE_SEPARATOR) {
        if i < start || mask[i] {
            continue;
        }
        clauses.push(query[start..i].trim());
        start = i + CLAUSE_SEPARATOR.len();
    }
    clauses.push(query[start..].trim());
    clauses
}

/// Byte range and kind of the operator that splits `clause`.
pub fn find_operator(clause: &str) -> Option<(usize, usize, Operator)> {
    let mask = quoted_mask(clause);
    let upper = clause.to_ascii_uppercase();
    let bytes = clause.as_bytes();

    OPERATOR_PRECEDENCE.iter().find_map(|(symbol, op)| {
        let is_keyword = symbol.chars().all(|c| c.is_ascii_alphabetic());
        upper
            .match_indices(symbol)
            .map(|(i, _)| i)
            .find(|&i| {
                if mask[i] {
                    return false;
                }
                if !is_keyword {
                    return true;
                }
                let end = i + symbol.len();
                i > 0
                    && end < bytes.len()
                    && bytes[i - 1].is_ascii_whitespace()
                    && bytes[end].is_ascii_whitespace()
            })
            .map(|i| (i, i + symbol.len(), *op))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_clauses() {
        assert_eq!(split_clauses("camera:Canon AND iso > 100"), vec!["camera:Canon", "iso > 100"]);
        assert_eq!(split_clauses("  a = 1  "), vec!["a = 1"]);
        assert_eq!(split_clauses("title = \"rock AND roll\" AND x = 1"), vec!["title = \"rock AND roll\"", "x = 1"]);
        assert_eq!(split_clauses("a = 1 and b = 2"), vec!["a = 1 and b = 2"]);
        assert_eq!(split_clauses("a = 1 AND "), vec!["a = 1", ""]);
        assert!(split_clauses("   ").is_empty());
    }

    #[test]
    fn test_unbalanced_quote_does_not_swallow_clauses() {
        assert_eq!(split_clauses("model:Tom's AND camera:Canon"), vec!["model:Tom's", "camera:Canon"]);
        assert_eq!(split_clauses("title = it's AND x = \"a AND b\""), vec!["title = it's", "x = \"a AND b\""]);
        assert_eq!(split_clauses("note = \"open AND x = 1"), vec!["note = \"open", "x = 1"]);
        assert_eq!(find_operator("name = O'Brien's"), Some((5, 6, Operator::Eq)));
    }

    #[test]
    fn test_precedence_order() {
        assert_eq!(find_operator("iso >= 100").map(|o| o.2), Some(Operator::Ge));
        assert_eq!(find_operator("iso>100").map(|o| o.2), Some(Operator::Gt));
        assert_eq!(find_operator("iso != 100").map(|o| o.2), Some(Operator::Ne));
        assert_eq!(find_operator("a = b > c"), Some((6, 7, Operator::Gt)));
        assert_eq!(find_operator("title like sun").map(|o| o.2), Some(Operator::Like));
        assert_eq!(find_operator("title CONTAINS sun").map(|o| o.2), Some(Operator::Contains));
        assert_eq!(find_operator("unlikely value"), None);
    }

    #[test]
    fn test_quoted_operators_are_ignored() {
        assert_eq!(find_operator("title = \"a>b\""), Some((6, 7, Operator::Eq)));
        assert_eq!(find_operator("\"x=y\""), None);
    }
}
