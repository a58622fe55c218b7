//! Filter evaluation for in-memory documents.
//!
//! Native filter documents are evaluated the way the document database evaluates them:
//! dotted paths descend through nested documents and arrays, a condition on an array field
//! holds when it holds for the array itself or for any of its elements, and values of
//! different types are ordered by type bracket.

use std::cmp::Ordering;

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::{Regex, RegexBuilder};

use docrepo_core::error::{RepositoryError, RepositoryResult};

/// Comparable view of a BSON value, ordered like the document database orders values.
///
/// Numbers of every width are normalized to `f64`. Types without a meaningful order share the
/// last bracket and only compare equal to an identical value.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Map(Vec<(&'a str, Comparable<'a>)>),
    Array(Vec<Comparable<'a>>),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::String(value) | Bson::Symbol(value) => Comparable::String(value),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            Bson::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Bson::ObjectId(oid) => Comparable::ObjectId(*oid),
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    /// Position of the value's type in the cross-type sort order.
    fn bracket(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Other(_) => 10,
        }
    }

    pub(crate) fn same_bracket(&self, other: &Self) -> bool {
        self.bracket() == other.bracket()
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Comparable<'_> {}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Comparable<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Map(a), Comparable::Map(b)) => a
                .iter()
                .zip(b.iter())
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.cmp(vb)))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Array(a), Comparable::Array(b)) => a.cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Other(a), Comparable::Other(b)) if a == b => Ordering::Equal,
            (Comparable::Other(_), Comparable::Other(_)) => Ordering::Less,
            (a, b) => a.bracket().cmp(&b.bracket()),
        }
    }
}

/// Collects every value reachable through the dotted `path`.
///
/// Arrays met on the way are traversed element-wise; a numeric segment also addresses an array
/// position. A path that leads nowhere yields nothing.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();
    if let Some((head, rest)) = segments.split_first()
        && let Some(value) = document.get(*head)
    {
        descend(value, rest, &mut found);
    }
    found
}

fn descend<'a>(value: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(value) = doc.get(*head) {
                descend(value, rest, found);
            }
        }
        Bson::Array(items) => {
            if let Some(item) = head.parse::<usize>().ok().and_then(|index| items.get(index)) {
                descend(item, rest, found);
            }
            for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                descend(item, segments, found);
            }
        }
        _ => {}
    }
}

/// The values a condition is tested against: each value itself and, for arrays, their elements.
fn candidates<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());
    for value in values {
        expanded.push(*value);
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
    }
    expanded
}

fn query_error(message: impl Into<String>) -> RepositoryError {
    RepositoryError::Query(message.into())
}

fn is_operator_document(value: &Bson) -> bool {
    match value {
        Bson::Document(doc) => doc.keys().next().is_some_and(|key| key.starts_with('$')),
        _ => false,
    }
}

fn compile_regex(pattern: &str, options: &str) -> RepositoryResult<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(query_error(format!("Unsupported regex option '{other}'"))),
        };
    }
    builder
        .build()
        .map_err(|e| query_error(format!("Invalid regex '{pattern}': {e}")))
}

fn equals(values: &[&Bson], expected: &Bson) -> bool {
    let expected = Comparable::from(expected);
    if matches!(expected, Comparable::Null) && values.is_empty() {
        return true;
    }
    candidates(values)
        .into_iter()
        .any(|candidate| Comparable::from(candidate) == expected)
}

fn compares(values: &[&Bson], bound: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let bound = Comparable::from(bound);
    candidates(values).into_iter().any(|candidate| {
        let candidate = Comparable::from(candidate);
        candidate.same_bracket(&bound) && accept(candidate.cmp(&bound))
    })
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(value) => Some(*value as i64),
        Bson::Int64(value) => Some(*value),
        Bson::Double(value) if value.is_finite() => Some(value.trunc() as i64),
        _ => None,
    }
}

fn array_operand<'b>(operator: &str, operand: &'b Bson) -> RepositoryResult<&'b [Bson]> {
    match operand {
        Bson::Array(items) => Ok(items.as_slice()),
        _ => Err(query_error(format!("{operator} needs an array"))),
    }
}

/// Evaluates native filter documents against stored documents.
pub(crate) struct FilterEvaluator<'a> {
    filter: &'a Document,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(filter: &'a Document) -> Self {
        Self { filter }
    }

    /// Returns whether `document` satisfies the filter.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Query`] for unknown operators and malformed operands.
    pub fn matches(&self, document: &Document) -> RepositoryResult<bool> {
        matches_document(document, self.filter)
    }

    /// Keeps the documents satisfying the filter.
    pub fn filter_documents<'d>(
        &self,
        documents: impl IntoIterator<Item = &'d Document>,
    ) -> RepositoryResult<Vec<&'d Document>> {
        let mut kept = Vec::new();
        for document in documents {
            if self.matches(document)? {
                kept.push(document);
            }
        }
        Ok(kept)
    }
}

fn matches_document(document: &Document, filter: &Document) -> RepositoryResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses("$and", condition)? {
                    if !matches_document(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(document, "$or", condition)?,
            "$nor" => !any_clause(document, "$nor", condition)?,
            operator if operator.starts_with('$') => {
                return Err(query_error(format!("Unknown top level operator {operator}")));
            }
            path => matches_condition(&lookup(document, path), condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'b>(operator: &str, condition: &'b Bson) -> RepositoryResult<Vec<&'b Document>> {
    let items = array_operand(operator, condition)?;
    if items.is_empty() {
        return Err(query_error(format!("{operator} needs a non-empty array")));
    }
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| query_error(format!("{operator} entries must be documents")))
        })
        .collect()
}

fn any_clause(document: &Document, operator: &str, condition: &Bson) -> RepositoryResult<bool> {
    for clause in clauses(operator, condition)? {
        if matches_document(document, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Evaluates the condition attached to one path.
fn matches_condition(values: &[&Bson], condition: &Bson) -> RepositoryResult<bool> {
    match condition {
        Bson::Document(operators) if is_operator_document(condition) => {
            matches_operators(values, operators)
        }
        literal => Ok(equals(values, literal)),
    }
}

fn matches_regex(values: &[&Bson], regex: &Regex) -> RepositoryResult<bool> {
    Ok(candidates(values).into_iter().any(|candidate| match candidate {
        Bson::String(text) | Bson::Symbol(text) => regex.is_match(text),
        _ => false,
    }))
}

fn matches_operators(values: &[&Bson], operators: &Document) -> RepositoryResult<bool> {
    for (operator, operand) in operators {
        let satisfied = match operator.as_str() {
            "$eq" => equals(values, operand),
            "$ne" => !equals(values, operand),
            "$gt" => compares(values, operand, Ordering::is_gt),
            "$gte" => compares(values, operand, Ordering::is_ge),
            "$lt" => compares(values, operand, Ordering::is_lt),
            "$lte" => compares(values, operand, Ordering::is_le),
            "$in" => in_list(values, array_operand("$in", operand)?),
            "$nin" => !in_list(values, array_operand("$nin", operand)?),
            "$exists" => {
                let flag = match operand {
                    Bson::Boolean(flag) => *flag,
                    other => as_i64(other).is_some_and(|value| value != 0),
                };
                values.is_empty() != flag
            }
            "$regex" => {
                let pattern = match operand {
                    Bson::String(pattern) => pattern.as_str(),
                    _ => return Err(query_error("$regex needs a string pattern")),
                };
                let options = match operators.get("$options") {
                    Some(Bson::String(options)) => options.as_str(),
                    Some(_) => return Err(query_error("$options needs a string")),
                    None => "",
                };
                matches_regex(values, &compile_regex(pattern, options)?)?
            }
            "$options" if operators.contains_key("$regex") => true,
            "$all" => all_of(values, array_operand("$all", operand)?)?,
            "$elemMatch" => elem_match(values, operand)?,
            "$mod" => modulo(values, array_operand("$mod", operand)?)?,
            "$type" => of_type(values, operand)?,
            "$not" => match operand {
                Bson::Document(inner) if is_operator_document(operand) => {
                    !matches_operators(values, inner)?
                }
                _ => return Err(query_error("$not needs an operator document")),
            },
            unknown => return Err(query_error(format!("Unknown operator {unknown}"))),
        };

        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(values: &[&Bson], list: &[Bson]) -> bool {
    list.iter().any(|item| equals(values, item))
}

fn all_of(values: &[&Bson], list: &[Bson]) -> RepositoryResult<bool> {
    if list.is_empty() {
        return Ok(false);
    }
    for item in list {
        let hit = match item {
            Bson::Document(inner) if inner.contains_key("$elemMatch") => {
                matches_operators(values, inner)?
            }
            literal => equals(values, literal),
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Holds when some array element satisfies `condition` as a whole.
fn elem_match(values: &[&Bson], condition: &Bson) -> RepositoryResult<bool> {
    let condition = condition
        .as_document()
        .ok_or_else(|| query_error("$elemMatch needs a document"))?;
    let on_values = condition.keys().next().is_some_and(|key| key.starts_with('$'));

    for value in values {
        let Bson::Array(items) = value else { continue };
        for item in items {
            let hit = if on_values {
                matches_operators(&[item], condition)?
            } else {
                match item {
                    Bson::Document(element) => matches_document(element, condition)?,
                    _ => false,
                }
            };
            if hit {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn modulo(values: &[&Bson], operand: &[Bson]) -> RepositoryResult<bool> {
    let (divisor, remainder) = match operand {
        [divisor, remainder] => (as_i64(divisor), as_i64(remainder)),
        _ => return Err(query_error("$mod needs [divisor, remainder]")),
    };
    let (Some(divisor), Some(remainder)) = (divisor, remainder) else {
        return Err(query_error("$mod needs numeric operands"));
    };
    if divisor == 0 {
        return Err(query_error("$mod divisor cannot be 0"));
    }

    Ok(candidates(values)
        .into_iter()
        .filter_map(as_i64)
        .any(|value| value.wrapping_rem(divisor) == remainder))
}

/// BSON type code for a `$type` alias, or `None` for the `number` alias.
fn type_code(alias: &str) -> RepositoryResult<Option<u8>> {
    let code = match alias {
        "double" => 1,
        "string" => 2,
        "object" => 3,
        "array" => 4,
        "binData" => 5,
        "objectId" => 7,
        "bool" => 8,
        "date" => 9,
        "null" => 10,
        "regex" => 11,
        "int" => 16,
        "timestamp" => 17,
        "long" => 18,
        "decimal" => 19,
        "number" => return Ok(None),
        unknown => return Err(query_error(format!("Unknown $type alias {unknown}"))),
    };
    Ok(Some(code))
}

fn type_codes(operand: &Bson) -> RepositoryResult<Vec<Option<u8>>> {
    match operand {
        Bson::String(alias) => Ok(vec![type_code(alias)?]),
        Bson::Array(items) => Ok(items
            .iter()
            .map(type_codes)
            .collect::<RepositoryResult<Vec<_>>>()?
            .concat()),
        other => match as_i64(other).and_then(|code| u8::try_from(code).ok()) {
            Some(code) => Ok(vec![Some(code)]),
            None => Err(query_error("$type needs a type alias or code")),
        },
    }
}

/// Array type codes test the field itself; every other code also tests array elements.
fn of_type(values: &[&Bson], operand: &Bson) -> RepositoryResult<bool> {
    let codes = type_codes(operand)?;
    let expanded = candidates(values);

    Ok(codes.into_iter().any(|code| match code {
        Some(4) => values.iter().any(|value| matches!(value, Bson::Array(_))),
        Some(code) => expanded.iter().any(|value| value.element_type() as u8 == code),
        None => expanded
            .iter()
            .any(|value| matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))),
    }))
}
