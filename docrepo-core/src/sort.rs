//! Conversion of caller supplied ordering tokens into sort documents.
//!
//! Tokens have the form `[+|-]alias`. The alias is resolved to a stored field name by a caller
//! supplied resolver; the sign selects ascending (default) or descending order.

use bson::Document;

use crate::error::{RepositoryError, RepositoryResult};

/// Ascending sort value.
pub const ASCENDING: i32 = 1;
/// Descending sort value.
pub const DESCENDING: i32 = -1;

/// Builds a sort document from a list of ordering tokens.
///
/// Returns `Ok(None)` when there are no tokens. Fails with a validation error coded
/// `error_code_prefix[index]` when the token at `index` is blank, cannot be resolved, or names a
/// field already present in the order (whatever its direction).
///
/// # Example
///
/// ```ignore
/// let order = query_param_to_sort(Some(["name", "-updated"]), "order", |alias| match alias {
///     "name" => Some("name".to_string()),
///     "updated" => Some("_lastUpdateTs".to_string()),
///     _ => None,
/// })?;
/// ```
pub fn query_param_to_sort<I, S, F>(
    tokens: Option<I>,
    error_code_prefix: &str,
    alias_resolver: F,
) -> RepositoryResult<Option<Document>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(&str) -> Option<String>,
{
    let Some(tokens) = tokens else {
        return Ok(None);
    };

    let mut sort = Document::new();
    for (index, token) in tokens.into_iter().enumerate() {
        let token = token.as_ref().trim();
        let (direction, alias) = match token.chars().next() {
            Some('-') => (DESCENDING, token[1..].trim()),
            Some('+') => (ASCENDING, token[1..].trim()),
            _ => (ASCENDING, token),
        };

        if alias.is_empty() {
            return Err(RepositoryError::validation(
                error_code_prefix,
                index,
                "An empty value is not a valid sort field",
            ));
        }

        let field = alias_resolver(alias).ok_or_else(|| {
            RepositoryError::validation(
                error_code_prefix,
                index,
                format!("The value '{alias}' is not a valid sort field"),
            )
        })?;

        if sort.contains_key(&field) {
            return Err(RepositoryError::validation(
                error_code_prefix,
                index,
                format!("The field '{alias}' is already used to sort"),
            ));
        }
        sort.insert(field, direction);
    }

    Ok(if sort.is_empty() { None } else { Some(sort) })
}

/// Same as [`query_param_to_sort`] for a single comma separated query parameter.
pub fn sort_from_query_param<F>(
    param: Option<&str>,
    error_code_prefix: &str,
    alias_resolver: F,
) -> RepositoryResult<Option<Document>>
where
    F: Fn(&str) -> Option<String>,
{
    let tokens = param
        .filter(|param| !param.trim().is_empty())
        .map(|param| param.split(','));

    query_param_to_sort(tokens, error_code_prefix, alias_resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn upper_case_known(alias: &str) -> Option<String> {
        match alias {
            "key" | "key1" | "key2" => Some(alias.to_uppercase()),
            _ => None,
        }
    }

    #[test]
    fn missing_or_empty_input_yields_no_order() {
        assert_eq!(sort_from_query_param(None, "order", upper_case_known).unwrap(), None);
        assert_eq!(sort_from_query_param(Some(" "), "order", upper_case_known).unwrap(), None);

        let empty: Vec<&str> = Vec::new();
        assert_eq!(query_param_to_sort(Some(empty), "order", upper_case_known).unwrap(), None);
    }

    #[test]
    fn resolves_aliases_and_directions() {
        let sort = sort_from_query_param(Some("key1,-key2"), "order", upper_case_known).unwrap();

        assert_eq!(sort, Some(doc! { "KEY1": 1, "KEY2": -1 }));
    }

    #[test]
    fn explicit_plus_is_ascending() {
        let sort = query_param_to_sort(Some([" +key "]), "order", upper_case_known).unwrap();

        assert_eq!(sort, Some(doc! { "KEY": 1 }));
    }

    #[test]
    fn duplicated_field_fails_with_its_index() {
        let err = sort_from_query_param(Some("key1,-key1"), "order", upper_case_known).unwrap_err();

        assert_eq!(err.code(), Some("order[1]"));
    }

    #[test]
    fn empty_token_fails_with_its_index() {
        let err = sort_from_query_param(Some("key,,key2"), "order", upper_case_known).unwrap_err();

        assert_eq!(err.code(), Some("order[1]"));
    }

    #[test]
    fn unknown_alias_fails_with_its_index() {
        let err = query_param_to_sort(Some(["key", "key2", "other"]), "sort", upper_case_known)
            .unwrap_err();

        assert_eq!(err.code(), Some("sort[2]"));
    }

    #[test]
    fn lone_sign_is_blank() {
        let err = query_param_to_sort(Some(["-"]), "order", upper_case_known).unwrap_err();

        assert_eq!(err.code(), Some("order[0]"));
    }
}
