//! Owner Resolver
//!
//! Turns free-form account input ("acme, https://github.com/globex other")
//! into an ordered list of distinct owner names.

use reqwest::Url;

use crate::error::BulkImportError;

/// Resolve raw input into owners, preserving input order and case
///
/// Tokens are separated by commas, semicolons or whitespace. A token holding
/// a `/` is read as a URL and its first path segment is the owner; any other
/// token is a bare account name. Duplicates keep their first occurrence.
pub fn resolve_owners(input: &str) -> Result<Vec<String>, BulkImportError> {
    let tokens: Vec<&str> = input
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return Err(BulkImportError::InvalidInput(
            "No GitHub account or URL provided".to_string(),
        ));
    }

    let mut owners: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let owner = owner_from_token(token).ok_or_else(|| {
            BulkImportError::InvalidInput(format!("Could not extract an owner from '{}'", token))
        })?;
        if !owners.contains(&owner) {
            owners.push(owner);
        }
    }

    Ok(owners)
}

fn owner_from_token(token: &str) -> Option<String> {
    if !token.contains('/') {
        return is_account_name(token).then(|| token.to_string());
    }

    let candidate = if token.contains("://") {
        token.to_string()
    } else if token.split('/').next().is_some_and(|host| host.contains('.')) {
        format!("https://{}", token)
    } else {
        // "owner/repo" shorthand without a host
        format!("https://github.com/{}", token.trim_start_matches('/'))
    };

    let url = Url::parse(&candidate).ok()?;
    let owner = url.path_segments()?.find(|s| !s.is_empty())?;
    is_account_name(owner).then(|| owner.to_string())
}

fn is_account_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name() {
        assert_eq!(resolve_owners("acme").unwrap(), vec!["acme"]);
    }

    #[test]
    fn test_url_forms() {
        assert_eq!(resolve_owners("https://github.com/acme").unwrap(), vec!["acme"]);
        assert_eq!(resolve_owners("github.com/acme/widgets").unwrap(), vec!["acme"]);
        assert_eq!(resolve_owners("http://github.com/Globex/").unwrap(), vec!["Globex"]);
        assert_eq!(resolve_owners("acme/widgets").unwrap(), vec!["acme"]);
    }

    #[test]
    fn test_mixed_separators_dedup_and_order() {
        let owners = resolve_owners("acme, globex;initech\n acme https://github.com/globex").unwrap();
        assert_eq!(owners, vec!["acme", "globex", "initech"]);
    }

    #[test]
    fn test_case_preserved_and_distinct() {
        let owners = resolve_owners("Acme acme").unwrap();
        assert_eq!(owners, vec!["Acme", "acme"]);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(resolve_owners("  ,; "), Err(BulkImportError::InvalidInput(_))));
        assert!(matches!(resolve_owners(""), Err(BulkImportError::InvalidInput(_))));
    }

    #[test]
    fn test_url_without_owner_rejected() {
        assert!(matches!(
            resolve_owners("https://github.com/"),
            Err(BulkImportError::InvalidInput(_))
        ));
        assert!(matches!(resolve_owners("acme!"), Err(BulkImportError::InvalidInput(_))));
    }

    #[test]
    fn test_distinct_token_count_matches_output() {
        let inputs = ["a b c", "a,a,b", "x;y;z;x;y", "one"];
        for input in inputs {
            let mut distinct: Vec<&str> = Vec::new();
            for t in input.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
                if !t.is_empty() && !distinct.contains(&t) {
                    distinct.push(t);
                }
            }
            assert_eq!(resolve_owners(input).unwrap().len(), distinct.len(), "{input}");
        }
    }
}
