//! Name rules for receiver bindings, block locals and message types.

fn check_ident(what: &str, name: &str, allow_underscore_start: bool) -> Result<(), String> {
    let Some(first) = name.chars().next() else {
        return Err(format!("{what} must be non-empty"));
    };
    if !(first.is_ascii_alphabetic() || (allow_underscore_start && first == '_')) {
        let allowed = if allow_underscore_start { "[A-Za-z_]" } else { "[A-Za-z]" };
        return Err(format!("{what} {name:?} must start with {allowed}"));
    }
    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(format!("{what} {name:?} contains {bad:?} (allowed [A-Za-z0-9_])"));
    }
    Ok(())
}

/// Fields, bindings and locals: `[A-Za-z_][A-Za-z0-9_]*`. Dotted paths are split before this.
pub fn validate_local_name(name: &str) -> Result<(), String> {
    check_ident("local name", name, true)
}

/// Message and contract names. These end up inside mangled function names, so no leading `_`.
pub fn validate_type_name(name: &str) -> Result<(), String> {
    check_ident("type name", name, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_identifier_rules() {
        assert!(validate_local_name("_tmp1").is_ok());
        assert!(validate_local_name("1x").is_err());
        assert!(validate_type_name("Counter").is_ok());
        assert!(validate_type_name("_Counter").is_err());
        assert!(validate_type_name("").is_err());
    }

    #[test]
    fn errors_name_the_offending_char() {
        let err = validate_local_name("a.b").expect_err("dot");
        assert!(err.contains("'.'"), "{err}");
        let err = validate_local_name("wallet€").expect_err("non-ascii");
        assert!(err.contains("'€'"), "{err}");
    }
}
