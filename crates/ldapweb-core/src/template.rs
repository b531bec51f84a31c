//! Username substitution into DN and filter templates.
//!
//! Both the bind DN and the lookup filter are produced by the same rule from the same raw
//! username, so a user can only ever name themselves. The username is inserted verbatim: no DN
//! or filter escaping is applied and the output must be treated as attacker-influenced.

/// Placeholder replaced by the username.
pub const PLACEHOLDER: &str = "%s";

/// Substitutes `username` into the placeholder of a DN template.
#[must_use]
pub fn build_dn(template: &str, username: &str) -> String {
    substitute(template, username)
}

/// Substitutes `username` into the placeholder of a search filter template.
#[must_use]
pub fn build_filter(template: &str, username: &str) -> String {
    substitute(template, username)
}

/// Checks that the template carries exactly one placeholder.
///
/// # Errors
///
/// Returns a description of the problem when the placeholder is missing or repeated.
pub fn validate_template(template: &str) -> std::result::Result<(), String> {
    match template.matches(PLACEHOLDER).count() {
        1 => Ok(()),
        0 => Err(format!("template `{template}` has no `{PLACEHOLDER}` placeholder")),
        n => Err(format!(
            "template `{template}` has {n} `{PLACEHOLDER}` placeholders, expected one"
        )),
    }
}

fn substitute(template: &str, username: &str) -> String {
    template.replacen(PLACEHOLDER, username, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_people_dn() {
        assert_eq!(
            build_dn("uid=%s,ou=people,dc=example,dc=com", "alice"),
            "uid=alice,ou=people,dc=example,dc=com"
        );
    }

    #[test]
    fn same_inputs_same_output() {
        let template = "cn=%s,ou=staff,dc=example,dc=org";
        assert_eq!(build_dn(template, "bob"), build_dn(template, "bob"));
        assert_ne!(build_dn(template, "bob"), build_dn(template, "bobby"));
    }

    #[test]
    fn filter_metacharacters_pass_through() {
        assert_eq!(build_filter("(uid=%s)", "*)(uid=*"), "(uid=*)(uid=*)");
    }

    #[test]
    fn placeholder_inside_username_is_not_expanded_again() {
        assert_eq!(build_dn("uid=%s,dc=example", "%s"), "uid=%s,dc=example");
    }

    #[test]
    fn template_validation() {
        assert!(validate_template("(uid=%s)").is_ok());
        assert!(validate_template("(uid=alice)").is_err());
        assert!(validate_template("(|(uid=%s)(mail=%s))").is_err());
    }
}
