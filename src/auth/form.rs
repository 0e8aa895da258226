//! HTML form extraction.
//!
//! The interactive login flow has to submit server-rendered forms: the
//! login page and, for first-time authorizations, the consent page. Both
//! are plain `<form method="post">` documents, so one parser covers them;
//! only the field values injected by the caller differ.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use scraper::{Html, Selector};

use crate::error::{Error, Result};

// ============================================================================
// Form
// ============================================================================

/// A parsed HTML form: the POST target and its input fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    /// The form's `action` URL, possibly relative.
    pub action: String,

    /// `name → value` for every non-submit `<input>`.
    pub fields: BTreeMap<String, String>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Extracts the first POST form from an HTML page.
///
/// Every `<input>` inside the form whose `type` is not `submit`
/// contributes a field; a missing `value` becomes an empty string.
///
/// # Errors
///
/// Returns [`Error::Scraper`] when the page has no POST form.
pub fn parse_form(html: &str) -> Result<Form> {
    let document = Html::parse_document(html);
    let form_selector = selector("form")?;
    let input_selector = selector("input")?;

    for form in document.select(&form_selector) {
        let form_method = form.value().attr("method").unwrap_or("");
        if !form_method.eq_ignore_ascii_case("post") {
            continue;
        }

        let action = form.value().attr("action").unwrap_or("").to_owned();
        let mut fields = BTreeMap::new();

        for input in form.select(&input_selector) {
            let input_type = input.value().attr("type").unwrap_or("");
            if input_type.eq_ignore_ascii_case("submit") {
                continue;
            }
            let Some(name) = input.value().attr("name") else {
                continue;
            };
            fields.insert(
                name.to_owned(),
                input.value().attr("value").unwrap_or("").to_owned(),
            );
        }

        return Ok(Form { action, fields });
    }

    Err(Error::scraper("page contains no POST form"))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| Error::scraper(format!("invalid selector `{css}`: {err}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form method="post" action="https://auth.mail.ru/cgi-bin/auth">
            <input type="hidden" name="page" value="https://connect.mail.ru/oauth/authorize">
            <input type="text" name="Login" value="">
            <input type="password" name="Password">
            <input type="submit" value="Sign in">
        </form>
        </body></html>
    "#;

    #[test]
    fn test_parse_login_form() {
        let form = parse_form(LOGIN_PAGE).unwrap();
        assert_eq!(form.action, "https://auth.mail.ru/cgi-bin/auth");
        assert_eq!(
            form.fields.get("page").map(String::as_str),
            Some("https://connect.mail.ru/oauth/authorize")
        );
        assert_eq!(form.fields.get("Login").map(String::as_str), Some(""));
        assert_eq!(form.fields.get("Password").map(String::as_str), Some(""));
    }

    #[test]
    fn test_submit_inputs_skipped() {
        let form = parse_form(LOGIN_PAGE).unwrap();
        assert_eq!(form.fields.len(), 3);
    }

    #[test]
    fn test_method_is_case_insensitive() {
        let html = r#"<form method="POST" action="/go"><input name="a" value="1"></form>"#;
        let form = parse_form(html).unwrap();
        assert_eq!(form.action, "/go");
        assert_eq!(form.fields.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_get_form_ignored() {
        let html = r#"<form method="get" action="/search"><input name="q"></form>"#;
        assert!(parse_form(html).is_err());
    }

    #[test]
    fn test_no_form() {
        let err = parse_form("<html><body>nothing here</body></html>").unwrap_err();
        assert!(err.is_scraper_error());
    }
}
