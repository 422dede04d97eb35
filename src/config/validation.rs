//! Configuration validation.

use std::collections::HashSet;

use url::Url;

use crate::core::session::FunctionDeclaration;

/// The relay base URL, when set, must be an absolute http(s) URL.
pub fn validate_relay_url(base_url: Option<&str>) -> Result<(), String> {
    let Some(base_url) = base_url else {
        return Ok(());
    };
    let parsed =
        Url::parse(base_url).map_err(|e| format!("Invalid relay base URL '{base_url}': {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!(
            "Relay base URL must use http or https, got '{other}'"
        )),
    }
}

/// The session endpoint override, when set, must be a ws(s) URL.
pub fn validate_session_url(url: Option<&str>) -> Result<(), String> {
    let Some(url) = url else {
        return Ok(());
    };
    let parsed = Url::parse(url).map_err(|e| format!("Invalid session URL '{url}': {e}"))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(format!("Session URL must use ws or wss, got '{other}'")),
    }
}

/// Function names must be non-empty and unique.
pub fn validate_functions(functions: &[FunctionDeclaration]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for function in functions {
        let name = function.name.trim();
        if name.is_empty() {
            return Err("Function declarations require a non-empty name".to_string());
        }
        if !seen.insert(name) {
            return Err(format!("Duplicate function declaration: {name}"));
        }
        if function
            .parameters
            .required
            .iter()
            .chain(function.parameters.optional.iter())
            .any(|p| p.trim().is_empty())
        {
            return Err(format!("Function {name} declares an empty parameter name"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_url() {
        assert!(validate_relay_url(None).is_ok());
        assert!(validate_relay_url(Some("https://relay.example.com")).is_ok());
        assert!(validate_relay_url(Some("http://127.0.0.1:8080/base")).is_ok());
        assert!(validate_relay_url(Some("ftp://relay.example.com")).is_err());
        assert!(validate_relay_url(Some("not a url")).is_err());
    }

    #[test]
    fn test_session_url() {
        assert!(validate_session_url(None).is_ok());
        assert!(validate_session_url(Some("ws://127.0.0.1:9000")).is_ok());
        assert!(validate_session_url(Some("https://example.com")).is_err());
    }

    #[test]
    fn test_functions() {
        let ok = vec![
            FunctionDeclaration::new("send_message", "").required("message"),
            FunctionDeclaration::new("create_task", "").required("title"),
        ];
        assert!(validate_functions(&ok).is_ok());

        let duplicate = vec![
            FunctionDeclaration::new("create_task", ""),
            FunctionDeclaration::new("create_task", ""),
        ];
        assert!(
            validate_functions(&duplicate)
                .unwrap_err()
                .contains("Duplicate")
        );

        let unnamed = vec![FunctionDeclaration::new("  ", "")];
        assert!(validate_functions(&unnamed).is_err());

        let empty_param = vec![FunctionDeclaration::new("x", "").optional("")];
        assert!(validate_functions(&empty_param).is_err());
    }
}
