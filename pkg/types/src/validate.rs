use anyhow::{Result, bail};

/// Validate a Kubernetes-style resource name.
/// Rules: lowercase `[a-z0-9-.]`, max 253 chars, no leading/trailing hyphens or dots.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 253 {
        bail!("name '{}' exceeds 253 characters (got {})", name, name.len());
    }
    if name.starts_with(['-', '.']) || name.ends_with(['-', '.']) {
        bail!("name '{}' must not start or end with a hyphen or dot", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, hyphens and dots",
            name
        );
    }
    Ok(())
}

/// Split a `namespace/name` store key, validating both halves.
pub fn split_key(key: &str) -> Result<(&str, &str)> {
    let Some((ns, name)) = key.split_once('/') else {
        bail!("key '{}' is not of the form <namespace>/<name>", key);
    };
    validate_name(ns)?;
    validate_name(name)?;
    Ok((ns, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_name("nginx").is_ok());
        assert!(validate_name("my-app").is_ok());
        assert!(validate_name("router-certs.v2").is_ok());
        assert!(validate_name("a").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("My-App").is_err());
        assert!(validate_name("my_app").is_err());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("trailing.").is_err());
        assert!(validate_name(&"a".repeat(254)).is_err());
    }

    #[test]
    fn split_keys() {
        assert_eq!(split_key("kube-system/router-certs").unwrap(), ("kube-system", "router-certs"));
        assert!(split_key("router-certs").is_err());
        assert!(split_key("/router-certs").is_err());
        assert!(split_key("ns/").is_err());
    }
}
