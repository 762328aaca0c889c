use anyhow::{Result, anyhow};

use super::ToolArgs;

pub fn required_str<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("missing string argument `{key}`"))
}

pub fn str_or<'a>(args: &'a ToolArgs, key: &str, default: &'a str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or(default)
}

pub fn u64_or(args: &ToolArgs, key: &str, default: u64) -> u64 {
    args.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

/// Catalog identifiers are lowercase and hyphenated ("Data Engineer" → "data-engineer").
pub fn slug(value: &str) -> String {
    value.replace(' ', "-").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slug_hyphenates_and_lowercases() {
        assert_eq!(slug("Data Engineer"), "data-engineer");
        assert_eq!(slug("azure"), "azure");
        assert_eq!(slug("Power Platform"), "power-platform");
    }

    #[test]
    fn string_helpers() {
        let args = json!({"role": "developer", "n": 3}).as_object().cloned().unwrap();
        assert_eq!(required_str(&args, "role").unwrap(), "developer");
        assert!(required_str(&args, "n").is_err());
        assert!(required_str(&args, "missing").is_err());
        assert_eq!(str_or(&args, "product", "azure"), "azure");
        assert_eq!(str_or(&args, "role", "student"), "developer");
        assert_eq!(u64_or(&args, "n", 20), 3);
        assert_eq!(u64_or(&args, "role", 20), 20);
    }
}
