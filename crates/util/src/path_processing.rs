use dirs_next::home_dir;
use std::path::PathBuf;

/// Expands a leading `~` to the current user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if trimmed == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = trimmed.strip_prefix("~/").or_else(|| trimmed.strip_prefix("~\\")) {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths_are_untouched() {
        assert_eq!(expand_tilde(" /etc/nodeflow.json "), PathBuf::from("/etc/nodeflow.json"));
    }

    #[test]
    fn test_tilde_prefix_is_expanded() {
        if let Some(home) = home_dir() {
            assert_eq!(expand_tilde("~/models/app.json"), home.join("models/app.json"));
        }
    }
}
