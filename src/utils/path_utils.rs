use std::path::{Component, Path};

/// Path of `path` relative to `root`, joined with `/` whatever the
/// platform separator is. `None` when `path` is not under `root`.
pub fn relative_slash_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Last `/`-separated segment of a path string.
pub fn base_name(path_str: &str) -> &str {
    path_str.rsplit('/').next().unwrap_or(path_str)
}

/// Quotes a path for a POSIX shell `cd`. Plain paths are left alone.
pub fn shell_quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let is_plain = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '~' | '+' | ':' | '\\'));
    if is_plain {
        raw.into_owned()
    } else {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn relative_path_uses_forward_slashes() {
        let root = PathBuf::from("/cache/core_lib-abc");
        let file = root.join("lib").join("a").join("b.dart");
        assert_eq!(relative_slash_path(&file, &root).as_deref(), Some("lib/a/b.dart"));
    }

    #[test]
    fn relative_path_outside_root_is_none() {
        assert_eq!(relative_slash_path(Path::new("/other/x.dart"), Path::new("/cache")), None);
    }

    #[test]
    fn base_name_takes_last_segment() {
        assert_eq!(base_name("/cache/lib/a/b.dart"), "b.dart");
        assert_eq!(base_name("b.dart"), "b.dart");
    }

    #[test]
    fn shell_quote_wraps_paths_with_spaces() {
        assert_eq!(shell_quote(Path::new("/home/dev/app")), "/home/dev/app");
        assert_eq!(shell_quote(Path::new("/home/dev/my app")), "'/home/dev/my app'");
        assert_eq!(shell_quote(Path::new("/tmp/it's")), r"'/tmp/it'\''s'");
    }
}
