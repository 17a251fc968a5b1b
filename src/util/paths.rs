use std::path::PathBuf;

/// Expand a leading `~` or `~/` to `$HOME`. Other paths are returned as-is,
/// as is `~` when `HOME` is unset.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => return PathBuf::from(path),
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => PathBuf::from(path),
    }
}

/// Normalise an IRC-style channel name: prefix `#` unless it already
/// carries a channel prefix.
pub fn as_channel(name: &str) -> String {
    let name = name.trim();
    if name.starts_with(['#', '&', '+', '!']) {
        name.to_string()
    } else {
        format!("#{name}")
    }
}
