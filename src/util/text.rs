/// Cleans a channel name for matching.
///
/// Replaces `_` and `-` with spaces, trims, and collapses whitespace runs to
/// a single space. Applying it twice gives the same result as applying it
/// once.
///
/// # Examples
///
/// ```
/// use chanlist::util::clean_name;
///
/// assert_eq!(clean_name("  CCTV_1   HD "), "CCTV 1 HD");
/// assert_eq!(clean_name("CCTV-1"), "CCTV 1");
/// ```
pub fn clean_name(name: &str) -> String {
    name.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Removes every occurrence of every suffix from `name`.
///
/// Removal is plain substring removal, not word-boundary aware, and is
/// repeated until nothing changes so that removing one suffix cannot expose
/// another (`"HHDD"` → `""`). When `clean` is set the name is re-cleaned after
/// each round, since removals can leave doubled or trailing spaces.
pub fn strip_suffixes(name: &str, suffixes: &[String], clean: bool) -> String {
    let mut current = name.to_string();
    loop {
        let mut next = current.clone();
        for suffix in suffixes.iter().filter(|s| !s.is_empty()) {
            if next.contains(suffix.as_str()) {
                next = next.replace(suffix.as_str(), "");
            }
        }
        if clean {
            next = clean_name(&next);
        }
        if next == current {
            return current;
        }
        current = next;
    }
}
