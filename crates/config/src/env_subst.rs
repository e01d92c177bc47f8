//! `${VAR}` and `${VAR:-default}` expansion for raw config text.

/// Expand placeholders from the process environment.
///
/// Unset variables without a default are left untouched so validation can
/// point at them.
pub fn substitute_env(input: &str) -> String {
    expand(input, |name| std::env::var(name).ok())
}

fn expand(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: keep the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };
        let placeholder = &after[..end];
        let (name, default) = match placeholder.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (placeholder, None),
        };

        match (name.is_empty(), lookup(name).filter(|v| !v.is_empty()), default) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(default)) => out.push_str(default),
            _ => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
