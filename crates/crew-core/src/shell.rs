//! POSIX shell quoting.
//!
//! Every value interpolated into a composed script goes through [`quote`].
//! Nothing else in the workspace builds shell words by hand.

/// Quote `value` as a single POSIX shell word.
///
/// The result is wrapped in single quotes; embedded single quotes become
/// `'\''`. Inside single quotes the shell interprets nothing, so `$`, `` ` ``,
/// `\`, `;`, `|`, newlines and glob characters all pass through literally.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Quote `value` unless it consists only of characters that never need it.
///
/// Keeps generated scripts readable for the common case of plain paths and
/// names while staying safe for everything else.
pub fn quote_if_needed(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '@' | '='));
    if plain {
        value.to_string()
    } else {
        quote(value)
    }
}

/// Join already-built command lines into one script, one command per line.
pub fn join_lines(commands: &[String]) -> String {
    commands.join("\n")
}

/// Substitute `{name}` placeholders in `template` with quoted values.
///
/// Unknown placeholders are left untouched.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), &quote(value));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
