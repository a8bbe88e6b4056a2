//! `$MACRO$` expansion for notification commands, event handlers, and
//! performance-data templates. Supplements spec.md's C6 dispatch step,
//! which names macro expansion but leaves the table itself to the external
//! command line; grounded on `original_source`'s `$USERx$`/`$HOSTx$`/
//! `$SERVICEx$` macro set.

use std::collections::HashMap;

/// A flat name -> value table built fresh for each command invocation.
/// Built by the caller (dispatch or notify) from the entity being acted on
/// plus the resource file's `$USERx$` table; this module only knows how to
/// substitute, not how to populate.
#[derive(Debug, Clone, Default)]
pub struct MacroContext {
    values: HashMap<String, String>,
}

impl MacroContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }
}

/// Replaces every `$NAME$` occurrence in `template` with its value from
/// `ctx`. An unknown macro name is replaced with an empty string rather
/// than left as-is, matching the "missing macros render empty" convention
/// `original_source`'s macro expander uses. A single unmatched `$` (not
/// part of a `$NAME$` pair) passes through literally.
pub fn expand_macros(template: &str, ctx: &MacroContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    let bytes = template.as_bytes();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        if let Some(end) = find_closing_dollar(bytes, i + 1) {
            let name = &template[i + 1..end];
            if name.is_empty() {
                // "$$" is the literal-dollar escape.
                out.push('$');
            } else {
                out.push_str(ctx.get(name).unwrap_or(""));
            }
            while let Some((j, _)) = chars.peek() {
                if *j <= end {
                    chars.next();
                } else {
                    break;
                }
            }
        } else {
            out.push('$');
        }
    }
    out
}

fn find_closing_dollar(bytes: &[u8], start: usize) -> Option<usize> {
    bytes[start..].iter().position(|&b| b == b'$').map(|p| start + p)
}

/// Translates the escape sequences a perfdata template may contain:
/// `\n`, `\r`, `\t` to their ASCII counterparts; any other `\x` passes
/// through as the literal two characters (spec.md §6 "Template escapes").
pub fn unescape_template(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('r') => {
                out.push('\r');
                chars.next();
            }
            Some('t') => {
                out.push('\t');
                chars.next();
            }
            Some(other) => {
                out.push('\\');
                out.push(*other);
                chars.next();
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_macros() {
        let mut ctx = MacroContext::new();
        ctx.set("HOSTNAME", "web1");
        ctx.set("HOSTADDRESS", "10.0.0.1");
        let out = expand_macros("check $HOSTNAME$ at $HOSTADDRESS$", &ctx);
        assert_eq!(out, "check web1 at 10.0.0.1");
    }

    #[test]
    fn unknown_macro_renders_empty() {
        let ctx = MacroContext::new();
        let out = expand_macros("value=$NOPE$", &ctx);
        assert_eq!(out, "value=");
    }

    #[test]
    fn double_dollar_is_literal() {
        let ctx = MacroContext::new();
        let out = expand_macros("cost: $$5", &ctx);
        assert_eq!(out, "cost: $5");
    }

    #[test]
    fn unterminated_dollar_passes_through() {
        let ctx = MacroContext::new();
        let out = expand_macros("trailing $", &ctx);
        assert_eq!(out, "trailing $");
    }

    #[test]
    fn template_escapes_translate_known_sequences() {
        assert_eq!(unescape_template("a\\nb\\tc\\rd"), "a\nb\tc\rd");
        assert_eq!(unescape_template("keep \\x literal"), "keep \\x literal");
    }
}
