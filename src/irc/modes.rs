/// Channel mode handling — flag storage and mode-string parsing.
///
/// The server supports the RFC 1459 channel modes `i`, `t`, `k`, `l` and
/// `o`. A mode string is a sign-flipping sequence (`+ik-t...`) applied
/// left to right; letters that take an argument consume the next one in
/// order. Unknown letters are surfaced to the caller so it can reply 472
/// and keep going.

/// Maximum length of a channel key set with `+k`.
pub const MAX_KEY_LEN: usize = 23;

/// A single parsed mode change: `+i`, `-t`, `+k secret`, `+o nick`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    /// true = setting (+), false = unsetting (-).
    pub adding: bool,
    /// The mode letter.
    pub letter: char,
    /// Consumed argument (key, limit, or nick), when the letter takes one.
    pub arg: Option<String>,
}

/// Parse a mode string with its arguments into individual mode changes.
///
/// Argument consumption per letter:
/// - `k` — takes an argument when setting only (clearing a key needs none)
/// - `l` — takes an argument when setting only
/// - `o` — always takes an argument (the nickname)
/// - `i`, `t` — never take an argument
/// - anything else — no argument; passed through for the 472 reply
///
/// A letter whose argument is missing is emitted with `arg: None`; the
/// caller decides how to reject it.
pub fn parse_mode_string(mode_str: &str, args: &[String]) -> Vec<ModeChange> {
    let mut changes = Vec::new();
    let mut adding = true;
    let mut arg_idx = 0;

    let mut take_arg = |idx: &mut usize| -> Option<String> {
        let arg = args.get(*idx).cloned();
        if arg.is_some() {
            *idx += 1;
        }
        arg
    };

    for letter in mode_str.chars() {
        match letter {
            '+' => adding = true,
            '-' => adding = false,
            'k' | 'l' => {
                let arg = if adding { take_arg(&mut arg_idx) } else { None };
                changes.push(ModeChange {
                    adding,
                    letter,
                    arg,
                });
            }
            'o' => {
                let arg = take_arg(&mut arg_idx);
                changes.push(ModeChange {
                    adding,
                    letter,
                    arg,
                });
            }
            'i' | 't' => changes.push(ModeChange {
                adding,
                letter,
                arg: None,
            }),
            other => changes.push(ModeChange {
                adding,
                letter: other,
                arg: None,
            }),
        }
    }

    changes
}

/// A channel key must be nonempty, at most [`MAX_KEY_LEN`] bytes, and free
/// of spaces, commas and control characters.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b != b' ' && b != b',' && !b.is_ascii_control())
}

/// Parse a `+l` argument: a decimal count. Rejects non-digits and
/// overflow; a zero limit is valid here and treated as a no-op upstream.
pub fn parse_limit(arg: &str) -> Option<usize> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    arg.parse::<usize>().ok()
}

/// Render a list of applied changes as one `MODE` broadcast payload:
/// the sign-flipping flag string plus the consumed arguments in order.
pub fn render_applied(applied: &[ModeChange]) -> (String, Vec<String>) {
    let mut flags = String::new();
    let mut args = Vec::new();
    let mut sign: Option<bool> = None;

    for change in applied {
        if sign != Some(change.adding) {
            flags.push(if change.adding { '+' } else { '-' });
            sign = Some(change.adding);
        }
        flags.push(change.letter);
        if let Some(ref arg) = change.arg {
            args.push(arg.clone());
        }
    }

    (flags, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_mode_string ────────────────────────────────────────

    #[test]
    fn parse_simple_flags() {
        let changes = parse_mode_string("+it", &[]);
        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes[0],
            ModeChange {
                adding: true,
                letter: 'i',
                arg: None
            }
        );
        assert_eq!(
            changes[1],
            ModeChange {
                adding: true,
                letter: 't',
                arg: None
            }
        );
    }

    #[test]
    fn parse_defaults_to_adding() {
        let changes = parse_mode_string("i", &[]);
        assert!(changes[0].adding);
    }

    #[test]
    fn parse_mixed_set_unset() {
        let changes = parse_mode_string("+i-t+i", &[]);
        assert!(changes[0].adding);
        assert!(!changes[1].adding);
        assert!(changes[2].adding);
    }

    #[test]
    fn parse_key_set_consumes_arg() {
        let changes = parse_mode_string("+k", &["hunter2".into()]);
        assert_eq!(
            changes[0],
            ModeChange {
                adding: true,
                letter: 'k',
                arg: Some("hunter2".into())
            }
        );
    }

    #[test]
    fn parse_key_unset_takes_no_arg() {
        let changes = parse_mode_string("-k", &["leftover".into()]);
        assert_eq!(
            changes[0],
            ModeChange {
                adding: false,
                letter: 'k',
                arg: None
            }
        );
    }

    #[test]
    fn parse_limit_set_and_unset() {
        let changes = parse_mode_string("+l-l", &["50".into()]);
        assert_eq!(changes[0].arg.as_deref(), Some("50"));
        assert_eq!(changes[1].arg, None);
    }

    #[test]
    fn parse_operator_always_consumes() {
        let changes = parse_mode_string("+o-o", &["alice".into(), "bob".into()]);
        assert_eq!(changes[0].arg.as_deref(), Some("alice"));
        assert!(changes[0].adding);
        assert_eq!(changes[1].arg.as_deref(), Some("bob"));
        assert!(!changes[1].adding);
    }

    #[test]
    fn parse_missing_arg_is_surfaced() {
        let changes = parse_mode_string("+k", &[]);
        assert_eq!(changes[0].arg, None);
    }

    #[test]
    fn parse_args_consumed_in_order() {
        let changes = parse_mode_string("+kl", &["secret".into(), "25".into()]);
        assert_eq!(changes[0].arg.as_deref(), Some("secret"));
        assert_eq!(changes[1].arg.as_deref(), Some("25"));
    }

    #[test]
    fn parse_unknown_letter_passes_through() {
        let changes = parse_mode_string("+x", &[]);
        assert_eq!(
            changes[0],
            ModeChange {
                adding: true,
                letter: 'x',
                arg: None
            }
        );
    }

    // ── is_valid_key ─────────────────────────────────────────────

    #[test]
    fn valid_keys() {
        assert!(is_valid_key("hunter2"));
        assert!(is_valid_key("a"));
        assert!(is_valid_key(&"k".repeat(MAX_KEY_LEN)));
    }

    #[test]
    fn invalid_keys() {
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(&"k".repeat(MAX_KEY_LEN + 1)));
        assert!(!is_valid_key("has space"));
        assert!(!is_valid_key("has,comma"));
        assert!(!is_valid_key("has\x07bell"));
    }

    // ── parse_limit ──────────────────────────────────────────────

    #[test]
    fn limit_parses_decimal() {
        assert_eq!(parse_limit("50"), Some(50));
        assert_eq!(parse_limit("0"), Some(0));
    }

    #[test]
    fn limit_rejects_garbage_and_overflow() {
        assert_eq!(parse_limit(""), None);
        assert_eq!(parse_limit("-1"), None);
        assert_eq!(parse_limit("12a"), None);
        assert_eq!(parse_limit("99999999999999999999999999"), None);
    }

    // ── render_applied ───────────────────────────────────────────

    #[test]
    fn render_groups_signs() {
        let applied = vec![
            ModeChange {
                adding: true,
                letter: 'i',
                arg: None,
            },
            ModeChange {
                adding: true,
                letter: 'k',
                arg: Some("secret".into()),
            },
            ModeChange {
                adding: false,
                letter: 't',
                arg: None,
            },
        ];
        let (flags, args) = render_applied(&applied);
        assert_eq!(flags, "+ik-t");
        assert_eq!(args, vec!["secret"]);
    }

    #[test]
    fn render_empty_is_empty() {
        let (flags, args) = render_applied(&[]);
        assert_eq!(flags, "");
        assert!(args.is_empty());
    }
}
