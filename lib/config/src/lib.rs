// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Helpers for reading gateway settings out of the process environment.
//!
//! Settings are read once at start-up. Boolean switches accept the usual spellings
//! (`1/0`, `true/false`, `on/off`, `yes/no`, case-insensitive); anything else is an error
//! when read strictly and `false` when read leniently.

use std::str::FromStr;

const TRUTHY: [&str; 4] = ["1", "true", "on", "yes"];
const FALSEY: [&str; 4] = ["0", "false", "off", "no"];

/// `true` for "1", "true", "on", "yes" (case-insensitive).
pub fn is_truthy(val: &str) -> bool {
    let val = val.trim();
    TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(val))
}

/// `true` for "0", "false", "off", "no" (case-insensitive).
pub fn is_falsey(val: &str) -> bool {
    let val = val.trim();
    FALSEY.iter().any(|f| f.eq_ignore_ascii_case(val))
}

/// Strict boolean parse. Errors on anything that is neither truthy nor falsey.
pub fn parse_bool(val: &str) -> anyhow::Result<bool> {
    match (is_truthy(val), is_falsey(val)) {
        (true, _) => Ok(true),
        (_, true) => Ok(false),
        _ => anyhow::bail!(
            "Invalid boolean value: '{val}'. Expected one of: true/false, 1/0, on/off, yes/no"
        ),
    }
}

/// Reads an environment variable, treating unset and empty the same way.
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Lenient switch: unset or unparseable reads as `false`.
pub fn env_is_truthy(name: &str) -> bool {
    env_var(name).is_some_and(|v| is_truthy(&v))
}

/// Strict switch: `Ok(None)` when unset, error when set to garbage.
pub fn env_parse_bool(name: &str) -> anyhow::Result<Option<bool>> {
    env_var(name)
        .map(|v| {
            parse_bool(&v).map_err(|e| anyhow::anyhow!("environment variable {name}: {e}"))
        })
        .transpose()
}

/// Typed parse of an environment variable.
///
/// ```ignore
/// let port: Option<u16> = env_parse("PRISM_HTTP_PORT")?;
/// ```
pub fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env_var(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| anyhow::anyhow!("environment variable {name}={raw:?} is invalid: {e}"))
}

/// First non-empty value among `names`, in order. Used for legacy fallbacks such as
/// `HUGGINGFACE_MODEL` standing in for `PRISM_MODEL_ID`.
pub fn env_first(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env_var(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_and_falsey_spellings() {
        for val in ["1", "true", "True", "ON", "yes", " yes "] {
            assert!(is_truthy(val), "{val} should be truthy");
            assert!(!is_falsey(val), "{val} should not be falsey");
        }
        for val in ["0", "false", "FALSE", "off", "No"] {
            assert!(is_falsey(val), "{val} should be falsey");
            assert!(!is_truthy(val), "{val} should not be truthy");
        }
        for val in ["", "maybe", "2"] {
            assert!(!is_truthy(val));
            assert!(!is_falsey(val));
        }
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("on").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("").is_err());
        assert!(parse_bool("random").is_err());
    }

    #[test]
    fn test_env_parse_bool() {
        temp_env::with_vars(
            [
                ("PRISM_TEST_FLAG_ON", Some("yes")),
                ("PRISM_TEST_FLAG_BAD", Some("perhaps")),
                ("PRISM_TEST_FLAG_EMPTY", Some("")),
                ("PRISM_TEST_FLAG_UNSET", None),
            ],
            || {
                assert_eq!(env_parse_bool("PRISM_TEST_FLAG_ON").unwrap(), Some(true));
                assert!(env_parse_bool("PRISM_TEST_FLAG_BAD").is_err());
                assert_eq!(env_parse_bool("PRISM_TEST_FLAG_EMPTY").unwrap(), None);
                assert_eq!(env_parse_bool("PRISM_TEST_FLAG_UNSET").unwrap(), None);
                assert!(env_is_truthy("PRISM_TEST_FLAG_ON"));
                assert!(!env_is_truthy("PRISM_TEST_FLAG_BAD"));
            },
        );
    }

    #[test]
    fn test_env_parse_typed() {
        temp_env::with_vars(
            [
                ("PRISM_TEST_PORT", Some("9000")),
                ("PRISM_TEST_PORT_BAD", Some("ninety")),
            ],
            || {
                assert_eq!(env_parse::<u16>("PRISM_TEST_PORT").unwrap(), Some(9000));
                assert!(env_parse::<u16>("PRISM_TEST_PORT_BAD").is_err());
                assert_eq!(env_parse::<u16>("PRISM_TEST_PORT_MISSING").unwrap(), None);
            },
        );
    }

    #[test]
    fn test_env_first_skips_empty() {
        temp_env::with_vars(
            [
                ("PRISM_TEST_PRIMARY", Some("")),
                ("PRISM_TEST_FALLBACK", Some("microsoft/Phi-3-vision-128k-instruct")),
            ],
            || {
                assert_eq!(
                    env_first(&["PRISM_TEST_PRIMARY", "PRISM_TEST_FALLBACK"]).as_deref(),
                    Some("microsoft/Phi-3-vision-128k-instruct")
                );
                assert_eq!(env_first(&["PRISM_TEST_NOTHING"]), None);
            },
        );
    }
}
