use std::{env, path::PathBuf};

use crate::error::{PathError, PathResult};

/// Resolves a path string that may contain environment variables.
///
/// Expands `$VAR` and `${VAR}`, resolves a leading `~` to the home directory and turns
/// relative paths into absolute ones based on the current working directory.
///
/// # Errors
///
/// * [`PathError::Empty`] if the path is empty
/// * [`PathError::CurrentDir`] if the current directory cannot be determined
/// * [`PathError::MissingEnvVar`] if a referenced variable is undefined
/// * [`PathError::UnclosedVariable`] if a `${` is never closed
///
/// # Example
///
/// ```
/// use repodex_utils::path::resolve_path;
///
/// let resolved = resolve_path("/var/cache/repodex").unwrap();
/// assert!(resolved.is_absolute());
/// ```
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    let path = path.trim();

    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let path_buf = PathBuf::from(expand_variables(path)?);

    if path_buf.is_absolute() {
        Ok(path_buf)
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path_buf))
            .map_err(|err| PathError::CurrentDir { source: err })
    }
}

/// Returns the user's home directory from `HOME`, falling back to the system
/// temporary directory when it is unset.
pub fn home_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir())
}

/// Returns `XDG_CONFIG_HOME`, defaulting to `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns `XDG_CACHE_HOME`, defaulting to `$HOME/.cache`.
pub fn xdg_cache_home() -> PathBuf {
    env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".cache"))
}

fn expand_variables(path: &str) -> PathResult<String> {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' if chars.peek() == Some(&'{') => {
                chars.next();
                let mut var_name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    var_name.push(c);
                }
                if !closed {
                    return Err(PathError::UnclosedVariable {
                        input: format!("${{{var_name}"),
                    });
                }
                expand_env_var(&var_name, &mut result, path)?;
            }
            '$' => {
                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        var_name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    result.push('$');
                } else {
                    expand_env_var(&var_name, &mut result, path)?;
                }
            }
            '~' if result.is_empty() => result.push_str(&home_dir().to_string_lossy()),
            _ => result.push(c),
        }
    }

    Ok(result)
}

fn expand_env_var(var_name: &str, result: &mut String, original: &str) -> PathResult<()> {
    match var_name {
        "HOME" => result.push_str(&home_dir().to_string_lossy()),
        "XDG_CONFIG_HOME" => result.push_str(&xdg_config_home().to_string_lossy()),
        "XDG_CACHE_HOME" => result.push_str(&xdg_cache_home().to_string_lossy()),
        _ => {
            let value = env::var(var_name).map_err(|_| {
                PathError::MissingEnvVar {
                    input: original.into(),
                    var: var_name.into(),
                }
            })?;
            result.push_str(&value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_resolve_path_variables() {
        env::set_var("REPODEX_TEST_ROOT", "/srv/mirror");
        assert_eq!(
            resolve_path("$REPODEX_TEST_ROOT/cache").unwrap(),
            PathBuf::from("/srv/mirror/cache")
        );
        assert_eq!(
            resolve_path("${REPODEX_TEST_ROOT}/cache").unwrap(),
            PathBuf::from("/srv/mirror/cache")
        );
        env::remove_var("REPODEX_TEST_ROOT");
    }

    #[test]
    #[serial]
    fn test_resolve_path_tilde() {
        env::set_var("HOME", "/home/builder");
        assert_eq!(
            resolve_path("~/.cache/repodex").unwrap(),
            PathBuf::from("/home/builder/.cache/repodex")
        );
    }

    #[test]
    #[serial]
    fn test_resolve_path_errors() {
        assert!(matches!(resolve_path("  "), Err(PathError::Empty)));
        assert!(matches!(
            resolve_path("${UNCLOSED"),
            Err(PathError::UnclosedVariable { .. })
        ));
        env::remove_var("REPODEX_DEFINITELY_UNSET");
        assert!(matches!(
            resolve_path("$REPODEX_DEFINITELY_UNSET/x"),
            Err(PathError::MissingEnvVar { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_xdg_cache_home_fallback() {
        env::remove_var("XDG_CACHE_HOME");
        env::set_var("HOME", "/home/builder");
        assert_eq!(xdg_cache_home(), PathBuf::from("/home/builder/.cache"));

        env::set_var("XDG_CACHE_HOME", "/tmp/xdg-cache");
        assert_eq!(xdg_cache_home(), PathBuf::from("/tmp/xdg-cache"));
        env::remove_var("XDG_CACHE_HOME");
    }

    #[test]
    fn test_relative_path_is_made_absolute() {
        assert!(resolve_path("relative/dir").unwrap().is_absolute());
    }
}
