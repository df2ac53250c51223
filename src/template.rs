//! URL template expansion.
//!
//! Templates use `{version}`, `{platform}` and `{arch}` placeholders. Doubled
//! braces (`{{`, `}}`) produce literal braces. Expansion is pure: the same
//! template and bindings always yield the same URL, which is what lets the
//! download phase find the digest the lock phase pinned.

/// Errors raised while expanding a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// A `{` was opened but never closed.
    #[error("unclosed '{{' at byte {offset} in template '{template}'")]
    Unclosed {
        /// The offending template.
        template: String,
        /// Byte offset of the opening brace.
        offset: usize,
    },

    /// A `}` appeared without a matching `{`.
    #[error("unmatched '}}' at byte {offset} in template '{template}'")]
    Unmatched {
        /// The offending template.
        template: String,
        /// Byte offset of the closing brace.
        offset: usize,
    },

    /// A placeholder had no name.
    #[error("empty placeholder at byte {offset} in template '{template}'")]
    EmptyPlaceholder {
        /// The offending template.
        template: String,
        /// Byte offset of the opening brace.
        offset: usize,
    },

    /// The placeholder names a variable that does not exist.
    #[error("unknown template variable '{name}' (expected version, platform or arch)")]
    UnknownVariable {
        /// The placeholder name.
        name: String,
    },

    /// The variable exists but has no value for this target.
    #[error("template variable '{name}' is not bound for this target")]
    Unbound {
        /// The placeholder name.
        name: String,
    },
}

/// Values substituted into a template.
///
/// A `None` field means the definition does not provide that variable, so a
/// template referencing it fails with [`TemplateError::Unbound`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateVars<'a> {
    /// Value for `{version}`.
    pub version: Option<&'a str>,
    /// Value for `{platform}`.
    pub platform: Option<&'a str>,
    /// Value for `{arch}`.
    pub arch: Option<&'a str>,
}

impl TemplateVars<'_> {
    fn lookup(&self, name: &str) -> Result<&str, TemplateError> {
        let slot = match name {
            "version" => self.version,
            "platform" => self.platform,
            "arch" => self.arch,
            _ => {
                return Err(TemplateError::UnknownVariable {
                    name: name.to_owned(),
                });
            }
        };
        slot.ok_or_else(|| TemplateError::Unbound {
            name: name.to_owned(),
        })
    }
}

/// Expands `template` with `vars`.
///
/// # Errors
///
/// Returns a [`TemplateError`] for malformed braces, unknown variable names or
/// variables that are not bound.
///
/// # Examples
///
/// ```
/// use pinfetch::template::{TemplateVars, resolve};
///
/// let vars = TemplateVars {
///     version: Some("1.2.0"),
///     platform: Some("linux"),
///     arch: Some("x86_64"),
/// };
/// let url = resolve("https://example.test/{version}/tool-{platform}-{arch}.tar.gz", vars)?;
/// assert_eq!(url, "https://example.test/1.2.0/tool-linux-x86_64.tar.gz");
/// # Ok::<(), pinfetch::template::TemplateError>(())
/// ```
pub fn resolve(template: &str, vars: TemplateVars<'_>) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '{' if chars.next_if(|&(_, next)| next == '{').is_some() => output.push('{'),
            '}' if chars.next_if(|&(_, next)| next == '}').is_some() => output.push('}'),
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(TemplateError::Unclosed {
                        template: template.to_owned(),
                        offset,
                    });
                }
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder {
                        template: template.to_owned(),
                        offset,
                    });
                }
                output.push_str(vars.lookup(trimmed)?);
            }
            '}' => {
                return Err(TemplateError::Unmatched {
                    template: template.to_owned(),
                    offset,
                });
            }
            other => output.push(other),
        }
    }

    Ok(output)
}
