//! Script framing for the supported interpreter dialects.
//!
//! Every request crosses the process boundary as one line carrying a base64
//! payload, so caller text never has to be quoted or escaped.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::FramingError;

/// Interpreter family the channel speaks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    PowerShell,
    Posix,
}

impl Dialect {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PowerShell => "powershell",
            Self::Posix => "posix",
        }
    }

    /// Parse a dialect name as accepted in configuration and environment.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "powershell" | "pwsh" => Some(Self::PowerShell),
            "posix" | "sh" | "bash" => Some(Self::Posix),
            _ => None,
        }
    }

    #[must_use]
    pub fn default_program(self) -> &'static str {
        match self {
            Self::PowerShell => "pwsh",
            Self::Posix => "bash",
        }
    }

    #[must_use]
    pub fn default_args(self) -> &'static [&'static str] {
        match self {
            Self::PowerShell => &[
                "-NoProfile",
                "-NoLogo",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                "-",
            ],
            Self::Posix => &["--noprofile", "--norc"],
        }
    }

    /// Session setup run before the user bring-up script.
    #[must_use]
    pub fn preamble(self) -> &'static str {
        match self {
            Self::PowerShell => {
                "[Console]::OutputEncoding = [System.Text.Encoding]::UTF8\n\
                 $OutputEncoding = [System.Text.Encoding]::UTF8\n\
                 $ErrorActionPreference = 'Stop'"
            }
            Self::Posix => "export LANG=\"${LANG:-C.UTF-8}\"",
        }
    }

    /// Statement printing a literal line.
    #[must_use]
    pub fn print_line(self, text: &str) -> String {
        match self {
            Self::PowerShell => format!("Write-Output {}", self.embed_text(text)),
            Self::Posix => format!("printf '%s\\n' {}", self.embed_text(text)),
        }
    }

    /// Encode script text into the payload alphabet of this dialect.
    #[must_use]
    pub fn encode_payload(self, text: &str) -> String {
        match self {
            Self::PowerShell => {
                let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
                STANDARD.encode(bytes)
            }
            Self::Posix => STANDARD.encode(text.as_bytes()),
        }
    }

    /// Inverse of [`Self::encode_payload`].
    ///
    /// # Errors
    ///
    /// Returns [`FramingError`] if the payload is not base64 or does not decode
    /// to text in the dialect's encoding.
    pub fn decode_payload(self, payload: &str) -> Result<String, FramingError> {
        let bytes = STANDARD.decode(payload.trim())?;
        match self {
            Self::PowerShell => {
                if bytes.len() % 2 != 0 {
                    return Err(FramingError::Encoding {
                        encoding: "UTF-16LE",
                    });
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units).map_err(|_| FramingError::Encoding {
                    encoding: "UTF-16LE",
                })
            }
            Self::Posix => String::from_utf8(bytes).map_err(|_| FramingError::Encoding {
                encoding: "UTF-8",
            }),
        }
    }

    /// Expression that evaluates to `text` inside the interpreter.
    ///
    /// This is the only way caller-provided text should enter a script body.
    /// The POSIX form goes through command substitution, so trailing newlines
    /// of `text` are dropped.
    #[must_use]
    pub fn embed_text(self, text: &str) -> String {
        let encoded = STANDARD.encode(text.as_bytes());
        match self {
            Self::PowerShell => format!(
                "([System.Text.Encoding]::UTF8.GetString([System.Convert]::FromBase64String('{encoded}')))"
            ),
            Self::Posix => format!("\"$(printf '%s' '{encoded}' | base64 -d)\""),
        }
    }

    /// Wrap `body` so faults are reported as `ERROR:` lines and the delimiter
    /// is always printed last.
    #[must_use]
    pub fn wrap(self, body: &str, delimiter: &str) -> String {
        match self {
            Self::PowerShell => format!(
                "try {{\n{body}\n}} catch {{\n    Write-Output \"ERROR: $_\"\n}}\nWrite-Output '{delimiter}'"
            ),
            Self::Posix => body.to_owned(),
        }
    }

    /// Build the single request line written to the interpreter's stdin.
    /// The returned string contains no newline.
    #[must_use]
    pub fn frame(self, body: &str, delimiter: &str) -> String {
        let payload = self.encode_payload(&self.wrap(body, delimiter));
        match self {
            Self::PowerShell => format!(
                "$c = [System.Text.Encoding]::Unicode.GetString([System.Convert]::FromBase64String('{payload}')); Invoke-Expression $c *>&1"
            ),
            Self::Posix => format!(
                "eval \"$(printf '%s' '{payload}' | base64 -d)\" 2>&1 </dev/null; \
                 __is_status=$?; \
                 if [ \"$__is_status\" -ne 0 ]; then echo \"ERROR: exit status $__is_status\"; fi; \
                 echo '{delimiter}'"
            ),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
