//! Application signature table.
//!
//! Signatures are plain data: an identity key plus title patterns, process
//! names and URL substrings. The matching engine lives in
//! [`crate::signatures::identify`]; this module only declares and compiles
//! the table. Registration order is the tie-break for ambiguous titles, so
//! the built-in table lists AI tools before editors and browsers last.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What kind of application a signature describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    /// A native or web application
    Application,
    /// A web browser shell; skipped when a URL identifies the page instead
    Browser,
}

/// Declarative description of one signature.
#[derive(Debug, Clone, Copy)]
pub struct SignatureSpec {
    pub id: &'static str,
    pub kind: SignatureKind,
    /// Case-insensitive regular expressions tested against the window title
    pub titles: &'static [&'static str],
    /// Exact process names, compared case-insensitively
    pub processes: &'static [&'static str],
    /// Substrings searched for in the page URL
    pub urls: &'static [&'static str],
}

/// Built-in signature table, in priority order.
pub const BUILTIN_SIGNATURES: &[SignatureSpec] = &[
    // AI assistants
    SignatureSpec {
        id: "chatgpt",
        kind: SignatureKind::Application,
        titles: &[r"\bChatGPT\b"],
        processes: &["ChatGPT"],
        urls: &["chat.openai.com", "chatgpt.com"],
    },
    SignatureSpec {
        id: "claude",
        kind: SignatureKind::Application,
        titles: &[r"^Claude\b", r"\bClaude\s*-\s*Anthropic\b"],
        processes: &["Claude"],
        urls: &["claude.ai"],
    },
    SignatureSpec {
        id: "gemini",
        kind: SignatureKind::Application,
        titles: &[r"\bGoogle Gemini\b", r"^Gemini\b"],
        processes: &[],
        urls: &["gemini.google.com", "bard.google.com"],
    },
    SignatureSpec {
        id: "copilot",
        kind: SignatureKind::Application,
        titles: &[r"\bCopilot\b"],
        processes: &["Copilot", "Microsoft Copilot"],
        urls: &["copilot.microsoft.com", "github.com/copilot", "copilot.github.com"],
    },
    SignatureSpec {
        id: "perplexity",
        kind: SignatureKind::Application,
        titles: &[r"\bPerplexity\b"],
        processes: &["Perplexity"],
        urls: &["perplexity.ai"],
    },
    SignatureSpec {
        id: "cursor",
        kind: SignatureKind::Application,
        titles: &[r"\s-\sCursor$"],
        processes: &["Cursor"],
        urls: &[],
    },
    // Editors and IDEs
    SignatureSpec {
        id: "vscode",
        kind: SignatureKind::Application,
        titles: &[r"Visual Studio Code", r"\bVS ?Code\b"],
        processes: &["Code", "Code - Insiders", "code.exe"],
        urls: &["vscode.dev"],
    },
    SignatureSpec {
        id: "intellij",
        kind: SignatureKind::Application,
        titles: &[r"IntelliJ IDEA"],
        processes: &["idea", "idea64.exe", "IntelliJ IDEA"],
        urls: &[],
    },
    SignatureSpec {
        id: "pycharm",
        kind: SignatureKind::Application,
        titles: &[r"\bPyCharm\b"],
        processes: &["pycharm", "pycharm64.exe", "PyCharm"],
        urls: &[],
    },
    SignatureSpec {
        id: "xcode",
        kind: SignatureKind::Application,
        titles: &[r"\bXcode\b"],
        processes: &["Xcode"],
        urls: &[],
    },
    SignatureSpec {
        id: "sublime",
        kind: SignatureKind::Application,
        titles: &[r"Sublime Text"],
        processes: &["sublime_text", "Sublime Text", "sublime_text.exe"],
        urls: &[],
    },
    SignatureSpec {
        id: "terminal",
        kind: SignatureKind::Application,
        titles: &[],
        processes: &[
            "Terminal",
            "iTerm2",
            "WindowsTerminal.exe",
            "gnome-terminal-server",
            "Alacritty",
            "kitty",
            "WezTerm",
        ],
        urls: &[],
    },
    // Reference sites
    SignatureSpec {
        id: "stackoverflow",
        kind: SignatureKind::Application,
        titles: &[r"\bStack Overflow\b"],
        processes: &[],
        urls: &["stackoverflow.com", "stackexchange.com"],
    },
    SignatureSpec {
        id: "github",
        kind: SignatureKind::Application,
        titles: &[r"·\s*GitHub$"],
        processes: &["GitHub Desktop"],
        urls: &["github.com"],
    },
    SignatureSpec {
        id: "mdn",
        kind: SignatureKind::Application,
        titles: &[r"\bMDN Web Docs\b"],
        processes: &[],
        urls: &["developer.mozilla.org"],
    },
    // Browsers
    SignatureSpec {
        id: "chrome",
        kind: SignatureKind::Browser,
        titles: &[r"Google Chrome$"],
        processes: &["Google Chrome", "chrome", "chrome.exe", "Chrome"],
        urls: &[],
    },
    SignatureSpec {
        id: "firefox",
        kind: SignatureKind::Browser,
        titles: &[r"Mozilla Firefox$"],
        processes: &["firefox", "firefox.exe", "Firefox"],
        urls: &[],
    },
    SignatureSpec {
        id: "edge",
        kind: SignatureKind::Browser,
        titles: &[r"Microsoft Edge$"],
        processes: &["Microsoft Edge", "msedge", "msedge.exe"],
        urls: &[],
    },
    SignatureSpec {
        id: "safari",
        kind: SignatureKind::Browser,
        titles: &[],
        processes: &["Safari"],
        urls: &[],
    },
    SignatureSpec {
        id: "arc",
        kind: SignatureKind::Browser,
        titles: &[],
        processes: &["Arc"],
        urls: &[],
    },
];

/// Errors raised while compiling a signature table.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Signature '{id}' has an invalid title pattern '{pattern}': {source}")]
    InvalidPattern {
        id: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Duplicate signature id '{0}'")]
    DuplicateId(String),
}

/// A compiled signature.
#[derive(Debug, Clone)]
pub struct AppSignature {
    pub id: String,
    pub kind: SignatureKind,
    pub title_patterns: Vec<Regex>,
    pub process_names: Vec<String>,
    /// Stored lowercased
    pub url_substrings: Vec<String>,
}

impl AppSignature {
    /// Compile a declarative spec.
    pub fn from_spec(spec: &SignatureSpec) -> Result<Self, RegistryError> {
        let title_patterns = spec
            .titles
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RegistryError::InvalidPattern {
                        id: spec.id.to_string(),
                        pattern: pattern.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: spec.id.to_string(),
            kind: spec.kind,
            title_patterns,
            process_names: spec.processes.iter().map(|p| p.to_string()).collect(),
            url_substrings: spec.urls.iter().map(|u| u.to_lowercase()).collect(),
        })
    }

    pub fn is_browser(&self) -> bool {
        self.kind == SignatureKind::Browser
    }

    /// Whether any title pattern matches.
    pub fn matches_title(&self, title: &str) -> bool {
        self.title_patterns.iter().any(|re| re.is_match(title))
    }

    /// Whether the process name equals one of ours, ignoring case.
    pub fn matches_process(&self, process: &str) -> bool {
        let process = process.trim();
        !process.is_empty()
            && self
                .process_names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(process))
    }

    /// Whether the (already lowercased) URL contains one of our substrings.
    pub fn matches_url(&self, url_lower: &str) -> bool {
        self.url_substrings
            .iter()
            .any(|needle| url_lower.contains(needle.as_str()))
    }
}

lazy_static! {
    static ref BUILTIN: SignatureRegistry = SignatureRegistry::from_specs(BUILTIN_SIGNATURES)
        .expect("built-in signature table must compile");
}

/// Ordered, immutable collection of signatures. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SignatureRegistry {
    signatures: Arc<[AppSignature]>,
}

impl SignatureRegistry {
    /// Compile a table, preserving its order.
    pub fn from_specs(specs: &[SignatureSpec]) -> Result<Self, RegistryError> {
        let mut signatures: Vec<AppSignature> = Vec::with_capacity(specs.len());
        for spec in specs {
            if signatures.iter().any(|s| s.id == spec.id) {
                return Err(RegistryError::DuplicateId(spec.id.to_string()));
            }
            signatures.push(AppSignature::from_spec(spec)?);
        }
        Ok(Self {
            signatures: signatures.into(),
        })
    }

    /// The built-in table, compiled once per process.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppSignature> {
        self.signatures.iter()
    }

    pub fn get(&self, id: &str) -> Option<&AppSignature> {
        self.signatures.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_compiles_in_order() {
        let registry = SignatureRegistry::builtin();
        assert_eq!(registry.len(), BUILTIN_SIGNATURES.len());

        let ids: Vec<&str> = registry.iter().map(|s| s.id.as_str()).collect();
        let expected: Vec<&str> = BUILTIN_SIGNATURES.iter().map(|s| s.id).collect();
        assert_eq!(ids, expected);

        // copilot's github.com/copilot must be seen before github's github.com
        let copilot = ids.iter().position(|id| *id == "copilot").unwrap();
        let github = ids.iter().position(|id| *id == "github").unwrap();
        assert!(copilot < github);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let specs = [SignatureSpec {
            id: "broken",
            kind: SignatureKind::Application,
            titles: &["(unclosed"],
            processes: &[],
            urls: &[],
        }];
        let err = SignatureRegistry::from_specs(&specs).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPattern { ref id, .. } if id == "broken"));
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let spec = SignatureSpec {
            id: "dup",
            kind: SignatureKind::Application,
            titles: &[],
            processes: &["dup"],
            urls: &[],
        };
        assert!(matches!(
            SignatureRegistry::from_specs(&[spec, spec]),
            Err(RegistryError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_signature_matchers() {
        let registry = SignatureRegistry::builtin();
        let vscode = registry.get("vscode").unwrap();

        assert!(vscode.matches_title("main.rs - crate - visual studio code"));
        assert!(vscode.matches_process("code"));
        assert!(!vscode.matches_process("Code Helper"));
        assert!(!vscode.matches_process(""));
        assert!(vscode.matches_url("https://vscode.dev/github/foo"));
        assert!(!vscode.is_browser());
        assert!(registry.get("chrome").unwrap().is_browser());
    }
}
