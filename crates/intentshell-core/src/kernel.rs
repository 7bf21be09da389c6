//! Scripts that call the external collaborator ("kernel") through the channel.
//!
//! Caller-provided values always go through [`Dialect::embed_text`]; nothing
//! user-controlled is spliced into script text directly.

use intentshell_channel::Dialect;
use intentshell_sentinel::RiskLevel;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::intent::Intent;

/// Collaborator command names. Unset names fall back to the dialect default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct KernelCommands {
    #[serde(default)]
    pub resolve: Option<String>,
    #[serde(default)]
    pub generate: Option<String>,
    #[serde(default)]
    pub assess: Option<String>,
    #[serde(default)]
    pub execute: Option<String>,
}

impl KernelCommands {
    /// All configured names, for validation.
    pub fn configured(&self) -> impl Iterator<Item = &str> {
        [&self.resolve, &self.generate, &self.assess, &self.execute]
            .into_iter()
            .filter_map(Option::as_deref)
    }
}

fn default_names(dialect: Dialect) -> [&'static str; 4] {
    match dialect {
        Dialect::PowerShell => [
            "Resolve-Intent",
            "ConvertTo-SafePowerShellCommand",
            "Measure-Risk",
            "Invoke-SafePowerShell",
        ],
        Dialect::Posix => [
            "resolve_intent",
            "generate_command",
            "measure_risk",
            "invoke_safe",
        ],
    }
}

/// Builds the four collaborator scripts for one dialect.
#[derive(Debug, Clone)]
pub struct KernelScripts {
    dialect: Dialect,
    resolve: String,
    generate: String,
    assess: String,
    execute: String,
}

impl KernelScripts {
    #[must_use]
    pub fn new(dialect: Dialect, commands: &KernelCommands) -> Self {
        let [resolve, generate, assess, execute] = default_names(dialect);
        let pick = |name: &Option<String>, default: &str| {
            name.clone().unwrap_or_else(|| default.to_owned())
        };
        Self {
            dialect,
            resolve: pick(&commands.resolve, resolve),
            generate: pick(&commands.generate, generate),
            assess: pick(&commands.assess, assess),
            execute: pick(&commands.execute, execute),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn intent_json(intent: &Intent) -> Result<String, PipelineError> {
        serde_json::to_string(intent).map_err(PipelineError::Encode)
    }

    /// Script resolving normalized input into an intent JSON object.
    #[must_use]
    pub fn resolve(&self, input: &str) -> String {
        let input = self.dialect.embed_text(input);
        match self.dialect {
            Dialect::PowerShell => format!(
                "$json = {} -UserInput {input}\nWrite-Output $json",
                self.resolve
            ),
            Dialect::Posix => format!("{} {input}", self.resolve),
        }
    }

    /// Script synthesizing a command from an intent.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] if the intent cannot be serialized.
    pub fn generate(&self, intent: &Intent) -> Result<String, PipelineError> {
        let json = self.dialect.embed_text(&Self::intent_json(intent)?);
        Ok(match self.dialect {
            Dialect::PowerShell => format!(
                "$intentObj = {json} | ConvertFrom-Json\n{} -Intent $intentObj",
                self.generate
            ),
            Dialect::Posix => format!("{} {json}", self.generate),
        })
    }

    /// Script scoring a command, printing `{level, reasons, score}` as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] if the intent cannot be serialized.
    pub fn assess(&self, intent: &Intent, command: &str) -> Result<String, PipelineError> {
        let json = self.dialect.embed_text(&Self::intent_json(intent)?);
        let command = self.dialect.embed_text(command);
        Ok(match self.dialect {
            Dialect::PowerShell => format!(
                "$intentObj = {json} | ConvertFrom-Json\n\
                 $cmd = {command}\n\
                 $result = {} -Intent $intentObj -Command $cmd\n\
                 $result | ConvertTo-Json -Depth 5 -Compress",
                self.assess
            ),
            Dialect::Posix => format!("{} {json} {command}", self.assess),
        })
    }

    /// Script handing a command to the collaborator's guarded executor.
    #[must_use]
    pub fn execute(
        &self,
        command: &str,
        description: &str,
        risk: RiskLevel,
        protocol_version: &str,
        confirmed: bool,
    ) -> String {
        let command = self.dialect.embed_text(command);
        let description = self.dialect.embed_text(description);
        let protocol = self.dialect.embed_text(protocol_version);
        match self.dialect {
            Dialect::PowerShell => {
                let confirmed = if confirmed { " -Confirmed" } else { "" };
                format!(
                    "$cmd = {command}\n{} -Command $cmd -Description {description} -Risk '{risk}'{confirmed} -ProtocolVersion {protocol}",
                    self.execute
                )
            }
            Dialect::Posix => {
                let confirmed = if confirmed { "confirmed" } else { "unconfirmed" };
                format!(
                    "{} {command} {description} '{risk}' {confirmed} {protocol}",
                    self.execute
                )
            }
        }
    }
}
