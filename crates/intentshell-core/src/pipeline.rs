//! Request orchestration: normalize, resolve, synthesize, assess, execute.
//!
//! Every collaborator or transport fault is converted into a domain value
//! here. Nothing in this module returns an error to the caller.

use intentshell_channel::ScriptTransport;
use intentshell_sentinel::risk::FAIL_SAFE_SCORE;
use intentshell_sentinel::{
    AntiPatternScanner, Detection, RiskAssessment, RiskLevel, RiskSuspensionEngine,
};
use serde_json::Value;

use crate::audit::{AuditEntry, AuditLogger, AuditResult};
use crate::cache::IntentCache;
use crate::error::{IntentDecodeError, PipelineError};
use crate::intent::{self, Intent};
use crate::kernel::{KernelCommands, KernelScripts};
use crate::normalize::normalize;

/// Score added to the collaborator's verdict when anti-patterns are present.
pub const ANTI_PATTERN_SCORE_PENALTY: f64 = 50.0;

const FAILURE_MARKERS: &[&str] = &["security block", "execution failed", "error:"];

/// Result of [`SafetyPipeline::process`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub intent: Intent,
    pub command: String,
    pub assessment: RiskAssessment,
}

/// Outcome of handing one command to the collaborator's executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub success: bool,
    pub output: String,
}

/// Result of [`SafetyPipeline::execute_directly`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub intent: Intent,
    pub command: String,
    pub assessment: RiskAssessment,
}

/// Classify executor output: empty output is success, any failure marker is not.
#[must_use]
pub fn is_failure_output(output: &str) -> bool {
    let lowered = output.to_lowercase();
    FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Text shown instead of executing in dry-run mode.
#[must_use]
pub fn dry_run(command: &str, description: &str) -> String {
    format!(
        "--- DRY RUN SIMULATION ---\nWould execute: {command}\nDescription: {description}\n(No changes were made to the system)"
    )
}

fn generation_fallback(intent: &Intent) -> String {
    format!(
        "# Error: Could not generate command for {} {}",
        intent.action, intent.target
    )
}

/// Decode the collaborator's `{level, reasons, score}` verdict. Unlike intent
/// risk labels, an unknown level is rejected.
fn decode_assessment(output: &str) -> Result<RiskAssessment, IntentDecodeError> {
    let object = intent::json_object(output)?;
    let level = match intent::present(&object, "level") {
        None => RiskLevel::Low,
        Some(Value::String(label)) => {
            RiskLevel::parse(label).ok_or(IntentDecodeError::FieldType {
                field: "level",
                expected: "one of low, medium, high, very_high",
            })?
        }
        Some(_) => {
            return Err(IntentDecodeError::FieldType {
                field: "level",
                expected: "a string",
            });
        }
    };
    let reasons = intent::string_list(&object, "reasons")?;
    let score = match intent::present(&object, "score") {
        None => 0.0,
        Some(value) => value.as_f64().ok_or(IntentDecodeError::FieldType {
            field: "score",
            expected: "a number",
        })?,
    };
    Ok(RiskAssessment::new(level, reasons, score))
}

/// One session's safety pipeline. Owns the transport, the suspension engine
/// and the intent cache; share it across tasks behind a mutex.
pub struct SafetyPipeline<T: ScriptTransport> {
    transport: T,
    scripts: KernelScripts,
    engine: RiskSuspensionEngine,
    cache: IntentCache,
    audit: Option<AuditLogger>,
}

impl<T: ScriptTransport> SafetyPipeline<T> {
    #[must_use]
    pub fn new(transport: T, engine: RiskSuspensionEngine, cache: IntentCache) -> Self {
        let scripts = KernelScripts::new(transport.dialect(), &KernelCommands::default());
        Self {
            transport,
            scripts,
            engine,
            cache,
            audit: None,
        }
    }

    #[must_use]
    pub fn with_commands(mut self, commands: &KernelCommands) -> Self {
        self.scripts = KernelScripts::new(self.transport.dialect(), commands);
        self
    }

    #[must_use]
    pub fn with_audit(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn engine(&self) -> &RiskSuspensionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RiskSuspensionEngine {
        &mut self.engine
    }

    pub fn cache(&self) -> &IntentCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut IntentCache {
        &mut self.cache
    }

    /// Run one request through resolution, synthesis and assessment.
    pub async fn process(&mut self, raw_input: &str, bypass_cache: bool) -> ProcessOutcome {
        let input = normalize(raw_input);

        let intent = match self.resolve(&input, bypass_cache).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(error = %e, "intent resolution failed");
                return ProcessOutcome {
                    intent: Intent::resolution_failed(e.to_string()),
                    command: String::new(),
                    assessment: RiskAssessment::fail_safe(format!(
                        "Intent resolution failed: {e}"
                    )),
                };
            }
        };

        if intent.is_failure() {
            tracing::info!(intent = %intent.intent_type, "collaborator could not resolve intent");
            let reason = format!("Intent could not be resolved: {}", intent.description);
            return ProcessOutcome {
                intent,
                command: String::new(),
                assessment: RiskAssessment::fail_safe(reason),
            };
        }

        let command = match self.synthesize(&intent).await {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, intent = %intent.intent_type, "command generation failed");
                let fallback = generation_fallback(&intent);
                let failed = Intent::resolution_failed(format!(
                    "Could not generate command for {} {}: {e}",
                    intent.action, intent.target
                ));
                return ProcessOutcome {
                    intent: failed,
                    command: fallback,
                    assessment: RiskAssessment::fail_safe(format!(
                        "Command generation failed: {e}"
                    )),
                };
            }
        };

        let assessment = self.assess(&intent, &command).await;
        tracing::info!(
            intent = %intent.intent_type,
            level = %assessment.level,
            score = assessment.score,
            session_score = self.engine.score(),
            "request assessed"
        );
        ProcessOutcome {
            intent,
            command,
            assessment,
        }
    }

    async fn resolve(&mut self, input: &str, bypass_cache: bool) -> Result<Intent, PipelineError> {
        if !bypass_cache && let Some(intent) = self.cache.get(input) {
            tracing::debug!(intent = %intent.intent_type, "intent cache hit");
            return Ok(intent.clone());
        }
        let output = self.transport.submit(&self.scripts.resolve(input), false).await;
        Ok(Intent::from_response(&output)?)
    }

    async fn synthesize(&mut self, intent: &Intent) -> Result<String, PipelineError> {
        if let Some(command) = &intent.generated_command {
            return Ok(command.clone());
        }
        let script = self.scripts.generate(intent)?;
        let output = self.transport.submit(&script, false).await;
        let command = output.trim();
        let faulted = command
            .lines()
            .any(|line| line.trim_start().starts_with("ERROR:"));
        if command.is_empty() || faulted {
            return Err(PipelineError::Generation {
                message: if command.is_empty() {
                    "collaborator returned no command".to_owned()
                } else {
                    command.to_owned()
                },
            });
        }
        Ok(command.to_owned())
    }

    /// Score `command`: collaborator verdict merged with anti-pattern
    /// detections, then folded into the session engine.
    ///
    /// While suspended this refuses without consulting the collaborator.
    pub async fn assess(&mut self, intent: &Intent, command: &str) -> RiskAssessment {
        if self.engine.is_suspended() {
            return self.suspended_assessment();
        }

        let detections = AntiPatternScanner::scan(command);

        let mut assessment = match self.collaborator_assessment(intent, command).await {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::warn!(error = %e, "risk assessment failed, failing safe");
                let mut fallback =
                    RiskAssessment::fail_safe(format!("Risk assessment failed: {e}"));
                fallback
                    .reasons
                    .extend(detections.iter().map(ToString::to_string));
                return fallback;
            }
        };

        merge_detections(&mut assessment, &detections);

        let suspended = self.engine.record_risk(
            assessment.level,
            command,
            &intent.intent_type,
            &detections,
        );
        if suspended {
            assessment.push_reason("Session Suspended: combined risk exceeded safety threshold.");
            self.audit(intent, command, assessment.level, AuditResult::Suspended {
                score: self.engine.score(),
            })
            .await;
        }
        if let Some(warning) = self.engine.get_warning() {
            assessment.push_reason(warning);
        }
        assessment
    }

    async fn collaborator_assessment(
        &mut self,
        intent: &Intent,
        command: &str,
    ) -> Result<RiskAssessment, PipelineError> {
        let script = self.scripts.assess(intent, command)?;
        let output = self.transport.submit(&script, false).await;
        decode_assessment(&output).map_err(|e| PipelineError::Assessment {
            message: e.to_string(),
        })
    }

    fn suspended_assessment(&self) -> RiskAssessment {
        let mut reasons = vec!["Session Suspended".to_owned(), "Reasoning:".to_owned()];
        reasons.extend(
            self.engine
                .get_suspension_details()
                .into_iter()
                .map(|detail| format!(" - {detail}")),
        );
        reasons.push("Combined risk exceeded safety threshold.".to_owned());
        RiskAssessment::new(RiskLevel::VeryHigh, reasons, FAIL_SAFE_SCORE)
    }

    /// Hand `command` to the collaborator's guarded executor. Refused while
    /// the session is suspended.
    pub async fn execute(
        &mut self,
        command: &str,
        intent: &Intent,
        confirmed: bool,
    ) -> ExecutionReport {
        if self.engine.is_suspended() {
            let reason = "Session Suspended";
            tracing::warn!(intent = %intent.intent_type, "execution refused: session suspended");
            self.audit(intent, command, intent.risk, AuditResult::Refused {
                reason: reason.to_owned(),
            })
            .await;
            let mut lines = vec![format!("SECURITY BLOCK: {reason}")];
            lines.extend(self.engine.get_suspension_details());
            return ExecutionReport {
                success: false,
                output: lines.join("\n"),
            };
        }

        let script = self.scripts.execute(
            command,
            &intent.description,
            intent.risk,
            &intent.protocol_version,
            confirmed,
        );
        let output = self.transport.submit(&script, false).await;
        let output = output.trim().to_owned();
        let success = !is_failure_output(&output);

        tracing::info!(intent = %intent.intent_type, success, "command executed");
        let result = if success {
            AuditResult::Success
        } else {
            AuditResult::Failure {
                output: output.clone(),
            }
        };
        self.audit(intent, command, intent.risk, result).await;

        ExecutionReport { success, output }
    }

    /// `process` followed by a confirmed `execute`, skipping failed intents.
    /// For automated and trusted callers only: no user confirmation happens.
    pub async fn execute_directly(&mut self, raw_input: &str, bypass_cache: bool) -> ExecutionResult {
        let ProcessOutcome {
            intent,
            command,
            assessment,
        } = self.process(raw_input, bypass_cache).await;

        if intent.is_failure() {
            return ExecutionResult {
                success: false,
                output: format!("Intent Resolution Failed: {}", intent.description),
                intent,
                command,
                assessment,
            };
        }

        let report = self.execute(&command, &intent, true).await;
        ExecutionResult {
            success: report.success,
            output: report.output,
            intent,
            command,
            assessment,
        }
    }

    /// Cache `intent` for `raw_input` after a confirmed successful execution.
    pub fn remember_success(&mut self, raw_input: &str, intent: &Intent) -> bool {
        self.cache.remember(&normalize(raw_input), intent)
    }

    async fn audit(&self, intent: &Intent, command: &str, risk: RiskLevel, result: AuditResult) {
        if let Some(logger) = &self.audit {
            let entry = AuditEntry::new(
                &intent.description,
                &intent.intent_type,
                command,
                risk,
                self.engine.score(),
                result,
            );
            logger.log(&entry).await;
        }
    }
}

fn merge_detections(assessment: &mut RiskAssessment, detections: &[Detection]) {
    if detections.is_empty() {
        return;
    }
    assessment.escalate_to(RiskLevel::High);
    assessment
        .reasons
        .extend(detections.iter().map(ToString::to_string));
    assessment.score += ANTI_PATTERN_SCORE_PENALTY;
}
