use serde::Serialize;
use strand_core::config::{AppConfig, LoadOptions};
use strand_core::prompt::PromptStack;
use strand_drivers::config::{embedding_driver_from_settings, prompt_driver_from_settings};

use crate::commands::CommandResult;

const PROBE_TEXT: &str = "doctor probe";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_prompt_driver(&config));
            checks.push(check_embedding_driver(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["prompt_driver", "embedding_driver"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_prompt_driver(config: &AppConfig) -> DoctorCheck {
    let driver = prompt_driver_from_settings(&config.drivers);
    let mut probe = PromptStack::new();
    probe.add_user_message(PROBE_TEXT);

    match driver.try_run(&probe) {
        Ok(_) => DoctorCheck {
            name: "prompt_driver",
            status: CheckStatus::Pass,
            details: format!(
                "`{}` answered a probe prompt (provider `{}`)",
                driver.name(),
                config.drivers.prompt_provider.as_str()
            ),
        },
        Err(error) => DoctorCheck {
            name: "prompt_driver",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_embedding_driver(config: &AppConfig) -> DoctorCheck {
    let driver = embedding_driver_from_settings(&config.drivers);

    match driver.embed_text(PROBE_TEXT) {
        Ok(vector) if vector.len() == config.drivers.embedding_dimensions => DoctorCheck {
            name: "embedding_driver",
            status: CheckStatus::Pass,
            details: format!("`{}` produced {} dimensions", driver.name(), vector.len()),
        },
        Ok(vector) => DoctorCheck {
            name: "embedding_driver",
            status: CheckStatus::Fail,
            details: format!(
                "`{}` produced {} dimensions, expected {}",
                driver.name(),
                vector.len(),
                config.drivers.embedding_dimensions
            ),
        },
        Err(error) => DoctorCheck {
            name: "embedding_driver",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
