//! Reconfiguration plans: the line-oriented batch command format.
//!
//! Each non-blank, non-comment line is one command:
//!
//! ```text
//! table_init     <pipeline> <new_name>
//! table_change   <pipeline> <id0> <edge>         <id1>
//! table_delete   <pipeline> <id0>
//! cond_init      <pipeline> <new_name>
//! cond_change    <pipeline> <id0> <true|false>   <id1>
//! cond_delete    <pipeline> <id0>
//! flex_init      <pipeline> <flx_name> <true_id> <false_id>
//! flex_change    <pipeline> <flx_id>   <true|false> <id1>
//! flex_delete    <pipeline> <flx_id>
//! reg_init       <new_name> <size> <bitwidth>
//! reg_change     <id>       <0|1>  <value>
//! reg_delete     <id>
//! trigger        <on|off>   [<trigger_number>]
//! init_change    <pipeline> <id>
//! ```
//!
//! Unknown verbs, missing or extra arguments, and unparsable numbers are all
//! invalid commands; identifier semantics are checked later, when the
//! command executes.

use crate::error::ReconfigError;

use flexpipe_core::Branch;

/// One parsed plan command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanCommand {
    TableInit {
        pipeline: String,
        id: String,
    },
    TableChange {
        pipeline: String,
        id: String,
        edge: String,
        next_id: String,
    },
    TableDelete {
        pipeline: String,
        id: String,
    },
    CondInit {
        pipeline: String,
        id: String,
    },
    CondChange {
        pipeline: String,
        id: String,
        branch: Branch,
        next_id: String,
    },
    CondDelete {
        pipeline: String,
        id: String,
    },
    FlexInit {
        pipeline: String,
        id: String,
        true_id: String,
        false_id: String,
    },
    FlexChange {
        pipeline: String,
        id: String,
        branch: Branch,
        next_id: String,
    },
    FlexDelete {
        pipeline: String,
        id: String,
    },
    RegInit {
        id: String,
        size: usize,
        bitwidth: u32,
    },
    RegChange {
        id: String,
        change_type: u32,
        value: u32,
    },
    RegDelete {
        id: String,
    },
    Trigger {
        armed: bool,
        number: Option<u32>,
    },
    InitChange {
        pipeline: String,
        id: String,
    },
}

/// Parses a whole plan, skipping blank lines and `#` comments.
pub fn parse_plan(text: &str) -> Result<Vec<PlanCommand>, ReconfigError> {
    let mut commands = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        if let Some(command) = parse_line(line).map_err(|err| annotate(err, line_number + 1))? {
            commands.push(command);
        }
    }
    Ok(commands)
}

fn annotate(err: ReconfigError, line_number: usize) -> ReconfigError {
    match err {
        ReconfigError::InvalidCommand { reason } => ReconfigError::InvalidCommand {
            reason: format!("plan line {line_number}: {reason}"),
        },
        other => other,
    }
}

/// Parses one plan line; `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<PlanCommand>, ReconfigError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let (verb, args) = (tokens[0], &tokens[1..]);

    let command = match verb {
        "table_init" => {
            let [pipeline, id] = expect_args(verb, args)?;
            PlanCommand::TableInit {
                pipeline: pipeline.to_string(),
                id: id.to_string(),
            }
        }
        "table_change" => {
            let [pipeline, id, edge, next_id] = expect_args(verb, args)?;
            PlanCommand::TableChange {
                pipeline: pipeline.to_string(),
                id: id.to_string(),
                edge: edge.to_string(),
                next_id: next_id.to_string(),
            }
        }
        "table_delete" => {
            let [pipeline, id] = expect_args(verb, args)?;
            PlanCommand::TableDelete {
                pipeline: pipeline.to_string(),
                id: id.to_string(),
            }
        }
        "cond_init" => {
            let [pipeline, id] = expect_args(verb, args)?;
            PlanCommand::CondInit {
                pipeline: pipeline.to_string(),
                id: id.to_string(),
            }
        }
        "cond_change" => {
            let [pipeline, id, branch, next_id] = expect_args(verb, args)?;
            PlanCommand::CondChange {
                pipeline: pipeline.to_string(),
                id: id.to_string(),
                branch: parse_branch(branch)?,
                next_id: next_id.to_string(),
            }
        }
        "cond_delete" => {
            let [pipeline, id] = expect_args(verb, args)?;
            PlanCommand::CondDelete {
                pipeline: pipeline.to_string(),
                id: id.to_string(),
            }
        }
        "flex_init" => {
            let [pipeline, id, true_id, false_id] = expect_args(verb, args)?;
            PlanCommand::FlexInit {
                pipeline: pipeline.to_string(),
                id: id.to_string(),
                true_id: true_id.to_string(),
                false_id: false_id.to_string(),
            }
        }
        "flex_change" => {
            let [pipeline, id, branch, next_id] = expect_args(verb, args)?;
            PlanCommand::FlexChange {
                pipeline: pipeline.to_string(),
                id: id.to_string(),
                branch: parse_branch(branch)?,
                next_id: next_id.to_string(),
            }
        }
        "flex_delete" => {
            let [pipeline, id] = expect_args(verb, args)?;
            PlanCommand::FlexDelete {
                pipeline: pipeline.to_string(),
                id: id.to_string(),
            }
        }
        "reg_init" => {
            let [id, size, bitwidth] = expect_args(verb, args)?;
            PlanCommand::RegInit {
                id: id.to_string(),
                size: parse_number(verb, "size", size)?,
                bitwidth: parse_number(verb, "bitwidth", bitwidth)?,
            }
        }
        "reg_change" => {
            let [id, change_type, value] = expect_args(verb, args)?;
            PlanCommand::RegChange {
                id: id.to_string(),
                change_type: parse_number(verb, "change_type", change_type)?,
                value: parse_number(verb, "value", value)?,
            }
        }
        "reg_delete" => {
            let [id] = expect_args(verb, args)?;
            PlanCommand::RegDelete { id: id.to_string() }
        }
        "trigger" => {
            let (armed, number) = match args {
                [state] => (parse_on_off(state)?, None),
                [state, number] => (
                    parse_on_off(state)?,
                    Some(parse_number("trigger", "trigger_number", number)?),
                ),
                _ => {
                    return Err(ReconfigError::InvalidCommand {
                        reason: format!("trigger takes 1 or 2 arguments, got {}", args.len()),
                    });
                }
            };
            PlanCommand::Trigger { armed, number }
        }
        "init_change" => {
            let [pipeline, id] = expect_args(verb, args)?;
            PlanCommand::InitChange {
                pipeline: pipeline.to_string(),
                id: id.to_string(),
            }
        }
        other => {
            tracing::error!(verb = other, "unsupported plan operation");
            return Err(ReconfigError::InvalidCommand {
                reason: format!("unknown verb '{other}'"),
            });
        }
    };
    Ok(Some(command))
}

fn expect_args<'a, const N: usize>(
    verb: &str,
    args: &[&'a str],
) -> Result<[&'a str; N], ReconfigError> {
    <[&str; N]>::try_from(args).map_err(|_| ReconfigError::InvalidCommand {
        reason: format!("{verb} takes {N} arguments, got {}", args.len()),
    })
}

fn parse_branch(token: &str) -> Result<Branch, ReconfigError> {
    match token {
        "true" => Ok(Branch::True),
        "false" => Ok(Branch::False),
        other => Err(ReconfigError::InvalidCommand {
            reason: format!("expected 'true' or 'false', got '{other}'"),
        }),
    }
}

fn parse_on_off(token: &str) -> Result<bool, ReconfigError> {
    match token {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(ReconfigError::InvalidCommand {
            reason: format!("expected 'on' or 'off', got '{other}'"),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(
    verb: &str,
    field: &str,
    token: &str,
) -> Result<T, ReconfigError> {
    token.parse().map_err(|_| ReconfigError::InvalidCommand {
        reason: format!("{verb}: '{token}' is not a valid {field}"),
    })
}
