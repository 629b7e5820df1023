use crate::models::{Command, CommandError, MoveRequest};

/// Parses one protocol line: `COMMAND,arg1,arg2,...`.
///
/// The command name is case-insensitive and every argument is trimmed.
/// Axis names are returned lowercased and are not checked here, so a
/// malformed number is reported before an unknown axis.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let mut parts = line.trim().split(',').map(str::trim);
    let name = parts.next().unwrap_or_default().to_uppercase();
    let args: Vec<&str> = parts.collect();

    let command = match name.as_str() {
        "CONFIG_AXIS" => {
            let cmd = "CONFIG_AXIS";
            let axis = argument(&args, 0, cmd, "axis")?;
            let pulses_per_revolution = number(&args, 1, cmd, "pulses_per_revolution")?;
            let lead = number(&args, 2, cmd, "lead")?;

            Command::ConfigAxis {
                axis: axis.to_lowercase(),
                pulses_per_revolution,
                lead,
            }
        }
        "CONFIG_Z_PEEL" => {
            let cmd = "CONFIG_Z_PEEL";
            expect_count(&args, 4, cmd)?;

            Command::ConfigZPeel {
                lift: number(&args, 0, cmd, "lift")?,
                ret: number(&args, 1, cmd, "return")?,
                speed_down: number(&args, 2, cmd, "speed_down")?,
                speed_up: number(&args, 3, cmd, "speed_up")?,
            }
        }
        "CONFIG_A_WIPE" => {
            let cmd = "CONFIG_A_WIPE";
            expect_count(&args, 2, cmd)?;

            Command::ConfigAWipe {
                fast: number(&args, 0, cmd, "fast")?,
                slow: number(&args, 1, cmd, "slow")?,
            }
        }
        "NEXT_LAYER" => Command::NextLayer,
        "MOVE_REL" => {
            let cmd = "MOVE_REL";
            let axis = argument(&args, 0, cmd, "axis")?;
            let request = MoveRequest {
                distance: number(&args, 1, cmd, "distance")?,
                speed: number(&args, 2, cmd, "speed")?,
                accel: number(&args, 3, cmd, "accel")?,
            };

            Command::MoveRel {
                axis: axis.to_lowercase(),
                request,
            }
        }
        _ => Command::Unknown,
    };

    Ok(command)
}

fn argument<'a>(
    args: &[&'a str],
    index: usize,
    command: &'static str,
    name: &'static str,
) -> Result<&'a str, CommandError> {
    args.get(index)
        .copied()
        .ok_or(CommandError::MissingArgument {
            command,
            argument: name,
        })
}

fn number(
    args: &[&str],
    index: usize,
    command: &'static str,
    name: &'static str,
) -> Result<f64, CommandError> {
    let raw = argument(args, index, command, name)?;
    raw.parse::<f64>().map_err(|_| CommandError::InvalidNumber {
        argument: name,
        value: raw.to_string(),
    })
}

fn expect_count(args: &[&str], expected: usize, command: &'static str) -> Result<(), CommandError> {
    if args.len() != expected {
        return Err(CommandError::ArgumentCount {
            command,
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_axis_case_insensitively() {
        let command = parse_command("config_axis, Z ,12800, 5\r").unwrap();
        assert_eq!(
            command,
            Command::ConfigAxis {
                axis: "z".to_string(),
                pulses_per_revolution: 12800.0,
                lead: 5.0,
            }
        );
    }

    #[test]
    fn parses_move_rel_with_accel() {
        let command = parse_command("MOVE_REL,a,-2.5,10,20").unwrap();
        assert_eq!(
            command,
            Command::MoveRel {
                axis: "a".to_string(),
                request: MoveRequest {
                    distance: -2.5,
                    speed: 10.0,
                    accel: 20.0,
                },
            }
        );
    }

    #[test]
    fn number_errors_win_over_axis_names() {
        let err = parse_command("MOVE_REL,q,abc,10,20").unwrap_err();
        assert_eq!(
            err,
            CommandError::InvalidNumber {
                argument: "distance",
                value: "abc".to_string(),
            }
        );
    }

    #[test]
    fn peel_and_wipe_need_exact_argument_counts() {
        assert!(matches!(
            parse_command("CONFIG_Z_PEEL,5.05,5.0,20"),
            Err(CommandError::ArgumentCount { expected: 4, actual: 3, .. })
        ));
        assert!(matches!(
            parse_command("CONFIG_A_WIPE,80,10,1"),
            Err(CommandError::ArgumentCount { expected: 2, actual: 3, .. })
        ));
        assert_eq!(
            parse_command("CONFIG_A_WIPE,80,10").unwrap(),
            Command::ConfigAWipe {
                fast: 80.0,
                slow: 10.0
            }
        );
    }

    #[test]
    fn missing_arguments_are_reported() {
        assert_eq!(
            parse_command("CONFIG_AXIS,z,12800").unwrap_err(),
            CommandError::MissingArgument {
                command: "CONFIG_AXIS",
                argument: "lead",
            }
        );
    }

    #[test]
    fn anything_else_is_unknown() {
        assert_eq!(parse_command("HOME_ALL").unwrap(), Command::Unknown);
        assert_eq!(parse_command("").unwrap(), Command::Unknown);
        assert_eq!(parse_command("   ").unwrap(), Command::Unknown);
        assert_eq!(parse_command("NEXT_LAYER").unwrap(), Command::NextLayer);
    }
}
