//! Operator commands typed into the interactive watch mode.

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Start,
    Stop,
    CloseAll,
    CancelAll,
    SetTicker(String),
    SetQuantity(f64),
    SetSpread(f64),
    SetInterval(u64),
    SetBoost(bool),
    SetMaxExposure(f64),
    SetTarget(f64),
    TogglePlanner,
    RefreshPrice,
    Account,
    View,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  start | stop | close-all | cancel-all
  ticker <SYMBOL> | qty <N> | spread <N> | interval <SECONDS>
  boost on|off | exposure <N>
  target <VOLUME> | planner
  price | account | view | help | quit";

impl OperatorCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Err("empty command".into());
        };
        let arg = parts.next();
        if parts.next().is_some() {
            return Err(format!("too many arguments for '{head}'"));
        }

        let command = match (head.to_ascii_lowercase().as_str(), arg) {
            ("start", None) => OperatorCommand::Start,
            ("stop", None) => OperatorCommand::Stop,
            ("close-all" | "close_all" | "panic", None) => OperatorCommand::CloseAll,
            ("cancel-all" | "cancel_all", None) => OperatorCommand::CancelAll,
            ("ticker", Some(symbol)) => OperatorCommand::SetTicker(symbol.to_ascii_uppercase()),
            ("qty" | "quantity", Some(v)) => OperatorCommand::SetQuantity(number(head, v)?),
            ("spread", Some(v)) => OperatorCommand::SetSpread(number(head, v)?),
            ("interval", Some(v)) => OperatorCommand::SetInterval(
                v.parse()
                    .map_err(|_| format!("'{head}' expects whole seconds, got '{v}'"))?,
            ),
            ("boost", Some(v)) => OperatorCommand::SetBoost(switch(v)?),
            ("exposure" | "max-exposure", Some(v)) => {
                OperatorCommand::SetMaxExposure(number(head, v)?)
            }
            ("target", Some(v)) => OperatorCommand::SetTarget(number(head, v)?),
            ("planner", None) => OperatorCommand::TogglePlanner,
            ("price", None) => OperatorCommand::RefreshPrice,
            ("account", None) => OperatorCommand::Account,
            ("view" | "status", None) => OperatorCommand::View,
            ("help" | "?", None) => OperatorCommand::Help,
            ("quit" | "exit" | "q", None) => OperatorCommand::Quit,
            _ => return Err(format!("unknown command '{}'", line.trim())),
        };
        Ok(command)
    }
}

fn number(head: &str, raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("'{head}' expects a number, got '{raw}'"))
}

fn switch(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
