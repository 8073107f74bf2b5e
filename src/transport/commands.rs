//! Inbound text parsing
//!
//! Maps message text to a typed command. Text that is not a known command is
//! a relay payload, including unknown slash commands.

use crate::error::ChatError;
use crate::types::{Gender, UserId};

/// A user or admin command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Find,
    Next,
    Stop,
    Rate(i64),
    MyRating,
    SetGender(Gender),
    /// `None` clears the preference
    SetPreference(Option<Gender>),
    Premium,
    Report(UserId),
    Admin,
    Ban(UserId),
    Unban(UserId),
    Stats,
    Logs(UserId),
}

impl Command {
    /// Stable name used for metrics and logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::Find => "find",
            Command::Next => "next",
            Command::Stop => "stop",
            Command::Rate(_) => "rate",
            Command::MyRating => "myrating",
            Command::SetGender(_) => "setgender",
            Command::SetPreference(_) => "setpref",
            Command::Premium => "premium",
            Command::Report(_) => "report",
            Command::Admin => "admin",
            Command::Ban(_) => "ban",
            Command::Unban(_) => "unban",
            Command::Stats => "stats",
            Command::Logs(_) => "logs",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Command::Admin | Command::Ban(_) | Command::Unban(_) | Command::Stats | Command::Logs(_)
        )
    }
}

/// Parsed inbound text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Text(String),
}

fn invalid(usage: &str) -> ChatError {
    ChatError::InvalidArgument {
        usage: usage.to_string(),
    }
}

fn user_id_arg(arg: Option<&str>, usage: &str) -> Result<UserId, ChatError> {
    arg.and_then(|a| a.parse::<UserId>().ok())
        .ok_or_else(|| invalid(usage))
}

/// Parse one inbound text message
pub fn parse_input(text: &str) -> Result<Input, ChatError> {
    let trimmed = text.trim();
    let mut parts = trimmed.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(Input::Text(text.to_string()));
    };
    let arg = parts.next();

    // "report <id>" is accepted without a slash, but only as the whole message
    let bare_report = head.eq_ignore_ascii_case("report");
    if bare_report || head.eq_ignore_ascii_case("/report") {
        let id = arg.and_then(|a| a.parse::<UserId>().ok());
        if bare_report && parts.next().is_some() {
            return Ok(Input::Text(text.to_string()));
        }
        return match id {
            Some(id) => Ok(Input::Command(Command::Report(id))),
            None if head.starts_with('/') => Err(invalid("Usage: /report <user id>")),
            None => Ok(Input::Text(text.to_string())),
        };
    }

    let Some(name) = head.strip_prefix('/') else {
        return Ok(Input::Text(text.to_string()));
    };
    // Telegram appends "@botname" in group-style invocations
    let name = name.split('@').next().unwrap_or(name).to_ascii_lowercase();

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "find" => Command::Find,
        "next" => Command::Next,
        "stop" => Command::Stop,
        "rate" => {
            let arg = arg.ok_or_else(|| invalid("Usage: /rate <1-5>"))?;
            let score = arg
                .parse::<i64>()
                .map_err(|_| invalid("Please enter a number from 1 to 5."))?;
            Command::Rate(score)
        }
        "myrating" => Command::MyRating,
        "setgender" => {
            let arg = arg.ok_or_else(|| invalid("Usage: /setgender <male|female|other>"))?;
            Command::SetGender(arg.parse()?)
        }
        "setpref" => {
            let arg = arg.ok_or_else(|| invalid("Usage: /setpref <male|female|other|any>"))?;
            if arg.eq_ignore_ascii_case("any") {
                Command::SetPreference(None)
            } else {
                Command::SetPreference(Some(arg.parse()?))
            }
        }
        "premium" => Command::Premium,
        "admin" => Command::Admin,
        "ban" => Command::Ban(user_id_arg(arg, "Usage: /ban <user id>")?),
        "unban" => Command::Unban(user_id_arg(arg, "Usage: /unban <user id>")?),
        "stats" => Command::Stats,
        "logs" => Command::Logs(user_id_arg(arg, "Usage: /logs <user id>")?),
        _ => return Ok(Input::Text(text.to_string())),
    };

    Ok(Input::Command(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(text: &str) -> Command {
        match parse_input(text).unwrap() {
            Input::Command(c) => c,
            Input::Text(t) => panic!("expected command, got text {t:?}"),
        }
    }

    fn usage(text: &str) -> String {
        match parse_input(text) {
            Err(ChatError::InvalidArgument { usage }) => usage,
            other => panic!("expected usage error, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(command("/find"), Command::Find);
        assert_eq!(command("  /NEXT "), Command::Next);
        assert_eq!(command("/stop@tete_bot"), Command::Stop);
        assert_eq!(command("/myrating"), Command::MyRating);
        assert_eq!(command("/premium"), Command::Premium);
    }

    #[test]
    fn test_rate_arguments() {
        assert_eq!(command("/rate 4"), Command::Rate(4));
        // Range is checked by the rating service
        assert_eq!(command("/rate 9"), Command::Rate(9));
        assert_eq!(usage("/rate"), "Usage: /rate <1-5>");
        assert_eq!(usage("/rate five"), "Please enter a number from 1 to 5.");
    }

    #[test]
    fn test_gender_commands() {
        assert_eq!(command("/setgender f"), Command::SetGender(Gender::Female));
        assert_eq!(
            command("/setpref male"),
            Command::SetPreference(Some(Gender::Male))
        );
        assert_eq!(command("/setpref ANY"), Command::SetPreference(None));
        assert!(parse_input("/setgender robot").is_err());
        assert!(parse_input("/setpref").is_err());
    }

    #[test]
    fn test_admin_commands() {
        assert_eq!(command("/ban 42"), Command::Ban(42));
        assert_eq!(command("/unban 42"), Command::Unban(42));
        assert_eq!(command("/logs 7"), Command::Logs(7));
        assert_eq!(command("/stats"), Command::Stats);
        assert!(command("/admin").is_admin());
        assert!(!command("/find").is_admin());
        assert_eq!(usage("/ban someone"), "Usage: /ban <user id>");
    }

    #[test]
    fn test_report_forms() {
        assert_eq!(command("report 55"), Command::Report(55));
        assert_eq!(command("Report 55"), Command::Report(55));
        assert_eq!(command("/report 55"), Command::Report(55));
        assert_eq!(usage("/report"), "Usage: /report <user id>");
        assert_eq!(
            parse_input("report card looks fine").unwrap(),
            Input::Text("report card looks fine".to_string())
        );
        assert_eq!(
            parse_input("report 5 pages done").unwrap(),
            Input::Text("report 5 pages done".to_string())
        );
    }

    #[test]
    fn test_plain_text_and_unknown_commands() {
        assert_eq!(
            parse_input("hello there").unwrap(),
            Input::Text("hello there".to_string())
        );
        assert_eq!(
            parse_input("/shrug").unwrap(),
            Input::Text("/shrug".to_string())
        );
        assert_eq!(parse_input("   ").unwrap(), Input::Text("   ".to_string()));
    }
}
