use std::fmt::Display;

use colored::Colorize;
use log::{Level, LevelFilter, SetLoggerError};

/// Logs to stdout. unison's own crates log up to `level`, everything else
/// only reports warnings and errors.
pub fn init_logger(level: LevelFilter) -> Result<(), SetLoggerError> {
    fern::Dispatch::new()
        .format(move |out, message, record| {
            let target = Target::from(record.target());
            let now = chrono::Local::now();

            out.finish(format_args!(
                "{:^5} {} {:^8} {}",
                level_label(record.level()),
                now.format("%H:%M:%S").to_string().bright_black(),
                target,
                message
            ))
        })
        .filter(move |meta| is_enabled(&Target::from(meta.target()), meta.level(), level))
        .chain(std::io::stdout())
        .apply()
}

fn is_enabled(target: &Target, level: Level, max: LevelFilter) -> bool {
    match target {
        Target::External(_) => level <= Level::Warn,
        _ => level <= max,
    }
}

/// The crate a log record came from
#[derive(Debug, PartialEq)]
enum Target {
    External(String),
    Server,
    Collab,
    Core,
    Client,
}

impl From<&str> for Target {
    fn from(target: &str) -> Self {
        match target.split("::").next().unwrap_or(target) {
            "unison_core" => Self::Core,
            "unison_server" => Self::Server,
            "unison_collab" => Self::Collab,
            "unison_client" => Self::Client,
            other => Self::External(other.to_string()),
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::External(name) => name.as_str().clear(),
            Self::Server => "SERVER".bright_green(),
            Self::Collab => "COLLAB".bright_purple(),
            Self::Core => "CORE".blue(),
            Self::Client => "CLIENT".cyan(),
        };

        Display::fmt(&label, f)
    }
}

fn level_label(level: Level) -> String {
    match level {
        Level::Error => " ERR ".black().on_red().bold().to_string(),
        Level::Warn => " WRN ".black().on_yellow().bold().to_string(),
        Level::Info => " INF ".black().on_blue().bold().to_string(),
        Level::Debug => " DBG ".white().on_black().to_string(),
        Level::Trace => " TRC ".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_labelled_by_crate() {
        assert_eq!(Target::from("unison_collab::rooms::room"), Target::Collab);
        assert_eq!(Target::from("unison_server"), Target::Server);
        assert_eq!(Target::from("unison_client::session"), Target::Client);
        assert_eq!(
            Target::from("hyper::proto"),
            Target::External("hyper".to_string())
        );
    }

    #[test]
    fn external_crates_only_report_problems() {
        let hyper = Target::from("hyper::proto");
        let room = Target::from("unison_collab::rooms::room");

        assert!(is_enabled(&hyper, Level::Warn, LevelFilter::Trace));
        assert!(!is_enabled(&hyper, Level::Info, LevelFilter::Trace));

        assert!(is_enabled(&room, Level::Info, LevelFilter::Info));
        assert!(!is_enabled(&room, Level::Debug, LevelFilter::Info));
        assert!(is_enabled(&room, Level::Debug, LevelFilter::Debug));
        assert!(!is_enabled(&room, Level::Error, LevelFilter::Off));
    }
}
