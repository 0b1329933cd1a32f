//! Builders for the external processes this crate runs: AppleScript snippets
//! for `System Events` and the `sqlite3` query against Zed's workspace
//! database.

use std::fmt;
use std::path::Path;

/// AppleScript error number for "application isn't running".
pub const PROCESS_NOT_RUNNING: i32 = -600;

pub const WORKSPACE_PATHS_SQL: &str =
    "SELECT paths FROM workspaces WHERE paths IS NOT NULL ORDER BY timestamp DESC";

const RAISED: &str = "true";

/// A single invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub label: &'static str,
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(
        label: &'static str,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            label,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn osascript(label: &'static str, script: String) -> Self {
        Self::new(label, "osascript", ["-e".to_string(), script])
    }

    /// The AppleScript source, if this is an `osascript -e` invocation.
    pub fn script(&self) -> Option<&str> {
        match (self.program.as_str(), self.args.as_slice()) {
            ("osascript", [flag, script]) if flag == "-e" => Some(script),
            _ => None,
        }
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.program)
    }
}

/// Quotes `value` as an AppleScript string literal.
pub fn applescript_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Whether the output of one of the raise scripts reports a raised window.
pub fn was_raised(output: &str) -> bool { output.trim() == RAISED }

pub fn list_window_titles(process: &str) -> ExternalCommand {
    let process = applescript_string(process);
    ExternalCommand::osascript(
        "list-window-titles",
        format!(
            r#"tell application "System Events"
    if not (exists process {process}) then error "not running" number {PROCESS_NOT_RUNNING}
    return name of every window of process {process}
end tell"#
        ),
    )
}

/// Raises the first window whose title is `name` or starts with
/// `name` followed by `separator`.
pub fn raise_window_named(process: &str, name: &str, separator: &str) -> ExternalCommand {
    let process = applescript_string(process);
    let exact = applescript_string(name);
    let prefix = applescript_string(&format!("{name}{separator}"));
    ExternalCommand::osascript(
        "raise-window",
        format!(
            r#"tell application "System Events"
    if not (exists process {process}) then return "false"
    tell process {process}
        repeat with w in windows
            set t to name of w
            if t is {exact} or t starts with {prefix} then
                perform action "AXRaise" of w
                set frontmost to true
                return "{RAISED}"
            end if
        end repeat
    end tell
end tell
return "false""#
        ),
    )
}

/// Raises the `index`-th (1-based) window titled exactly `title`.
pub fn raise_nth_window_titled(process: &str, title: &str, index: usize) -> ExternalCommand {
    let process = applescript_string(process);
    let title = applescript_string(title);
    ExternalCommand::osascript(
        "raise-untitled-window",
        format!(
            r#"tell application "System Events"
    if not (exists process {process}) then return "false"
    tell process {process}
        set hits to 0
        repeat with w in windows
            if name of w is {title} then
                set hits to hits + 1
                if hits is {index} then
                    perform action "AXRaise" of w
                    set frontmost to true
                    return "{RAISED}"
                end if
            end if
        end repeat
    end tell
end tell
return "false""#
        ),
    )
}

pub fn frontmost_application() -> ExternalCommand {
    ExternalCommand::osascript(
        "frontmost-application",
        concat!(
            r#"tell application "System Events" to return name of "#,
            "first application process whose frontmost is true",
        )
        .to_string(),
    )
}

pub fn open_in_editor(app_name: &str, path: &Path) -> ExternalCommand {
    ExternalCommand::new(
        "open-in-editor",
        "open",
        ["-a".to_string(), app_name.to_string(), path.display().to_string()],
    )
}

pub fn workspace_paths_query(sqlite: &str, database: &Path) -> ExternalCommand {
    ExternalCommand::new(
        "workspace-paths",
        sqlite,
        [
            "-readonly".to_string(),
            database.display().to_string(),
            WORKSPACE_PATHS_SQL.to_string(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn quotes_and_backslashes_are_escaped() {
        assert_eq!(applescript_string("plain"), "\"plain\"");
        assert_eq!(applescript_string(r#"a "b" \c"#), r#""a \"b\" \\c""#);
    }

    #[test]
    fn raise_script_matches_exact_title_or_separator_prefix() {
        let command = raise_window_named("zed", "bar", " — ");
        let script = command.script().unwrap();
        assert!(script.contains(r#"if t is "bar" or t starts with "bar — " then"#));
        assert!(script.contains(r#"exists process "zed""#));
    }

    #[test]
    fn untitled_script_counts_occurrences() {
        let command = raise_nth_window_titled("zed", "empty project", 2);
        let script = command.script().unwrap();
        assert!(script.contains(r#"if name of w is "empty project" then"#));
        assert!(script.contains("if hits is 2 then"));
    }

    #[test]
    fn title_script_reports_missing_process_as_error() {
        let command = list_window_titles("zed");
        assert!(command.script().unwrap().contains("number -600"));
    }

    #[test]
    fn database_query_is_read_only() {
        let command = workspace_paths_query("sqlite3", Path::new("/tmp/db.sqlite"));
        assert_eq!(command.program, "sqlite3");
        assert_eq!(command.args, vec![
            "-readonly".to_string(),
            "/tmp/db.sqlite".to_string(),
            WORKSPACE_PATHS_SQL.to_string(),
        ]);
        assert_eq!(command.script(), None);
    }

    #[test]
    fn raised_marker_ignores_trailing_newline() {
        assert!(was_raised("true\n"));
        assert!(!was_raised("false"));
        assert!(!was_raised(""));
    }
}
