//! Aggregate command splitting.
//!
//! An aggregate task is several sub-commands joined by `&&`. Detection is
//! lexical: a `&&` inside quotes is still a split point.

use crate::types::TaskKind;

/// Token that joins the sub-commands of an aggregate task.
pub const AGGREGATE_SEPARATOR: &str = "&&";

/// Returns true if `command` contains the aggregate separator.
///
/// ## Examples
///
/// ```
/// use tasker_lib::is_aggregate;
///
/// assert!(is_aggregate("cargo build && cargo test"));
/// assert!(!is_aggregate("cargo build"));
/// ```
pub fn is_aggregate(command: &str) -> bool {
    command.contains(AGGREGATE_SEPARATOR)
}

/// Splits `command` into its ordered sub-commands.
///
/// Each segment is trimmed and empty segments are dropped. A command without
/// the separator yields a single element equal to the trimmed input.
///
/// ## Examples
///
/// ```
/// use tasker_lib::split_aggregate;
///
/// assert_eq!(
///     split_aggregate(" echo hi &&  && echo bye "),
///     vec!["echo hi", "echo bye"],
/// );
/// assert_eq!(split_aggregate("  ls -la "), vec!["ls -la"]);
/// ```
pub fn split_aggregate(command: &str) -> Vec<String> {
    command
        .split(AGGREGATE_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Classifies a command as normal or aggregate.
pub fn task_kind(command: &str) -> TaskKind {
    if is_aggregate(command) {
        TaskKind::Aggregate
    } else {
        TaskKind::Normal
    }
}

/// Joins commands into a single aggregate command line.
///
/// Blank commands are skipped.
///
/// ## Examples
///
/// ```
/// use tasker_lib::join_aggregate;
///
/// assert_eq!(join_aggregate(["make", " ", "make install "]), "make && make install");
/// ```
pub fn join_aggregate<I, S>(commands: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    commands
        .into_iter()
        .filter_map(|c| {
            let trimmed = c.as_ref().trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect::<Vec<_>>()
        .join(&format!(" {AGGREGATE_SEPARATOR} "))
}
