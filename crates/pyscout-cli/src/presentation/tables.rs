use pyscout_core::{EnvCollectionEvent, PythonEnvInfo};

/// Print a horizontal separator line.
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Truncate a string to at most `max_len` characters, marking the cut with
/// an ellipsis.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// One table row for `env`.
pub fn env_row(env: &PythonEnvInfo) -> String {
    let name = if env.name.is_empty() { "--" } else { env.name.as_str() };
    format!(
        "{:<16} {:<12} {:<20} {}",
        env.kind.as_str(),
        env.version.to_string(),
        truncate_string(name, 19),
        env.filename().display()
    )
}

pub fn print_env_table(envs: &[PythonEnvInfo]) {
    println!("{:<16} {:<12} {:<20} Executable", "Kind", "Version", "Name");
    print_separator(80);
    for env in envs {
        println!("{}", env_row(env));
    }
}

/// Single-line description of a collection change.
pub fn describe_event(event: &EnvCollectionEvent) -> String {
    match event {
        EnvCollectionEvent::ClearAll => event.event_name().to_string(),
        EnvCollectionEvent::Add { env } => format!(
            "{} {} ({}, {})",
            event.event_name(),
            env.filename().display(),
            env.kind.as_str(),
            env.version
        ),
        EnvCollectionEvent::Update { old, new } if old.version != new.version => format!(
            "{} {} ({} -> {})",
            event.event_name(),
            new.filename().display(),
            old.version,
            new.version
        ),
        EnvCollectionEvent::Update { new, .. } => {
            format!("{} {}", event.event_name(), new.filename().display())
        }
        EnvCollectionEvent::Remove { old } => {
            format!("{} {}", event.event_name(), old.filename().display())
        }
    }
}
