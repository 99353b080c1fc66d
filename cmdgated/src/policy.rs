// ABOUTME: enforces a deny policy over approved shell commands before execution.
// ABOUTME: keeps destructive programs out even when a user approves them by mistake.

fn is_program_denied(program: &str) -> bool {
    let name = program.rsplit('/').next().unwrap_or(program);
    match name {
        "dd" => true,
        "shutdown" | "reboot" | "halt" | "poweroff" => true,
        n if n == "mkfs" || n.starts_with("mkfs.") => true,
        _ => false,
    }
}

/// Checks the leading program of every pipeline and list segment.
pub fn is_command_denied(command_text: &str) -> bool {
    command_text
        .split(|c| matches!(c, ';' | '|' | '&' | '\n' | '(' | ')'))
        .filter_map(leading_program)
        .any(is_program_denied)
}

fn leading_program(segment: &str) -> Option<&str> {
    segment
        .split_whitespace()
        .find(|word| !is_env_assignment(word) && !matches!(*word, "sudo" | "exec" | "env" | "nohup"))
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        None => false,
    }
}
