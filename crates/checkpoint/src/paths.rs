use std::{env, path::PathBuf};

/// Environment variable overriding the checkpoint root directory.
pub const CHECKPOINTS_ENV: &str = "LLAMA_CHECKPOINTS";

/// Resolves the directory holding checkpoint `name`.
///
/// Uses `$LLAMA_CHECKPOINTS/<name>` when set, else
/// `$HOME/.llama/checkpoints/<name>`, else a path relative to the working
/// directory.
pub fn checkpoint_dir(name: &str) -> PathBuf {
    let root = match env::var_os(CHECKPOINTS_ENV) {
        Some(root) if !root.is_empty() => PathBuf::from(root),
        _ => match env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".llama").join("checkpoints"),
            None => PathBuf::from(".llama").join("checkpoints"),
        },
    };
    root.join(name)
}
