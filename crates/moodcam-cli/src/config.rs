use std::path::PathBuf;

/// Default journal directory: `$XDG_DATA_HOME/moodcam`, falling back to
/// `~/.local/share/moodcam`.
pub fn default_data_dir() -> PathBuf {
    data_dir_from(
        std::env::var("XDG_DATA_HOME").ok(),
        std::env::var("HOME").ok(),
    )
}

fn data_dir_from(xdg_data_home: Option<String>, home: Option<String>) -> PathBuf {
    xdg_data_home
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(home.unwrap_or_else(|| "/tmp".to_string())).join(".local/share")
        })
        .join("moodcam")
}
