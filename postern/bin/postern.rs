#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = find_config_file()?;
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let postern: postern::Postern = ron::from_str(&config_content)?;

    postern.run().await
}

/// Find the configuration file using the following precedence:
/// 1. `POSTERN_CONFIG` environment variable
/// 2. ./postern.config.ron (current working directory)
/// 3. /etc/postern/postern.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<std::path::PathBuf> {
    if let Ok(env_path) = std::env::var("POSTERN_CONFIG") {
        let path = std::path::PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "POSTERN_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        std::path::PathBuf::from("./postern.config.ron"),
        std::path::PathBuf::from("/etc/postern/postern.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - POSTERN_CONFIG environment variable\n{paths_tried}"
    )
}
