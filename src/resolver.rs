//! Command resolver (§4.1): turns a launch spec into a concrete
//! `(executable, argv, env)` triple ready to hand to the OS spawn primitive.
//!
//! Pure aside from file-existence probes and a `which` lookup — no process is
//! spawned here.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{DockerSpec, LaunchSpec, RiskLevel};
use crate::error::RegistryError;

/// A concrete, spawnable command produced by [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub executable: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Whether the spawn primitive should go through a shell (§4.1 rule 3).
    /// `true` for a native, non-containerized command on a non-Windows
    /// target; `false` for docker-wrapped commands and for Windows targets,
    /// which either invoke the resolved path directly or go through `cmd
    /// /c` (already a shell-equivalent indirection) instead.
    pub use_shell: bool,
}

const PACKAGE_RUNNER_SHIMS: &[&str] = &["npm", "npx"];

/// Resolves a launch spec into a spawnable command, applying container
/// wrapping for High risk and package-runner shim resolution otherwise.
///
/// Returns `Err(RegistryError::MissingDockerImage)` only when risk is High
/// and no docker image is configured; the caller (§4.1 rule 1) downgrades the
/// server's effective risk class to Medium on that error rather than
/// treating it as fatal.
pub fn resolve(spec: &LaunchSpec) -> Result<ResolvedCommand, RegistryError> {
    if spec.risk_level == Some(RiskLevel::High) {
        return resolve_docker(spec);
    }
    Ok(resolve_native(spec))
}

fn resolve_docker(spec: &LaunchSpec) -> Result<ResolvedCommand, RegistryError> {
    let docker = spec
        .docker
        .as_ref()
        .filter(|d| !d.image.is_empty())
        .ok_or(RegistryError::MissingDockerImage)?;

    let mut args = vec!["run".to_string(), "--rm".to_string()];
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    for binding in &docker.volumes {
        args.push("-v".to_string());
        args.push(binding.clone());
    }
    if let Some(network) = &docker.network {
        args.push("--network".to_string());
        args.push(network.clone());
    }
    args.push(docker.image.clone());

    let is_shim = PACKAGE_RUNNER_SHIMS.contains(&spec.command.as_str());
    if !is_shim {
        args.push(spec.command.clone());
        args.extend(spec.args.iter().cloned());
    }

    Ok(ResolvedCommand {
        executable: "docker".to_string(),
        args,
        env: BTreeMap::new(),
        use_shell: false,
    })
}

fn resolve_native(spec: &LaunchSpec) -> ResolvedCommand {
    let is_shim = PACKAGE_RUNNER_SHIMS.contains(&spec.command.as_str());
    let resolved_path = if is_shim {
        resolve_shim_path(&spec.command)
    } else {
        spec.command.clone()
    };

    if cfg!(target_os = "windows") && resolved_path.ends_with(".cmd") {
        let mut args = vec!["/c".to_string(), resolved_path];
        args.extend(spec.args.iter().cloned());
        return ResolvedCommand {
            executable: "cmd".to_string(),
            args,
            env: spec.env.clone(),
            use_shell: false,
        };
    }

    ResolvedCommand {
        executable: resolved_path,
        args: spec.args.clone(),
        env: spec.env.clone(),
        use_shell: !cfg!(target_os = "windows"),
    }
}

#[cfg(target_os = "windows")]
fn resolve_shim_path(command: &str) -> String {
    let candidates = windows_candidates(command);
    candidates
        .into_iter()
        .find(|path| path.exists())
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|| command.to_string())
}

#[cfg(target_os = "windows")]
fn windows_candidates(command: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(app_data) = std::env::var("APPDATA") {
        candidates.push(PathBuf::from(app_data).join("npm").join(format!("{command}.cmd")));
    }
    if let Ok(program_files) = std::env::var("ProgramFiles") {
        candidates.push(
            PathBuf::from(program_files)
                .join("nodejs")
                .join(format!("{command}.cmd")),
        );
    }
    candidates.push(PathBuf::from(r"C:\Program Files\nodejs").join(format!("{command}.cmd")));
    candidates
}

#[cfg(not(target_os = "windows"))]
fn resolve_shim_path(command: &str) -> String {
    which::which(command)
        .ok()
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|| command.to_string())
}
