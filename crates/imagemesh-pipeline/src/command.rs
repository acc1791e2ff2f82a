//! Pipeline backed by an external inference command.
//!
//! The command is described by the model directory's manifest and runs as a
//! child process with timeout management and output capturing. Each run
//! gets its own temp directory, owned by the returned [`MeshFile`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use imagemesh_core::Logger;

use crate::error::ConversionError;
use crate::manifest::PipelineManifest;
use crate::mesh::{Mesh, MeshFile, MeshFormat};
use crate::pipeline::{LoadOptions, MeshPipeline, PipelineLoader};

/// Maximum stderr characters kept in a [`ConversionError::ProcessFailed`].
const STDERR_LIMIT: usize = 2000;

/// Environment variables set on the child when loading is local-only.
const OFFLINE_ENV: [(&str, &str); 2] = [
    ("HF_HUB_OFFLINE", "1"),
    ("IMAGEMESH_LOCAL_FILES_ONLY", "1"),
];

/// Loads a [`CommandPipeline`] from a model directory.
#[derive(Debug, Clone)]
pub struct CommandPipelineLoader {
    logger: Logger,
}

impl CommandPipelineLoader {
    /// Create a loader that hands `logger` to every pipeline it builds.
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.named("pipeline"),
        }
    }
}

#[async_trait]
impl PipelineLoader for CommandPipelineLoader {
    async fn from_pretrained(
        &self,
        model_dir: &Path,
        options: LoadOptions,
    ) -> Result<Arc<dyn MeshPipeline>, ConversionError> {
        let pipeline = CommandPipeline::from_pretrained(model_dir, options, self.logger.clone())
            .await?;
        Ok(Arc::new(pipeline))
    }
}

/// Runs an inference command once per image.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    model_dir: PathBuf,
    command: PathBuf,
    manifest: PipelineManifest,
    env_vars: HashMap<String, String>,
    logger: Logger,
}

impl CommandPipeline {
    /// Resolve the pipeline stored in `model_dir`.
    ///
    /// Fails if the directory is missing, its manifest is absent or invalid,
    /// or the inference command cannot be found.
    pub async fn from_pretrained(
        model_dir: &Path,
        options: LoadOptions,
        logger: Logger,
    ) -> Result<Self, ConversionError> {
        let model_dir = std::path::absolute(model_dir)?;
        if !tokio::fs::metadata(&model_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(ConversionError::ModelDirNotFound { path: model_dir });
        }

        let manifest = PipelineManifest::load(&model_dir)?;
        let command = manifest.command_path(&model_dir);

        let found = if command.components().count() == 1 {
            check_command_available(&manifest.command)
        } else {
            command.is_file()
        };
        if !found {
            return Err(ConversionError::CommandNotFound(
                command.display().to_string(),
            ));
        }

        let mut env_vars = manifest.env.clone();
        if options.local_files_only {
            for (key, value) in OFFLINE_ENV {
                env_vars.insert(key.to_string(), value.to_string());
            }
        }

        logger.in_scope(|| {
            tracing::info!(
                model_dir = %model_dir.display(),
                command = %command.display(),
                format = manifest.format().extension(),
                timeout_seconds = manifest.timeout_seconds,
                local_files_only = options.local_files_only,
                "Loaded command pipeline"
            )
        });

        Ok(Self {
            model_dir,
            command,
            manifest,
            env_vars,
            logger,
        })
    }

    /// Absolute model directory.
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Format the command writes.
    pub fn output_format(&self) -> MeshFormat {
        self.manifest.format()
    }

    /// Substitute template placeholders in the manifest arguments.
    pub fn substitute_args(&self, input_path: &Path, output_path: &Path) -> Vec<String> {
        let input_str = input_path.to_string_lossy();
        let output_str = output_path.to_string_lossy();
        let output_dir = output_path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let model_dir = self.model_dir.to_string_lossy();
        let format = self.manifest.format().extension();

        self.manifest
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input_str)
                    .replace("{output}", &output_str)
                    .replace("{output_dir}", &output_dir)
                    .replace("{format}", format)
                    .replace("{model_dir}", &model_dir)
            })
            .collect()
    }

    async fn run(&self, image: &Path, output_path: &Path) -> Result<(), ConversionError> {
        let args = self.substitute_args(image, output_path);
        let start = Instant::now();

        self.logger.in_scope(|| {
            tracing::debug!(
                command = %self.command.display(),
                ?args,
                input = %image.display(),
                output = %output_path.display(),
                "Executing inference"
            )
        });

        let mut cmd = Command::new(&self.command);
        cmd.args(&args)
            .current_dir(&self.model_dir)
            .envs(&self.env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.manifest.timeout_seconds);
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                self.logger.error(format!(
                    "Inference timed out after {}s: command='{}'",
                    self.manifest.timeout_seconds,
                    self.command.display()
                ));
                return Err(ConversionError::Timeout(self.manifest.timeout_seconds));
            }
        };

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .chars()
                .take(STDERR_LIMIT)
                .collect();
            self.logger.in_scope(|| {
                tracing::error!(
                    command = %self.command.display(),
                    code,
                    stderr = %stderr.chars().take(500).collect::<String>(),
                    "Inference failed"
                )
            });
            return Err(ConversionError::ProcessFailed { code, stderr });
        }

        let size = tokio::fs::metadata(output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            self.logger.warn(format!(
                "Inference succeeded but produced no mesh at '{}'",
                output_path.display()
            ));
            return Err(ConversionError::OutputMissing(output_path.to_path_buf()));
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        self.logger.in_scope(|| {
            tracing::info!(
                duration_ms,
                output_size = size,
                "Inference completed"
            )
        });
        Ok(())
    }
}

#[async_trait]
impl MeshPipeline for CommandPipeline {
    async fn generate(&self, image: &Path) -> Result<Vec<Box<dyn Mesh>>, ConversionError> {
        let workspace = tempfile::Builder::new()
            .prefix("imagemesh-job-")
            .tempdir()?;
        let output_path = workspace
            .path()
            .join(format!("mesh.{}", self.output_format().extension()));

        self.run(image, &output_path).await?;

        let mesh = MeshFile::in_workspace(output_path, workspace)?;
        Ok(vec![Box::new(mesh)])
    }
}

/// Check if a bare command name resolves to a file on `PATH`.
pub fn check_command_available(command: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(command);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}
