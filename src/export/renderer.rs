// src/export/renderer.rs
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::ExportError;
use crate::app_log;
use crate::environment::RendererSettings;
use crate::media_validator::looks_like_pdf;

/// Turns a complete HTML page into PDF bytes.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>, ExportError>;
}

/// Pipes HTML through an external converter (`weasyprint - -` by default).
pub struct CommandRenderer {
    settings: RendererSettings,
}

impl CommandRenderer {
    pub fn new(settings: RendererSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, ExportError> {
        let program = &self.settings.program;

        let mut child = Command::new(program)
            .args(&self.settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExportError::Render(format!("failed to start {}: {}", program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExportError::Render("renderer stdin unavailable".to_string()))?;
        let input = html.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });

        let timeout = Duration::from_secs(self.settings.timeout_seconds);
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ExportError::Render(format!(
                    "{} timed out after {}s",
                    program, self.settings.timeout_seconds
                ))
            })?
            .map_err(|e| ExportError::Render(format!("{} failed: {}", program, e)))?;

        if let Ok(Err(e)) = writer.await {
            app_log!(debug, "Renderer closed stdin early: {}", e);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExportError::Render(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        if !looks_like_pdf(&output.stdout) {
            return Err(ExportError::Render(format!(
                "{} did not produce a PDF ({} bytes)",
                program,
                output.stdout.len()
            )));
        }

        app_log!(
            debug,
            "Rendered {} bytes of HTML into {} bytes of PDF",
            html.len(),
            output.stdout.len()
        );
        Ok(output.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, timeout_seconds: u64) -> CommandRenderer {
        CommandRenderer::new(RendererSettings {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_seconds,
        })
    }

    #[tokio::test]
    async fn test_reads_pdf_from_stdout() {
        let renderer = shell("cat > /dev/null; printf '%%PDF-1.4 rendered'", 10);
        let pdf = renderer.render("<html></html>").await.unwrap();
        assert_eq!(pdf, b"%PDF-1.4 rendered");
    }

    #[tokio::test]
    async fn test_non_pdf_output_is_a_failure() {
        let renderer = shell("cat", 10);
        let err = renderer.render("<html></html>").await.unwrap_err();
        assert!(matches!(err, ExportError::Render(_)));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_failure() {
        let renderer = shell("echo broken template >&2; exit 3", 10);
        let err = renderer.render("<html></html>").await.unwrap_err();
        assert!(err.to_string().contains("broken template"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let renderer = shell("sleep 5", 1);
        let err = renderer.render("<html></html>").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let renderer = CommandRenderer::new(RendererSettings {
            program: "cvfolio-no-such-renderer".to_string(),
            ..Default::default()
        });
        assert!(renderer.render("<html></html>").await.is_err());
    }
}
