//! File sink: stringify a token stream and write it to disk.

use std::path::{Path, PathBuf};

use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::emitter::{emit, EmitterOptions};
use crate::error::PipelineError;
use crate::token::TokenResult;

/// Consume a token stream, stringify it and write it to `path`. Returns the
/// number of bytes written.
///
/// On any pipeline or I/O error the partially written output is renamed with
/// a `-partial` suffix and the error propagates with its cause chain, so a
/// crashed run never masquerades as a complete document.
#[instrument(target = "jsonflow::sink", skip(tokens, path), fields(path = %path.as_ref().display()))]
pub async fn write_json_file<S>(
    tokens: S,
    path: impl AsRef<Path>,
    options: EmitterOptions,
) -> Result<u64, PipelineError>
where
    S: Stream<Item = TokenResult>,
{
    let path = path.as_ref();
    match write_inner(tokens, path, options).await {
        Ok(written) => {
            info!(target: "jsonflow::sink", written, "output complete");
            Ok(written)
        }
        Err(e) => {
            let partial = partial_path(path);
            match tokio::fs::rename(path, &partial).await {
                Ok(()) => {
                    warn!(
                        target: "jsonflow::sink",
                        partial = %partial.display(),
                        "pipeline failed, kept partial output"
                    );
                }
                Err(rename_err) => {
                    warn!(
                        target: "jsonflow::sink",
                        error = %rename_err,
                        "pipeline failed and partial output could not be renamed"
                    );
                }
            }
            Err(e)
        }
    }
}

async fn write_inner<S>(
    tokens: S,
    path: &Path,
    options: EmitterOptions,
) -> Result<u64, PipelineError>
where
    S: Stream<Item = TokenResult>,
{
    let mut file = File::create(path).await?;
    let output = emit(tokens, options);
    pin_mut!(output);
    let mut written = 0u64;
    while let Some(chunk) = output.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push("-partial");
    path.with_file_name(name)
}
